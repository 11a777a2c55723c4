//! Ora bytecode virtual machine.
//!
//! - **Package loading**: binary format parsing and cross-package linking
//!   (`package` module).
//! - **Heap**: a precise, generational, moving GC (`heap`, `gc`, `object`,
//!   `tagged` modules).
//! - **Interpreter**: a register-based bytecode dispatch loop (`interpreter`
//!   module).
//! - **Native bridge**: dispatch to Rust functions registered via
//!   `ora-native` (`bridge` module).
//!
//! [`Vm`] ties these together into the one type an embedder constructs.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// The native call bridge: dispatches `is_native` functions to registered
/// handlers and implements `ora_native::NativeContext`.
pub mod bridge;

/// VM-wide error taxonomy: load failures, language-level exceptions, fatal
/// faults.
pub mod error;

/// Precise GC: semi-space copying new generation, mark-compact old
/// generation.
pub mod gc;

/// The managed heap and handle bookkeeping.
pub mod heap;

/// The bytecode interpreter.
pub mod interpreter;

/// Symbol names.
pub mod name;

/// Heap block layout: headers and shape metadata.
pub mod object;

/// Package loading, binary format, and dependency resolution.
pub mod package;

/// Per-function stack pointer maps for precise GC root scanning.
pub mod pointermap;

/// The substrate allocator: raw chunk management beneath the GC's spaces.
pub mod substrate;

/// The internal pointer-or-small-int GC word.
pub mod tagged;

/// The type system: `Type`, `Class`, `Field`, `Global`.
pub mod types;

/// The embedder-facing entry point.
pub mod vm;

pub use bridge::NativeBridge;
pub use error::{LoadError, NativeLinkError, VmException, VmFault};
pub use heap::{Handle, Heap, HeapOptions, PersistentHandle};
pub use interpreter::{ExecContext, Outcome};
pub use name::{Name, NameTable};
pub use object::{BlockHeader, Meta};
pub use package::{Dependency, Function, GlobalSlot, Package, Version, VersionRange};
pub use pointermap::StackPointerMap;
pub use tagged::Tagged;
pub use types::{Class, ClassTable, Field, Global, MethodSlot, Type};
pub use vm::{Vm, VmOptions};
