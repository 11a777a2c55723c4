//! Ora native SDK — the minimal types and traits needed to write native
//! functions callable from Ora bytecode without depending on `ora-vm`
//! internals.
//!
//! A native module implements [`NativeHandler`] and is registered with the
//! VM under a set of symbolic names (`"math.abs"`, `"io.print"`, ...). Each
//! handler receives a [`NativeContext`] — the VM's own implementation of
//! this trait — giving it allocation, field access, and call-back
//! capabilities without linking against the engine crate.
//!
//! ```ignore
//! use ora_native::{NativeContext, NativeHandler, NativeCallResult, NativeValue};
//!
//! struct Math;
//!
//! impl NativeHandler for Math {
//!     fn call(&self, _ctx: &dyn NativeContext, name: &str, args: &[NativeValue]) -> NativeCallResult {
//!         match name {
//!             "abs" => NativeCallResult::i64(args[0].as_i64().unwrap_or(0).abs()),
//!             _ => NativeCallResult::Unhandled,
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod convert;
pub mod error;
pub mod handler;
pub mod types;
pub mod value;

pub use context::{ClassInfo, NativeContext};
pub use convert::{FromNativeObject, ToNativeObject};
pub use error::{AbiResult, NativeError};
pub use handler::{NativeCallResult, NativeFunctionRegistry, NativeHandler, NativeHandlerFn, NoopNativeHandler};
pub use types::{NativeArray, NativeClass, NativeFunction, NativeMethod, NativeObject, ObjectSchema, ObjectSchemaBuilder};
pub use value::NativeValue;
