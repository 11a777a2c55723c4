//! VM-wide error taxonomy.
//!
//! One enum per failing subsystem rather than a single crate-wide error,
//! matching the layering of loading (before any bytecode runs) vs. running
//! (language-level exceptions bytecode can itself catch) vs. fatal faults
//! that abort the current invocation.

use crate::name::Name;

/// Failures while parsing or linking a package binary.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file does not start with the expected magic bytes.
    #[error("not an Ora package: bad magic")]
    BadMagic,

    /// The package was produced by an incompatible format version.
    #[error("unsupported package format version {0}")]
    UnsupportedVersion(u32),

    /// The binary ended before a table's declared length was satisfied.
    #[error("truncated package: expected {expected} more bytes at offset {offset}")]
    Truncated { offset: usize, expected: usize },

    /// A varint did not fit in 64 bits.
    #[error("malformed varint at offset {0}")]
    MalformedVarint(usize),

    /// A string/name pool index referenced a slot that doesn't exist.
    #[error("invalid pool index {index} (pool size {size})")]
    InvalidPoolIndex { index: u32, size: usize },

    /// No package satisfying the dependency's name and version range was
    /// found on any search path.
    #[error("unresolved dependency {0} (no package satisfies the version range)")]
    UnresolvedDependency(Name),

    /// The dependency graph contains a cycle.
    #[error("circular package dependency: {0}")]
    CircularDependency(String),

    /// A symbol referenced from another package's import table was not
    /// exported (or did not exist) in the resolved dependency.
    #[error("unresolved symbol {symbol} in package {package}")]
    UnresolvedSymbol { package: Name, symbol: Name },

    /// I/O failure reading the package file.
    #[error("I/O error loading package: {0}")]
    Io(#[from] std::io::Error),
}

/// A host symbol a native-flagged function needs was never registered.
#[derive(Debug, thiserror::Error)]
#[error("no native handler registered for {0}")]
pub struct NativeLinkError(pub String);

/// A language-level exception — the payload bytecode's `THROW` raises and
/// `PUSHTRY`/`POPTRY` can catch.
///
/// Carries the runtime class of the thrown value so a catch clause's type
/// test and the host's `Debug` output agree on identity.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{class_name}: {message}")]
pub struct VmException {
    /// Name of the exception's runtime class (e.g. `"OutOfBoundsError"`).
    pub class_name: String,
    /// Human-readable detail message.
    pub message: String,
}

impl VmException {
    /// Build an exception of the given class.
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), message: message.into() }
    }

    /// `UninitializedAccessError` — a `Global` or field was read before its
    /// initializer ran.
    pub fn uninitialized_access(what: &str) -> Self {
        Self::new("UninitializedAccessError", format!("access to uninitialized {what}"))
    }

    /// `OutOfBoundsError` — array/buffer index outside `[0, len)`.
    pub fn out_of_bounds(index: i64, len: usize) -> Self {
        Self::new("OutOfBoundsError", format!("index {index} out of bounds for length {len}"))
    }

    /// `CastError` — a checked downcast failed.
    pub fn bad_cast(from: &str, to: &str) -> Self {
        Self::new("CastError", format!("cannot cast {from} to {to}"))
    }

    /// `ArithmeticError` — division or modulo by zero.
    pub fn arithmetic(detail: &str) -> Self {
        Self::new("ArithmeticError", detail.to_string())
    }

    /// `NullDereferenceError` — a field/method access through `null`.
    pub fn null_dereference() -> Self {
        Self::new("NullDereferenceError", "dereference of null".to_string())
    }

    /// `NoSuchElementError` — an iterator or lookup found nothing.
    pub fn no_such_element(what: &str) -> Self {
        Self::new("NoSuchElementError", format!("no such element: {what}"))
    }
}

/// Top-level error returned to the host for a single invocation.
#[derive(Debug, thiserror::Error)]
pub enum VmFault {
    /// Bytecode threw and nothing caught it before it reached the entry
    /// frame. Carries the reconstructed call-stack trace (function name and
    /// PC offset per frame — no source locations, since the compiler that
    /// would map a PC to a source position is out of scope here).
    #[error("uncaught exception: {exception}\n{}", trace.join("\n"))]
    Uncaught { exception: VmException, trace: Vec<String> },

    /// An `ASSERT` opcode failed. Assertions are not catchable: they
    /// indicate the bytecode itself is inconsistent with its own invariants.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// The collector could not reclaim enough space to satisfy an
    /// allocation even after a full collection.
    #[error("heap exhausted: requested {requested} bytes, {available} available")]
    HeapExhausted { requested: usize, available: usize },

    /// Loading the entry package, or a dependency of it, failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}
