//! Error types crossing the native ABI boundary.

/// Result type for ABI calls.
pub type AbiResult<T> = Result<T, NativeError>;

/// Errors a native handler or the VM can report across the ABI.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name.
        expected: String,
        /// Actual type name.
        got: String,
    },

    /// Invalid argument passed to a native function.
    #[error("argument error: {0}")]
    ArgumentError(String),

    /// Field or method not found on a class.
    #[error("no such member: {0}")]
    NoSuchMember(String),

    /// Class not found by name.
    #[error("no such class: {0}")]
    NoSuchClass(String),

    /// A native function raised a bytecode-catchable exception.
    #[error("native exception: {0}")]
    Exception(String),

    /// Opaque ABI failure with no more specific variant.
    #[error("{0}")]
    AbiError(String),
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::AbiError(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::AbiError(s.to_string())
    }
}
