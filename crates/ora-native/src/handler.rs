//! `NativeHandler` — the dispatch interface a native module implements.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::NativeContext;
use crate::value::NativeValue;

/// Outcome of a native call.
///
/// Every call completes synchronously — there is no suspension protocol,
/// since the VM has no scheduler to resume a task from (native calls run to
/// completion on the interpreter's own stack, calling back into bytecode via
/// [`NativeContext::call_function`] as needed).
pub enum NativeCallResult {
    /// The call succeeded and produced a value.
    Value(NativeValue),
    /// This handler does not recognize the requested name.
    Unhandled,
    /// The call failed; message becomes a language-level exception.
    Error(String),
}

impl NativeCallResult {
    /// A successful result of `null`.
    #[inline]
    pub fn null() -> Self {
        Self::Value(NativeValue::null())
    }

    /// A successful `i32` result.
    #[inline]
    pub fn i32(val: i32) -> Self {
        Self::Value(NativeValue::i32(val))
    }

    /// A successful `i64` result.
    #[inline]
    pub fn i64(val: i64) -> Self {
        Self::Value(NativeValue::i64(val))
    }

    /// A successful `f64` result.
    #[inline]
    pub fn f64(val: f64) -> Self {
        Self::Value(NativeValue::f64(val))
    }

    /// A successful `bool` result.
    #[inline]
    pub fn bool(val: bool) -> Self {
        Self::Value(NativeValue::bool(val))
    }
}

/// Implemented by a native module to handle calls dispatched by symbolic
/// name (the name bytecode records for a `NATIVECALL`-flagged function).
pub trait NativeHandler: Send + Sync {
    /// Handle one call. Return `Unhandled` if `name` is not this module's.
    fn call(&self, ctx: &dyn NativeContext, name: &str, args: &[NativeValue]) -> NativeCallResult;
}

/// A handler that answers `Unhandled` to everything; the default before any
/// module registers.
pub struct NoopNativeHandler;

impl NativeHandler for NoopNativeHandler {
    fn call(&self, _ctx: &dyn NativeContext, _name: &str, _args: &[NativeValue]) -> NativeCallResult {
        NativeCallResult::Unhandled
    }
}

/// A single native function, registered by symbolic name.
pub type NativeHandlerFn = Arc<dyn Fn(&dyn NativeContext, &[NativeValue]) -> NativeCallResult + Send + Sync>;

/// Registry mapping symbolic native-call names to handler closures.
///
/// Populated by native modules at startup, consulted by the package loader
/// when linking a function flagged `is_native` (spec §4.5, §6): the name
/// stored in bytecode is looked up here once and the resolved closure is
/// cached on the `Function`, so steady-state dispatch never touches the map.
pub struct NativeFunctionRegistry {
    handlers: HashMap<String, NativeHandlerFn>,
}

impl NativeFunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a function under `name`, overwriting any prior registration.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl Fn(&dyn NativeContext, &[NativeValue]) -> NativeCallResult + Send + Sync + 'static,
    ) {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<NativeHandlerFn> {
        self.handlers.get(name).cloned()
    }

    /// Whether `name` has a registered handler.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for NativeFunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let mut reg = NativeFunctionRegistry::new();
        assert!(reg.is_empty());
        reg.register("math.abs", |_ctx, args| {
            let n = args[0].as_i64().unwrap_or(0);
            NativeCallResult::i64(n.abs())
        });
        assert!(reg.contains("math.abs"));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("math.missing").is_none());
    }
}
