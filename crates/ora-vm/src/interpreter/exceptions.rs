//! `PUSHTRY`/`POPTRY`/`THROW`: per-frame exception handler stack.

use std::sync::Arc;

use crate::error::VmException;
use crate::package::Package;
use crate::types::Class;

/// One active `try` region within a single frame.
#[derive(Clone, Copy)]
pub struct TryHandler {
    /// PC to jump to if a matching exception is thrown while this handler
    /// is on top of the stack.
    pub catch_target: u32,
    /// Index into the frame's owning package's class table of the
    /// exception type this handler catches.
    pub exception_class_index: u32,
}

/// A frame's try-handler stack, pushed/popped by `PUSHTRY`/`POPTRY`.
#[derive(Default, Clone)]
pub struct TryStack {
    handlers: Vec<TryHandler>,
}

impl TryStack {
    /// An empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new handler, active until its matching `POPTRY`.
    pub fn push(&mut self, handler: TryHandler) {
        self.handlers.push(handler);
    }

    /// Pop the innermost handler.
    pub fn pop(&mut self) {
        self.handlers.pop();
    }

    /// Search from the innermost handler outward for one whose exception
    /// class is a superclass of (or equal to) `thrown`'s runtime class,
    /// popping every handler searched past (including the match, which the
    /// caller re-establishes with its own `PUSHTRY` if it wants to nest).
    pub fn find_handler(&mut self, package: &Package, thrown_class: &Class) -> Option<u32> {
        while let Some(handler) = self.handlers.pop() {
            let Some(catch_class) = package.classes.get(handler.exception_class_index as usize) else {
                continue;
            };
            if thrown_class.is_subclass_of(catch_class) {
                return Some(handler.catch_target);
            }
        }
        None
    }
}

/// Build a class for a thrown built-in [`VmException`] that has no
/// corresponding user-defined class in any loaded package — the small set
/// of exception classes the interpreter itself raises (`CastError`,
/// `OutOfBoundsError`, etc.) are synthesized once and cached here rather
/// than requiring every package to declare them.
pub fn builtin_exception_class(exception: &VmException) -> Arc<Class> {
    Class::shell(crate::name::Name::parse(&exception.class_name), 0, true)
}
