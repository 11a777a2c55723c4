//! Handle scopes: the GC-safe way host Rust code holds a reference into the
//! moving heap across any call that might trigger a collection.
//!
//! A raw `Tagged` pointer is only valid until the next allocation; a
//! `Handle` is instead an index into a scope's backing slab, which the
//! collector walks as a root set and updates in place when it relocates the
//! objects the slab points at. Scopes nest: opening one pushes a mark,
//! closing it truncates the slab back to that mark, dropping every handle
//! opened since (mirrors the teacher's own stack-discipline handle scopes,
//! generalized from a fixed stack to one per heap).

use crate::tagged::Tagged;

/// An index into the enclosing scope's slab. Valid only while that scope
/// (or an ancestor) is still open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle(usize);

/// A long-lived root that survives across handle scopes, for values a host
/// embedding needs to keep alive indefinitely (e.g. a cached entry-point
/// function's closure). Explicitly released, unlike a `Handle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersistentHandle(usize);

/// Owns the slab of root slots handles and persistent handles index into.
pub struct HandleStorage {
    scoped: Vec<Tagged>,
    scope_marks: Vec<usize>,
    persistent: Vec<Option<Tagged>>,
    persistent_free: Vec<usize>,
}

impl HandleStorage {
    /// An empty handle storage with no scopes open.
    pub fn new() -> Self {
        Self { scoped: Vec::new(), scope_marks: Vec::new(), persistent: Vec::new(), persistent_free: Vec::new() }
    }

    /// Open a new scope, recording where to truncate back to on close.
    pub fn push_scope(&mut self) {
        self.scope_marks.push(self.scoped.len());
    }

    /// Close the innermost open scope, dropping every handle created since
    /// the matching `push_scope`. Returns `value` re-homed into the parent
    /// scope so a constructor-style function can return a handle allocated
    /// in its own scope without it dying at the `}`.
    pub fn pop_scope(&mut self, value: Option<Tagged>) -> Option<Handle> {
        let mark = self.scope_marks.pop().expect("pop_scope without matching push_scope");
        self.scoped.truncate(mark);
        value.map(|v| self.new_handle(v))
    }

    /// Allocate a handle in the current (innermost) scope.
    pub fn new_handle(&mut self, value: Tagged) -> Handle {
        let idx = self.scoped.len();
        self.scoped.push(value);
        Handle(idx)
    }

    /// Dereference a handle. Panics if the index is stale (its scope
    /// already closed) — a programming error in the embedder, not a
    /// recoverable runtime condition.
    pub fn get(&self, handle: Handle) -> Tagged {
        self.scoped[handle.0]
    }

    /// Register a value as a persistent root, returning a handle that
    /// survives scope closes.
    pub fn new_persistent(&mut self, value: Tagged) -> PersistentHandle {
        if let Some(idx) = self.persistent_free.pop() {
            self.persistent[idx] = Some(value);
            PersistentHandle(idx)
        } else {
            let idx = self.persistent.len();
            self.persistent.push(Some(value));
            PersistentHandle(idx)
        }
    }

    /// Dereference a persistent handle.
    pub fn get_persistent(&self, handle: PersistentHandle) -> Tagged {
        self.persistent[handle.0].expect("use of released persistent handle")
    }

    /// Release a persistent handle, freeing its slot for reuse.
    pub fn release_persistent(&mut self, handle: PersistentHandle) {
        self.persistent[handle.0] = None;
        self.persistent_free.push(handle.0);
    }

    /// Every root the collector must scan: open scoped handles plus live
    /// persistent handles.
    pub fn roots_mut(&mut self) -> impl Iterator<Item = &mut Tagged> {
        self.scoped.iter_mut().chain(self.persistent.iter_mut().filter_map(|slot| slot.as_mut()))
    }
}

impl Default for HandleStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagged::Tagged;

    #[test]
    fn scope_discards_handles_on_pop() {
        let mut storage = HandleStorage::new();
        storage.push_scope();
        let _h1 = storage.new_handle(Tagged::from_small_int(1).unwrap());
        storage.pop_scope(None);
        storage.push_scope();
        let h2 = storage.new_handle(Tagged::from_small_int(2).unwrap());
        assert_eq!(storage.get(h2).as_small_int(), Some(2));
        storage.pop_scope(None);
    }

    #[test]
    fn pop_scope_rehomes_return_value() {
        let mut storage = HandleStorage::new();
        storage.push_scope();
        storage.push_scope();
        let inner = storage.new_handle(Tagged::from_small_int(42).unwrap());
        let rehomed = storage.pop_scope(Some(storage.get(inner))).unwrap();
        assert_eq!(storage.get(rehomed).as_small_int(), Some(42));
        storage.pop_scope(None);
    }

    #[test]
    fn persistent_handle_survives_scopes() {
        let mut storage = HandleStorage::new();
        let p = storage.new_persistent(Tagged::from_small_int(7).unwrap());
        storage.push_scope();
        storage.pop_scope(None);
        assert_eq!(storage.get_persistent(p).as_small_int(), Some(7));
        storage.release_persistent(p);
    }
}
