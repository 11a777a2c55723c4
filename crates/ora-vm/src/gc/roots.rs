//! Root enumeration: every place a `Tagged` lives outside the heap itself.

use crate::heap::HandleStorage;
use crate::tagged::Tagged;

/// Visit every root the collector must trace, in turn.
///
/// Roots today are exactly the open handle scopes and live persistent
/// handles. The interpreter's register file is not itself a root set: a
/// register holding a live pointer across an allocation or a nested call is
/// pinned into a scoped handle for the duration (see
/// `interpreter::with_protected_registers`), so by the time a collection
/// can run, every live pointer already has a handle here.
///
/// Takes the handle storage alone, not the whole [`crate::heap::Heap`], so
/// callers can borrow a heap's other fields (the spaces being collected)
/// at the same time without a borrow-checker conflict.
pub fn for_each_root_mut(handles: &mut HandleStorage, mut visit: impl FnMut(&mut Tagged)) {
    for root in handles.roots_mut() {
        visit(root);
    }
}
