//! The collector: semi-space copying for the new generation, mark-compact
//! for the old generation.
//!
//! Both passes trace from the same root set ([`roots::for_each_root_mut`])
//! and use the same forwarding-pointer mechanism (a field on
//! [`crate::object::BlockHeader`]) to redirect every reference to a moved
//! object's new address, copying-collector style; the old generation just
//! slides objects toward the low end of its arena in place rather than
//! copying them into a second space, since most of what's there is expected
//! to survive.

pub mod roots;

use std::mem::size_of;
use std::ptr::NonNull;

use crate::heap::Heap;
use crate::object::BlockHeader;
use crate::tagged::Tagged;

/// Outcome of a collection, for the interpreter's allocation-retry loop and
/// for diagnostics.
#[derive(Debug, Default)]
pub struct CollectionStats {
    /// Bytes that survived and were copied (minor) or slid (major).
    pub bytes_survived: usize,
    /// Whether this was a major (old-generation) collection.
    pub major: bool,
}

/// Run a minor collection: copy everything reachable from the roots out of
/// the active new-generation space into the other half, then swap their
/// roles.
pub fn minor_collect(heap: &mut Heap) -> CollectionStats {
    let Heap { handles, from_space, to_space, .. } = heap;

    roots::for_each_root_mut(handles, |root| {
        if let Some(ptr) = root.as_ptr() {
            if ptr_in_space(ptr, from_space) {
                let new_ptr = unsafe { copy_object(ptr, to_space) };
                *root = Tagged::from_ptr(new_ptr);
            }
        }
    });

    // Cheney scan: walk the to-space from its start, re-scanning objects as
    // they're copied in, until the scan cursor catches the allocation
    // cursor.
    let mut scan = to_space.chunk_start().as_ptr();
    while (scan as usize) < to_space.chunk_cursor() as usize {
        unsafe {
            let header = scan.cast::<BlockHeader>();
            let payload = scan.add(size_of::<BlockHeader>());
            let meta = (*header).meta.clone();
            let length = (*header).length;
            for field in meta.scan_pointers(payload, length) {
                let tagged = &mut *field;
                if let Some(ptr) = tagged.as_ptr() {
                    if ptr_in_space(ptr, from_space) {
                        let new_ptr = copy_object(ptr, to_space);
                        *tagged = Tagged::from_ptr(new_ptr);
                    }
                }
            }
            scan = scan.add(size_of::<BlockHeader>() + meta.instance_size + length as usize * meta.element_size);
        }
    }

    let survived = to_space.used();
    std::mem::swap(from_space, to_space);
    to_space.reset();
    heap.bytes_allocated_since_gc = 0;
    CollectionStats { bytes_survived: survived, major: false }
}

/// Copy one object from `src` to the bump cursor of `to_space`, or return
/// its already-recorded forwarding address if a previous root already
/// copied it.
///
/// # Safety
/// `src` must point at a live `BlockHeader` inside the space currently
/// being evacuated.
unsafe fn copy_object(src: NonNull<u8>, to_space: &mut crate::heap::SemiSpace) -> NonNull<u8> {
    let header_ptr = src.as_ptr().cast::<BlockHeader>();
    if let Some(fwd) = (*header_ptr).forward {
        return fwd;
    }
    let meta = (*header_ptr).meta.clone();
    let length = (*header_ptr).length;
    let header_size = size_of::<BlockHeader>();
    let payload_size = meta.instance_size + length as usize * meta.element_size;
    let total = header_size + payload_size;

    let dest = to_space.bump(total).expect("to-space exhausted mid-collection (new generation undersized)");
    std::ptr::copy_nonoverlapping(src.as_ptr().add(header_size), dest.as_ptr().add(header_size), payload_size);
    dest.as_ptr().cast::<BlockHeader>().write(BlockHeader { forward: None, meta, length, marked: false });
    (*header_ptr).forward = Some(dest);
    dest
}

fn ptr_in_space(ptr: NonNull<u8>, space: &crate::heap::SemiSpace) -> bool {
    let addr = ptr.as_ptr() as usize;
    let start = space.chunk_start().as_ptr() as usize;
    addr >= start && addr < start + space.capacity()
}

/// Run a major collection over the old generation: mark everything
/// reachable, then slide survivors to the low end of the arena, updating
/// every reference (root or field) that pointed past a hole left by a dead
/// object.
///
/// Simpler than a full mark-sweep-compact with a separate bitmap: since the
/// old generation's allocator is itself a bump cursor, "sweep" is just
/// resetting that cursor to the new high-water mark once every survivor has
/// been relocated.
pub fn major_collect(heap: &mut Heap) -> CollectionStats {
    let Heap { handles, old_space, .. } = heap;

    // Mark phase: trace from roots, setting each reached header's `marked`
    // bit, to know which old-space objects are live before we start moving
    // any of them (a forwarding-as-we-go scheme like the minor collector's
    // would corrupt the scan since we're compacting in place).
    let mut stack: Vec<NonNull<u8>> = Vec::new();
    roots::for_each_root_mut(handles, |root| {
        if let Some(ptr) = root.as_ptr() {
            if ptr_in_old_space(ptr, old_space) {
                stack.push(ptr);
            }
        }
    });
    while let Some(ptr) = stack.pop() {
        unsafe {
            let header = ptr.as_ptr().cast::<BlockHeader>();
            if (*header).marked {
                continue;
            }
            (*header).marked = true;
            let payload = ptr.as_ptr().add(size_of::<BlockHeader>());
            let meta = (*header).meta.clone();
            let length = (*header).length;
            for field in meta.scan_pointers(payload, length) {
                if let Some(child) = (*field).as_ptr() {
                    if ptr_in_old_space(child, old_space) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    // Compact phase: walk the arena linearly, sliding each marked object
    // down to `write`, recording old->new address in `moved` so roots and
    // interior pointers can be fixed up in a second pass.
    let start = old_space.chunk_start().as_ptr() as usize;
    let end = start + old_space.used();
    let mut moved: rustc_hash::FxHashMap<usize, usize> = rustc_hash::FxHashMap::default();
    let mut read = start;
    let mut write = start;
    while read < end {
        unsafe {
            let header = read as *mut BlockHeader;
            let meta = (*header).meta.clone();
            let length = (*header).length;
            let total = size_of::<BlockHeader>() + meta.instance_size + length as usize * meta.element_size;
            if (*header).marked {
                if write != read {
                    std::ptr::copy(read as *const u8, write as *mut u8, total);
                    moved.insert(read, write);
                }
                (*(write as *mut BlockHeader)).marked = false;
                write += total;
            }
            read += total;
        }
    }

    // Fixup phase: anything whose old address moved gets rewritten.
    roots::for_each_root_mut(handles, |root| {
        if let Some(ptr) = root.as_ptr() {
            if let Some(&new_addr) = moved.get(&(ptr.as_ptr() as usize)) {
                *root = Tagged::from_ptr(NonNull::new(new_addr as *mut u8).unwrap());
            }
        }
    });
    let mut scan = start;
    while scan < write {
        unsafe {
            let header = scan as *mut BlockHeader;
            let payload = (scan as *mut u8).add(size_of::<BlockHeader>());
            let meta = (*header).meta.clone();
            let length = (*header).length;
            for field in meta.scan_pointers(payload, length) {
                if let Some(child) = (*field).as_ptr() {
                    if let Some(&new_addr) = moved.get(&(child.as_ptr() as usize)) {
                        *field = Tagged::from_ptr(NonNull::new(new_addr as *mut u8).unwrap());
                    }
                }
            }
            scan += size_of::<BlockHeader>() + meta.instance_size + length as usize * meta.element_size;
        }
    }

    let survived = write - start;
    old_space.reset_to(survived);
    CollectionStats { bytes_survived: survived, major: true }
}

fn ptr_in_old_space(ptr: NonNull<u8>, space: &crate::heap::OldSpace) -> bool {
    let addr = ptr.as_ptr() as usize;
    let start = space.chunk_start().as_ptr() as usize;
    addr >= start && addr < start + space.capacity()
}
