//! The managed heap: new-generation semi-space plus old-generation
//! mark-compact arena, and the handle bookkeeping that lets host code hold
//! references across a collection.

mod handles;

pub use handles::{Handle, HandleStorage, PersistentHandle};

use std::sync::Arc;

use crate::object::{BlockHeader, Meta};
use crate::substrate::{AllocationRange, Chunk, DEFAULT_CHUNK_BYTES};
use crate::tagged::Tagged;

/// Sizing knobs for the managed heap. Always set by the embedder at
/// construction time — there is no environment-variable or config-file
/// layer, matching [`crate::VmOptions`]'s "everything is a constructor
/// argument" stance.
#[derive(Clone, Copy, Debug)]
pub struct HeapOptions {
    /// Bytes reserved for the new-generation semi-space (split two ways:
    /// from-space and to-space, so the usable allocation budget before a
    /// minor collection is half this).
    pub new_space_bytes: usize,
    /// Bytes reserved for the old-generation mark-compact arena.
    pub old_space_bytes: usize,
    /// Hard cap on total bytes live across both generations, checked after
    /// a collection fails to free enough space for the pending allocation.
    /// `0` means unlimited (bounded only by `new_space_bytes`/
    /// `old_space_bytes` themselves).
    pub max_heap_bytes: usize,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self { new_space_bytes: 4 * DEFAULT_CHUNK_BYTES, old_space_bytes: 16 * DEFAULT_CHUNK_BYTES, max_heap_bytes: 0 }
    }
}

/// One half of the new generation's semi-space.
pub struct SemiSpace {
    chunk: Chunk,
    range: AllocationRange,
}

impl SemiSpace {
    fn new(bytes: usize) -> Self {
        let chunk = Chunk::new(bytes);
        let range = chunk.full_range();
        Self { chunk, range }
    }

    /// Attempt a bump allocation of `size` bytes, 8-byte aligned.
    pub fn bump(&mut self, size: usize) -> Option<std::ptr::NonNull<u8>> {
        self.range.bump(size, 8)
    }

    /// Reset the bump cursor, discarding everything allocated in this
    /// space — used once its contents have all been copied out by a minor
    /// collection.
    pub fn reset(&mut self) {
        self.range.reset();
    }

    /// Bytes currently live in this space.
    pub fn used(&self) -> usize {
        self.range.used()
    }

    /// Total capacity of this space.
    pub fn capacity(&self) -> usize {
        self.chunk.size()
    }

    /// Start of this space's backing chunk.
    pub fn chunk_start(&self) -> std::ptr::NonNull<u8> {
        self.chunk.base()
    }

    /// Current bump cursor, as a raw pointer one-past the last allocated
    /// byte — the Cheney scan's "already copied, not yet scanned" boundary.
    pub fn chunk_cursor(&self) -> *mut u8 {
        unsafe { self.chunk.base().as_ptr().add(self.range.used()) }
    }
}

/// The old generation: one growing arena, compacted in place rather than
/// copied between two spaces (objects here are expected to be long-lived,
/// so halving the usable space the way the new generation does would waste
/// most of it).
pub struct OldSpace {
    chunk: Chunk,
    range: AllocationRange,
}

impl OldSpace {
    fn new(bytes: usize) -> Self {
        let chunk = Chunk::new(bytes);
        let range = chunk.full_range();
        Self { chunk, range }
    }

    /// Bump-allocate within the arena.
    pub fn bump(&mut self, size: usize) -> Option<std::ptr::NonNull<u8>> {
        self.range.bump(size, 8)
    }

    /// Bytes currently used.
    pub fn used(&self) -> usize {
        self.range.used()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.chunk.size()
    }

    /// Start of this space's backing chunk.
    pub fn chunk_start(&self) -> std::ptr::NonNull<u8> {
        self.chunk.base()
    }

    /// Reset the bump cursor to `new_end`, the high-water mark left by a
    /// mark-compact pass's sliding relocation.
    pub fn reset_to(&mut self, new_end: usize) {
        self.range.reset();
        self.range.bump(new_end, 1);
    }
}

/// The full managed heap: both generations plus the handle bookkeeping
/// tying host-visible roots to GC-relocatable storage.
pub struct Heap {
    pub(crate) from_space: SemiSpace,
    pub(crate) to_space: SemiSpace,
    pub(crate) old_space: OldSpace,
    pub(crate) handles: HandleStorage,
    pub(crate) bytes_allocated_since_gc: usize,
    pub(crate) max_heap_bytes: usize,
}

impl Heap {
    /// Construct a heap with the given sizing.
    pub fn new(options: HeapOptions) -> Self {
        let half = options.new_space_bytes / 2;
        Self {
            from_space: SemiSpace::new(half),
            to_space: SemiSpace::new(half),
            old_space: OldSpace::new(options.old_space_bytes),
            handles: HandleStorage::new(),
            bytes_allocated_since_gc: 0,
            max_heap_bytes: options.max_heap_bytes,
        }
    }

    /// Bytes currently live across both generations.
    pub fn total_bytes_in_use(&self) -> usize {
        self.from_space.used() + self.old_space.used()
    }

    /// The configured hard cap (`0` for unlimited).
    pub fn max_heap_bytes(&self) -> usize {
        self.max_heap_bytes
    }

    /// Allocate a new block in the new generation's active (from) space.
    /// Returns `None` if the space is full; the caller (the interpreter's
    /// allocation path) is expected to trigger a minor collection and
    /// retry once.
    pub fn try_alloc_young(&mut self, meta: Arc<Meta>, length: u32) -> Option<Tagged> {
        let header_size = std::mem::size_of::<BlockHeader>();
        let payload_size = meta.instance_size + length as usize * meta.element_size;
        let total = header_size + payload_size;
        let ptr = self.from_space.bump(total)?;
        self.bytes_allocated_since_gc += total;
        unsafe {
            ptr.cast::<BlockHeader>().as_ptr().write(BlockHeader::new(meta, length));
        }
        Some(Tagged::from_ptr(ptr))
    }

    /// Allocate directly into the old generation — used by the collector
    /// when promoting a survivor, and by the interpreter for allocations
    /// known up front to outlive a handful of minor collections (none
    /// today; reserved for a future generational write barrier heuristic).
    pub fn try_alloc_old(&mut self, meta: Arc<Meta>, length: u32) -> Option<Tagged> {
        let header_size = std::mem::size_of::<BlockHeader>();
        let payload_size = meta.instance_size + length as usize * meta.element_size;
        let total = header_size + payload_size;
        let ptr = self.old_space.bump(total)?;
        unsafe {
            ptr.cast::<BlockHeader>().as_ptr().write(BlockHeader::new(meta, length));
        }
        Some(Tagged::from_ptr(ptr))
    }

    /// Fraction of the new generation's active space already consumed.
    pub fn young_occupancy(&self) -> f64 {
        self.from_space.used() as f64 / self.from_space.capacity().max(1) as f64
    }

    /// Fraction of the old generation consumed.
    pub fn old_occupancy(&self) -> f64 {
        self.old_space.used() as f64 / self.old_space.capacity().max(1) as f64
    }

    /// The handle table backing this heap's roots.
    pub fn handles(&self) -> &HandleStorage {
        &self.handles
    }

    /// Mutable access to the handle table, for pinning a value or opening a
    /// scope.
    pub fn handles_mut(&mut self) -> &mut HandleStorage {
        &mut self.handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Meta;

    fn small_meta() -> Arc<Meta> {
        Arc::new(Meta { instance_size: 16, element_size: 0, pointer_offsets: vec![], elements_are_pointers: false, defining_class: None })
    }

    #[test]
    fn young_allocation_succeeds_until_space_exhausted() {
        let mut heap = Heap::new(HeapOptions { new_space_bytes: 4096, old_space_bytes: 4096, max_heap_bytes: 0 });
        let mut count = 0;
        while heap.try_alloc_young(small_meta(), 0).is_some() {
            count += 1;
            if count > 10_000 {
                break;
            }
        }
        assert!(count > 0);
        assert!(heap.young_occupancy() > 0.0);
    }

    #[test]
    fn old_space_allocates_independently_of_young() {
        let mut heap = Heap::new(HeapOptions { new_space_bytes: 4096, old_space_bytes: 4096, max_heap_bytes: 0 });
        assert!(heap.try_alloc_old(small_meta(), 0).is_some());
        assert!(heap.old_occupancy() > 0.0);
    }
}
