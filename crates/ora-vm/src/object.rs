//! Heap block layout: the header every GC-managed allocation carries, and
//! the `Meta` describing how to interpret and scan the bytes that follow it.
//!
//! Kept deliberately narrow — this module knows about blocks, their headers
//! and the per-class metadata that describes their shape. It does not grow a
//! standard library's worth of allocation kinds (the VM has no built-in
//! string, map or buffer type; a package's own classes define those, and
//! native modules that need a raw byte region use `Meta::element_size` with
//! an empty pointer bitmap).

use std::sync::Arc;

use crate::tagged::Tagged;

/// Header written immediately before every heap object's field data.
///
/// `repr(C)` and word-aligned so the collector can compute a block's start
/// from a payload pointer with fixed pointer arithmetic, and so relocating a
/// block only ever rewrites this header plus any `Tagged` fields the `Meta`
/// says to scan.
#[repr(C, align(8))]
pub struct BlockHeader {
    /// During a copying collection, the forwarding address this block was
    /// relocated to; `None` otherwise. Checked before every field access
    /// that might race a concurrent collection trigger (there is none today,
    /// but the field exists so a future incremental collector has somewhere
    /// to put it).
    pub forward: Option<std::ptr::NonNull<u8>>,
    /// Shape metadata: shared across every instance of a class, so this is
    /// a pointer rather than an inline copy.
    pub meta: Arc<Meta>,
    /// Element count for variable-length blocks (arrays, raw buffers);
    /// `0` for fixed-shape instances.
    pub length: u32,
    /// Mark bit for the old-generation mark-and-compact collector. Unused
    /// by the new-generation semi-space copier, which relocates reachable
    /// objects instead of marking them in place.
    pub marked: bool,
}

impl BlockHeader {
    /// A fresh, unmarked, unforwarded header for `meta` with `length`
    /// trailing elements.
    pub fn new(meta: Arc<Meta>, length: u32) -> Self {
        Self { forward: None, meta, length, marked: false }
    }

    /// Total payload size in bytes: fixed fields plus variable elements.
    pub fn payload_size(&self) -> usize {
        self.meta.instance_size + self.length as usize * self.meta.element_size
    }
}

/// How to interpret the bytes following a `BlockHeader`.
///
/// One `Meta` is shared by every instance of a class (or every array of a
/// given element shape); it never changes after construction, so the GC can
/// read it without synchronization even while mutators run.
pub struct Meta {
    /// Size in bytes of the object's fixed fields (excludes any trailing
    /// variable-length element region).
    pub instance_size: usize,
    /// Size in bytes of one trailing element, or `0` if this shape has no
    /// variable-length tail.
    pub element_size: usize,
    /// Offsets (in words from the start of the payload) of fields that hold
    /// a [`Tagged`] the collector must scan and possibly relocate. Built by
    /// the pointer-map pass over a class's field type list (unboxed `f64`,
    /// `bool` etc. fields contribute no entry).
    pub pointer_offsets: Vec<usize>,
    /// Whether the trailing variable-length region (if any) holds `Tagged`
    /// elements that must themselves be scanned, as opposed to raw bytes
    /// (e.g. a `Buffer`'s payload).
    pub elements_are_pointers: bool,
    /// The class this shape belongs to, for downcast checks and reflection.
    /// `None` for anonymous shapes the VM allocates for its own bookkeeping
    /// (e.g. a raw byte buffer backing a native `create_buffer` call).
    pub defining_class: Option<Arc<crate::types::Class>>,
}

impl Meta {
    /// Read the `Tagged` fields of an object described by this `Meta`,
    /// given a pointer to the start of its payload.
    ///
    /// # Safety
    /// `payload` must point at `payload_size` live bytes belonging to a
    /// block whose header's `meta` is (a clone of) `self`.
    pub unsafe fn scan_pointers(&self, payload: *mut u8, length: u32) -> Vec<*mut Tagged> {
        let mut out = Vec::with_capacity(self.pointer_offsets.len());
        for &word_offset in &self.pointer_offsets {
            out.push(payload.cast::<Tagged>().add(word_offset));
        }
        if self.elements_are_pointers && self.element_size > 0 {
            let fixed_words = self.instance_size / std::mem::size_of::<Tagged>();
            let base = payload.cast::<Tagged>().add(fixed_words);
            for i in 0..length as usize {
                out.push(base.add(i));
            }
        }
        out
    }
}

/// Shape for a generic array of [`Tagged`] elements.
///
/// Arrays don't carry their element type in the instance the way a class's
/// fields do — reads through `GETELEM` are checked against the static
/// element type recorded on the array's declared [`crate::types::Type`] at
/// the use site, not on the object itself, so one shared `Meta` serves
/// every array regardless of what it was declared to hold.
pub fn array_meta() -> Arc<Meta> {
    static CACHE: once_cell::sync::OnceCell<Arc<Meta>> = once_cell::sync::OnceCell::new();
    CACHE
        .get_or_init(|| {
            Arc::new(Meta {
                instance_size: 0,
                element_size: std::mem::size_of::<Tagged>(),
                pointer_offsets: vec![],
                elements_are_pointers: true,
                defining_class: None,
            })
        })
        .clone()
}

/// Shape for a raw byte region with no pointer content: a native module's
/// string or buffer allocation. Distinguished from [`array_meta`] only by
/// `elements_are_pointers`, so the collector never tries to chase a byte as
/// if it were a `Tagged`.
pub fn buffer_meta() -> Arc<Meta> {
    static CACHE: once_cell::sync::OnceCell<Arc<Meta>> = once_cell::sync::OnceCell::new();
    CACHE
        .get_or_init(|| {
            Arc::new(Meta { instance_size: 0, element_size: 1, pointer_offsets: vec![], elements_are_pointers: false, defining_class: None })
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_accounts_for_tail() {
        let meta = Arc::new(Meta {
            instance_size: 16,
            element_size: 8,
            pointer_offsets: vec![0],
            elements_are_pointers: false,
            defining_class: None,
        });
        let header = BlockHeader::new(meta, 4);
        assert_eq!(header.payload_size(), 16 + 4 * 8);
    }
}
