//! `NativeValue` — a self-describing value crossing the native ABI boundary.
//!
//! Internally the VM distinguishes only two shapes in a generic slot: a
//! small tagged integer or a heap pointer (see `ora_vm::tagged::Tagged`).
//! That bit is not enough information for a native function written in Rust,
//! which has no access to the static type the bytecode compiler assigned a
//! slot — so `NativeValue` carries an explicit tag alongside the payload,
//! wide enough to describe every primitive Type variant plus an opaque
//! pointer into the heap for everything else.
//!
//! # Encoding
//!
//! ```text
//! tag  data
//! 0    unused        Null
//! 1    0 or 1         Bool
//! 2    sign-extended  I32
//! 3    as-is          I64
//! 4    to_bits()      F64
//! 5    as-is          address of a GC-managed block
//! ```

use std::ptr::NonNull;

/// Discriminant for [`NativeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Tag {
    Null = 0,
    Bool = 1,
    I32 = 2,
    I64 = 3,
    F64 = 4,
    Ptr = 5,
}

/// A value crossing the boundary between bytecode and native Rust code.
///
/// Copy, `Send + Sync` — ownership of any referenced heap block stays with
/// the VM, `NativeValue` is just a view onto it for the duration of the
/// native call.
#[derive(Clone, Copy)]
pub struct NativeValue {
    tag: Tag,
    data: u64,
}

unsafe impl Send for NativeValue {}
unsafe impl Sync for NativeValue {}

impl NativeValue {
    /// Create a null value.
    #[inline]
    pub const fn null() -> Self {
        Self { tag: Tag::Null, data: 0 }
    }

    /// Create a boolean value.
    #[inline]
    pub const fn bool(b: bool) -> Self {
        Self { tag: Tag::Bool, data: b as u64 }
    }

    /// Create a 32-bit integer value.
    #[inline]
    pub const fn i32(i: i32) -> Self {
        Self { tag: Tag::I32, data: i as u32 as u64 }
    }

    /// Create a 64-bit integer value.
    #[inline]
    pub const fn i64(i: i64) -> Self {
        Self { tag: Tag::I64, data: i as u64 }
    }

    /// Create a 64-bit float value.
    #[inline]
    pub fn f64(f: f64) -> Self {
        Self { tag: Tag::F64, data: f.to_bits() }
    }

    /// Create from a pointer into the GC heap.
    ///
    /// # Safety
    /// `ptr` must point at a live, VM-managed block for as long as this
    /// `NativeValue` is read from.
    #[inline]
    pub unsafe fn from_ptr<T>(ptr: NonNull<T>) -> Self {
        Self { tag: Tag::Ptr, data: ptr.as_ptr() as usize as u64 }
    }

    /// Check if this value is null.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self.tag, Tag::Null)
    }

    /// Check if this value is a pointer into the heap.
    #[inline]
    pub const fn is_ptr(&self) -> bool {
        matches!(self.tag, Tag::Ptr)
    }

    /// Extract a boolean, if this value holds one.
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        match self.tag {
            Tag::Bool => Some(self.data != 0),
            _ => None,
        }
    }

    /// Extract an `i32`, if this value holds one.
    #[inline]
    pub const fn as_i32(&self) -> Option<i32> {
        match self.tag {
            Tag::I32 => Some(self.data as u32 as i32),
            _ => None,
        }
    }

    /// Extract an `i64`, if this value holds one.
    #[inline]
    pub const fn as_i64(&self) -> Option<i64> {
        match self.tag {
            Tag::I64 => Some(self.data as i64),
            Tag::I32 => Some(self.data as u32 as i32 as i64),
            _ => None,
        }
    }

    /// Extract an `f64`, if this value holds one.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self.tag {
            Tag::F64 => Some(f64::from_bits(self.data)),
            _ => None,
        }
    }

    /// Extract the heap pointer, if this value holds one.
    ///
    /// # Safety
    /// The caller must know the pointee type matches `T` and that the block
    /// has not since been collected.
    #[inline]
    pub unsafe fn as_ptr<T>(&self) -> Option<NonNull<T>> {
        match self.tag {
            Tag::Ptr => Some(NonNull::new_unchecked(self.data as usize as *mut T)),
            _ => None,
        }
    }

    /// Name of the held variant, for diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self.tag {
            Tag::Null => "null",
            Tag::Bool => "bool",
            Tag::I32 => "i32",
            Tag::I64 => "i64",
            Tag::F64 => "f64",
            Tag::Ptr => "pointer",
        }
    }
}

impl Default for NativeValue {
    fn default() -> Self {
        Self::null()
    }
}

impl std::fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            Tag::Null => write!(f, "NativeValue::Null"),
            Tag::Bool => write!(f, "NativeValue::Bool({})", self.data != 0),
            Tag::I32 => write!(f, "NativeValue::I32({})", self.data as u32 as i32),
            Tag::I64 => write!(f, "NativeValue::I64({})", self.data as i64),
            Tag::F64 => write!(f, "NativeValue::F64({})", f64::from_bits(self.data)),
            Tag::Ptr => write!(f, "NativeValue::Ptr({:#x})", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_distinct() {
        let v = NativeValue::null();
        assert!(v.is_null());
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_i32(), None);
    }

    #[test]
    fn bool_roundtrip() {
        assert_eq!(NativeValue::bool(true).as_bool(), Some(true));
        assert_eq!(NativeValue::bool(false).as_bool(), Some(false));
    }

    #[test]
    fn i32_roundtrip() {
        assert_eq!(NativeValue::i32(-7).as_i32(), Some(-7));
        assert_eq!(NativeValue::i32(-7).as_i64(), Some(-7));
    }

    #[test]
    fn i64_roundtrip() {
        assert_eq!(NativeValue::i64(9_000_000_000).as_i64(), Some(9_000_000_000));
        assert_eq!(NativeValue::i64(9_000_000_000).as_i32(), None);
    }

    #[test]
    fn f64_roundtrip() {
        let v = NativeValue::f64(3.5);
        assert!((v.as_f64().unwrap() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn ptr_roundtrip() {
        let mut x = 42u32;
        let ptr = NonNull::new(&mut x as *mut u32).unwrap();
        let v = unsafe { NativeValue::from_ptr(ptr) };
        assert!(v.is_ptr());
        let back: NonNull<u32> = unsafe { v.as_ptr() }.unwrap();
        assert_eq!(unsafe { *back.as_ptr() }, 42);
    }

    #[test]
    fn debug_format_contains_payload() {
        let s = format!("{:?}", NativeValue::i32(42));
        assert!(s.contains("42"));
    }
}
