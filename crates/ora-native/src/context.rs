//! `NativeContext` — the abstract VM operations a native handler can call.
//!
//! `ora-vm` provides the concrete implementation; native modules program
//! against this trait alone so they never need to link `ora-vm` itself.

use crate::error::{AbiResult, NativeError};
use crate::value::NativeValue;

/// Metadata about a class, as seen from native code.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Class id in the owning package's class table.
    pub class_id: usize,
    /// Number of instance fields.
    pub field_count: usize,
    /// Class name.
    pub name: String,
    /// Id of the superclass, if any.
    pub parent_id: Option<usize>,
    /// Number of methods in the vtable.
    pub method_count: usize,
}

/// Abstract VM context passed to every native call.
///
/// # Performance
///
/// Dynamic dispatch (`&dyn NativeContext`) costs a few nanoseconds per call;
/// negligible next to what each method actually does (GC allocation, table
/// lookup, interpreter re-entry for callbacks).
pub trait NativeContext {
    // -- Allocation ---------------------------------------------------

    /// Allocate a new string on the GC heap.
    fn create_string(&self, s: &str) -> NativeValue;

    /// Allocate a new byte buffer on the GC heap.
    fn create_buffer(&self, data: &[u8]) -> NativeValue;

    /// Allocate a new array on the GC heap, populated from `items`.
    fn create_array(&self, items: &[NativeValue]) -> NativeValue;

    /// Allocate a new, zero-initialized instance of the given class.
    fn create_object_by_id(&self, class_id: usize) -> AbiResult<NativeValue>;

    // -- Reading --------------------------------------------------------

    /// Read string contents from a string value.
    fn read_string(&self, val: NativeValue) -> AbiResult<String>;

    /// Read bytes from a buffer value.
    fn read_buffer(&self, val: NativeValue) -> AbiResult<Vec<u8>>;

    // -- Arrays -----------------------------------------------------------

    /// Number of elements in an array.
    fn array_len(&self, val: NativeValue) -> AbiResult<usize>;

    /// Read the element at `index`.
    fn array_get(&self, val: NativeValue, index: usize) -> AbiResult<NativeValue>;

    /// Write the element at `index`.
    fn array_set(&self, val: NativeValue, index: usize, value: NativeValue) -> AbiResult<()>;

    // -- Objects -----------------------------------------------------

    /// Read field `index` of an object.
    fn object_get_field(&self, val: NativeValue, index: usize) -> AbiResult<NativeValue>;

    /// Write field `index` of an object.
    fn object_set_field(&self, val: NativeValue, index: usize, value: NativeValue) -> AbiResult<()>;

    /// Id of the object's runtime class.
    fn object_class_id(&self, val: NativeValue) -> AbiResult<usize>;

    // -- Classes --------------------------------------------------------

    /// Look up class metadata by id.
    fn class_info(&self, class_id: usize) -> AbiResult<ClassInfo>;

    /// Look up class metadata by name among a package's exported classes.
    fn class_by_name(&self, name: &str) -> AbiResult<ClassInfo>;

    /// Field name/index pairs for a class, in declaration order.
    fn class_field_names(&self, class_id: usize) -> AbiResult<Vec<(String, usize)>>;

    /// Method name/vtable-index pairs for a class.
    fn class_method_entries(&self, class_id: usize) -> AbiResult<Vec<(String, usize)>>;

    // -- Calling back into bytecode ---------------------------------------

    /// Call a function by id, synchronously, re-entering the interpreter.
    fn call_function(&self, func_id: usize, args: &[NativeValue]) -> AbiResult<NativeValue>;

    /// Call a method on an object, synchronously.
    fn call_method(
        &self,
        receiver: NativeValue,
        class_id: usize,
        method_name: &str,
        args: &[NativeValue],
    ) -> AbiResult<NativeValue>;

    // -- Exceptions ---------------------------------------------------------

    /// Raise a language-level exception of the named runtime class,
    /// unwinding back through the caller as `NativeError::Exception`.
    ///
    /// The VM catches this at the native call boundary and resumes bytecode
    /// unwinding from there, so a `try`/`catch` in the calling package sees
    /// it like any exception thrown by `THROW`.
    fn raise(&self, class_name: &str, message: &str) -> NativeError;
}
