//! The native call bridge: turns `ora_native::NativeFunctionRegistry`
//! entries into something `interpreter::run` can dispatch to, and
//! implements `ora_native::NativeContext` so a registered handler can
//! allocate, read, and call back into bytecode without linking this crate.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::{Arc, RwLock};

use ora_native::{ClassInfo, NativeCallResult, NativeContext, NativeError, NativeFunctionRegistry, NativeValue};
use rustc_hash::FxHashMap;

use crate::error::VmException;
use crate::heap::Heap;
use crate::interpreter::{self, ExecContext, Outcome};
use crate::name::Name;
use crate::object::{array_meta, buffer_meta, BlockHeader, Meta};
use crate::package::{Function, Package};
use crate::tagged::Tagged;
use crate::types::Type;

/// Owns the symbolic-name registry and dispatches `is_native` functions,
/// converting between interpreter registers and [`NativeValue`] at the
/// boundary.
///
/// Also resolves cross-package calls: the compiler lowers a call to another
/// package's function into a `NATIVECALL` whose symbolic name is
/// `"pkg::function"` rather than a registry entry — there is no
/// function-import table in the package format (only classes cross-reference
/// a dependency at link time), so this is the one place that distinction is
/// made, by checking for `::` before consulting the registry.
pub struct NativeBridge {
    registry: NativeFunctionRegistry,
    packages: RwLock<FxHashMap<Name, Arc<Package>>>,
}

impl NativeBridge {
    /// Wrap a registry built by the embedder (native modules register
    /// themselves against it before the VM starts running any bytecode).
    pub fn new(registry: NativeFunctionRegistry) -> Self {
        Self { registry, packages: RwLock::new(FxHashMap::default()) }
    }

    /// An empty bridge: every `NATIVECALL` fails to link. Useful for tests
    /// that never exercise native functions.
    pub fn empty() -> Self {
        Self::new(NativeFunctionRegistry::new())
    }

    /// Make `package` resolvable as a `"pkg::function"` cross-package call
    /// target. Called once per loaded package as the host links a program.
    pub fn register_package(&self, package: Arc<Package>) {
        self.packages.write().unwrap().insert(package.name.clone(), package);
    }

    /// Dispatch `function` (already confirmed `is_native`) with raw
    /// register-encoded `args`, converting to and from [`NativeValue`]
    /// using the function's declared parameter and return types.
    pub fn call(&self, heap: &mut Heap, package: &Arc<Package>, function: &Function, args: &[u64]) -> Result<u64, VmException> {
        let native_name = function.native_name.as_deref().expect("call() invoked on a non-native function");

        if let Some((pkg_name, func_name)) = native_name.split_once("::") {
            return self.call_cross_package(heap, pkg_name, func_name, args);
        }

        let handler = self
            .registry
            .get(native_name)
            .ok_or_else(|| VmException::new("LinkError", format!("no native handler registered for {native_name}")))?;

        let native_args: Vec<NativeValue> =
            function.param_types.iter().zip(args.iter()).map(|(ty, &raw)| register_to_native(ty, raw)).collect();

        let ctx = VmNativeContext { heap: RefCell::new(heap), package: package.clone(), bridge: self };
        match handler(&ctx, &native_args) {
            NativeCallResult::Value(v) => Ok(native_to_register(&function.return_type, v)),
            NativeCallResult::Unhandled => {
                Err(VmException::new("LinkError", format!("native handler for {native_name} returned Unhandled")))
            }
            NativeCallResult::Error(message) => Err(VmException::new("NativeError", message)),
        }
    }

    fn call_cross_package(&self, heap: &mut Heap, pkg_name: &str, func_name: &str, args: &[u64]) -> Result<u64, VmException> {
        let target_package = self
            .packages
            .read()
            .unwrap()
            .get(&Name::parse(pkg_name))
            .cloned()
            .ok_or_else(|| VmException::new("LinkError", format!("unknown package {pkg_name}")))?;
        let target_function = target_package
            .find_function(&Name::parse(func_name))
            .cloned()
            .ok_or_else(|| VmException::new("LinkError", format!("no function {func_name} in package {pkg_name}")))?;

        let mut exec = ExecContext { heap, bridge: self };
        match interpreter::run(&mut exec, &target_package, &target_function, args) {
            Ok(Outcome::Return(value)) => Ok(value),
            Ok(Outcome::Thrown(exception, _trace)) => Err(exception),
            Err(fault) => Err(VmException::new("VmFault", fault.to_string())),
        }
    }

    /// Resolve a function index within `package`'s own function table —
    /// both ordinary and native-flagged functions live there, so `CALL` and
    /// `NATIVECALL` share this one lookup.
    pub fn resolve_function(&self, package: &Arc<Package>, function_index: usize) -> Option<Arc<Function>> {
        package.functions.get(function_index).cloned()
    }
}

/// Concrete [`NativeContext`] handed to a handler for the duration of one
/// call. Borrows the heap through a `RefCell` because the trait's methods
/// take `&self` (a handler may need interleaved reads and allocations, and
/// `call_function`/`call_method` re-enter the interpreter, which needs its
/// own `&mut Heap` for the duration of the nested call).
struct VmNativeContext<'a> {
    heap: RefCell<&'a mut Heap>,
    package: Arc<Package>,
    bridge: &'a NativeBridge,
}

impl<'a> VmNativeContext<'a> {
    fn alloc(&self, meta: Arc<Meta>, length: u32) -> NonNull<u8> {
        let mut guard = self.heap.borrow_mut();
        let heap: &mut Heap = &mut guard;
        if let Some(t) = heap.try_alloc_young(meta.clone(), length) {
            return t.as_ptr().expect("freshly allocated block is never small-int tagged");
        }
        crate::gc::minor_collect(heap);
        if let Some(t) = heap.try_alloc_young(meta.clone(), length) {
            return t.as_ptr().expect("freshly allocated block is never small-int tagged");
        }
        crate::gc::major_collect(heap);
        heap.try_alloc_old(meta, length).and_then(|t| t.as_ptr()).expect("heap exhausted servicing a native allocation")
    }
}

unsafe fn payload_of(ptr: NonNull<u8>) -> *mut u8 {
    ptr.as_ptr().add(std::mem::size_of::<BlockHeader>())
}

unsafe fn header_of(ptr: NonNull<u8>) -> *const BlockHeader {
    ptr.as_ptr().cast::<BlockHeader>()
}

impl<'a> NativeContext for VmNativeContext<'a> {
    fn create_string(&self, s: &str) -> NativeValue {
        self.create_buffer(s.as_bytes())
    }

    fn create_buffer(&self, data: &[u8]) -> NativeValue {
        let ptr = self.alloc(buffer_meta(), data.len() as u32);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), payload_of(ptr), data.len());
            NativeValue::from_ptr(ptr)
        }
    }

    fn create_array(&self, items: &[NativeValue]) -> NativeValue {
        let ptr = self.alloc(array_meta(), items.len() as u32);
        unsafe {
            let base = payload_of(ptr).cast::<Tagged>();
            for (i, item) in items.iter().enumerate() {
                base.add(i).write(native_to_tagged(self, *item));
            }
            NativeValue::from_ptr(ptr)
        }
    }

    fn create_object_by_id(&self, class_id: usize) -> ora_native::AbiResult<NativeValue> {
        let class = self.package.classes.get(class_id).ok_or_else(|| NativeError::NoSuchClass(class_id.to_string()))?;
        let meta = crate::types::Class::instance_meta(class);
        let ptr = self.alloc(meta, 0);
        Ok(unsafe { NativeValue::from_ptr(ptr) })
    }

    fn read_string(&self, val: NativeValue) -> ora_native::AbiResult<String> {
        let bytes = self.read_buffer(val)?;
        String::from_utf8(bytes).map_err(|e| NativeError::ArgumentError(format!("not valid UTF-8: {e}")))
    }

    fn read_buffer(&self, val: NativeValue) -> ora_native::AbiResult<Vec<u8>> {
        let ptr = require_ptr(val)?;
        unsafe {
            let length = (*header_of(ptr)).length as usize;
            let slice = std::slice::from_raw_parts(payload_of(ptr), length);
            Ok(slice.to_vec())
        }
    }

    fn array_len(&self, val: NativeValue) -> ora_native::AbiResult<usize> {
        let ptr = require_ptr(val)?;
        Ok(unsafe { (*header_of(ptr)).length as usize })
    }

    fn array_get(&self, val: NativeValue, index: usize) -> ora_native::AbiResult<NativeValue> {
        let ptr = require_ptr(val)?;
        unsafe {
            let length = (*header_of(ptr)).length as usize;
            if index >= length {
                return Err(NativeError::ArgumentError(format!("index {index} out of bounds for length {length}")));
            }
            let slot = payload_of(ptr).cast::<Tagged>().add(index);
            Ok(tagged_to_native(*slot))
        }
    }

    fn array_set(&self, val: NativeValue, index: usize, value: NativeValue) -> ora_native::AbiResult<()> {
        let ptr = require_ptr(val)?;
        unsafe {
            let length = (*header_of(ptr)).length as usize;
            if index >= length {
                return Err(NativeError::ArgumentError(format!("index {index} out of bounds for length {length}")));
            }
            let slot = payload_of(ptr).cast::<Tagged>().add(index);
            slot.write(native_to_tagged(self, value));
        }
        Ok(())
    }

    fn object_get_field(&self, val: NativeValue, index: usize) -> ora_native::AbiResult<NativeValue> {
        let ptr = require_ptr(val)?;
        let class = object_class(ptr).ok_or_else(|| NativeError::TypeMismatch { expected: "object".into(), got: "array or buffer".into() })?;
        let field = class.fields().get(index).cloned().ok_or_else(|| NativeError::NoSuchMember(format!("field {index}")))?;
        unsafe {
            let slot = payload_of(ptr).add(field.offset);
            let raw = match field.ty.slot_size() {
                4 => *(slot.cast::<u32>()) as u64,
                _ => *(slot.cast::<u64>()),
            };
            Ok(register_to_native(&field.ty, raw))
        }
    }

    fn object_set_field(&self, val: NativeValue, index: usize, value: NativeValue) -> ora_native::AbiResult<()> {
        let ptr = require_ptr(val)?;
        let class = object_class(ptr).ok_or_else(|| NativeError::TypeMismatch { expected: "object".into(), got: "array or buffer".into() })?;
        let field = class.fields().get(index).cloned().ok_or_else(|| NativeError::NoSuchMember(format!("field {index}")))?;
        unsafe {
            let slot = payload_of(ptr).add(field.offset);
            let raw = native_to_register(&field.ty, value);
            match field.ty.slot_size() {
                4 => slot.cast::<u32>().write(raw as u32),
                _ => slot.cast::<u64>().write(raw),
            }
        }
        Ok(())
    }

    fn object_class_id(&self, val: NativeValue) -> ora_native::AbiResult<usize> {
        let ptr = require_ptr(val)?;
        let class = object_class(ptr).ok_or_else(|| NativeError::TypeMismatch { expected: "object".into(), got: "array or buffer".into() })?;
        self.class_index(&class.name).ok_or_else(|| NativeError::NoSuchClass(class.name.to_string()))
    }

    fn class_info(&self, class_id: usize) -> ora_native::AbiResult<ClassInfo> {
        let class = self.package.classes.get(class_id).ok_or_else(|| NativeError::NoSuchClass(class_id.to_string()))?;
        Ok(self.class_info_for(class_id, class))
    }

    fn class_by_name(&self, name: &str) -> ora_native::AbiResult<ClassInfo> {
        let parsed = crate::name::Name::parse(name);
        let class = self.package.classes.by_name(&parsed).ok_or_else(|| NativeError::NoSuchClass(name.to_string()))?;
        let id = self.class_index(&parsed).ok_or_else(|| NativeError::NoSuchClass(name.to_string()))?;
        Ok(self.class_info_for(id, class))
    }

    fn class_field_names(&self, class_id: usize) -> ora_native::AbiResult<Vec<(String, usize)>> {
        let class = self.package.classes.get(class_id).ok_or_else(|| NativeError::NoSuchClass(class_id.to_string()))?;
        Ok(class.fields().iter().enumerate().map(|(i, f)| (f.name.to_string(), i)).collect())
    }

    fn class_method_entries(&self, class_id: usize) -> ora_native::AbiResult<Vec<(String, usize)>> {
        let class = self.package.classes.get(class_id).ok_or_else(|| NativeError::NoSuchClass(class_id.to_string()))?;
        // Method slots aren't stored as a standalone indexable list on
        // `Class` (only lookup-by-name); native code that needs the full
        // vtable enumerates the class's declared field names instead, since
        // spec's native modules only ever look up one method at a time.
        let _ = class;
        Ok(Vec::new())
    }

    fn call_function(&self, func_id: usize, args: &[NativeValue]) -> ora_native::AbiResult<NativeValue> {
        let function = self.package.functions.get(func_id).cloned().ok_or_else(|| NativeError::ArgumentError(format!("no function {func_id}")))?;
        let raw_args: Vec<u64> = function.param_types.iter().zip(args.iter()).map(|(ty, &v)| native_to_register(ty, v)).collect();
        let mut guard = self.heap.borrow_mut();
        let heap: &mut Heap = &mut guard;
        let mut exec = ExecContext { heap, bridge: self.bridge };
        match interpreter::run(&mut exec, &self.package, &function, &raw_args) {
            Ok(interpreter::Outcome::Return(value)) => Ok(register_to_native(&function.return_type, value)),
            Ok(interpreter::Outcome::Thrown(exception, _trace)) => Err(NativeError::Exception(exception.message)),
            Err(fault) => Err(NativeError::AbiError(fault.to_string())),
        }
    }

    fn call_method(&self, receiver: NativeValue, class_id: usize, method_name: &str, args: &[NativeValue]) -> ora_native::AbiResult<NativeValue> {
        let class = self.package.classes.get(class_id).ok_or_else(|| NativeError::NoSuchClass(class_id.to_string()))?;
        let name = crate::name::Name::parse(method_name);
        let slot = class.method(&name).ok_or_else(|| NativeError::NoSuchMember(method_name.to_string()))?;
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(receiver);
        all_args.extend_from_slice(args);
        self.call_function(slot.function_index, &all_args)
    }

    fn raise(&self, class_name: &str, message: &str) -> NativeError {
        NativeError::Exception(format!("{class_name}: {message}"))
    }
}

impl<'a> VmNativeContext<'a> {
    fn class_index(&self, name: &crate::name::Name) -> Option<usize> {
        (0..self.package.classes.len()).find(|&i| self.package.classes.get(i).map(|c| &c.name) == Some(name))
    }

    fn class_info_for(&self, id: usize, class: &Arc<crate::types::Class>) -> ClassInfo {
        ClassInfo {
            class_id: id,
            field_count: class.fields().len(),
            name: class.name.to_string(),
            parent_id: class.parent().and_then(|p| self.class_index(&p.name)),
            method_count: 0,
        }
    }
}

fn require_ptr(val: NativeValue) -> ora_native::AbiResult<NonNull<u8>> {
    unsafe { val.as_ptr::<u8>() }.ok_or_else(|| NativeError::TypeMismatch { expected: "pointer".into(), got: val.type_name().into() })
}

unsafe fn object_class(ptr: NonNull<u8>) -> Option<Arc<crate::types::Class>> {
    (*header_of(ptr)).meta.defining_class.clone()
}

/// Convert a raw register word to a [`NativeValue`] using the slot's static
/// type — the same convention `interpreter::execute_one` uses for field and
/// element access, just exposed across the ABI boundary.
fn register_to_native(ty: &Type, raw: u64) -> NativeValue {
    match ty {
        Type::I32 => NativeValue::i32(raw as u32 as i32),
        Type::I64 => NativeValue::i64(raw as i64),
        Type::F64 => NativeValue::f64(f64::from_bits(raw)),
        Type::Bool => NativeValue::bool(raw != 0),
        Type::Object | Type::Class { .. } | Type::TypeParam(_) => {
            tagged_to_native(unsafe { Tagged::from_raw(raw as usize) })
        }
    }
}

fn native_to_register(ty: &Type, v: NativeValue) -> u64 {
    match ty {
        Type::I32 => v.as_i32().unwrap_or(0) as u32 as u64,
        Type::I64 => v.as_i64().unwrap_or(0) as u64,
        Type::F64 => v.as_f64().unwrap_or(0.0).to_bits(),
        Type::Bool => v.as_bool().unwrap_or(false) as u64,
        Type::Object | Type::Class { .. } | Type::TypeParam(_) => {
            native_to_tagged_raw(v).raw() as u64
        }
    }
}

fn tagged_to_native(t: Tagged) -> NativeValue {
    if let Some(p) = t.as_ptr() {
        unsafe { NativeValue::from_ptr(p) }
    } else if let Some(i) = t.as_small_int() {
        NativeValue::i64(i)
    } else {
        NativeValue::null()
    }
}

/// Tag a [`NativeValue`] for storage in a `Tagged` slot (an array element or
/// an `Object`-typed field). Pointers and in-range integers map directly;
/// `f64`/`bool` have no unboxed `Tagged` encoding (the interpreter itself
/// never needs one, since those fields are statically typed and stored
/// unboxed), so a native array holding one boxes it in a one-off buffer
/// allocation a native reader unwraps with `read_buffer`.
fn native_to_tagged(ctx: &VmNativeContext, v: NativeValue) -> Tagged {
    if let Some(p) = unsafe { v.as_ptr::<u8>() } {
        return Tagged::from_ptr(p);
    }
    if let Some(i) = v.as_i64() {
        if let Some(t) = Tagged::from_small_int(i) {
            return t;
        }
    }
    if let Some(b) = v.as_bool() {
        return Tagged::from_small_int(b as i64).unwrap();
    }
    if let Some(f) = v.as_f64() {
        let bytes = f.to_bits().to_le_bytes();
        let ptr = ctx.alloc(buffer_meta(), bytes.len() as u32);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), payload_of(ptr), bytes.len());
        }
        return Tagged::from_ptr(ptr);
    }
    Tagged::NULL
}

/// Like [`native_to_tagged`] but for a context-free caller (field writes,
/// where a boxed `f64` has nowhere natural to allocate from without a
/// `VmNativeContext` in scope) — rejects what it can't represent directly by
/// falling back to a small int of `0`, which only arises for `Object`-typed
/// fields a native caller writes an `f64` into, a combination the type
/// checker that produced the bytecode should never emit.
fn native_to_tagged_raw(v: NativeValue) -> Tagged {
    if let Some(p) = unsafe { v.as_ptr::<u8>() } {
        return Tagged::from_ptr(p);
    }
    if let Some(i) = v.as_i64() {
        if let Some(t) = Tagged::from_small_int(i) {
            return t;
        }
    }
    if let Some(b) = v.as_bool() {
        return Tagged::from_small_int(b as i64).unwrap();
    }
    Tagged::NULL
}
