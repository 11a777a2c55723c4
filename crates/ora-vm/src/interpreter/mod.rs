//! The bytecode interpreter: a register-based dispatch loop over one
//! function's code, recursing into itself for `CALL`.
//!
//! Recursive rather than an explicit frame stack: Rust's own call stack
//! already gives each nested invocation its own local state, and `PUSHTRY`
//! handlers only ever need to catch exceptions raised within their own
//! frame or a callee's, which a `Result` return value propagates for free.

pub mod exceptions;
pub mod opcode;

use std::sync::Arc;

use crate::bridge::NativeBridge;
use crate::error::{VmException, VmFault};
use crate::heap::Heap;
use crate::object::array_meta;
use crate::package::{Function, Package};
use crate::tagged::Tagged;
use exceptions::{TryHandler, TryStack};
use opcode::{BinOpKind, Opcode};

/// Either an ordinary value flowing out of `Return`, or an exception
/// propagating past every `PUSHTRY` in the current frame, carrying the
/// call-stack trace accumulated so far (one line appended per frame it
/// passes through uncaught).
pub enum Outcome {
    Return(u64),
    Thrown(VmException, Vec<String>),
}

/// Interpreter execution context threaded through every call: the heap to
/// allocate from, and the native bridge to dispatch `is_native` functions
/// to.
pub struct ExecContext<'a> {
    pub heap: &'a mut Heap,
    pub bridge: &'a NativeBridge,
}

/// A single execution step's failure: either a language-level exception a
/// `PUSHTRY` handler in this frame or a caller's can still catch, or a fault
/// that unwinds straight past every handler to the host.
///
/// Kept distinct from [`VmFault`] itself (rather than reusing it directly)
/// so `execute_one`'s `?`-based propagation of ordinary exceptions needs no
/// change: [`From<VmException>`] below makes `Err(some_vm_exception)?` keep
/// working exactly as it did before faults existed.
enum ExecError {
    Exception(VmException),
    Fault(VmFault),
}

impl From<VmException> for ExecError {
    fn from(e: VmException) -> Self {
        ExecError::Exception(e)
    }
}

impl From<VmFault> for ExecError {
    fn from(f: VmFault) -> Self {
        ExecError::Fault(f)
    }
}

/// Run `function` (declared in `package`) with `args` already placed in
/// registers `0..args.len()`, returning its result or the exception it let
/// escape.
pub fn run(ctx: &mut ExecContext, package: &Arc<Package>, function: &Arc<Function>, args: &[u64]) -> Result<Outcome, VmFault> {
    if function.is_native() {
        return match ctx.bridge.call(ctx.heap, package, function, args) {
            Ok(value) => Ok(Outcome::Return(value)),
            Err(exception) => Ok(Outcome::Thrown(exception, vec![format!("  at {} (native)", function.name)])),
        };
    }

    let mut registers: Vec<u64> = vec![0; function.register_count as usize];
    registers[..args.len().min(registers.len())].copy_from_slice(&args[..args.len().min(registers.len())]);
    let mut try_stack = TryStack::new();
    let mut pc: u32 = 0;

    loop {
        let Some((op, successors)) = Opcode::decode_at(&function.code, pc) else {
            return Err(VmFault::AssertionFailed(format!("{}: pc {pc} out of bounds", function.name)));
        };

        let step = execute_one(ctx, package, function, &op, &mut registers, &mut try_stack, pc);
        match step {
            Ok(StepResult::Continue) => {
                pc = successors.first().copied().unwrap_or(pc + 1);
            }
            Ok(StepResult::Branch(target)) => {
                pc = target;
            }
            Ok(StepResult::Return(value)) => return Ok(Outcome::Return(value)),
            Ok(StepResult::CallInto { target_function, arg_regs }) => {
                let call_args: Vec<u64> = arg_regs.iter().map(|&r| registers[r as usize]).collect();
                let outcome = with_protected_registers(ctx, function, pc, &mut registers, |ctx, _regs| {
                    run(ctx, package, &target_function, &call_args)
                })?;
                match outcome {
                    Outcome::Return(value) => {
                        if let Opcode::Call { dst, .. } | Opcode::NativeCall { dst, .. } | Opcode::CallVirtual { dst, .. } = &op {
                            registers[*dst as usize] = value;
                        }
                        pc = successors.first().copied().unwrap_or(pc + 1);
                    }
                    Outcome::Thrown(exception, mut trace) => {
                        if let Some(resume) = try_handler_resume(package, &mut try_stack, &exception) {
                            pc = resume;
                        } else {
                            trace.push(format!("  at {} (pc {pc})", function.name));
                            return Ok(Outcome::Thrown(exception, trace));
                        }
                    }
                }
            }
            Err(ExecError::Exception(exception)) => {
                if let Some(resume) = try_handler_resume(package, &mut try_stack, &exception) {
                    pc = resume;
                } else {
                    return Ok(Outcome::Thrown(exception, vec![format!("  at {} (pc {pc})", function.name)]));
                }
            }
            Err(ExecError::Fault(fault)) => return Err(fault),
        }
    }
}

/// Pin every register `pc` holds a live pointer in (per `function`'s
/// [`crate::pointermap::StackPointerMap`]) as a GC handle for the duration
/// of `f`, then write the handles' (possibly relocated) values back — used
/// around every action that can trigger a collection out from under the
/// register file, which `gc::roots` otherwise never sees (it only walks
/// [`crate::heap::HandleStorage`]).
fn with_protected_registers<T>(
    ctx: &mut ExecContext,
    function: &Function,
    pc: u32,
    registers: &mut [u64],
    f: impl FnOnce(&mut ExecContext, &mut [u64]) -> T,
) -> T {
    let map = function.pointer_map();
    let live = map.live_pointer_registers(pc).to_vec();
    ctx.heap.handles_mut().push_scope();
    let pinned: Vec<(u16, crate::heap::Handle)> = live
        .iter()
        .map(|&r| {
            let tagged = unsafe { Tagged::from_raw(registers[r as usize] as usize) };
            (r, ctx.heap.handles_mut().new_handle(tagged))
        })
        .collect();

    let result = f(ctx, registers);

    for (r, h) in pinned {
        registers[r as usize] = ctx.heap.handles().get(h).raw() as u64;
    }
    ctx.heap.handles_mut().pop_scope(None);
    result
}

fn try_handler_resume(package: &Package, try_stack: &mut TryStack, exception: &VmException) -> Option<u32> {
    let class = exceptions::builtin_exception_class(exception);
    try_stack.find_handler(package, &class)
}

enum StepResult {
    Continue,
    Branch(u32),
    Return(u64),
    CallInto { target_function: Arc<Function>, arg_regs: Vec<u16> },
}

fn execute_one(
    ctx: &mut ExecContext,
    package: &Arc<Package>,
    function: &Function,
    op: &Opcode,
    registers: &mut [u64],
    try_stack: &mut TryStack,
    pc: u32,
) -> Result<StepResult, ExecError> {
    match op {
        Opcode::LoadI32 { dst, value } => {
            registers[*dst as usize] = *value as u32 as u64;
            Ok(StepResult::Continue)
        }
        Opcode::LoadI64 { dst, value } => {
            registers[*dst as usize] = *value as u64;
            Ok(StepResult::Continue)
        }
        Opcode::LoadF64 { dst, value } => {
            registers[*dst as usize] = value.to_bits();
            Ok(StepResult::Continue)
        }
        Opcode::LoadNull { dst } => {
            registers[*dst as usize] = Tagged::NULL.raw() as u64;
            Ok(StepResult::Continue)
        }
        Opcode::Move { dst, src } => {
            registers[*dst as usize] = registers[*src as usize];
            Ok(StepResult::Continue)
        }
        Opcode::BinOp { dst, op, float, lhs, rhs } => {
            let result = if *float {
                let l = f64::from_bits(registers[*lhs as usize]);
                let r = f64::from_bits(registers[*rhs as usize]);
                apply_binop_f64(*op, l, r)?
            } else {
                let l = registers[*lhs as usize] as i64;
                let r = registers[*rhs as usize] as i64;
                apply_binop_i64(*op, l, r)?
            };
            registers[*dst as usize] = result;
            Ok(StepResult::Continue)
        }
        Opcode::NewObject { dst, class_index } => {
            let class = package
                .classes
                .get(*class_index as usize)
                .ok_or_else(|| VmException::new("LinkError", "invalid class index"))?;
            let meta = crate::types::Class::instance_meta(class);
            let tagged = with_protected_registers(ctx, function, pc, registers, |ctx, _regs| alloc_or_collect(ctx, meta, 0))?;
            registers[*dst as usize] = tagged.raw() as u64;
            Ok(StepResult::Continue)
        }
        Opcode::NewArray { dst, length } => {
            let tagged =
                with_protected_registers(ctx, function, pc, registers, |ctx, _regs| alloc_or_collect(ctx, array_meta(), *length as u32))?;
            registers[*dst as usize] = tagged.raw() as u64;
            Ok(StepResult::Continue)
        }
        Opcode::GetField { dst, obj, field_index } => {
            let ptr = nonnull_register(registers, *obj)?;
            let value = unsafe { read_field(ptr, *field_index as usize) }?;
            registers[*dst as usize] = value;
            Ok(StepResult::Continue)
        }
        Opcode::SetField { obj, field_index, value } => {
            let ptr = nonnull_register(registers, *obj)?;
            unsafe { write_field(ptr, *field_index as usize, registers[*value as usize]) }?;
            Ok(StepResult::Continue)
        }
        Opcode::GetElement { dst, arr, index } => {
            let ptr = nonnull_register(registers, *arr)?;
            let idx = registers[*index as usize] as i64;
            let value = unsafe { read_element(ptr, idx) }?;
            registers[*dst as usize] = value;
            Ok(StepResult::Continue)
        }
        Opcode::SetElement { arr, index, value } => {
            let ptr = nonnull_register(registers, *arr)?;
            let idx = registers[*index as usize] as i64;
            unsafe { write_element(ptr, idx, registers[*value as usize]) }?;
            Ok(StepResult::Continue)
        }
        Opcode::LoadGlobal { dst, global_index } => {
            let slot = package.globals.get(*global_index as usize).ok_or_else(|| VmException::new("LinkError", "invalid global index"))?;
            let value = slot.global.value.read().unwrap().ok_or_else(|| VmException::uninitialized_access(&slot.global.name.to_string()))?;
            registers[*dst as usize] = value.raw() as u64;
            Ok(StepResult::Continue)
        }
        Opcode::StoreGlobal { global_index, value } => {
            let slot = package.globals.get(*global_index as usize).ok_or_else(|| VmException::new("LinkError", "invalid global index"))?;
            let raw = registers[*value as usize] as usize;
            *slot.global.value.write().unwrap() = Some(unsafe { Tagged::from_raw(raw) });
            Ok(StepResult::Continue)
        }
        Opcode::Jump { target } => Ok(StepResult::Branch(*target)),
        Opcode::JumpIfFalse { cond, target } => {
            if registers[*cond as usize] == 0 {
                Ok(StepResult::Branch(*target))
            } else {
                Ok(StepResult::Continue)
            }
        }
        Opcode::Call { function_index, first_arg, arg_count, .. } => {
            let target = ctx
                .bridge
                .resolve_function(package, *function_index as usize)
                .ok_or_else(|| VmException::new("LinkError", "invalid function index"))?;
            let arg_regs: Vec<u16> = (*first_arg..*first_arg + *arg_count).collect();
            Ok(StepResult::CallInto { target_function: target, arg_regs })
        }
        Opcode::NativeCall { native_name_index, first_arg, arg_count, .. } => {
            // Reuses the function table: native dispatch is keyed by the
            // callee `Function::native_name`, resolved the same way an
            // ordinary intra-package `CALL` resolves its target.
            let target = ctx
                .bridge
                .resolve_function(package, *native_name_index as usize)
                .ok_or_else(|| VmException::new("LinkError", "invalid native function index"))?;
            let arg_regs: Vec<u16> = (*first_arg..*first_arg + *arg_count).collect();
            Ok(StepResult::CallInto { target_function: target, arg_regs })
        }
        Opcode::Cast { dst, src, class_index } => {
            let ptr = nonnull_register(registers, *src)?;
            let class = package.classes.get(*class_index as usize).ok_or_else(|| VmException::new("LinkError", "invalid class index"))?;
            let actual = unsafe { object_class(ptr) };
            if let Some(actual) = actual {
                if !actual.is_subclass_of(class) {
                    return Err(VmException::bad_cast(&actual.name.to_string(), &class.name.to_string()).into());
                }
            }
            registers[*dst as usize] = registers[*src as usize];
            Ok(StepResult::Continue)
        }
        Opcode::IsNull { dst, src } => {
            let is_null = unsafe { Tagged::from_raw(registers[*src as usize] as usize) }.is_null();
            registers[*dst as usize] = is_null as u64;
            Ok(StepResult::Continue)
        }
        Opcode::PushTry { catch_target, exception_class_index } => {
            try_stack.push(TryHandler { catch_target: *catch_target, exception_class_index: *exception_class_index });
            Ok(StepResult::Continue)
        }
        Opcode::PopTry => {
            try_stack.pop();
            Ok(StepResult::Continue)
        }
        Opcode::Throw { value } => {
            let ptr = nonnull_register(registers, *value)?;
            let class = unsafe { object_class(ptr) };
            let message = class.map(|c| c.name.to_string()).unwrap_or_else(|| "exception".to_string());
            Err(ExecError::Exception(VmException::new(
                class.map(|c| c.name.to_string()).unwrap_or_else(|| "Exception".to_string()),
                message,
            )))
        }
        Opcode::Assert { cond, .. } => {
            if registers[*cond as usize] == 0 {
                Err(ExecError::Fault(VmFault::AssertionFailed(format!("assertion failed in {}", function.name))))
            } else {
                Ok(StepResult::Continue)
            }
        }
        Opcode::CallVirtual { vtable_slot, receiver, first_arg, arg_count, .. } => {
            let ptr = nonnull_register(registers, *receiver)?;
            let class = unsafe { object_class(ptr) }.ok_or_else(|| VmException::new("TypeError", "virtual call on non-object receiver"))?;
            let slot = class.method_at(*vtable_slot as usize).ok_or_else(|| VmException::new("LinkError", "invalid vtable slot"))?;
            let target = ctx
                .bridge
                .resolve_function(package, slot.function_index)
                .ok_or_else(|| VmException::new("LinkError", "invalid function index"))?;
            let mut arg_regs = vec![*receiver];
            arg_regs.extend(*first_arg..*first_arg + *arg_count);
            Ok(StepResult::CallInto { target_function: target, arg_regs })
        }
        Opcode::Return => Ok(StepResult::Return(registers.first().copied().unwrap_or(0))),
    }
}

fn apply_binop_i64(op: BinOpKind, l: i64, r: i64) -> Result<u64, VmException> {
    Ok(match op {
        BinOpKind::Add => l.wrapping_add(r) as u64,
        BinOpKind::Sub => l.wrapping_sub(r) as u64,
        BinOpKind::Mul => l.wrapping_mul(r) as u64,
        BinOpKind::Div => {
            if r == 0 {
                return Err(VmException::arithmetic("division by zero"));
            }
            l.wrapping_div(r) as u64
        }
        BinOpKind::Mod => {
            if r == 0 {
                return Err(VmException::arithmetic("modulo by zero"));
            }
            l.wrapping_rem(r) as u64
        }
        BinOpKind::And => (l & r) as u64,
        BinOpKind::Or => (l | r) as u64,
        BinOpKind::Xor => (l ^ r) as u64,
        BinOpKind::Eq => (l == r) as u64,
        BinOpKind::Ne => (l != r) as u64,
        BinOpKind::Lt => (l < r) as u64,
        BinOpKind::Le => (l <= r) as u64,
        BinOpKind::Gt => (l > r) as u64,
        BinOpKind::Ge => (l >= r) as u64,
    })
}

/// Float arithmetic for a [`Opcode::BinOp`] whose operands are statically
/// typed `f64`. Bitwise ops have no float meaning and are rejected rather
/// than silently truncating through an integer reinterpretation.
fn apply_binop_f64(op: BinOpKind, l: f64, r: f64) -> Result<u64, VmException> {
    Ok(match op {
        BinOpKind::Add => (l + r).to_bits(),
        BinOpKind::Sub => (l - r).to_bits(),
        BinOpKind::Mul => (l * r).to_bits(),
        BinOpKind::Div => {
            if r == 0.0 {
                return Err(VmException::arithmetic("division by zero"));
            }
            (l / r).to_bits()
        }
        BinOpKind::Mod => {
            if r == 0.0 {
                return Err(VmException::arithmetic("modulo by zero"));
            }
            (l % r).to_bits()
        }
        BinOpKind::And | BinOpKind::Or | BinOpKind::Xor => {
            return Err(VmException::new("TypeError", "bitwise operator applied to float operands"));
        }
        BinOpKind::Eq => (l == r) as u64,
        BinOpKind::Ne => (l != r) as u64,
        BinOpKind::Lt => (l < r) as u64,
        BinOpKind::Le => (l <= r) as u64,
        BinOpKind::Gt => (l > r) as u64,
        BinOpKind::Ge => (l >= r) as u64,
    })
}

fn nonnull_register(registers: &[u64], reg: u16) -> Result<std::ptr::NonNull<u8>, VmException> {
    let tagged = unsafe { Tagged::from_raw(registers[reg as usize] as usize) };
    tagged.as_ptr().ok_or_else(VmException::null_dereference)
}

fn alloc_or_collect(ctx: &mut ExecContext, meta: Arc<crate::object::Meta>, length: u32) -> Result<Tagged, ExecError> {
    if let Some(t) = ctx.heap.try_alloc_young(meta.clone(), length) {
        return Ok(t);
    }
    crate::gc::minor_collect(ctx.heap);

    let cap = ctx.heap.max_heap_bytes();
    if cap != 0 && ctx.heap.total_bytes_in_use() >= cap {
        let requested = length as usize;
        let available = cap.saturating_sub(ctx.heap.total_bytes_in_use());
        return Err(ExecError::Fault(VmFault::HeapExhausted { requested, available }));
    }

    match ctx.heap.try_alloc_young(meta, length) {
        Some(t) => Ok(t),
        None => {
            let requested = length as usize;
            let available = ctx.heap.from_space.capacity().saturating_sub(ctx.heap.from_space.used());
            Err(ExecError::Fault(VmFault::HeapExhausted { requested, available }))
        }
    }
}

unsafe fn header_of(ptr: std::ptr::NonNull<u8>) -> *mut crate::object::BlockHeader {
    ptr.as_ptr().cast::<crate::object::BlockHeader>()
}

unsafe fn payload_of(ptr: std::ptr::NonNull<u8>) -> *mut u8 {
    ptr.as_ptr().add(std::mem::size_of::<crate::object::BlockHeader>())
}

unsafe fn object_class(ptr: std::ptr::NonNull<u8>) -> Option<Arc<crate::types::Class>> {
    (*header_of(ptr)).meta.defining_class.clone()
}

unsafe fn read_field(ptr: std::ptr::NonNull<u8>, field_index: usize) -> Result<u64, VmException> {
    let class = object_class(ptr).ok_or_else(|| VmException::new("TypeError", "not an object"))?;
    let field = class.fields().get(field_index).cloned().ok_or_else(|| VmException::new("LinkError", "invalid field index"))?;
    let slot = payload_of(ptr).add(field.offset);
    Ok(match field.ty.slot_size() {
        4 => *(slot.cast::<u32>()) as u64,
        _ => *(slot.cast::<u64>()),
    })
}

unsafe fn write_field(ptr: std::ptr::NonNull<u8>, field_index: usize, value: u64) -> Result<(), VmException> {
    let class = object_class(ptr).ok_or_else(|| VmException::new("TypeError", "not an object"))?;
    let field = class.fields().get(field_index).cloned().ok_or_else(|| VmException::new("LinkError", "invalid field index"))?;
    let slot = payload_of(ptr).add(field.offset);
    match field.ty.slot_size() {
        4 => slot.cast::<u32>().write(value as u32),
        _ => slot.cast::<u64>().write(value),
    }
    Ok(())
}

unsafe fn read_element(ptr: std::ptr::NonNull<u8>, index: i64) -> Result<u64, VmException> {
    let header = header_of(ptr);
    let length = (*header).length as i64;
    if index < 0 || index >= length {
        return Err(VmException::out_of_bounds(index, length as usize));
    }
    let slot = payload_of(ptr).add(index as usize * std::mem::size_of::<Tagged>());
    Ok(*(slot.cast::<u64>()))
}

unsafe fn write_element(ptr: std::ptr::NonNull<u8>, index: i64, value: u64) -> Result<(), VmException> {
    let header = header_of(ptr);
    let length = (*header).length as i64;
    if index < 0 || index >= length {
        return Err(VmException::out_of_bounds(index, length as usize));
    }
    let slot = payload_of(ptr).add(index as usize * std::mem::size_of::<Tagged>());
    slot.cast::<u64>().write(value);
    Ok(())
}
