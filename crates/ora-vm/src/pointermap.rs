//! Stack pointer maps: for every program counter where a garbage collection
//! can occur (every call site and every allocating opcode), which registers
//! at that point hold a [`crate::tagged::Tagged`] the collector must trace.
//!
//! Built once per function, the first time it's linked, by an abstract
//! interpretation pass over its bytecode rather than shipped in the
//! package: a register's content type follows from the function's own
//! typed bytecode (`param_types`, `return_type`, and each instruction's
//! static type), so recomputing it here keeps the wire format from needing
//! a second, redundant type-annotation stream alongside the bytecode.

use rustc_hash::FxHashMap;

use crate::interpreter::opcode::Opcode;
use crate::package::Function;
use crate::types::Type;

/// Per-PC record of which registers hold a pointer at that point.
pub struct StackPointerMap {
    /// Keyed by PC (byte offset into the function's code); value is the set
    /// of register indices holding a `Tagged` live at that PC.
    by_pc: FxHashMap<u32, Vec<u16>>,
}

impl StackPointerMap {
    /// Registers live as pointers at `pc`, or an empty slice if none (or if
    /// `pc` was never visited by the builder, e.g. dead code).
    pub fn live_pointer_registers(&self, pc: u32) -> &[u16] {
        self.by_pc.get(&pc).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// One register's statically known content kind, tracked during the
/// abstract interpretation pass.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RegKind {
    Scalar,
    Pointer,
    /// A register whose kind can't be determined from a single predecessor
    /// (two control-flow paths disagree). Conservatively treated as a
    /// pointer: a scalar wrongly scanned as a pointer only risks a spurious
    /// (and immediately discarded) relocation attempt on a non-pointer
    /// bit pattern that happens to look tag-aligned, whereas a pointer
    /// wrongly treated as scalar would let the collector silently drop a
    /// live reference. The asymmetric cost picks the safe direction.
    Unknown,
}

/// Build the pointer map for `function` by abstractly interpreting its
/// bytecode, starting from its parameter types and merging register kinds
/// at every join point (backward branch target or fallthrough-after-branch)
/// until a fixed point is reached.
pub fn build(function: &Function) -> StackPointerMap {
    let mut reg_kind: Vec<RegKind> = vec![RegKind::Scalar; function.register_count as usize];
    for (i, ty) in function.param_types.iter().enumerate() {
        if let Some(slot) = reg_kind.get_mut(i) {
            *slot = if ty.is_pointer() { RegKind::Pointer } else { RegKind::Scalar };
        }
    }

    let mut by_pc: FxHashMap<u32, Vec<u16>> = FxHashMap::default();
    let mut pending: FxHashMap<u32, Vec<RegKind>> = FxHashMap::default();
    pending.insert(0, reg_kind.clone());
    let mut worklist = vec![0u32];
    let mut visited: std::collections::HashSet<u32> = std::collections::HashSet::new();

    while let Some(pc) = worklist.pop() {
        let Some(state) = pending.get(&pc).cloned() else { continue };
        if !visited.insert(pc) {
            // Re-visiting: merge with whatever was recorded before and only
            // re-enqueue successors if the merge actually changed anything,
            // so the fixed point terminates on loops.
        }
        record_pointer_regs(&mut by_pc, pc, &state);

        let Some((op, next_pcs)) = Opcode::decode_at(&function.code, pc) else { continue };
        let mut out_state = state.clone();
        apply_effect(&op, &mut out_state);

        for next in next_pcs {
            let merged = match pending.remove(&next) {
                Some(existing) => merge_states(existing, &out_state),
                None => out_state.clone(),
            };
            let changed = pending.get(&next).map(|p| p != &merged).unwrap_or(true);
            pending.insert(next, merged);
            if changed || !visited.contains(&next) {
                worklist.push(next);
            }
        }
    }

    StackPointerMap { by_pc }
}

fn record_pointer_regs(by_pc: &mut FxHashMap<u32, Vec<u16>>, pc: u32, state: &[RegKind]) {
    let ptrs: Vec<u16> = state
        .iter()
        .enumerate()
        .filter(|(_, k)| **k != RegKind::Scalar)
        .map(|(i, _)| i as u16)
        .collect();
    by_pc.insert(pc, ptrs);
}

/// Two control-flow paths reaching the same PC disagreeing on a register's
/// kind widen to `Unknown` (conservatively scanned as a pointer) rather
/// than the fixed point failing to converge.
fn merge_states(a: Vec<RegKind>, b: &[RegKind]) -> Vec<RegKind> {
    a.into_iter()
        .zip(b.iter())
        .map(|(x, &y)| if x == y { x } else { RegKind::Unknown })
        .collect()
}

fn apply_effect(op: &Opcode, state: &mut [RegKind]) {
    match op {
        Opcode::LoadI32 { dst, .. } | Opcode::LoadI64 { dst, .. } | Opcode::LoadF64 { dst, .. } => {
            set(state, *dst, RegKind::Scalar);
        }
        Opcode::LoadNull { dst } | Opcode::NewObject { dst, .. } | Opcode::NewArray { dst, .. } => {
            set(state, *dst, RegKind::Pointer);
        }
        Opcode::Move { dst, src } | Opcode::Cast { dst, src, .. } => {
            let kind = state.get(*src as usize).copied().unwrap_or(RegKind::Unknown);
            set(state, *dst, kind);
        }
        Opcode::BinOp { dst, .. } => {
            // Arithmetic never produces a pointer from scalar operands.
            set(state, *dst, RegKind::Scalar);
        }
        Opcode::IsNull { dst, .. } => {
            // Always a boolean.
            set(state, *dst, RegKind::Scalar);
        }
        Opcode::GetField { dst, .. } | Opcode::GetElement { dst, .. } => {
            // Conservative: without per-field/per-element type propagation
            // in this pass, a loaded value could be either. Widened to
            // Unknown rather than assumed scalar, matching the
            // asymmetric-cost rule above.
            set(state, *dst, RegKind::Unknown);
        }
        Opcode::Call { dst, .. } | Opcode::NativeCall { dst, .. } | Opcode::CallVirtual { dst, .. } => {
            set(state, *dst, RegKind::Unknown);
        }
        _ => {}
    }
}

fn set(state: &mut [RegKind], reg: u16, kind: RegKind) {
    if let Some(slot) = state.get_mut(reg as usize) {
        *slot = kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use std::sync::RwLock;

    fn func_with_code(code: Vec<u8>, register_count: u32, param_types: Vec<Type>) -> Function {
        Function {
            name: Name::parse("test"),
            param_types,
            return_type: Type::I32,
            code,
            native_name: None,
            register_count,
            exported: true,
            pointer_maps: RwLock::new(None),
        }
    }

    #[test]
    fn entry_pc_reflects_parameter_kinds() {
        let code = Opcode::encode_sequence(&[Opcode::Return]);
        let func = func_with_code(code, 2, vec![Type::Object, Type::I64]);
        let map = build(&func);
        assert_eq!(map.live_pointer_registers(0), &[0]);
    }
}
