//! The bytecode instruction set: fixed-tag, little-endian encoded, operating
//! on a per-call register file rather than an operand stack (registers make
//! the pointer map in [`crate::pointermap`] a per-PC fact about a fixed set
//! of slots instead of a stack depth that varies with control flow).

/// Binary arithmetic/comparison operator a `BinOp` instruction applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One bytecode instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Opcode {
    LoadI32 { dst: u16, value: i32 },
    LoadI64 { dst: u16, value: i64 },
    LoadF64 { dst: u16, value: f64 },
    LoadNull { dst: u16 },
    Move { dst: u16, src: u16 },
    /// `float` selects IEEE-754 double arithmetic over the two operand
    /// registers instead of the default wrapping 64-bit integer arithmetic
    /// — registers carry no runtime type tag of their own, so the opcode
    /// itself must say which interpretation the static types chose.
    BinOp { dst: u16, op: BinOpKind, float: bool, lhs: u16, rhs: u16 },
    NewObject { dst: u16, class_index: u32 },
    NewArray { dst: u16, length: u16 },
    GetField { dst: u16, obj: u16, field_index: u16 },
    SetField { obj: u16, field_index: u16, value: u16 },
    GetElement { dst: u16, arr: u16, index: u16 },
    SetElement { arr: u16, index: u16, value: u16 },
    LoadGlobal { dst: u16, global_index: u32 },
    StoreGlobal { global_index: u32, value: u16 },
    Jump { target: u32 },
    JumpIfFalse { cond: u16, target: u32 },
    Call { dst: u16, function_index: u32, first_arg: u16, arg_count: u16 },
    NativeCall { dst: u16, native_name_index: u32, first_arg: u16, arg_count: u16 },
    /// Dynamic dispatch: resolves `vtable_slot` against the runtime class of
    /// `receiver` (not the static declared type), so an override in a
    /// subclass is what actually runs. `receiver` is passed as the callee's
    /// first argument, ahead of `first_arg..first_arg+arg_count`.
    CallVirtual { dst: u16, vtable_slot: u32, receiver: u16, first_arg: u16, arg_count: u16 },
    Cast { dst: u16, src: u16, class_index: u32 },
    IsNull { dst: u16, src: u16 },
    PushTry { catch_target: u32, exception_class_index: u32 },
    PopTry,
    Throw { value: u16 },
    Assert { cond: u16, message_index: u32 },
    Return,
}

const TAG_LOAD_I32: u8 = 0;
const TAG_LOAD_I64: u8 = 1;
const TAG_LOAD_F64: u8 = 2;
const TAG_LOAD_NULL: u8 = 3;
const TAG_MOVE: u8 = 4;
const TAG_BINOP: u8 = 5;
const TAG_NEW_OBJECT: u8 = 6;
const TAG_NEW_ARRAY: u8 = 7;
const TAG_GET_FIELD: u8 = 8;
const TAG_SET_FIELD: u8 = 9;
const TAG_GET_ELEMENT: u8 = 10;
const TAG_SET_ELEMENT: u8 = 11;
const TAG_LOAD_GLOBAL: u8 = 12;
const TAG_STORE_GLOBAL: u8 = 13;
const TAG_JUMP: u8 = 14;
const TAG_JUMP_IF_FALSE: u8 = 15;
const TAG_CALL: u8 = 16;
const TAG_NATIVE_CALL: u8 = 17;
const TAG_CAST: u8 = 18;
const TAG_IS_NULL: u8 = 19;
const TAG_PUSH_TRY: u8 = 20;
const TAG_POP_TRY: u8 = 21;
const TAG_THROW: u8 = 22;
const TAG_ASSERT: u8 = 23;
const TAG_RETURN: u8 = 24;
const TAG_CALL_VIRTUAL: u8 = 25;

fn binop_tag(k: BinOpKind) -> u8 {
    match k {
        BinOpKind::Add => 0,
        BinOpKind::Sub => 1,
        BinOpKind::Mul => 2,
        BinOpKind::Div => 3,
        BinOpKind::Mod => 4,
        BinOpKind::And => 5,
        BinOpKind::Or => 6,
        BinOpKind::Xor => 7,
        BinOpKind::Eq => 8,
        BinOpKind::Ne => 9,
        BinOpKind::Lt => 10,
        BinOpKind::Le => 11,
        BinOpKind::Gt => 12,
        BinOpKind::Ge => 13,
    }
}

fn binop_from_tag(tag: u8) -> BinOpKind {
    match tag {
        0 => BinOpKind::Add,
        1 => BinOpKind::Sub,
        2 => BinOpKind::Mul,
        3 => BinOpKind::Div,
        4 => BinOpKind::Mod,
        5 => BinOpKind::And,
        6 => BinOpKind::Or,
        7 => BinOpKind::Xor,
        8 => BinOpKind::Eq,
        9 => BinOpKind::Ne,
        10 => BinOpKind::Lt,
        11 => BinOpKind::Le,
        12 => BinOpKind::Gt,
        _ => BinOpKind::Ge,
    }
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_u16(code: &[u8], pc: usize) -> u16 {
    u16::from_le_bytes(code[pc..pc + 2].try_into().unwrap())
}
fn read_u32(code: &[u8], pc: usize) -> u32 {
    u32::from_le_bytes(code[pc..pc + 4].try_into().unwrap())
}
fn read_i32(code: &[u8], pc: usize) -> i32 {
    i32::from_le_bytes(code[pc..pc + 4].try_into().unwrap())
}
fn read_i64(code: &[u8], pc: usize) -> i64 {
    i64::from_le_bytes(code[pc..pc + 8].try_into().unwrap())
}
fn read_f64(code: &[u8], pc: usize) -> f64 {
    f64::from_le_bytes(code[pc..pc + 8].try_into().unwrap())
}

impl Opcode {
    /// Append this instruction's encoded form to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Opcode::LoadI32 { dst, value } => {
                buf.push(TAG_LOAD_I32);
                push_u16(buf, *dst);
                push_i32(buf, *value);
            }
            Opcode::LoadI64 { dst, value } => {
                buf.push(TAG_LOAD_I64);
                push_u16(buf, *dst);
                push_i64(buf, *value);
            }
            Opcode::LoadF64 { dst, value } => {
                buf.push(TAG_LOAD_F64);
                push_u16(buf, *dst);
                push_f64(buf, *value);
            }
            Opcode::LoadNull { dst } => {
                buf.push(TAG_LOAD_NULL);
                push_u16(buf, *dst);
            }
            Opcode::Move { dst, src } => {
                buf.push(TAG_MOVE);
                push_u16(buf, *dst);
                push_u16(buf, *src);
            }
            Opcode::BinOp { dst, op, float, lhs, rhs } => {
                buf.push(TAG_BINOP);
                push_u16(buf, *dst);
                buf.push(binop_tag(*op));
                buf.push(*float as u8);
                push_u16(buf, *lhs);
                push_u16(buf, *rhs);
            }
            Opcode::NewObject { dst, class_index } => {
                buf.push(TAG_NEW_OBJECT);
                push_u16(buf, *dst);
                push_u32(buf, *class_index);
            }
            Opcode::NewArray { dst, length } => {
                buf.push(TAG_NEW_ARRAY);
                push_u16(buf, *dst);
                push_u16(buf, *length);
            }
            Opcode::GetField { dst, obj, field_index } => {
                buf.push(TAG_GET_FIELD);
                push_u16(buf, *dst);
                push_u16(buf, *obj);
                push_u16(buf, *field_index);
            }
            Opcode::SetField { obj, field_index, value } => {
                buf.push(TAG_SET_FIELD);
                push_u16(buf, *obj);
                push_u16(buf, *field_index);
                push_u16(buf, *value);
            }
            Opcode::GetElement { dst, arr, index } => {
                buf.push(TAG_GET_ELEMENT);
                push_u16(buf, *dst);
                push_u16(buf, *arr);
                push_u16(buf, *index);
            }
            Opcode::SetElement { arr, index, value } => {
                buf.push(TAG_SET_ELEMENT);
                push_u16(buf, *arr);
                push_u16(buf, *index);
                push_u16(buf, *value);
            }
            Opcode::LoadGlobal { dst, global_index } => {
                buf.push(TAG_LOAD_GLOBAL);
                push_u16(buf, *dst);
                push_u32(buf, *global_index);
            }
            Opcode::StoreGlobal { global_index, value } => {
                buf.push(TAG_STORE_GLOBAL);
                push_u32(buf, *global_index);
                push_u16(buf, *value);
            }
            Opcode::Jump { target } => {
                buf.push(TAG_JUMP);
                push_u32(buf, *target);
            }
            Opcode::JumpIfFalse { cond, target } => {
                buf.push(TAG_JUMP_IF_FALSE);
                push_u16(buf, *cond);
                push_u32(buf, *target);
            }
            Opcode::Call { dst, function_index, first_arg, arg_count } => {
                buf.push(TAG_CALL);
                push_u16(buf, *dst);
                push_u32(buf, *function_index);
                push_u16(buf, *first_arg);
                push_u16(buf, *arg_count);
            }
            Opcode::NativeCall { dst, native_name_index, first_arg, arg_count } => {
                buf.push(TAG_NATIVE_CALL);
                push_u16(buf, *dst);
                push_u32(buf, *native_name_index);
                push_u16(buf, *first_arg);
                push_u16(buf, *arg_count);
            }
            Opcode::Cast { dst, src, class_index } => {
                buf.push(TAG_CAST);
                push_u16(buf, *dst);
                push_u16(buf, *src);
                push_u32(buf, *class_index);
            }
            Opcode::IsNull { dst, src } => {
                buf.push(TAG_IS_NULL);
                push_u16(buf, *dst);
                push_u16(buf, *src);
            }
            Opcode::PushTry { catch_target, exception_class_index } => {
                buf.push(TAG_PUSH_TRY);
                push_u32(buf, *catch_target);
                push_u32(buf, *exception_class_index);
            }
            Opcode::PopTry => {
                buf.push(TAG_POP_TRY);
            }
            Opcode::Throw { value } => {
                buf.push(TAG_THROW);
                push_u16(buf, *value);
            }
            Opcode::Assert { cond, message_index } => {
                buf.push(TAG_ASSERT);
                push_u16(buf, *cond);
                push_u32(buf, *message_index);
            }
            Opcode::Return => {
                buf.push(TAG_RETURN);
            }
            Opcode::CallVirtual { dst, vtable_slot, receiver, first_arg, arg_count } => {
                buf.push(TAG_CALL_VIRTUAL);
                push_u16(buf, *dst);
                push_u32(buf, *vtable_slot);
                push_u16(buf, *receiver);
                push_u16(buf, *first_arg);
                push_u16(buf, *arg_count);
            }
        }
    }

    /// Encode a whole sequence, for tests and the in-memory package writer.
    pub fn encode_sequence(ops: &[Opcode]) -> Vec<u8> {
        let mut buf = Vec::new();
        for op in ops {
            op.encode(&mut buf);
        }
        buf
    }

    /// Decode the instruction at `pc`, returning it along with the set of
    /// PCs control can flow to next (more than one for a conditional
    /// branch, none for `Return`/`Throw`).
    pub fn decode_at(code: &[u8], pc: u32) -> Option<(Opcode, Vec<u32>)> {
        let p = pc as usize;
        if p >= code.len() {
            return None;
        }
        let tag = code[p];
        let body = p + 1;
        let (op, size): (Opcode, usize) = match tag {
            TAG_LOAD_I32 => (Opcode::LoadI32 { dst: read_u16(code, body), value: read_i32(code, body + 2) }, 7),
            TAG_LOAD_I64 => (Opcode::LoadI64 { dst: read_u16(code, body), value: read_i64(code, body + 2) }, 11),
            TAG_LOAD_F64 => (Opcode::LoadF64 { dst: read_u16(code, body), value: read_f64(code, body + 2) }, 11),
            TAG_LOAD_NULL => (Opcode::LoadNull { dst: read_u16(code, body) }, 3),
            TAG_MOVE => (Opcode::Move { dst: read_u16(code, body), src: read_u16(code, body + 2) }, 5),
            TAG_BINOP => (
                Opcode::BinOp {
                    dst: read_u16(code, body),
                    op: binop_from_tag(code[body + 2]),
                    float: code[body + 3] != 0,
                    lhs: read_u16(code, body + 4),
                    rhs: read_u16(code, body + 6),
                },
                9,
            ),
            TAG_NEW_OBJECT => (Opcode::NewObject { dst: read_u16(code, body), class_index: read_u32(code, body + 2) }, 7),
            TAG_NEW_ARRAY => (Opcode::NewArray { dst: read_u16(code, body), length: read_u16(code, body + 2) }, 5),
            TAG_GET_FIELD => (
                Opcode::GetField { dst: read_u16(code, body), obj: read_u16(code, body + 2), field_index: read_u16(code, body + 4) },
                7,
            ),
            TAG_SET_FIELD => (
                Opcode::SetField { obj: read_u16(code, body), field_index: read_u16(code, body + 2), value: read_u16(code, body + 4) },
                7,
            ),
            TAG_GET_ELEMENT => (
                Opcode::GetElement { dst: read_u16(code, body), arr: read_u16(code, body + 2), index: read_u16(code, body + 4) },
                7,
            ),
            TAG_SET_ELEMENT => (
                Opcode::SetElement { arr: read_u16(code, body), index: read_u16(code, body + 2), value: read_u16(code, body + 4) },
                7,
            ),
            TAG_LOAD_GLOBAL => (Opcode::LoadGlobal { dst: read_u16(code, body), global_index: read_u32(code, body + 2) }, 7),
            TAG_STORE_GLOBAL => (Opcode::StoreGlobal { global_index: read_u32(code, body), value: read_u16(code, body + 4) }, 7),
            TAG_JUMP => (Opcode::Jump { target: read_u32(code, body) }, 5),
            TAG_JUMP_IF_FALSE => (Opcode::JumpIfFalse { cond: read_u16(code, body), target: read_u32(code, body + 2) }, 7),
            TAG_CALL => (
                Opcode::Call {
                    dst: read_u16(code, body),
                    function_index: read_u32(code, body + 2),
                    first_arg: read_u16(code, body + 6),
                    arg_count: read_u16(code, body + 8),
                },
                11,
            ),
            TAG_NATIVE_CALL => (
                Opcode::NativeCall {
                    dst: read_u16(code, body),
                    native_name_index: read_u32(code, body + 2),
                    first_arg: read_u16(code, body + 6),
                    arg_count: read_u16(code, body + 8),
                },
                11,
            ),
            TAG_CAST => (Opcode::Cast { dst: read_u16(code, body), src: read_u16(code, body + 2), class_index: read_u32(code, body + 4) }, 9),
            TAG_IS_NULL => (Opcode::IsNull { dst: read_u16(code, body), src: read_u16(code, body + 2) }, 5),
            TAG_PUSH_TRY => (
                Opcode::PushTry { catch_target: read_u32(code, body), exception_class_index: read_u32(code, body + 4) },
                9,
            ),
            TAG_POP_TRY => (Opcode::PopTry, 1),
            TAG_THROW => (Opcode::Throw { value: read_u16(code, body) }, 3),
            TAG_ASSERT => (Opcode::Assert { cond: read_u16(code, body), message_index: read_u32(code, body + 2) }, 7),
            TAG_RETURN => (Opcode::Return, 1),
            TAG_CALL_VIRTUAL => (
                Opcode::CallVirtual {
                    dst: read_u16(code, body),
                    vtable_slot: read_u32(code, body + 2),
                    receiver: read_u16(code, body + 6),
                    first_arg: read_u16(code, body + 8),
                    arg_count: read_u16(code, body + 10),
                },
                13,
            ),
            _ => return None,
        };

        let next_pc = pc + size as u32;
        let successors = match &op {
            Opcode::Jump { target } => vec![*target],
            Opcode::JumpIfFalse { target, .. } => vec![next_pc, *target],
            Opcode::PushTry { catch_target, .. } => vec![next_pc, *catch_target],
            Opcode::Return | Opcode::Throw { .. } => vec![],
            _ => vec![next_pc],
        };
        Some((op, successors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_simple_sequence() {
        let ops = vec![
            Opcode::LoadI64 { dst: 0, value: 42 },
            Opcode::LoadI64 { dst: 1, value: 8 },
            Opcode::BinOp { dst: 2, op: BinOpKind::Add, float: false, lhs: 0, rhs: 1 },
            Opcode::Return,
        ];
        let code = Opcode::encode_sequence(&ops);
        let mut pc = 0u32;
        let mut decoded = Vec::new();
        while let Some((op, successors)) = Opcode::decode_at(&code, pc) {
            let is_terminal = successors.is_empty();
            decoded.push(op);
            if is_terminal {
                break;
            }
            pc = successors[0];
        }
        assert_eq!(decoded, ops);
    }

    #[test]
    fn conditional_branch_has_two_successors() {
        let ops = vec![Opcode::JumpIfFalse { cond: 0, target: 100 }];
        let code = Opcode::encode_sequence(&ops);
        let (_, successors) = Opcode::decode_at(&code, 0).unwrap();
        assert_eq!(successors, vec![7, 100]);
    }

    #[test]
    fn call_virtual_roundtrips() {
        let ops = vec![Opcode::CallVirtual { dst: 3, vtable_slot: 1, receiver: 0, first_arg: 1, arg_count: 2 }];
        let code = Opcode::encode_sequence(&ops);
        let (op, successors) = Opcode::decode_at(&code, 0).unwrap();
        assert_eq!(op, ops[0]);
        assert_eq!(successors, vec![code.len() as u32]);
    }
}
