//! End-to-end: a live object referenced only from a register survives many
//! minor collections triggered by churning throwaway allocations in a loop —
//! the direct regression test for the register file being a GC root.

mod support;

use ora_native::NativeFunctionRegistry;
use ora_vm::heap::HeapOptions;
use ora_vm::interpreter::opcode::{BinOpKind, Opcode};
use ora_vm::{Vm, VmOptions};
use support::{ClassDef, FunctionDef, PackageBuilder, TypeDef};

fn gc_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("gcsurvival");

    let mut boxed = ClassDef::new("Box");
    boxed.fields.push(("value".to_string(), TypeDef::I64));
    pkg.classes.push(boxed);

    // r0 = the surviving Box, r1 = 42, r2 = loop counter, r3 = loop limit
    // (500), r6 = increment constant (1), r5 = loop condition, r4 = a
    // throwaway Box allocated fresh each iteration, r7 = the field read back
    // after the loop.
    //
    // Byte offsets (NewObject=7, LoadI64=11, SetField=7, BinOp=9,
    // JumpIfFalse=7, Jump=5, GetField=7, Move=5, Return=1):
    //   [0]  NewObject dst=0            offset 0
    //   [1]  LoadI64   dst=1, 42        offset 7
    //   [2]  SetField  obj=0            offset 18
    //   [3]  LoadI64   dst=2, 0         offset 25
    //   [4]  LoadI64   dst=3, 500       offset 36
    //   [5]  LoadI64   dst=6, 1         offset 47
    //   loop_start = 58
    //   [6]  BinOp Lt  dst=5            offset 58
    //   [7]  JumpIfFalse -> end (95)    offset 67
    //   [8]  NewObject dst=4            offset 74
    //   [9]  BinOp Add dst=2            offset 81
    //   [10] Jump -> loop_start (58)    offset 90
    //   end = 95
    //   [11] GetField dst=7             offset 95
    //   [12] Move     dst=0, src=7      offset 102
    //   [13] Return                     offset 107
    let loop_start: u32 = 58;
    let end: u32 = 95;
    let code = Opcode::encode_sequence(&[
        Opcode::NewObject { dst: 0, class_index: 0 },
        Opcode::LoadI64 { dst: 1, value: 42 },
        Opcode::SetField { obj: 0, field_index: 0, value: 1 },
        Opcode::LoadI64 { dst: 2, value: 0 },
        Opcode::LoadI64 { dst: 3, value: 500 },
        Opcode::LoadI64 { dst: 6, value: 1 },
        Opcode::BinOp { dst: 5, op: BinOpKind::Lt, float: false, lhs: 2, rhs: 3 },
        Opcode::JumpIfFalse { cond: 5, target: end },
        Opcode::NewObject { dst: 4, class_index: 0 },
        Opcode::BinOp { dst: 2, op: BinOpKind::Add, float: false, lhs: 2, rhs: 6 },
        Opcode::Jump { target: loop_start },
        Opcode::GetField { dst: 7, obj: 0, field_index: 0 },
        Opcode::Move { dst: 0, src: 7 },
        Opcode::Return,
    ]);

    pkg.functions.push(FunctionDef::bytecode("churn", 8, vec![], TypeDef::I64, code));
    pkg.entry_function = Some(0);
    pkg
}

#[test]
fn live_register_survives_repeated_minor_collections() {
    let tmp = tempfile::tempdir().unwrap();
    let pkg = gc_package();
    let path = pkg.write_to(tmp.path());

    let heap = HeapOptions { new_space_bytes: 4096, old_space_bytes: 4096, max_heap_bytes: 0 };
    let mut vm = Vm::new(VmOptions { heap, ..VmOptions::default() }, NativeFunctionRegistry::new());
    let package = vm.load_package(&path).expect("load gcsurvival package");

    let result = vm.run_entry(&package).expect("churn should not fault or run out of heap");
    assert_eq!(result as i64, 42, "the surviving Box's field must be intact after repeated collections");
}
