//! End-to-end: load a package with one self-recursive function and run it
//! to completion through the public `Vm` API.

mod support;

use ora_native::NativeFunctionRegistry;
use ora_vm::interpreter::opcode::{BinOpKind, Opcode};
use ora_vm::{Vm, VmOptions};
use support::{FunctionDef, PackageBuilder, TypeDef};

fn factorial_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("factorial");

    // r0 = n (param), r1 = 1, r2 = (n <= 1), r3 = n - 1, r4 = factorial(n-1),
    // r5 = n * r4. Byte offsets of the base-case block (LoadI64 dst=1,1 /
    // BinOp Le / JumpIfFalse / LoadI64 dst=0,1 / Return) are 11 + 9 + 7 + 11
    // + 1 = 39 bytes, so the recursive-case block the `JumpIfFalse` skips to
    // starts at offset 39.
    let recurse_target: u32 = 39;
    let code = Opcode::encode_sequence(&[
        Opcode::LoadI64 { dst: 1, value: 1 },
        Opcode::BinOp { dst: 2, op: BinOpKind::Le, float: false, lhs: 0, rhs: 1 },
        Opcode::JumpIfFalse { cond: 2, target: recurse_target },
        Opcode::LoadI64 { dst: 0, value: 1 },
        Opcode::Return,
        Opcode::BinOp { dst: 3, op: BinOpKind::Sub, float: false, lhs: 0, rhs: 1 },
        Opcode::Call { dst: 4, function_index: 0, first_arg: 3, arg_count: 1 },
        Opcode::BinOp { dst: 5, op: BinOpKind::Mul, float: false, lhs: 0, rhs: 4 },
        Opcode::Move { dst: 0, src: 5 },
        Opcode::Return,
    ]);

    pkg.functions.push(FunctionDef::bytecode("factorial", 6, vec![TypeDef::I64], TypeDef::I64, code));
    pkg
}

#[test]
fn recursive_factorial_runs_to_completion() {
    let tmp = tempfile::tempdir().unwrap();
    let pkg = factorial_package();
    let path = pkg.write_to(tmp.path());

    let mut vm = Vm::new(VmOptions::default(), NativeFunctionRegistry::new());
    let package = vm.load_package(&path).expect("load factorial package");

    let result = vm
        .call_function(&package, &ora_vm::Name::parse("factorial"), &[5i64 as u64])
        .expect("factorial(5) should not fault");
    assert_eq!(result as i64, 120);

    let result = vm.call_function(&package, &ora_vm::Name::parse("factorial"), &[0i64 as u64]).unwrap();
    assert_eq!(result as i64, 1);
}
