//! End-to-end: a small two-level class hierarchy with an overridden
//! method, dispatched through `CALLV` by vtable slot rather than by name —
//! confirms resolution follows the receiver's runtime class, not whatever
//! static type the call site was compiled against.

mod support;

use ora_native::NativeFunctionRegistry;
use ora_vm::interpreter::opcode::{BinOpKind, Opcode};
use ora_vm::{Vm, VmOptions};
use support::{ClassDef, FunctionDef, ParentRef, PackageBuilder, TypeDef};

fn shapes_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("shapes");

    // Function 0: Shape.area — the vtable's default, always 0.
    let default_area = Opcode::encode_sequence(&[Opcode::LoadI64 { dst: 0, value: 0 }, Opcode::Return]);
    pkg.functions.push(FunctionDef::bytecode("shapeAreaDefault", 1, vec![TypeDef::Object], TypeDef::I64, default_area));

    // Function 1: Circle.area — radius * radius. r0 = receiver, r1 = radius,
    // r2 = result.
    let circle_area = Opcode::encode_sequence(&[
        Opcode::GetField { dst: 1, obj: 0, field_index: 0 },
        Opcode::BinOp { dst: 2, op: BinOpKind::Mul, float: false, lhs: 1, rhs: 1 },
        Opcode::Move { dst: 0, src: 2 },
        Opcode::Return,
    ]);
    pkg.functions.push(FunctionDef::bytecode("circleArea", 3, vec![TypeDef::Object], TypeDef::I64, circle_area));

    let mut shape = ClassDef::new("Shape");
    shape.methods.push(("area".to_string(), 0));
    pkg.classes.push(shape);

    let mut circle = ClassDef::new("Circle");
    circle.parent = Some(ParentRef::Local(0));
    circle.fields.push(("radius".to_string(), TypeDef::I64));
    circle.methods.push(("area".to_string(), 1));
    pkg.classes.push(circle);

    // Function 2: entry point. Builds a Circle with radius 5, calls vtable
    // slot 0 on it (the `area` slot both classes share), returns the result.
    let eval = Opcode::encode_sequence(&[
        Opcode::NewObject { dst: 0, class_index: 1 },
        Opcode::LoadI64 { dst: 1, value: 5 },
        Opcode::SetField { obj: 0, field_index: 0, value: 1 },
        Opcode::CallVirtual { dst: 2, vtable_slot: 0, receiver: 0, first_arg: 0, arg_count: 0 },
        Opcode::Move { dst: 0, src: 2 },
        Opcode::Return,
    ]);
    pkg.functions.push(FunctionDef::bytecode("evalArea", 3, vec![], TypeDef::I64, eval));
    pkg.entry_function = Some(2);

    pkg
}

#[test]
fn virtual_call_resolves_to_receivers_runtime_class() {
    let tmp = tempfile::tempdir().unwrap();
    let pkg = shapes_package();
    let path = pkg.write_to(tmp.path());

    let mut vm = Vm::new(VmOptions::default(), NativeFunctionRegistry::new());
    let package = vm.load_package(&path).expect("load shapes package");

    let result = vm.run_entry(&package).expect("evalArea should not fault");
    assert_eq!(result as i64, 25, "Circle's override, not Shape's default, should have run");
}
