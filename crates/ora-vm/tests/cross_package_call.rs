//! End-to-end: a function in one package invokes an exported function in a
//! dependency via the `"pkg::function"` native-name convention, exercising
//! the loader's dependency resolution and `NativeBridge::call_cross_package`
//! together.

mod support;

use ora_native::NativeFunctionRegistry;
use ora_vm::interpreter::opcode::{BinOpKind, Opcode};
use ora_vm::{Vm, VmOptions};
use support::{DependencyDef, FunctionDef, PackageBuilder, TypeDef};

fn lib_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("lib");
    let code = Opcode::encode_sequence(&[
        Opcode::BinOp { dst: 0, op: BinOpKind::Add, float: false, lhs: 0, rhs: 1 },
        Opcode::Return,
    ]);
    pkg.functions.push(FunctionDef::bytecode("add", 2, vec![TypeDef::I64, TypeDef::I64], TypeDef::I64, code));
    pkg
}

fn app_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("app");
    pkg.dependencies.push(DependencyDef { name: "lib".to_string(), min: (0, 0, 0), max: (99, 0, 0) });

    // Function 0: forwards straight to lib::add.
    pkg.functions.push(FunctionDef::native("crossAdd", "lib::add", vec![TypeDef::I64, TypeDef::I64], TypeDef::I64));

    // Function 1: entry point. r0 = 7, r1 = 8, NATIVECALL crossAdd(r0, r1).
    let code = Opcode::encode_sequence(&[
        Opcode::LoadI64 { dst: 0, value: 7 },
        Opcode::LoadI64 { dst: 1, value: 8 },
        Opcode::NativeCall { dst: 0, native_name_index: 0, first_arg: 0, arg_count: 2 },
        Opcode::Return,
    ]);
    pkg.functions.push(FunctionDef::bytecode("main", 2, vec![], TypeDef::I64, code));
    pkg.entry_function = Some(1);
    pkg
}

#[test]
fn cross_package_call_resolves_through_dependency() {
    let tmp = tempfile::tempdir().unwrap();
    lib_package().write_to(tmp.path());
    let app_path = app_package().write_to(tmp.path());

    let mut vm = Vm::new(VmOptions { search_paths: vec![tmp.path().to_path_buf()], ..VmOptions::default() }, NativeFunctionRegistry::new());
    let package = vm.load_package(&app_path).expect("load app package and its lib dependency");

    let result = vm.run_entry(&package).expect("cross-package call should not fault");
    assert_eq!(result as i64, 15);
}
