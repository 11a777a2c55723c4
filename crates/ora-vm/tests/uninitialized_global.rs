//! End-to-end: reading a global before any `STOREGLOBAL` has run raises
//! `UninitializedAccessError`, surfaced to the host as an uncaught
//! `VmFault`.

mod support;

use ora_native::NativeFunctionRegistry;
use ora_vm::interpreter::opcode::Opcode;
use ora_vm::{Vm, VmFault, VmOptions};
use support::{FunctionDef, GlobalDef, PackageBuilder, TypeDef};

fn package_with_unset_global() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("globals");
    pkg.globals.push(GlobalDef { name: "counter".to_string(), ty: TypeDef::I64, exported: false });

    let code = Opcode::encode_sequence(&[Opcode::LoadGlobal { dst: 0, global_index: 0 }, Opcode::Return]);
    pkg.functions.push(FunctionDef::bytecode("readCounter", 1, vec![], TypeDef::I64, code));
    pkg.entry_function = Some(0);
    pkg
}

#[test]
fn reading_an_unset_global_raises_uninitialized_access() {
    let tmp = tempfile::tempdir().unwrap();
    let pkg = package_with_unset_global();
    let path = pkg.write_to(tmp.path());

    let mut vm = Vm::new(VmOptions::default(), NativeFunctionRegistry::new());
    let package = vm.load_package(&path).expect("load globals package");

    let err = vm.run_entry(&package).expect_err("reading an unset global must not succeed");
    match err {
        VmFault::Uncaught { exception, .. } => {
            assert_eq!(exception.class_name, "UninitializedAccessError");
        }
        other => panic!("expected VmFault::Uncaught, got {other:?}"),
    }
}
