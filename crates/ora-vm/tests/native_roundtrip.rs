//! End-to-end: a `NATIVECALL`-flagged function with a plain (no `"::"`)
//! native name dispatches through the embedder-supplied
//! `NativeFunctionRegistry`, round-tripping an argument through
//! `NativeValue` and back into a VM register.

mod support;

use ora_native::{NativeCallResult, NativeFunctionRegistry};
use ora_vm::interpreter::opcode::Opcode;
use ora_vm::{Vm, VmOptions};
use support::{FunctionDef, PackageBuilder, TypeDef};

fn native_package() -> PackageBuilder {
    let mut pkg = PackageBuilder::new("nativeroundtrip");

    // Function 0: the native-flagged function itself, resolved at call time
    // through the registry by its symbolic name.
    pkg.functions.push(FunctionDef::native("double", "math.double", vec![TypeDef::I64], TypeDef::I64));

    // Function 1: entry point. r0 = 21, NATIVECALL double(r0).
    let code = Opcode::encode_sequence(&[
        Opcode::LoadI64 { dst: 0, value: 21 },
        Opcode::NativeCall { dst: 0, native_name_index: 0, first_arg: 0, arg_count: 1 },
        Opcode::Return,
    ]);
    pkg.functions.push(FunctionDef::bytecode("main", 1, vec![], TypeDef::I64, code));
    pkg.entry_function = Some(1);
    pkg
}

#[test]
fn native_call_round_trips_through_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let pkg = native_package();
    let path = pkg.write_to(tmp.path());

    let mut registry = NativeFunctionRegistry::new();
    registry.register("math.double", |_ctx, args| {
        let n = args[0].as_i64().unwrap_or(0);
        NativeCallResult::i64(n * 2)
    });

    let mut vm = Vm::new(VmOptions::default(), registry);
    let package = vm.load_package(&path).expect("load nativeroundtrip package");

    let result = vm.run_entry(&package).expect("double(21) should not fault");
    assert_eq!(result as i64, 42);
}
