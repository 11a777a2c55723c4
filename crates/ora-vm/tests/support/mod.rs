//! Hand-rolled `.orapkg` fixture builder for the integration suites.
//!
//! Nothing in `ora-vm` builds a full package binary outside this file: the
//! loader only ever reads one (`package::loader::parse_and_link`), and the
//! format's own unit tests round-trip individual fields, not a whole
//! package. So an integration test that wants to drive `Vm::load_package`
//! has to encode the wire format itself, the same way a real compiler
//! backend would — this module is that backend, reduced to exactly the
//! fields each test needs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ora_vm::package::format::{Writer, FORMAT_VERSION};

/// A field/parameter/return type, as written to the wire format.
#[derive(Clone)]
pub enum TypeDef {
    I32,
    I64,
    F64,
    Bool,
    Object,
    Class { class_idx: usize, args: Vec<TypeDef> },
}

fn write_type(w: &mut Writer, ty: &TypeDef) {
    match ty {
        TypeDef::I32 => w.write_u8(0),
        TypeDef::I64 => w.write_u8(1),
        TypeDef::F64 => w.write_u8(2),
        TypeDef::Bool => w.write_u8(3),
        TypeDef::Object => w.write_u8(4),
        TypeDef::Class { class_idx, args } => {
            w.write_u8(5);
            w.write_varint(*class_idx as u64);
            w.write_varint(args.len() as u64);
            for a in args {
                write_type(w, a);
            }
        }
    }
}

/// A parent class reference: either another class in the same package
/// (`dep_pkg_idx` unused) or a class exported by a dependency.
pub enum ParentRef {
    Local(usize),
    Dependency { dep_pkg_idx: usize, class_name: String },
}

pub struct ClassDef {
    pub name: String,
    pub type_param_count: usize,
    pub exported: bool,
    pub parent: Option<ParentRef>,
    pub fields: Vec<(String, TypeDef)>,
    /// `(method name, function index)` — the vtable, in slot order.
    pub methods: Vec<(String, usize)>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), type_param_count: 0, exported: true, parent: None, fields: Vec::new(), methods: Vec::new() }
    }
}

pub struct FunctionDef {
    pub name: String,
    pub exported: bool,
    pub native_name: Option<String>,
    pub register_count: u32,
    pub params: Vec<TypeDef>,
    pub return_ty: TypeDef,
    pub code: Vec<u8>,
}

impl FunctionDef {
    pub fn bytecode(name: &str, register_count: u32, params: Vec<TypeDef>, return_ty: TypeDef, code: Vec<u8>) -> Self {
        Self { name: name.to_string(), exported: true, native_name: None, register_count, params, return_ty, code }
    }

    pub fn native(name: &str, native_name: &str, params: Vec<TypeDef>, return_ty: TypeDef) -> Self {
        Self {
            name: name.to_string(),
            exported: true,
            native_name: Some(native_name.to_string()),
            register_count: params.len() as u32,
            params,
            return_ty,
            code: Vec::new(),
        }
    }
}

pub struct GlobalDef {
    pub name: String,
    pub ty: TypeDef,
    pub exported: bool,
}

pub struct DependencyDef {
    pub name: String,
    pub min: (u32, u32, u32),
    pub max: (u32, u32, u32),
}

/// Interns name strings in the order first seen, so the same identifier
/// written twice (e.g. a field name reused as a method name) shares one
/// string-pool slot — not required by the format, just what a real
/// compiler's backend would do.
#[derive(Default)]
struct Interner {
    order: Vec<String>,
    index: std::collections::HashMap<String, u64>,
}

impl Interner {
    fn intern(&mut self, s: &str) -> u64 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.order.len() as u64;
        self.order.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }
}

#[derive(Default)]
pub struct PackageBuilder {
    pub name: String,
    pub version: (u32, u32, u32),
    pub dependencies: Vec<DependencyDef>,
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
    pub globals: Vec<GlobalDef>,
    pub entry_function: Option<usize>,
}

impl PackageBuilder {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), version: (0, 1, 0), ..Default::default() }
    }

    /// Encode this package to its binary wire format.
    pub fn build(&self) -> Vec<u8> {
        let mut names = Interner::default();
        for class in &self.classes {
            names.intern(&class.name);
            for (fname, _) in &class.fields {
                names.intern(fname);
            }
            for (mname, _) in &class.methods {
                names.intern(mname);
            }
            if let Some(ParentRef::Dependency { class_name, .. }) = &class.parent {
                names.intern(class_name);
            }
        }
        for function in &self.functions {
            names.intern(&function.name);
        }
        for global in &self.globals {
            names.intern(&global.name);
        }

        let mut w = Writer::new();
        w.write_magic();
        w.write_varint(FORMAT_VERSION as u64);
        w.write_string(&self.name);
        w.write_varint(self.version.0 as u64);
        w.write_varint(self.version.1 as u64);
        w.write_varint(self.version.2 as u64);

        w.write_varint(self.dependencies.len() as u64);
        for dep in &self.dependencies {
            w.write_string(&dep.name);
            w.write_varint(dep.min.0 as u64);
            w.write_varint(dep.min.1 as u64);
            w.write_varint(dep.min.2 as u64);
            w.write_varint(dep.max.0 as u64);
            w.write_varint(dep.max.1 as u64);
            w.write_varint(dep.max.2 as u64);
        }

        // String pool and name pool are the same list here: each name-pool
        // entry points at the string-pool slot of the same index.
        w.write_varint(names.order.len() as u64);
        for s in &names.order {
            w.write_string(s);
        }
        w.write_varint(names.order.len() as u64);
        for i in 0..names.order.len() as u64 {
            w.write_varint(i);
        }

        // Phase one: class shells.
        w.write_varint(self.classes.len() as u64);
        for class in &self.classes {
            w.write_varint(names.intern(&class.name));
            w.write_varint(class.type_param_count as u64);
            w.write_u8(class.exported as u8);
        }

        // Phase two: parent link, fields, vtable.
        for class in &self.classes {
            match &class.parent {
                None => w.write_u8(0),
                Some(ParentRef::Local(idx)) => {
                    w.write_u8(1);
                    w.write_u8(1);
                    w.write_varint(*idx as u64);
                }
                Some(ParentRef::Dependency { dep_pkg_idx, class_name }) => {
                    w.write_u8(1);
                    w.write_u8(0);
                    w.write_varint(*dep_pkg_idx as u64);
                    w.write_varint(names.intern(class_name));
                }
            }

            w.write_varint(class.fields.len() as u64);
            for (fname, ty) in &class.fields {
                w.write_varint(names.intern(fname));
                write_type(&mut w, ty);
            }

            w.write_varint(class.methods.len() as u64);
            for (mname, function_index) in &class.methods {
                w.write_varint(names.intern(mname));
                w.write_varint(*function_index as u64);
            }
        }

        // Functions.
        w.write_varint(self.functions.len() as u64);
        for function in &self.functions {
            w.write_varint(names.intern(&function.name));
            w.write_u8(function.exported as u8);
            let is_native = function.native_name.is_some();
            w.write_u8(is_native as u8);
            if let Some(native_name) = &function.native_name {
                w.write_string(native_name);
            }
            w.write_varint(function.register_count as u64);
            w.write_varint(function.params.len() as u64);
            for p in &function.params {
                write_type(&mut w, p);
            }
            write_type(&mut w, &function.return_ty);
            w.write_varint(function.code.len() as u64);
            if !is_native {
                w.write_bytes(&function.code);
            }
        }

        // Globals.
        w.write_varint(self.globals.len() as u64);
        for global in &self.globals {
            w.write_varint(names.intern(&global.name));
            write_type(&mut w, &global.ty);
            w.write_u8(global.exported as u8);
        }

        w.write_varint(self.entry_function.map(|i| i as u64 + 1).unwrap_or(0));

        w.into_bytes()
    }

    /// Write this package to `dir/{name}.orapkg`, the filename convention
    /// the loader's search-path resolution expects.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.orapkg", self.name));
        std::fs::write(&path, self.build()).expect("write package fixture");
        path
    }
}
