//! Packages: the unit of compilation the loader reads, links and the
//! interpreter runs functions from.

pub mod format;
pub mod loader;

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::name::Name;
use crate::types::{Class, ClassTable, Global, Type};

/// A semantic version, compared field by field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An inclusive `[min, max]` version range a dependency declares it's
/// compatible with.
///
/// Chosen over caret/tilde ranges or a SemVer predicate language because
/// the package format has no expression grammar to parse for version
/// constraints — two fixed bounds read as two fixed-width triples keep the
/// loader free of a second mini-parser.
#[derive(Clone, Copy, Debug)]
pub struct VersionRange {
    pub min: Version,
    pub max: Version,
}

impl VersionRange {
    /// Whether `v` falls within `[min, max]` inclusive.
    pub fn contains(&self, v: Version) -> bool {
        v >= self.min && v <= self.max
    }
}

/// One entry in a package's dependency table.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub name: Name,
    pub range: VersionRange,
}

/// A compiled function.
pub struct Function {
    pub name: Name,
    pub param_types: Vec<Type>,
    pub return_type: Type,
    /// Bytecode body, empty for a function resolved to a native handler.
    pub code: Vec<u8>,
    /// Symbolic name a `NATIVECALL`-flagged function dispatches to; `None`
    /// for ordinary bytecode functions.
    pub native_name: Option<String>,
    /// Maximum register-file depth this function's body requires, computed
    /// by the compiler that produced the package (not recomputed here).
    pub register_count: u32,
    /// Whether this function's *source* name resolves outside its
    /// declaring package; a `defn`-name lookup sees it regardless.
    pub exported: bool,
    /// Per-PC stack pointer maps, built by [`crate::pointermap`] the first
    /// time this function is linked rather than shipped in the binary.
    pub pointer_maps: RwLock<Option<Arc<crate::pointermap::StackPointerMap>>>,
}

impl Function {
    /// Whether this function dispatches to a native handler rather than
    /// running its own bytecode.
    pub fn is_native(&self) -> bool {
        self.native_name.is_some()
    }

    /// This function's [`crate::pointermap::StackPointerMap`], built by
    /// abstract interpretation the first time it's needed and cached for
    /// every subsequent call — the GC-safe-point register protection in
    /// [`crate::interpreter`] consults this before any allocation or nested
    /// call that could trigger a collection.
    pub fn pointer_map(&self) -> Arc<crate::pointermap::StackPointerMap> {
        if let Some(existing) = self.pointer_maps.read().unwrap().as_ref() {
            return existing.clone();
        }
        let built = Arc::new(crate::pointermap::build(self));
        *self.pointer_maps.write().unwrap() = Some(built.clone());
        built
    }
}

/// A package's exported or internal global variable declaration, paired
/// with its runtime storage slot.
pub struct GlobalSlot {
    pub global: Global,
    pub exported: bool,
}

/// A fully loaded and linked package.
pub struct Package {
    pub name: Name,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    pub classes: ClassTable,
    pub functions: Vec<Arc<Function>>,
    pub globals: Vec<Arc<GlobalSlot>>,
    pub entry_function: Option<usize>,
    functions_by_name: FxHashMap<Name, usize>,
    globals_by_name: FxHashMap<Name, usize>,
}

impl Package {
    pub(crate) fn new(
        name: Name,
        version: Version,
        dependencies: Vec<Dependency>,
        classes: ClassTable,
        functions: Vec<Arc<Function>>,
        globals: Vec<Arc<GlobalSlot>>,
        entry_function: Option<usize>,
    ) -> Self {
        let functions_by_name = functions.iter().enumerate().map(|(i, f)| (f.name.clone(), i)).collect();
        let globals_by_name = globals.iter().enumerate().map(|(i, g)| (g.global.name.clone(), i)).collect();
        Self { name, version, dependencies, classes, functions, globals, entry_function, functions_by_name, globals_by_name }
    }

    /// Look up a function by its *defn* name: every symbol in the package,
    /// public or private. The ordinary lookup used by intra-package
    /// dispatch, which already knows the exact symbol it wants.
    pub fn find_function(&self, name: &Name) -> Option<&Arc<Function>> {
        self.functions_by_name.get(name).map(|&i| &self.functions[i])
    }

    /// Look up a function by its *source* name: only symbols this package
    /// exports. What a dependent package's `import` resolves against.
    pub fn find_function_by_source_name(&self, name: &Name) -> Option<&Arc<Function>> {
        self.find_function(name).filter(|f| f.exported)
    }

    /// Alias of [`find_function`](Self::find_function), named to match its
    /// `by_source_name` counterpart.
    pub fn find_function_by_defn_name(&self, name: &Name) -> Option<&Arc<Function>> {
        self.find_function(name)
    }

    /// Look up a global by its *defn* name (every symbol, public or
    /// private).
    pub fn find_global(&self, name: &Name) -> Option<&Arc<GlobalSlot>> {
        self.globals_by_name.get(name).map(|&i| &self.globals[i])
    }

    /// Look up a global by its *source* name: only globals this package
    /// exports.
    pub fn find_global_by_source_name(&self, name: &Name) -> Option<&Arc<GlobalSlot>> {
        self.find_global(name).filter(|g| g.exported)
    }

    /// Alias of [`find_global`](Self::find_global).
    pub fn find_global_by_defn_name(&self, name: &Name) -> Option<&Arc<GlobalSlot>> {
        self.find_global(name)
    }

    /// Look up a class by its *defn* name (every symbol, public or
    /// private).
    pub fn find_class(&self, name: &Name) -> Option<&Arc<Class>> {
        self.classes.by_name(name)
    }

    /// Look up a class by its *source* name: only classes this package
    /// exports. What a dependent package's `extends`/`implements` clause
    /// resolves a cross-package reference against (see
    /// [`crate::package::loader`]).
    pub fn find_class_by_source_name(&self, name: &Name) -> Option<&Arc<Class>> {
        self.find_class(name).filter(|c| c.exported)
    }

    /// Alias of [`find_class`](Self::find_class).
    pub fn find_class_by_defn_name(&self, name: &Name) -> Option<&Arc<Class>> {
        self.find_class(name)
    }

    /// Field lookup convenience: class name plus field name.
    pub fn find_field(&self, class_name: &Name, field_name: &Name) -> Option<crate::types::Field> {
        self.find_class(class_name)?.field(field_name)
    }
}
