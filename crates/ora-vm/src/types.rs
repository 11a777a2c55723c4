//! The type system: the `Type` tree a package's tables reference, and the
//! `Class`/`Field` shapes that drive object layout and the pointer-map
//! builder.
//!
//! Classes are built in two phases because a package's class table can
//! contain mutually- or self-referential types (a field of type `List<T>`
//! pointing back at a class still being constructed): first every class in
//! a package gets an empty *shell* (name, arity, parent slot reserved), then
//! a second pass fills in each shell's fields and parent link once every
//! shell in the dependency's transitive closure exists to refer to.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::name::Name;

/// A type as it appears in a field, parameter, or return-type slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// Unboxed 32-bit integer.
    I32,
    /// Unboxed 64-bit integer.
    I64,
    /// Unboxed double.
    F64,
    /// Unboxed boolean.
    Bool,
    /// A generic, possibly-null reference: stored as a [`crate::tagged::Tagged`].
    Object,
    /// A concrete class, possibly instantiated with type arguments.
    Class { class: Arc<Class>, args: Vec<Type> },
    /// An unresolved reference to one of the class's own type parameters,
    /// by index — replaced by [`substitute`] when a concrete instantiation
    /// is known.
    TypeParam(usize),
}

impl Type {
    /// Whether a slot of this type is a `Tagged` the GC must scan, as
    /// opposed to an unboxed scalar.
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Object | Type::Class { .. } | Type::TypeParam(_))
    }

    /// Size in bytes a slot of this type occupies.
    pub fn slot_size(&self) -> usize {
        match self {
            Type::I32 | Type::Bool => 4,
            Type::I64 | Type::F64 => 8,
            Type::Object | Type::Class { .. } | Type::TypeParam(_) => {
                std::mem::size_of::<crate::tagged::Tagged>()
            }
        }
    }

    /// Spec-named alias of [`slot_size`](Type::slot_size).
    pub fn type_size(&self) -> usize {
        self.slot_size()
    }

    /// Spec-named alias of [`is_pointer`](Type::is_pointer).
    pub fn is_object(&self) -> bool {
        self.is_pointer()
    }

    /// Whether `self` can be used wherever `other` is expected: primitives
    /// match exactly, any reference type widens to `Object`, and a `Class`
    /// type is a subtype of another `Class` type of the same (invariant)
    /// type arguments when its class is a subclass.
    ///
    /// Type parameters are invariant (see [`substitute_for_inheritance`]):
    /// `List<Derived>` is not a subtype of `List<Base>` even if `Derived` is
    /// a subtype of `Base`, since nothing here tracks use-site variance.
    pub fn is_subtype(&self, other: &Type) -> bool {
        match (self, other) {
            (_, Type::Object) if self.is_pointer() => true,
            (Type::Class { class: sub, args: sub_args }, Type::Class { class: sup, args: sup_args }) => {
                sub_args == sup_args && sub.is_subclass_of(sup)
            }
            _ => self == other,
        }
    }

    /// The type-parameter-index → argument map a `Class { args, .. }`
    /// instantiation binds, empty for every other variant.
    pub fn type_argument_bindings(&self) -> FxHashMap<usize, Type> {
        match self {
            Type::Class { args, .. } => args.iter().cloned().enumerate().collect(),
            _ => FxHashMap::default(),
        }
    }
}

/// Replace every `TypeParam(i)` in `ty` with `args[i]`.
///
/// Used both when a generic class is instantiated with concrete arguments
/// and — per `substitute_for_inheritance` below — when a subclass fixes its
/// parent's type parameters to some expression over its own.
pub fn substitute(ty: &Type, args: &[Type]) -> Type {
    match ty {
        Type::TypeParam(i) => args.get(*i).cloned().unwrap_or(Type::Object),
        Type::Class { class, args: inner } => {
            Type::Class { class: class.clone(), args: inner.iter().map(|t| substitute(t, args)).collect() }
        }
        other => other.clone(),
    }
}

/// Substitute a parent class's type parameters with the expressions a
/// subclass's `extends Parent<...>` clause supplies, expressed in terms of
/// the *subclass's* own type parameters.
///
/// E.g. `class IntList extends List<i32>` substitutes `List`'s single
/// parameter with the concrete `Type::I32`; `class Pair<A,B> extends
/// Box<A>` substitutes `Box`'s parameter with `TypeParam(0)` (the
/// subclass's own first parameter), not a ground type.
///
/// Type parameters are treated as invariant: no `Type` variant encodes a
/// use-site variance annotation, so field layout and the pointer map never
/// need to reason about covariant/contravariant substitution — a
/// substituted field is simply re-typed, not re-checked against its
/// original bound.
pub fn substitute_for_inheritance(parent_field_ty: &Type, parent_args_in_subclass_terms: &[Type]) -> Type {
    substitute(parent_field_ty, parent_args_in_subclass_terms)
}

/// One declared field of a class.
#[derive(Clone, Debug)]
pub struct Field {
    /// Field name.
    pub name: Name,
    /// Declared type, possibly mentioning the owning class's type
    /// parameters via [`Type::TypeParam`].
    pub ty: Type,
    /// Byte offset within the instance's fixed region, assigned once the
    /// class's layout is computed.
    pub offset: usize,
}

/// A method slot: resolved by index into the class's vtable.
#[derive(Clone, Debug)]
pub struct MethodSlot {
    /// Method name.
    pub name: Name,
    /// Index into the runtime function table this slot currently resolves
    /// to (overridden by subclasses that provide their own body).
    pub function_index: usize,
}

enum ClassBody {
    /// Phase one: shell exists, fields and parent link not yet known.
    Shell,
    /// Phase two: layout complete.
    Complete { parent: Option<Arc<Class>>, fields: Vec<Field>, vtable: Vec<MethodSlot>, instance_size: usize },
}

/// A class: the package-level declaration driving instance layout, method
/// dispatch and the GC's pointer map.
pub struct Class {
    /// Fully-qualified name.
    pub name: Name,
    /// Number of type parameters this class declares.
    pub type_param_count: usize,
    /// Whether this class's *source* name resolves outside its declaring
    /// package; a `defn`-name lookup sees it regardless (see
    /// [`crate::package::Package::find_class_by_source_name`]).
    pub exported: bool,
    body: RwLock<ClassBody>,
    /// Shape metadata for instances of this class, built lazily on first
    /// allocation and shared by every instance thereafter (see
    /// [`crate::object::Meta`]'s doc comment on why this is a pointer
    /// rather than an inline copy).
    meta_cache: RwLock<Option<Arc<crate::object::Meta>>>,
}

impl Class {
    /// Phase one: construct an empty shell. `fill` must be called once
    /// every class this one (transitively) depends on also has a shell, to
    /// complete the layout.
    pub fn shell(name: Name, type_param_count: usize, exported: bool) -> Arc<Self> {
        Arc::new(Self { name, type_param_count, exported, body: RwLock::new(ClassBody::Shell), meta_cache: RwLock::new(None) })
    }

    /// The shared [`crate::object::Meta`] describing instances of this
    /// class, built from its field layout the first time it's needed.
    ///
    /// A free function taking `&Arc<Class>` rather than a `&self` method:
    /// stable Rust only allows `Arc<Self>` itself (by value) as a special
    /// method receiver, and cloning the `Arc` on every call just to get one
    /// back would defeat the point of caching.
    pub fn instance_meta(this: &Arc<Class>) -> Arc<crate::object::Meta> {
        if let Some(meta) = this.meta_cache.read().unwrap().as_ref() {
            return meta.clone();
        }
        let word = std::mem::size_of::<crate::tagged::Tagged>();
        let fields = this.fields();
        let pointer_offsets = fields.iter().filter(|f| f.ty.is_pointer()).map(|f| f.offset / word).collect();
        let meta = Arc::new(crate::object::Meta {
            instance_size: this.instance_size(),
            element_size: 0,
            pointer_offsets,
            elements_are_pointers: false,
            defining_class: Some(this.clone()),
        });
        *this.meta_cache.write().unwrap() = Some(meta.clone());
        meta
    }

    /// Phase two: fill in parent link and fields, computing offsets and the
    /// instance's total fixed size.
    ///
    /// Fields are laid out in declaration order, inherited fields first (so
    /// a subclass's payload is a valid prefix-compatible extension of its
    /// parent's — a downcast never needs to move data).
    pub fn fill(&self, parent: Option<Arc<Class>>, own_fields: Vec<(Name, Type)>, vtable: Vec<MethodSlot>) {
        let mut fields = Vec::new();
        let mut offset = if let Some(p) = &parent {
            match &*p.body.read().unwrap() {
                ClassBody::Complete { fields: parent_fields, instance_size, .. } => {
                    fields.extend(parent_fields.iter().cloned());
                    *instance_size
                }
                ClassBody::Shell => panic!("parent class filled after child: build shells before filling any class"),
            }
        } else {
            0
        };
        for (name, ty) in own_fields {
            let size = ty.slot_size();
            offset = align_up(offset, size);
            fields.push(Field { name, ty, offset });
            offset += size;
        }
        *self.body.write().unwrap() = ClassBody::Complete { parent, fields, vtable, instance_size: offset };
    }

    /// Whether phase two has run.
    pub fn is_complete(&self) -> bool {
        matches!(&*self.body.read().unwrap(), ClassBody::Complete { .. })
    }

    /// All fields, inherited and own, in layout order.
    pub fn fields(&self) -> Vec<Field> {
        match &*self.body.read().unwrap() {
            ClassBody::Complete { fields, .. } => fields.clone(),
            ClassBody::Shell => Vec::new(),
        }
    }

    /// Total size in bytes of the instance's fixed region.
    pub fn instance_size(&self) -> usize {
        match &*self.body.read().unwrap() {
            ClassBody::Complete { instance_size, .. } => *instance_size,
            ClassBody::Shell => 0,
        }
    }

    /// The immediate superclass, if any.
    pub fn parent(&self) -> Option<Arc<Class>> {
        match &*self.body.read().unwrap() {
            ClassBody::Complete { parent, .. } => parent.clone(),
            ClassBody::Shell => None,
        }
    }

    /// Whether `self` is `other` or a transitive subclass of it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        if self.name == other.name {
            return true;
        }
        match self.parent() {
            Some(p) => p.is_subclass_of(other),
            None => false,
        }
    }

    /// Resolve a field by name, searching inherited fields too.
    pub fn field(&self, name: &Name) -> Option<Field> {
        self.fields().into_iter().find(|f| &f.name == name)
    }

    /// Method slot by name.
    pub fn method(&self, name: &Name) -> Option<MethodSlot> {
        match &*self.body.read().unwrap() {
            ClassBody::Complete { vtable, .. } => vtable.iter().find(|m| &m.name == name).cloned(),
            ClassBody::Shell => None,
        }
    }

    /// Method slot by vtable index, for `CALLV`-style dynamic dispatch where
    /// the call site has already resolved a slot number (stable across
    /// overrides) rather than a name.
    pub fn method_at(&self, index: usize) -> Option<MethodSlot> {
        match &*self.body.read().unwrap() {
            ClassBody::Complete { vtable, .. } => vtable.get(index).cloned(),
            ClassBody::Shell => None,
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// A mutable global variable slot, as declared by a package.
pub struct Global {
    /// Global name.
    pub name: Name,
    /// Declared type.
    pub ty: Type,
    /// Current value, `None` until the initializer has run (reading it in
    /// that state raises `UninitializedAccessError`, per
    /// [`crate::error::VmException::uninitialized_access`]).
    pub value: RwLock<Option<crate::tagged::Tagged>>,
}

impl Global {
    /// A fresh, uninitialized global.
    pub fn new(name: Name, ty: Type) -> Self {
        Self { name, ty, value: RwLock::new(None) }
    }
}

/// Package-scoped table of classes, built in the two-phase shell/fill
/// sequence described on [`Class`].
#[derive(Default)]
pub struct ClassTable {
    by_name: FxHashMap<Name, Arc<Class>>,
    by_index: Vec<Arc<Class>>,
}

impl ClassTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shell, returning its table index.
    pub fn insert_shell(&mut self, class: Arc<Class>) -> usize {
        let idx = self.by_index.len();
        self.by_name.insert(class.name.clone(), class.clone());
        self.by_index.push(class);
        idx
    }

    /// Look up by index.
    pub fn get(&self, index: usize) -> Option<&Arc<Class>> {
        self.by_index.get(index)
    }

    /// Look up by name.
    pub fn by_name(&self, name: &Name) -> Option<&Arc<Class>> {
        self.by_name.get(name)
    }

    /// Number of classes in the table.
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Whether every shell in the table has completed phase two.
    pub fn all_complete(&self) -> bool {
        self.by_index.iter().all(|c| c.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_phase_layout_prefixes_parent() {
        let base = Class::shell(Name::parse("Base"), 0, true);
        base.fill(None, vec![(Name::parse("a"), Type::I64)], vec![]);

        let derived = Class::shell(Name::parse("Derived"), 0, true);
        derived.fill(Some(base.clone()), vec![(Name::parse("b"), Type::F64)], vec![]);

        let fields = derived.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, Name::parse("a"));
        assert_eq!(fields[0].offset, 0);
        assert_eq!(fields[1].name, Name::parse("b"));
        assert!(derived.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&derived));
    }

    #[test]
    fn substitution_replaces_type_params() {
        let generic_field_ty = Type::TypeParam(0);
        let concrete = substitute(&generic_field_ty, &[Type::I32]);
        assert_eq!(concrete, Type::I32);
    }

    #[test]
    fn pointer_classification() {
        assert!(!Type::I32.is_pointer());
        assert!(!Type::F64.is_pointer());
        assert!(Type::Object.is_pointer());
        assert!(Type::TypeParam(0).is_pointer());
        assert_eq!(Type::I32.is_object(), Type::I32.is_pointer());
        assert_eq!(Type::Object.type_size(), Type::Object.slot_size());
    }

    #[test]
    fn subtype_widens_to_object_but_not_across_instantiations() {
        let base = Class::shell(Name::parse("Base"), 0, true);
        base.fill(None, vec![], vec![]);
        let derived = Class::shell(Name::parse("Derived"), 0, true);
        derived.fill(Some(base.clone()), vec![], vec![]);

        let base_ty = Type::Class { class: base.clone(), args: vec![] };
        let derived_ty = Type::Class { class: derived, args: vec![] };
        assert!(derived_ty.is_subtype(&base_ty));
        assert!(!base_ty.is_subtype(&derived_ty));
        assert!(derived_ty.is_subtype(&Type::Object));

        let list_i32 = Type::Class { class: base.clone(), args: vec![Type::I32] };
        let list_i64 = Type::Class { class: base, args: vec![Type::I64] };
        assert!(!list_i32.is_subtype(&list_i64), "type parameters are invariant");
    }

    #[test]
    fn type_argument_bindings_index_class_args() {
        let generic = Class::shell(Name::parse("Pair"), 2, true);
        generic.fill(None, vec![], vec![]);
        let ty = Type::Class { class: generic, args: vec![Type::I32, Type::Bool] };
        let bindings = ty.type_argument_bindings();
        assert_eq!(bindings.get(&0), Some(&Type::I32));
        assert_eq!(bindings.get(&1), Some(&Type::Bool));
        assert!(Type::I32.type_argument_bindings().is_empty());
    }
}
