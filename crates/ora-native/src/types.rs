//! Ergonomic wrappers over raw `NativeValue`s: arrays, objects (with named
//! field access via a cached [`ObjectSchema`]), classes, and functions — all
//! expressed purely in terms of [`NativeContext`].

use std::collections::HashMap;

use crate::context::{ClassInfo, NativeContext};
use crate::error::{AbiResult, NativeError};
use crate::value::NativeValue;

// ---------------------------------------------------------------------
// NativeArray
// ---------------------------------------------------------------------

/// A typed view over an Ora array value.
pub struct NativeArray<'a> {
    value: NativeValue,
    ctx: &'a dyn NativeContext,
}

impl<'a> NativeArray<'a> {
    /// Wrap `val` as an array. Fails if `val` is not a heap pointer.
    pub fn wrap(ctx: &'a dyn NativeContext, val: NativeValue) -> AbiResult<Self> {
        if !val.is_ptr() {
            return Err(NativeError::TypeMismatch {
                expected: "array".to_string(),
                got: val.type_name().to_string(),
            });
        }
        Ok(Self { value: val, ctx })
    }

    /// Number of elements.
    pub fn len(&self) -> AbiResult<usize> {
        self.ctx.array_len(self.value)
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> AbiResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> AbiResult<NativeValue> {
        self.ctx.array_get(self.value, index)
    }

    /// Write the element at `index`.
    pub fn set(&self, index: usize, value: NativeValue) -> AbiResult<()> {
        self.ctx.array_set(self.value, index, value)
    }

    /// Element at `index` as an `i64`.
    pub fn get_i64(&self, index: usize) -> AbiResult<i64> {
        self.get(index)?.as_i64().ok_or_else(|| NativeError::TypeMismatch {
            expected: "i64".to_string(),
            got: "other".to_string(),
        })
    }

    /// Element at `index` as an `f64`.
    pub fn get_f64(&self, index: usize) -> AbiResult<f64> {
        self.get(index)?.as_f64().ok_or_else(|| NativeError::TypeMismatch {
            expected: "f64".to_string(),
            got: "other".to_string(),
        })
    }

    /// Element at `index` read as a string.
    pub fn get_string(&self, index: usize) -> AbiResult<String> {
        self.ctx.read_string(self.get(index)?)
    }

    /// All elements, collected into a `Vec`.
    pub fn to_vec(&self) -> AbiResult<Vec<NativeValue>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i)?);
        }
        Ok(out)
    }

    /// The underlying raw value.
    pub fn into_value(self) -> NativeValue {
        self.value
    }
}

// ---------------------------------------------------------------------
// ObjectSchema
// ---------------------------------------------------------------------

/// Builder for an [`ObjectSchema`] constructed by hand (tests, or a module
/// that knows its companion class's layout statically).
pub struct ObjectSchemaBuilder {
    class_id: usize,
    class_name: String,
    field_lookup: HashMap<String, usize>,
    field_names: Vec<String>,
    method_lookup: HashMap<String, usize>,
}

impl ObjectSchemaBuilder {
    /// Register a field at `index`.
    pub fn field(mut self, name: &str, index: usize) -> Self {
        self.field_lookup.insert(name.to_string(), index);
        if index >= self.field_names.len() {
            self.field_names.resize(index + 1, String::new());
        }
        self.field_names[index] = name.to_string();
        self
    }

    /// Register a method at vtable slot `index`.
    pub fn method(mut self, name: &str, index: usize) -> Self {
        self.method_lookup.insert(name.to_string(), index);
        self
    }

    /// Finish building.
    pub fn build(self) -> ObjectSchema {
        ObjectSchema {
            class_id: self.class_id,
            class_name: self.class_name,
            field_lookup: self.field_lookup,
            field_names: self.field_names,
            method_lookup: self.method_lookup,
        }
    }
}

/// A cached name-to-index mapping for a class's fields and methods.
///
/// Build once per class, reuse for every instance — lookups are then
/// `HashMap` hits rather than a class-metadata round trip per field access.
pub struct ObjectSchema {
    class_id: usize,
    class_name: String,
    field_lookup: HashMap<String, usize>,
    field_names: Vec<String>,
    method_lookup: HashMap<String, usize>,
}

impl ObjectSchema {
    /// Build a schema from the VM's own class metadata.
    pub fn from_context(ctx: &dyn NativeContext, class_id: usize) -> AbiResult<Self> {
        let info = ctx.class_info(class_id)?;
        let fields = ctx.class_field_names(class_id)?;
        let methods = ctx.class_method_entries(class_id)?;

        let mut field_lookup = HashMap::with_capacity(fields.len());
        let mut field_names = vec![String::new(); info.field_count];
        for (name, index) in &fields {
            field_lookup.insert(name.clone(), *index);
            if *index < field_names.len() {
                field_names[*index] = name.clone();
            }
        }

        let mut method_lookup = HashMap::with_capacity(methods.len());
        for (name, index) in &methods {
            method_lookup.insert(name.clone(), *index);
        }

        Ok(Self {
            class_id,
            class_name: info.name,
            field_lookup,
            field_names,
            method_lookup,
        })
    }

    /// Start building a schema by hand.
    pub fn builder(class_id: usize, class_name: &str) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            class_id,
            class_name: class_name.to_string(),
            field_lookup: HashMap::new(),
            field_names: Vec::new(),
            method_lookup: HashMap::new(),
        }
    }

    /// Field index by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_lookup.get(name).copied()
    }

    /// Method vtable index by name.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.method_lookup.get(name).copied()
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.field_lookup.len()
    }

    /// The class name this schema describes.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The class id this schema describes.
    pub fn class_id(&self) -> usize {
        self.class_id
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }
}

// ---------------------------------------------------------------------
// NativeObject
// ---------------------------------------------------------------------

/// A named-field view over an object value, backed by an [`ObjectSchema`].
pub struct NativeObject<'a> {
    value: NativeValue,
    schema: &'a ObjectSchema,
    ctx: &'a dyn NativeContext,
}

impl<'a> NativeObject<'a> {
    /// Wrap `val` with `schema`. Fails if `val` is not a heap pointer.
    pub fn wrap(ctx: &'a dyn NativeContext, val: NativeValue, schema: &'a ObjectSchema) -> AbiResult<Self> {
        if !val.is_ptr() {
            return Err(NativeError::TypeMismatch {
                expected: format!("object({})", schema.class_name()),
                got: val.type_name().to_string(),
            });
        }
        Ok(Self { value: val, schema, ctx })
    }

    /// Read field `name`.
    pub fn get(&self, name: &str) -> AbiResult<NativeValue> {
        let index = self.schema.field_index(name).ok_or_else(|| {
            NativeError::NoSuchMember(format!("{}.{}", self.schema.class_name(), name))
        })?;
        self.ctx.object_get_field(self.value, index)
    }

    /// Read field `name` as an `i64`.
    pub fn get_i64(&self, name: &str) -> AbiResult<i64> {
        self.get(name)?.as_i64().ok_or_else(|| NativeError::TypeMismatch {
            expected: "i64".to_string(),
            got: "other".to_string(),
        })
    }

    /// Read field `name` as an `f64`.
    pub fn get_f64(&self, name: &str) -> AbiResult<f64> {
        self.get(name)?.as_f64().ok_or_else(|| NativeError::TypeMismatch {
            expected: "f64".to_string(),
            got: "other".to_string(),
        })
    }

    /// Read field `name` as a string.
    pub fn get_string(&self, name: &str) -> AbiResult<String> {
        self.ctx.read_string(self.get(name)?)
    }

    /// Write field `name`.
    pub fn set(&self, name: &str, value: NativeValue) -> AbiResult<()> {
        let index = self.schema.field_index(name).ok_or_else(|| {
            NativeError::NoSuchMember(format!("{}.{}", self.schema.class_name(), name))
        })?;
        self.ctx.object_set_field(self.value, index, value)
    }

    /// This object's runtime class id (may differ from the schema's class
    /// if the schema describes a supertype).
    pub fn class_id(&self) -> AbiResult<usize> {
        self.ctx.object_class_id(self.value)
    }

    /// The schema this view was built with.
    pub fn schema(&self) -> &ObjectSchema {
        self.schema
    }

    /// The underlying raw value.
    pub fn into_value(self) -> NativeValue {
        self.value
    }
}

// ---------------------------------------------------------------------
// NativeClass
// ---------------------------------------------------------------------

/// Class metadata with convenience accessors and instantiation.
#[derive(Debug, Clone)]
pub struct NativeClass {
    info: ClassInfo,
}

impl NativeClass {
    /// Look up by id.
    pub fn from_id(ctx: &dyn NativeContext, class_id: usize) -> AbiResult<Self> {
        Ok(Self { info: ctx.class_info(class_id)? })
    }

    /// Look up by name among a package's exported classes.
    pub fn from_name(ctx: &dyn NativeContext, name: &str) -> AbiResult<Self> {
        Ok(Self { info: ctx.class_by_name(name)? })
    }

    /// Class id.
    pub fn id(&self) -> usize {
        self.info.class_id
    }

    /// Class name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Instance field count.
    pub fn field_count(&self) -> usize {
        self.info.field_count
    }

    /// Superclass id, if any.
    pub fn parent_id(&self) -> Option<usize> {
        self.info.parent_id
    }

    /// Build an [`ObjectSchema`] for this class.
    pub fn schema(&self, ctx: &dyn NativeContext) -> AbiResult<ObjectSchema> {
        ObjectSchema::from_context(ctx, self.info.class_id)
    }

    /// Allocate a new, zero-initialized instance.
    pub fn instantiate(&self, ctx: &dyn NativeContext) -> AbiResult<NativeValue> {
        ctx.create_object_by_id(self.info.class_id)
    }
}

// ---------------------------------------------------------------------
// NativeFunction / NativeMethod
// ---------------------------------------------------------------------

/// A callable function value, called back into synchronously.
pub struct NativeFunction<'a> {
    func_id: usize,
    ctx: &'a dyn NativeContext,
}

impl<'a> NativeFunction<'a> {
    /// Wrap a function id.
    pub fn new(ctx: &'a dyn NativeContext, func_id: usize) -> Self {
        Self { func_id, ctx }
    }

    /// The underlying function id.
    pub fn func_id(&self) -> usize {
        self.func_id
    }

    /// Call the function, re-entering the interpreter synchronously.
    pub fn call(&self, args: &[NativeValue]) -> AbiResult<NativeValue> {
        self.ctx.call_function(self.func_id, args)
    }
}

/// A method resolved from a class's vtable.
#[derive(Debug, Clone)]
pub struct NativeMethod {
    /// Declaring class id.
    pub class_id: usize,
    /// Method name.
    pub method_name: String,
    /// Vtable slot index.
    pub vtable_index: usize,
}

impl NativeMethod {
    /// Resolve `method_name` on `class_id`.
    pub fn resolve(ctx: &dyn NativeContext, class_id: usize, method_name: &str) -> AbiResult<Self> {
        let methods = ctx.class_method_entries(class_id)?;
        let (_, vtable_index) = methods
            .iter()
            .find(|(name, _)| name == method_name)
            .ok_or_else(|| NativeError::NoSuchMember(format!("{}#{}", class_id, method_name)))?;
        Ok(Self {
            class_id,
            method_name: method_name.to_string(),
            vtable_index: *vtable_index,
        })
    }

    /// Call this method on `receiver`.
    pub fn call(&self, ctx: &dyn NativeContext, receiver: NativeValue, args: &[NativeValue]) -> AbiResult<NativeValue> {
        ctx.call_method(receiver, self.class_id, &self.method_name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_schema_builder() {
        let schema = ObjectSchema::builder(0, "Point").field("x", 0).field("y", 1).method("toString", 0).build();

        assert_eq!(schema.class_id(), 0);
        assert_eq!(schema.class_name(), "Point");
        assert_eq!(schema.field_count(), 2);
        assert_eq!(schema.field_index("x"), Some(0));
        assert_eq!(schema.field_index("y"), Some(1));
        assert_eq!(schema.field_index("z"), None);
        assert_eq!(schema.method_index("toString"), Some(0));
    }

    #[test]
    fn object_schema_field_names() {
        let schema = ObjectSchema::builder(1, "Vec2").field("x", 0).field("y", 1).build();
        assert_eq!(schema.field_names(), &["x", "y"]);
    }

    #[test]
    fn native_class_accessors() {
        let class = NativeClass {
            info: ClassInfo {
                class_id: 5,
                field_count: 3,
                name: "MyClass".to_string(),
                parent_id: Some(1),
                method_count: 2,
            },
        };
        assert_eq!(class.id(), 5);
        assert_eq!(class.name(), "MyClass");
        assert_eq!(class.field_count(), 3);
        assert_eq!(class.parent_id(), Some(1));
    }
}
