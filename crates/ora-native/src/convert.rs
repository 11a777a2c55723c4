//! Traits mapping between Ora objects and Rust structs.
//!
//! Manual implementation for now; a derive macro could generate these from
//! a struct definition later, but that's outside this crate's scope.
//!
//! ```ignore
//! use ora_native::{FromNativeObject, ToNativeObject, NativeObject, NativeClass, NativeValue, NativeContext, AbiResult};
//!
//! struct Point { x: f64, y: f64 }
//!
//! impl FromNativeObject for Point {
//!     fn from_native_object(obj: &NativeObject) -> AbiResult<Self> {
//!         Ok(Point { x: obj.get_f64("x")?, y: obj.get_f64("y")? })
//!     }
//! }
//!
//! impl ToNativeObject for Point {
//!     fn class_name() -> &'static str { "Point" }
//!     fn to_native_object(&self, ctx: &dyn NativeContext) -> AbiResult<NativeValue> {
//!         let class = NativeClass::from_name(ctx, "Point")?;
//!         let schema = class.schema(ctx)?;
//!         let val = class.instantiate(ctx)?;
//!         let obj = NativeObject::wrap(ctx, val, &schema)?;
//!         obj.set("x", NativeValue::f64(self.x))?;
//!         obj.set("y", NativeValue::f64(self.y))?;
//!         Ok(obj.into_value())
//!     }
//! }
//! ```

use crate::context::NativeContext;
use crate::error::AbiResult;
use crate::types::NativeObject;
use crate::value::NativeValue;

/// Convert an Ora object into a Rust struct.
pub trait FromNativeObject: Sized {
    /// Read from a schema-backed object view.
    fn from_native_object(obj: &NativeObject) -> AbiResult<Self>;
}

/// Convert a Rust struct into an Ora object.
pub trait ToNativeObject {
    /// The Ora class name this type maps to.
    fn class_name() -> &'static str;

    /// Allocate the companion object and populate its fields.
    fn to_native_object(&self, ctx: &dyn NativeContext) -> AbiResult<NativeValue>;
}
