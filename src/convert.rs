//! Conversion between Rust types and [`Value`]s through serde.
//!
//! Any `Serialize` type can be turned into a [`Value`] tree with
//! [`to_value`], which is then encoded like any other value, and any
//! `Deserialize` type can be read back out of a decoded tree with
//! [`from_value`].
//!
//! Tuples and tuple structs become D-Bus structs. How structs with named
//! fields are represented is up to the [`ConversionPolicy`]: by default
//! they become `a{sv}` dicts keyed by field name, the customary D-Bus way of
//! sending records, while [`StronglyTypedConversionPolicy`] makes them
//! structs as well.
//!
//! D-Bus has no unit or null value. `None` and `()` are only accepted as
//! the value of a dict-style struct field or map entry, where the entry is
//! simply left out.
//!
//! Object paths and signatures are recognized by serializing as a newtype
//! struct named [`OBJECT_PATH_MARKER`] or [`SIGNATURE_MARKER`], which is how
//! [`ObjectPath`] and [`Signature`] serialize.
//!
//! [`Value`]: crate::value::Value
//! [`ObjectPath`]: crate::value::ObjectPath
//! [`Signature`]: crate::signature::Signature

mod de;
mod policy;
mod ser;

pub use de::{from_value, ValueDeserializer};
pub use policy::{
    ConversionPolicy, DefaultConversionPolicy, LooseIntegerPolicy, StronglyTypedConversionPolicy,
    StructConversionStyle,
};
pub use ser::{to_value, to_value_with_policy, OBJECT_PATH_MARKER, SIGNATURE_MARKER};
