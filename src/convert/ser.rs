use super::policy::{ConversionPolicy, DefaultConversionPolicy, StructConversionStyle};
use crate::error::{Error, Result};
use crate::guess::guess_value_signature;
use crate::signature::{Signature, TypeCode};
use crate::value::{
    Array, ByteArray, Dict, Double, Int16, ObjectPath, SignatureValue, Str, Struct, UInt32, Value,
};

use serde::ser::{self, Serialize};
use std::fmt::Display;

/// Name of the newtype struct an object path serializes as.
pub const OBJECT_PATH_MARKER: &str = "$dbus_marshal::ObjectPath";

/// Name of the newtype struct a signature serializes as.
pub const SIGNATURE_MARKER: &str = "$dbus_marshal::Signature";

/// Converts `value` into a [`Value`] tree, deciding struct representation
/// and integer widths with `config`.
pub fn to_value_with_policy<T>(value: &T, config: impl ConversionPolicy) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    let converted = value.serialize(Serializer { config })?;
    required(converted, "top-level value")
}

/// Converts `value` into a [`Value`] tree with the
/// [`DefaultConversionPolicy`].
pub fn to_value<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    to_value_with_policy(value, DefaultConversionPolicy)
}

/// `None` stands for a value that is absent: a unit or `None`, which only
/// dict entries can drop.
fn required(value: Option<Value>, what: impl Display) -> Result<Value> {
    value.ok_or_else(|| {
        Error::Serializing(format!(
            "{} is unit or None, which D-Bus cannot represent",
            what
        ))
    })
}

/// The signature every value shares, if there is one.
fn common_signature<'a>(values: impl Iterator<Item = &'a Value>) -> Option<Signature> {
    let mut common: Option<Signature> = None;
    for value in values {
        let sig = guess_value_signature(value).ok()?;
        match &common {
            None => common = Some(sig),
            Some(c) if *c == sig => (),
            Some(_) => return None,
        }
    }
    common
}

fn variant_signature() -> Signature {
    Signature::basic(TypeCode::Variant)
}

/// An `a{sv}` dict, the D-Bus idiom for named fields.
fn property_dict(entries: Vec<(Value, Value)>) -> Result<Option<Value>> {
    let dict = Dict::with_signature(entries, Signature::basic(TypeCode::String), variant_signature())?;
    Ok(Some(dict.into()))
}

/// Homogeneous sequences become typed arrays, empty or mixed ones `av`.
fn sequence(items: Vec<Value>) -> Result<Option<Value>> {
    let array = match common_signature(items.iter()) {
        Some(_) => Array::new(items),
        None => Array::with_signature(items, variant_signature())?,
    };
    Ok(Some(array.into()))
}

fn map(entries: Vec<(Value, Value)>) -> Result<Option<Value>> {
    let first_key = match entries.first() {
        Some((key, _)) => guess_value_signature(key)?,
        None => return property_dict(entries),
    };
    let dict = match common_signature(entries.iter().map(|(_, v)| v)) {
        Some(_) => Dict::new(entries),
        None => Dict::with_signature(entries, first_key, variant_signature())?,
    };
    Ok(Some(dict.into()))
}

fn marker_text(inner: Option<Value>, marker: &str) -> Result<String> {
    match inner {
        Some(Value::String(s)) => Ok(s.into_string()),
        _ => Err(Error::Serializing(format!("{} must wrap a string", marker))),
    }
}

struct Serializer<C: ConversionPolicy> {
    config: C,
}

impl<C: ConversionPolicy> ser::Serializer for Serializer<C> {
    type Ok = Option<Value>;
    type Error = Error;

    type SerializeSeq = SerializeSeq<C>;
    type SerializeTuple = SerializeTuple<C>;
    type SerializeTupleStruct = SerializeTuple<C>;
    type SerializeTupleVariant = SerializeTupleVariant<C>;
    type SerializeMap = SerializeMap<C>;
    type SerializeStruct = SerializeStruct<C>;
    type SerializeStructVariant = SerializeStructVariant<C>;

    fn serialize_bool(self, val: bool) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_i8(self, val: i8) -> Result<Option<Value>> {
        Ok(Some(Int16::from(i16::from(val)).into()))
    }

    fn serialize_i16(self, val: i16) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_i32(self, val: i32) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_i64(self, val: i64) -> Result<Option<Value>> {
        let guess = self.config.integer_guess();
        Ok(Some(guess.type_wide_integer(val.into(), true)?))
    }

    fn serialize_u8(self, val: u8) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_u16(self, val: u16) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_u32(self, val: u32) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_u64(self, val: u64) -> Result<Option<Value>> {
        let guess = self.config.integer_guess();
        Ok(Some(guess.type_wide_integer(val.into(), false)?))
    }

    fn serialize_f32(self, val: f32) -> Result<Option<Value>> {
        Ok(Some(Double::from(f64::from(val)).into()))
    }

    fn serialize_f64(self, val: f64) -> Result<Option<Value>> {
        Ok(Some(val.into()))
    }

    fn serialize_char(self, val: char) -> Result<Option<Value>> {
        Ok(Some(UInt32::from(val as u32).into()))
    }

    fn serialize_str(self, val: &str) -> Result<Option<Value>> {
        Ok(Some(Str::new(val).into()))
    }

    fn serialize_bytes(self, val: &[u8]) -> Result<Option<Value>> {
        Ok(Some(ByteArray::from(val).into()))
    }

    fn serialize_none(self) -> Result<Option<Value>> {
        Ok(None)
    }

    fn serialize_some<T>(self, val: &T) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        val.serialize(self)
    }

    fn serialize_unit(self) -> Result<Option<Value>> {
        Ok(None)
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<Option<Value>> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        variant_index: u32,
        _: &'static str,
    ) -> Result<Option<Value>> {
        variant_index.serialize(self)
    }

    fn serialize_newtype_struct<T>(self, name: &'static str, value: &T) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        let inner = value.serialize(self)?;
        match name {
            OBJECT_PATH_MARKER => {
                let path = ObjectPath::new(marker_text(inner, name)?)?;
                Ok(Some(path.into()))
            }
            SIGNATURE_MARKER => {
                let sig = SignatureValue::new(marker_text(inner, name)?)?;
                Ok(Some(sig.into()))
            }
            _ => Ok(inner),
        }
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Option<Value>>
    where
        T: Serialize + ?Sized,
    {
        let inner = required(value.serialize(self)?, variant)?;
        property_dict(vec![(variant.into(), inner)])
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(SerializeSeq {
            items: Vec::with_capacity(len.unwrap_or(0)),
            config: self.config,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        Ok(SerializeTuple {
            items: Vec::with_capacity(len),
            config: self.config,
        })
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_tuple(len)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Ok(SerializeTupleVariant {
            name: variant,
            items: Vec::with_capacity(len),
            config: self.config,
        })
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(SerializeMap {
            entries: Vec::new(),
            key: None,
            config: self.config,
        })
    }

    fn serialize_struct(self, name: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        let fields = match self.config.query_struct_name(name) {
            StructConversionStyle::Dict => StructFields::Dict(Vec::new()),
            StructConversionStyle::StronglyTyped => StructFields::Struct(Vec::new()),
        };
        Ok(SerializeStruct {
            fields,
            config: self.config,
        })
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Ok(SerializeStructVariant {
            name: variant,
            entries: Vec::new(),
            config: self.config,
        })
    }
}

struct SerializeSeq<C: ConversionPolicy> {
    items: Vec<Value>,
    config: C,
}

impl<C: ConversionPolicy> ser::SerializeSeq for SerializeSeq<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        self.items.push(required(value.serialize(ser)?, "array element")?);
        Ok(())
    }

    fn end(self) -> Result<Option<Value>> {
        sequence(self.items)
    }
}

struct SerializeTuple<C: ConversionPolicy> {
    items: Vec<Value>,
    config: C,
}

impl<C: ConversionPolicy> SerializeTuple<C> {
    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        self.items.push(required(value.serialize(ser)?, "struct field")?);
        Ok(())
    }
}

impl<C: ConversionPolicy> ser::SerializeTuple for SerializeTuple<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Value>> {
        Ok(Some(Struct::new(self.items)?.into()))
    }
}

impl<C: ConversionPolicy> ser::SerializeTupleStruct for SerializeTuple<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Option<Value>> {
        Ok(Some(Struct::new(self.items)?.into()))
    }
}

struct SerializeTupleVariant<C: ConversionPolicy> {
    name: &'static str,
    items: Vec<Value>,
    config: C,
}

impl<C: ConversionPolicy> ser::SerializeTupleVariant for SerializeTupleVariant<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        self.items.push(required(value.serialize(ser)?, self.name)?);
        Ok(())
    }

    fn end(self) -> Result<Option<Value>> {
        let st = Struct::new(self.items)?;
        property_dict(vec![(self.name.into(), st.into())])
    }
}

struct SerializeMap<C: ConversionPolicy> {
    entries: Vec<(Value, Value)>,
    key: Option<Value>,
    config: C,
}

impl<C: ConversionPolicy> ser::SerializeMap for SerializeMap<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        self.key = Some(required(key.serialize(ser)?, "map key")?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self
            .key
            .take()
            .ok_or_else(|| Error::Serializing("map value without a key".to_owned()))?;
        let ser = Serializer {
            config: self.config.clone(),
        };
        if let Some(value) = value.serialize(ser)? {
            self.entries.push((key, value));
        }
        Ok(())
    }

    fn end(self) -> Result<Option<Value>> {
        map(self.entries)
    }
}

enum StructFields {
    Dict(Vec<(Value, Value)>),
    Struct(Vec<Value>),
}

struct SerializeStruct<C: ConversionPolicy> {
    fields: StructFields,
    config: C,
}

impl<C: ConversionPolicy> ser::SerializeStruct for SerializeStruct<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_field<T>(&mut self, name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        let item = value.serialize(ser)?;
        match &mut self.fields {
            StructFields::Dict(entries) => {
                if let Some(item) = item {
                    entries.push((name.into(), item));
                }
            }
            StructFields::Struct(items) => items.push(required(item, name)?),
        }
        Ok(())
    }

    fn end(self) -> Result<Option<Value>> {
        match self.fields {
            StructFields::Dict(entries) => property_dict(entries),
            StructFields::Struct(items) => Ok(Some(Struct::new(items)?.into())),
        }
    }
}

struct SerializeStructVariant<C: ConversionPolicy> {
    name: &'static str,
    entries: Vec<(Value, Value)>,
    config: C,
}

impl<C: ConversionPolicy> ser::SerializeStructVariant for SerializeStructVariant<C> {
    type Ok = Option<Value>;
    type Error = Error;

    fn serialize_field<T>(&mut self, name: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ser = Serializer {
            config: self.config.clone(),
        };
        if let Some(item) = value.serialize(ser)? {
            self.entries.push((name.into(), item));
        }
        Ok(())
    }

    fn end(self) -> Result<Option<Value>> {
        let fields = property_dict(self.entries)?;
        let fields = required(fields, self.name)?;
        property_dict(vec![(self.name.into(), fields)])
    }
}

impl Serialize for ObjectPath {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(OBJECT_PATH_MARKER, self.as_str())
    }
}

impl Serialize for Signature {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(SIGNATURE_MARKER, self.as_str())
    }
}

impl Serialize for SignatureValue {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.signature().serialize(serializer)
    }
}
