use super::ser::{OBJECT_PATH_MARKER, SIGNATURE_MARKER};
use crate::error::{Error, Result};
use crate::signature::Signature;
use crate::value::{ObjectPath, SignatureValue, Value};

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use serde::forward_to_deserialize_any;
use serde::Deserialize;
use std::fmt;

/// Reads a `Deserialize` type out of a decoded value.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    T::deserialize(ValueDeserializer::new(value))
}

/// A serde `Deserializer` over an owned [`Value`].
///
/// Variant wrappers are looked through: a value reads the same whether or
/// not it travelled inside a variant. Dicts read as maps, arrays and structs
/// as sequences. Enums are read from a variant index (`u`), a variant name,
/// or a single-entry dict from name to contents.
#[derive(Debug)]
pub struct ValueDeserializer {
    value: Value,
}

impl ValueDeserializer {
    pub fn new(value: Value) -> Self {
        Self {
            value: value.into_innermost(),
        }
    }
}

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match self.value {
            Value::Byte(v) => visitor.visit_u8(v.get()),
            Value::Boolean(v) => visitor.visit_bool(v.get()),
            Value::Int16(v) => visitor.visit_i16(v.get()),
            Value::UInt16(v) => visitor.visit_u16(v.get()),
            Value::Int32(v) => visitor.visit_i32(v.get()),
            Value::UInt32(v) => visitor.visit_u32(v.get()),
            Value::Int64(v) => visitor.visit_i64(v.get()),
            Value::UInt64(v) => visitor.visit_u64(v.get()),
            Value::Double(v) => visitor.visit_f64(v.get()),
            Value::UnixFd(v) => visitor.visit_i32(v.get()),
            Value::String(s) => visitor.visit_string(s.into_string()),
            Value::Utf8String(s) => visitor.visit_str(s.as_str()),
            Value::ObjectPath(p) => visitor.visit_string(p.into_string()),
            Value::Signature(s) => visitor.visit_str(s.signature().as_str()),
            Value::ByteArray(b) => visitor.visit_byte_buf(b.into_bytes()),
            Value::Array(a) => visitor.visit_seq(Items::new(a.into_items())),
            Value::Struct(s) => visitor.visit_seq(Items::new(s.into_items())),
            Value::Dict(d) => visitor.visit_map(Entries::new(d.into_entries())),
            Value::Variant(v) => ValueDeserializer::new(v.into_inner()).deserialize_any(visitor),
        }
    }

    /// Chars travel as their code point, `u`.
    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        match &self.value {
            Value::UInt32(v) => match std::char::from_u32(v.get()) {
                Some(c) => visitor.visit_char(c),
                None => Err(Error::Deserializing(format!(
                    "{:#x} is not a char",
                    v.get()
                ))),
            },
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V>(self, _: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Err(Error::Deserializing(format!(
            "expected unit, found {}; D-Bus has no unit value",
            self.value.kind_name()
        )))
    }

    fn deserialize_unit_struct<V>(self, _: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(self, _: &'static str, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        let access = match self.value {
            Value::Dict(dict) if dict.len() == 1 => {
                let mut entries = dict.into_entries();
                match entries.pop() {
                    Some((variant, content)) => Enum {
                        variant,
                        content: Some(content),
                    },
                    None => return Err(Error::Deserializing(format!("empty dict for {}", name))),
                }
            }
            variant @ Value::String(_) | variant @ Value::UInt32(_) => Enum {
                variant,
                content: None,
            },
            other => {
                return Err(Error::Deserializing(format!(
                    "expected enum {}, found {}",
                    name,
                    other.kind_name()
                )))
            }
        };
        visitor.visit_enum(access)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 str string
        bytes byte_buf seq tuple tuple_struct map struct identifier
    }
}

struct Items {
    iter: std::vec::IntoIter<Value>,
}

impl Items {
    fn new(items: Vec<Value>) -> Self {
        Self {
            iter: items.into_iter(),
        }
    }
}

impl<'de> SeqAccess<'de> for Items {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(item) => Ok(Some(seed.deserialize(ValueDeserializer::new(item))?)),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct Entries {
    iter: std::vec::IntoIter<(Value, Value)>,
    value: Option<Value>,
}

impl Entries {
    fn new(entries: Vec<(Value, Value)>) -> Self {
        Self {
            iter: entries.into_iter(),
            value: None,
        }
    }
}

impl<'de> MapAccess<'de> for Entries {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                Ok(Some(seed.deserialize(ValueDeserializer::new(key))?))
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        match self.value.take() {
            Some(value) => seed.deserialize(ValueDeserializer::new(value)),
            None => Err(Error::Deserializing("dict value read before its key".to_owned())),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct Enum {
    variant: Value,
    content: Option<Value>,
}

impl<'de> EnumAccess<'de> for Enum {
    type Error = Error;
    type Variant = Contents;

    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Contents)>
    where
        V: DeserializeSeed<'de>,
    {
        let content = Contents(self.content);
        seed.deserialize(ValueDeserializer::new(self.variant))
            .map(|v| (v, content))
    }
}

struct Contents(Option<Value>);

impl Contents {
    fn deserializer(self) -> Result<ValueDeserializer> {
        self.0
            .map(ValueDeserializer::new)
            .ok_or_else(|| Error::Deserializing("enum variant has no contents".to_owned()))
    }
}

impl<'de> VariantAccess<'de> for Contents {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.0 {
            None => Ok(()),
            Some(content) => Err(Error::Deserializing(format!(
                "unit variant carries a {}",
                content.kind_name()
            ))),
        }
    }

    fn newtype_variant_seed<T>(self, seed: T) -> Result<T::Value>
    where
        T: DeserializeSeed<'de>,
    {
        seed.deserialize(self.deserializer()?)
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Deserializer::deserialize_any(self.deserializer()?, visitor)
    }

    fn struct_variant<V>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value>
    where
        V: Visitor<'de>,
    {
        Deserializer::deserialize_any(self.deserializer()?, visitor)
    }
}

/// Accepts the string inside an object path or signature marker.
struct MarkedText(&'static str);

impl<'de> Visitor<'de> for MarkedText {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.0)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<String, E> {
        Ok(v)
    }

    fn visit_newtype_struct<D>(self, deserializer: D) -> std::result::Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_string(self)
    }
}

impl<'de> Deserialize<'de> for ObjectPath {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text =
            deserializer.deserialize_newtype_struct(OBJECT_PATH_MARKER, MarkedText("an object path"))?;
        ObjectPath::new(text).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text =
            deserializer.deserialize_newtype_struct(SIGNATURE_MARKER, MarkedText("a signature"))?;
        Signature::new(text).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for SignatureValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Signature::deserialize(deserializer).map(SignatureValue::from)
    }
}
