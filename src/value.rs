//! The in-memory representation of D-Bus values.
//!
//! [`Value`] is a closed sum type over every kind of value the wire format
//! can carry. Each kind has its own payload type which enforces that kind's
//! invariants when it is constructed: integers are range-checked against
//! their width, object paths and signatures are validated, structs may not
//! be empty. Invalid values are rejected up front and never deferred to send
//! time.
//!
//! Every payload carries a `variant_level`, the number of variant wrappers
//! the value was unwrapped from when decoded, or should be wrapped in when
//! encoded. A level of 0 means the value is not wrapped at all.

use crate::error::Result;
use crate::signature::{Signature, TypeCode};

mod basic;
mod container;
mod string;

pub use basic::{Boolean, Byte, Double, Int16, Int32, Int64, UInt16, UInt32, UInt64, UnixFd};
pub use container::{Array, ByteArray, Dict, Struct, Variant};
pub use string::{ObjectPath, SignatureValue, Str, Utf8String};
pub(crate) use string::validate_dbus_string;

macro_rules! variant_level_accessors {
    ($($kind:ident),* $(,)?) => {
        $(
            impl $kind {
                pub fn variant_level(&self) -> u32 {
                    self.variant_level
                }

                pub fn with_variant_level(mut self, variant_level: u32) -> Self {
                    self.variant_level = variant_level;
                    self
                }

                pub fn set_variant_level(&mut self, variant_level: u32) {
                    self.variant_level = variant_level;
                }
            }
        )*
    };
}

variant_level_accessors!(
    Byte, Boolean, Int16, UInt16, Int32, UInt32, Int64, UInt64, Double, UnixFd, Str,
    Utf8String, ObjectPath, SignatureValue, ByteArray, Array, Dict, Struct, Variant,
);

/// A D-Bus value of any kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(Byte),
    Boolean(Boolean),
    Int16(Int16),
    UInt16(UInt16),
    Int32(Int32),
    UInt32(UInt32),
    Int64(Int64),
    UInt64(UInt64),
    Double(Double),
    String(Str),
    Utf8String(Utf8String),
    ObjectPath(ObjectPath),
    Signature(SignatureValue),
    UnixFd(UnixFd),
    ByteArray(ByteArray),
    Array(Array),
    Dict(Dict),
    Struct(Struct),
    Variant(Variant),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Value::Byte($inner) => $body,
            Value::Boolean($inner) => $body,
            Value::Int16($inner) => $body,
            Value::UInt16($inner) => $body,
            Value::Int32($inner) => $body,
            Value::UInt32($inner) => $body,
            Value::Int64($inner) => $body,
            Value::UInt64($inner) => $body,
            Value::Double($inner) => $body,
            Value::String($inner) => $body,
            Value::Utf8String($inner) => $body,
            Value::ObjectPath($inner) => $body,
            Value::Signature($inner) => $body,
            Value::UnixFd($inner) => $body,
            Value::ByteArray($inner) => $body,
            Value::Array($inner) => $body,
            Value::Dict($inner) => $body,
            Value::Struct($inner) => $body,
            Value::Variant($inner) => $body,
        }
    };
}

impl Value {
    pub fn variant_level(&self) -> u32 {
        dispatch!(self, v => v.variant_level())
    }

    pub fn set_variant_level(&mut self, variant_level: u32) {
        dispatch!(self, v => v.set_variant_level(variant_level))
    }

    pub fn with_variant_level(mut self, variant_level: u32) -> Value {
        self.set_variant_level(variant_level);
        self
    }

    /// The wire type code this value marshals as when it is not wrapped in
    /// a variant.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Byte(_) => TypeCode::Byte,
            Value::Boolean(_) => TypeCode::Boolean,
            Value::Int16(_) => TypeCode::Int16,
            Value::UInt16(_) => TypeCode::UInt16,
            Value::Int32(_) => TypeCode::Int32,
            Value::UInt32(_) => TypeCode::UInt32,
            Value::Int64(_) => TypeCode::Int64,
            Value::UInt64(_) => TypeCode::UInt64,
            Value::Double(_) => TypeCode::Double,
            Value::String(_) | Value::Utf8String(_) => TypeCode::String,
            Value::ObjectPath(_) => TypeCode::ObjectPath,
            Value::Signature(_) => TypeCode::Signature,
            Value::UnixFd(_) => TypeCode::UnixFd,
            Value::ByteArray(_) | Value::Array(_) | Value::Dict(_) => TypeCode::Array,
            Value::Struct(_) => TypeCode::Struct,
            Value::Variant(_) => TypeCode::Variant,
        }
    }

    /// Short human readable name of the value's kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Byte(_) => "Byte",
            Value::Boolean(_) => "Boolean",
            Value::Int16(_) => "Int16",
            Value::UInt16(_) => "UInt16",
            Value::Int32(_) => "Int32",
            Value::UInt32(_) => "UInt32",
            Value::Int64(_) => "Int64",
            Value::UInt64(_) => "UInt64",
            Value::Double(_) => "Double",
            Value::String(_) => "String",
            Value::Utf8String(_) => "Utf8String",
            Value::ObjectPath(_) => "ObjectPath",
            Value::Signature(_) => "Signature",
            Value::UnixFd(_) => "UnixFd",
            Value::ByteArray(_) => "ByteArray",
            Value::Array(_) => "Array",
            Value::Dict(_) => "Dict",
            Value::Struct(_) => "Struct",
            Value::Variant(_) => "Variant",
        }
    }

    /// The signature this value would be sent with, see
    /// [`guess_value_signature`](crate::guess::guess_value_signature).
    pub fn signature(&self) -> Result<Signature> {
        crate::guess::guess_value_signature(self)
    }

    /// Integer kinds (including bytes) widened to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Byte(v) => Some(v.get().into()),
            Value::Int16(v) => Some(v.get().into()),
            Value::UInt16(v) => Some(v.get().into()),
            Value::Int32(v) => Some(v.get().into()),
            Value::UInt32(v) => Some(v.get().into()),
            Value::Int64(v) => Some(v.get().into()),
            Value::UInt64(v) => Some(v.get().into()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(v.get()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(v.get()),
            _ => None,
        }
    }

    /// Text of any of the string-like kinds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            Value::Utf8String(v) => Some(v.as_str()),
            Value::ObjectPath(v) => Some(v.as_str()),
            Value::Signature(v) => Some(v.signature().as_str()),
            _ => None,
        }
    }

    /// Strips every variant wrapper, returning the innermost concrete value.
    pub fn into_innermost(self) -> Value {
        match self {
            Value::Variant(v) => v.into_inner().into_innermost(),
            other => other.with_variant_level(0),
        }
    }
}

macro_rules! value_from {
    ($($from:ty => $kind:ident),* $(,)?) => {
        $(
            impl From<$from> for Value {
                fn from(v: $from) -> Value {
                    Value::$kind(v.into())
                }
            }
        )*
    };
}

value_from!(
    Byte => Byte,
    Boolean => Boolean,
    Int16 => Int16,
    UInt16 => UInt16,
    Int32 => Int32,
    UInt32 => UInt32,
    Int64 => Int64,
    UInt64 => UInt64,
    Double => Double,
    Str => String,
    Utf8String => Utf8String,
    ObjectPath => ObjectPath,
    SignatureValue => Signature,
    UnixFd => UnixFd,
    ByteArray => ByteArray,
    Array => Array,
    Dict => Dict,
    Struct => Struct,
    Variant => Variant,
    u8 => Byte,
    bool => Boolean,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => ByteArray,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Result};
    use test_log::test;

    #[test]
    fn int16_range() -> Result<()> {
        assert_eq!(Int16::new(32767)?.get(), 32767);
        assert_eq!(Int16::new(-32768)?.get(), -32768);

        let e = Int16::new(32768).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Range);
        assert!(e.to_string().contains("32768"));
        assert!(e.to_string().contains("Int16"));
        assert_eq!(Int16::new(-32769).unwrap_err().kind(), ErrorKind::Range);
        Ok(())
    }

    #[test]
    fn other_integer_ranges() -> Result<()> {
        assert!(Byte::new(255)?.get() == 255);
        assert!(Byte::new(256).is_err());
        assert!(Byte::new(-1).is_err());
        assert!(UInt16::new(65536).is_err());
        assert!(UInt32::new(-1).is_err());
        assert!(Int32::new(i64::from(i32::MAX) + 1).is_err());
        assert_eq!(UInt64::new(u64::MAX)?.get(), u64::MAX);
        assert!(UInt64::new(i128::from(u64::MAX) + 1).is_err());
        assert!(Int64::new(i128::from(i64::MIN) - 1).is_err());
        Ok(())
    }

    #[test]
    fn variant_level_round_trips_through_value() {
        let v = Value::from(7i32).with_variant_level(2);
        assert_eq!(v.variant_level(), 2);
        assert_eq!(v.clone().into_innermost().variant_level(), 0);
        assert_ne!(v, Value::from(7i32));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(3u8).as_integer(), Some(3));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(vec![1u8, 2]).type_code(), TypeCode::Array);
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn struct_must_not_be_empty() -> Result<()> {
        assert_eq!(
            Struct::new(vec![]).unwrap_err().kind(),
            ErrorKind::EncodingMismatch
        );
        let sig = Signature::new("i")?;
        assert!(Struct::with_signature(vec![], sig).is_err());
        Ok(())
    }

    #[test]
    fn object_path_checked_at_construction() {
        assert!(ObjectPath::new("/foo/bar").is_ok());
        assert!(ObjectPath::new("/").is_ok());
        assert_eq!(
            ObjectPath::new("/foo//bar").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(ObjectPath::new("/foo/").is_err());
    }
}
