//! Signature guessing.
//!
//! When a caller sends values without an explicit signature, the signature
//! is derived from the values themselves. Because every [`Value`] already
//! knows its kind, this is a match over the sum type. The only remaining
//! choice is how to type integers that arrive without a D-Bus width, which
//! [`IntegerGuess`] decides.

use crate::error::{Error, Result};
use crate::signature::{Signature, TypeCode};
use crate::value::{Int32, Int64, UInt64, Value};

use log::debug;

/// Guesses the signature of a sequence of values, one complete type per
/// value.
pub fn guess_signature(values: &[Value]) -> Result<Signature> {
    let parts = values
        .iter()
        .map(guess_value_signature)
        .collect::<Result<Vec<_>>>()?;
    let signature = Signature::concat(&parts)?;
    debug!("guessed signature {:?} for {} values", signature.as_str(), values.len());
    Ok(signature)
}

/// Guesses the single complete type of one value.
///
/// A value with a non-zero `variant_level`, or an explicit
/// [`Variant`](crate::value::Variant), is sent as `v`. Arrays and dicts
/// without a declared signature are typed from their first element, structs
/// from every field; empty undeclared arrays and dicts cannot be guessed.
pub fn guess_value_signature(value: &Value) -> Result<Signature> {
    if value.variant_level() > 0 {
        return Ok(Signature::basic(TypeCode::Variant));
    }
    guess_unwrapped_signature(value)
}

/// Like [`guess_value_signature`], but ignores the value's own
/// `variant_level`: the type found inside its innermost variant wrapper.
pub(crate) fn guess_unwrapped_signature(value: &Value) -> Result<Signature> {
    match value {
        Value::Variant(_) => Ok(Signature::basic(TypeCode::Variant)),
        Value::ByteArray(_) => Ok(Signature::from_validated("ay")),
        Value::Array(array) => Signature::array_of(&array.element_signature()?),
        Value::Dict(dict) => {
            let (key, value) = dict.key_value_signatures()?;
            match key.type_code() {
                Some(code) if code.is_basic() => Signature::dict_of(&key, &value),
                _ => Err(Error::mismatch(format_args!(
                    "dict keys must have a basic type, not {:?}",
                    key.as_str()
                ))),
            }
        }
        Value::Struct(st) => Signature::new(format!("({})", st.field_signatures()?)),
        basic => Ok(Signature::basic(basic.type_code())),
    }
}

/// How integers without a declared D-Bus width are typed at the
/// conversion boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegerGuess {
    /// Keep the width of the Rust integer type.
    Preserve,
    /// Type 64-bit integers as int32 when they lie within
    /// `-threshold - 1 ..= threshold`, as int64 otherwise, and as uint64
    /// above `i64::MAX`. The threshold is capped at `i32::MAX`.
    Narrow { threshold: i64 },
}

impl Default for IntegerGuess {
    fn default() -> Self {
        IntegerGuess::Preserve
    }
}

impl IntegerGuess {
    /// Narrow to int32 whenever the value fits.
    pub const INT32_FIRST: IntegerGuess = IntegerGuess::Narrow {
        threshold: i32::MAX as i64,
    };

    /// Types a 64-bit integer according to this policy. `value` is the
    /// integer and `signed` tells whether it came from a signed Rust type.
    pub fn type_wide_integer(self, value: i128, signed: bool) -> Result<Value> {
        match self {
            IntegerGuess::Preserve if signed => Ok(Int64::new(value)?.into()),
            IntegerGuess::Preserve => Ok(UInt64::new(value)?.into()),
            IntegerGuess::Narrow { threshold } => {
                let threshold = i128::from(threshold.clamp(0, i32::MAX.into()));
                if value >= -threshold - 1 && value <= threshold {
                    Ok(Int32::new(value)?.into())
                } else if value <= i128::from(i64::MAX) {
                    Ok(Int64::new(value)?.into())
                } else {
                    Ok(UInt64::new(value)?.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::{
        Array, ByteArray, Dict, Int16, ObjectPath, SignatureValue, Str, Struct, UnixFd, Variant,
    };
    use test_log::test;

    fn sig_of(value: impl Into<Value>) -> Result<String> {
        Ok(guess_value_signature(&value.into())?.as_str().to_owned())
    }

    #[test]
    fn basic_kinds() -> Result<()> {
        assert_eq!(guess_signature(&[Value::from(true)])?.as_str(), "b");
        assert_eq!(sig_of(1u8)?, "y");
        assert_eq!(sig_of(Int16::from(1))?, "n");
        assert_eq!(sig_of(1u16)?, "q");
        assert_eq!(sig_of(1i32)?, "i");
        assert_eq!(sig_of(1u32)?, "u");
        assert_eq!(sig_of(1i64)?, "x");
        assert_eq!(sig_of(1u64)?, "t");
        assert_eq!(sig_of(1.0)?, "d");
        assert_eq!(sig_of("s")?, "s");
        assert_eq!(sig_of(ObjectPath::new("/a")?)?, "o");
        assert_eq!(sig_of(SignatureValue::new("ii")?)?, "g");
        assert_eq!(sig_of(UnixFd::new(0)?)?, "h");
        assert_eq!(sig_of(ByteArray::new(vec![1u8]))?, "ay");
        Ok(())
    }

    #[test]
    fn containers() -> Result<()> {
        let st = Struct::new(vec![Value::from(1i32), Value::from(Str::new("a"))])?;
        assert_eq!(guess_signature(&[st.into()])?.as_str(), "(is)");

        let array = Array::new(vec![Value::from(1i32), Value::from(2i32)]);
        assert_eq!(sig_of(array)?, "ai");

        let mut dict = Dict::default();
        dict.insert("k", Value::from(1u8).with_variant_level(1));
        assert_eq!(sig_of(dict)?, "a{sv}");

        let nested = Array::new(vec![Array::new(vec![Value::from("x")]).into()]);
        assert_eq!(sig_of(nested)?, "aas");
        Ok(())
    }

    #[test]
    fn empty_containers_cannot_be_guessed() {
        let e = guess_signature(&[Dict::default().into()]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        let e = guess_signature(&[Array::default().into()]).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
    }

    #[test]
    fn variants() -> Result<()> {
        assert_eq!(sig_of(Value::from(1i32).with_variant_level(2))?, "v");
        assert_eq!(sig_of(Variant::new(1i32)?)?, "v");
        let vs = guess_signature(&[Value::from("a"), Variant::new(2u8)?.into()])?;
        assert_eq!(vs.as_str(), "sv");
        Ok(())
    }

    #[test]
    fn non_basic_dict_key_rejected() -> Result<()> {
        let mut dict = Dict::default();
        dict.insert(Array::new(vec![Value::from(1i32)]), 1i32);
        assert_eq!(
            guess_signature(&[dict.into()]).unwrap_err().kind(),
            ErrorKind::EncodingMismatch
        );
        Ok(())
    }

    #[test]
    fn integer_guess_policies() -> Result<()> {
        assert_eq!(
            IntegerGuess::Preserve.type_wide_integer(5, true)?,
            Value::from(5i64)
        );
        assert_eq!(
            IntegerGuess::Preserve.type_wide_integer(5, false)?,
            Value::from(5u64)
        );

        let narrow = IntegerGuess::INT32_FIRST;
        assert_eq!(narrow.type_wide_integer(5, true)?, Value::from(5i32));
        assert_eq!(
            narrow.type_wide_integer(i128::from(i32::MIN), true)?,
            Value::from(i32::MIN)
        );
        assert_eq!(
            narrow.type_wide_integer(i128::from(i32::MAX) + 1, true)?,
            Value::from(i64::from(i32::MAX) + 1)
        );
        assert_eq!(
            narrow.type_wide_integer(i128::from(u64::MAX), false)?,
            Value::from(u64::MAX)
        );

        let small = IntegerGuess::Narrow { threshold: 100 };
        assert_eq!(small.type_wide_integer(100, true)?, Value::from(100i32));
        assert_eq!(small.type_wide_integer(101, true)?, Value::from(101i64));
        Ok(())
    }
}
