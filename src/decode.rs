//! Unmarshaling a message body into [`Value`]s.

use crate::error::{Error, Result};
use crate::message::{Endianness, Message};
use crate::signature::{Signature, TypeCode};
use crate::value::{
    Array, ByteArray, Dict, Int32, ObjectPath, SignatureValue, Str, Struct, UnixFd, Utf8String,
    Value, Variant,
};
use crate::wire::{Basic, DataBuffer, MessageIter, WireOrder};

use byteorder::{BigEndian, LittleEndian};
use log::debug;

/// How many layers of nested variants are folded into the contained
/// value's `variant_level` rather than kept as explicit [`Variant`]s.
///
/// Layers are folded outermost first; once the budget is spent every
/// further layer of the same chain becomes an explicit `Variant`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantUnpack {
    /// Keep every layer as an explicit `Variant`.
    Preserve,
    Levels(u32),
    All,
}

impl Default for VariantUnpack {
    fn default() -> Self {
        VariantUnpack::Preserve
    }
}

impl VariantUnpack {
    /// Whether a chain that has already passed through `seen` variant
    /// layers may fold one more.
    fn folds(self, seen: u32) -> bool {
        match self {
            VariantUnpack::Preserve => false,
            VariantUnpack::Levels(n) => seen < n,
            VariantUnpack::All => true,
        }
    }
}

impl From<u32> for VariantUnpack {
    fn from(levels: u32) -> Self {
        match levels {
            0 => VariantUnpack::Preserve,
            n => VariantUnpack::Levels(n),
        }
    }
}

/// Options for [`decode`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode `ay` as a [`ByteArray`] instead of an [`Array`] of bytes.
    pub byte_arrays: bool,
    /// Decode strings as [`Utf8String`] instead of [`Str`].
    pub utf8_strings: bool,
    /// Decode bytes as plain `Int32` integers.
    pub integer_bytes: bool,
    pub variant_unpack_level: VariantUnpack,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_arrays(mut self, byte_arrays: bool) -> Self {
        self.byte_arrays = byte_arrays;
        self
    }

    pub fn utf8_strings(mut self, utf8_strings: bool) -> Self {
        self.utf8_strings = utf8_strings;
        self
    }

    pub fn integer_bytes(mut self, integer_bytes: bool) -> Self {
        self.integer_bytes = integer_bytes;
        self
    }

    pub fn variant_unpack_level(mut self, level: impl Into<VariantUnpack>) -> Self {
        self.variant_unpack_level = level.into();
        self
    }
}

/// Reads every value of a message body. The whole body must be consumed.
pub fn decode(mesg: &Message, options: &DecodeOptions) -> Result<Vec<Value>> {
    debug!(
        "decoding {} bytes as {:?} ({:?})",
        mesg.data.len(),
        mesg.signature.as_str(),
        mesg.endianness
    );
    match mesg.endianness {
        Endianness::Little => decode_body::<LittleEndian>(mesg, options),
        Endianness::Big => decode_body::<BigEndian>(mesg, options),
    }
}

fn decode_body<B: WireOrder>(mesg: &Message, options: &DecodeOptions) -> Result<Vec<Value>> {
    let mut buffer = DataBuffer::from_message(mesg);
    let mut values = Vec::new();
    let mut iter = MessageIter::<B>::new(&mut buffer, &mesg.signature);
    while iter.has_next() {
        values.push(read_value(&mut iter, options, 0, 0)?);
    }
    buffer.complete()?;
    Ok(values)
}

/// Reads one complete value. `seen` counts the variant layers of the
/// current chain already passed through and `folded` how many of those were
/// folded into the level of whatever is read next.
fn read_value<B: WireOrder>(
    iter: &mut MessageIter<'_, '_, B>,
    options: &DecodeOptions,
    seen: u32,
    folded: u32,
) -> Result<Value> {
    let code = iter
        .arg_type()
        .ok_or_else(|| Error::mismatch("expected another value"))?;
    let value = match code {
        TypeCode::Variant => {
            let mut inner = iter.recurse()?;
            if options.variant_unpack_level.folds(seen) {
                let value = read_value(&mut inner, options, seen + 1, folded + 1)?;
                inner.finish()?;
                return Ok(value);
            }
            let contained = Signature::new(inner.signature())?;
            let value = read_value(&mut inner, options, seen + 1, 0)?;
            inner.finish()?;
            Variant::with_signature(value, contained)?.into()
        }
        TypeCode::Array => read_array(iter, options)?,
        TypeCode::Struct => {
            let mut fields = iter.recurse()?;
            let signature = Signature::new(fields.signature())?;
            let mut items = Vec::new();
            while fields.has_next() {
                items.push(read_value(&mut fields, options, 0, 0)?);
            }
            fields.finish()?;
            Struct::with_signature(items, signature)?.into()
        }
        code if code.is_basic() => read_basic(iter.get_basic()?, options)?,
        other => {
            return Err(Error::mismatch(format_args!(
                "unexpected {} outside an array",
                other.name()
            )))
        }
    };
    Ok(value.with_variant_level(folded))
}

fn read_basic(basic: Basic<'_>, options: &DecodeOptions) -> Result<Value> {
    let value = match basic {
        Basic::Byte(b) if options.integer_bytes => Int32::from(i32::from(b)).into(),
        Basic::Byte(b) => b.into(),
        Basic::Boolean(b) => b.into(),
        Basic::Int16(v) => v.into(),
        Basic::UInt16(v) => v.into(),
        Basic::Int32(v) => v.into(),
        Basic::UInt32(v) => v.into(),
        Basic::Int64(v) => v.into(),
        Basic::UInt64(v) => v.into(),
        Basic::Double(v) => v.into(),
        Basic::String(s) if options.utf8_strings => Utf8String::new(s.as_bytes())?.into(),
        Basic::String(s) => Str::new(s).into(),
        Basic::ObjectPath(p) => ObjectPath::new(p)?.into(),
        Basic::Signature(s) => SignatureValue::new(s)?.into(),
        Basic::UnixFd(fd) => UnixFd::new(fd)?.into(),
    };
    Ok(value)
}

fn read_array<B: WireOrder>(
    iter: &mut MessageIter<'_, '_, B>,
    options: &DecodeOptions,
) -> Result<Value> {
    let signature = iter
        .current_signature()
        .ok_or_else(|| Error::mismatch("expected an array"))?;
    if options.byte_arrays && signature.as_str() == "ay" {
        return Ok(ByteArray::new(iter.read_byte_array()?).into());
    }
    let mut elements = iter.recurse()?;
    let value = match signature.dict_entry_signatures() {
        Some((key_sig, value_sig)) => {
            let mut entries = Vec::new();
            while elements.has_next() {
                let mut entry = elements.recurse()?;
                let key = read_value(&mut entry, options, 0, 0)?;
                let value = read_value(&mut entry, options, 0, 0)?;
                entry.finish()?;
                entries.push((key, value));
            }
            Dict::with_signature(entries, key_sig, value_sig)?.into()
        }
        None => {
            let element = signature
                .element_signature()
                .ok_or_else(|| Error::invalid_signature(signature.as_str(), "not an array"))?;
            let mut items = Vec::new();
            while elements.has_next() {
                items.push(read_value(&mut elements, options, 0, 0)?);
            }
            Array::with_signature(items, element)?.into()
        }
    };
    elements.finish()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode, encode_with, EncodeOptions};
    use crate::error::ErrorKind;
    use test_log::test;

    fn sig(text: &str) -> Result<Signature> {
        Signature::new(text)
    }

    fn round_trip(value: Value) -> Result<()> {
        let mesg = encode(&[value.clone()], None)?;
        let decoded = decode(&mesg, &DecodeOptions::new().variant_unpack_level(VariantUnpack::All))?;
        assert_eq!(decoded, vec![value]);
        Ok(())
    }

    #[test]
    fn round_trip_each_kind() -> Result<()> {
        round_trip(Value::from(200u8))?;
        round_trip(Value::from(true))?;
        round_trip(Value::from(-3i16))?;
        round_trip(Value::from(3u16))?;
        round_trip(Value::from(-70000i32))?;
        round_trip(Value::from(70000u32))?;
        round_trip(Value::from(i64::MIN))?;
        round_trip(Value::from(u64::MAX))?;
        round_trip(Value::from(0.25))?;
        round_trip(Value::from("text"))?;
        round_trip(ObjectPath::new("/org/example")?.into())?;
        round_trip(SignatureValue::new("a{sv}")?.into())?;
        round_trip(Struct::new(vec![Value::from(1u8), Value::from("x")])?.into())?;
        round_trip(Array::new(vec![Value::from(1.5), Value::from(2.5)]).into())?;
        let mut dict = Dict::default();
        dict.insert("k", Value::from(1i64).with_variant_level(1));
        round_trip(dict.into())?;
        Ok(())
    }

    #[test]
    fn round_trip_variant_levels() -> Result<()> {
        round_trip(Value::from(7i32).with_variant_level(1))?;
        round_trip(Value::from("deep").with_variant_level(4))?;
        round_trip(
            Struct::new(vec![Value::from(1i32).with_variant_level(2)])?
                .with_variant_level(1)
                .into(),
        )
    }

    #[test]
    fn variant_unpacking() -> Result<()> {
        let mesg = encode(&[Value::from(5i32).with_variant_level(3)], None)?;

        let preserved = decode(&mesg, &DecodeOptions::default())?;
        let expected = Variant::new(Variant::new(Variant::new(5i32)?)?)?;
        assert_eq!(preserved, vec![Value::from(expected)]);

        for levels in &[3u32, 4, 100] {
            let unpacked = decode(&mesg, &DecodeOptions::new().variant_unpack_level(*levels))?;
            assert_eq!(unpacked, vec![Value::from(5i32).with_variant_level(3)]);
        }

        let partial = decode(&mesg, &DecodeOptions::new().variant_unpack_level(1))?;
        let expected = Variant::new(Variant::new(5i32)?)?.with_variant_level(1);
        assert_eq!(partial, vec![Value::from(expected)]);

        // Partially unpacked values encode back to the same bytes.
        assert_eq!(encode(&partial, None)?.data, mesg.data);
        assert_eq!(encode(&preserved, None)?.data, mesg.data);
        Ok(())
    }

    #[test]
    fn unpack_budget_restarts_per_element() -> Result<()> {
        let items = vec![
            Value::from(1i32).with_variant_level(2),
            Value::from(2i32).with_variant_level(2),
        ];
        let array = Array::with_signature(items, sig("v")?)?.with_variant_level(1);
        let mesg = encode(&[array.into()], None)?;
        assert_eq!(mesg.signature.as_str(), "v");

        let decoded = decode(&mesg, &DecodeOptions::new().variant_unpack_level(1))?;
        let expected = Array::with_signature(
            vec![
                Variant::new(1i32)?.with_variant_level(1).into(),
                Variant::new(2i32)?.with_variant_level(1).into(),
            ],
            sig("v")?,
        )?
        .with_variant_level(1);
        assert_eq!(decoded, vec![Value::from(expected)]);
        assert_eq!(encode(&decoded, None)?.data, mesg.data);

        let all = decode(&mesg, &DecodeOptions::new().variant_unpack_level(VariantUnpack::All))?;
        match &all[0] {
            Value::Array(a) => {
                assert_eq!(a.variant_level(), 1);
                assert_eq!(a.items()[1], Value::from(2i32).with_variant_level(2));
            }
            other => panic!("expected an array, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn large_dict_decodes_in_linear_time() -> Result<()> {
        let n = 100_000u32;
        let entries = (0..n).map(|i| (Value::from(i), Value::from(i))).collect();
        let dict = Dict::with_signature(entries, sig("u")?, sig("u")?)?;
        let mesg = encode(&[dict.into()], None)?;
        assert_eq!(mesg.signature.as_str(), "a{uu}");
        assert_eq!(mesg.data.len(), 8 + 8 * n as usize);

        let decoded = decode(&mesg, &DecodeOptions::default())?;
        match &decoded[0] {
            Value::Dict(d) => {
                assert_eq!(d.len(), n as usize);
                assert_eq!(d.get(&Value::from(n / 2)), Some(&Value::from(n / 2)));
            }
            other => panic!("expected a dict, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn isai_scenario() -> Result<()> {
        let values = vec![
            Value::from(42i32),
            Value::from("hello"),
            Array::new(vec![1i32.into(), 2i32.into(), 3i32.into()]).into(),
        ];
        let mesg = encode(&values, Some(&sig("isai")?))?;
        assert_eq!(decode(&mesg, &DecodeOptions::default())?, values);
        Ok(())
    }

    #[test]
    fn dict_scenario() -> Result<()> {
        let mut dict = Dict::default();
        dict.insert("a", 1i32);
        dict.insert("b", 2i32);
        let mesg = encode(&[dict.into()], Some(&sig("a{si}")?))?;
        let decoded = decode(&mesg, &DecodeOptions::default())?;

        let mut expected = Dict::default();
        expected.insert("b", 2i32);
        expected.insert("a", 1i32);
        assert_eq!(decoded, vec![Value::from(expected)]);
        match &decoded[0] {
            Value::Dict(d) => {
                assert_eq!(d.get(&Value::from("a")), Some(&Value::from(1i32)));
                assert_eq!(
                    d.declared_signature().map(|(k, v)| (k.as_str(), v.as_str())),
                    Some(("s", "i"))
                );
            }
            other => panic!("expected a dict, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn decode_options() -> Result<()> {
        let mesg = encode(
            &[ByteArray::new(vec![1, 2]).into(), Value::from("s"), Value::from(9u8)],
            None,
        )?;
        assert_eq!(mesg.signature.as_str(), "aysy");

        let plain = decode(&mesg, &DecodeOptions::default())?;
        assert_eq!(
            plain[0],
            Array::with_signature(vec![1u8.into(), 2u8.into()], sig("y")?)?.into()
        );
        assert_eq!(plain[1], Value::from("s"));
        assert_eq!(plain[2], Value::from(9u8));

        let options = DecodeOptions::new()
            .byte_arrays(true)
            .utf8_strings(true)
            .integer_bytes(true);
        let custom = decode(&mesg, &options)?;
        assert_eq!(custom[0], ByteArray::new(vec![1, 2]).into());
        assert_eq!(custom[1], Utf8String::new(b"s".to_vec())?.into());
        assert_eq!(custom[2], Value::from(9i32));
        Ok(())
    }

    #[test]
    fn empty_array_in_variant_keeps_wire_signature() -> Result<()> {
        let array = Array::with_signature(vec![], sig("s")?)?.with_variant_level(1);
        let mesg = encode(&[array.into()], None)?;
        let decoded = decode(&mesg, &DecodeOptions::new().variant_unpack_level(1))?;
        match &decoded[0] {
            Value::Array(a) => {
                assert!(a.is_empty());
                assert_eq!(a.declared_signature().map(Signature::as_str), Some("s"));
                assert_eq!(a.variant_level(), 1);
            }
            other => panic!("expected an array, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn big_endian_round_trip() -> Result<()> {
        let options = EncodeOptions::new().endianness(Endianness::Big);
        let values = vec![Value::from(0x0102_0304u32), Value::from(-2i64)];
        let mesg = encode_with(&values, None, &options)?;
        assert_eq!(&mesg.data[..4], &[1, 2, 3, 4]);
        assert_eq!(decode(&mesg, &DecodeOptions::default())?, values);
        Ok(())
    }

    #[test]
    fn malformed_bodies() -> Result<()> {
        let truncated = Message::new(vec![1, 0], sig("i")?);
        assert_eq!(
            decode(&truncated, &DecodeOptions::default()).unwrap_err().kind(),
            ErrorKind::Malformed
        );

        let leftover = Message::new(vec![1, 0, 0, 0, 0], sig("i")?);
        assert_eq!(
            decode(&leftover, &DecodeOptions::default()).unwrap_err(),
            Error::LeftoverData(1)
        );

        let bad_bool = Message::new(vec![3, 0, 0, 0], sig("b")?);
        assert_eq!(
            decode(&bad_bool, &DecodeOptions::default()).unwrap_err(),
            Error::InvalidBoolValue(3)
        );

        let too_long = Message::new(vec![0, 0, 0, 5], sig("ay")?);
        assert_eq!(
            decode(&too_long, &DecodeOptions::default()).unwrap_err().kind(),
            ErrorKind::Malformed
        );
        Ok(())
    }

    #[test]
    fn unix_fds_travel_out_of_band() -> Result<()> {
        let mesg = encode(&[UnixFd::new(12)?.into()], None)?;
        assert_eq!(mesg.fds, vec![12]);
        assert_eq!(
            decode(&mesg, &DecodeOptions::default())?,
            vec![Value::from(UnixFd::new(12)?)]
        );
        Ok(())
    }
}
