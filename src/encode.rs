//! Marshaling [`Value`]s into a message body.
//!
//! The signature, given or guessed, is walked in lock-step with the values.
//! Every container is opened through
//! [`MessageWriter::with_container`], so a failure anywhere abandons what
//! was written and the caller only ever sees a complete [`Message`] or an
//! error.

use crate::error::{Error, Result};
use crate::guess::{guess_signature, guess_unwrapped_signature};
use crate::message::{Endianness, Message};
use crate::names::validate_object_path;
use crate::signature::{self, Signature, TypeCode};
use crate::value::{
    validate_dbus_string, Byte, Int16, Int32, Int64, UInt16, UInt32, UInt64, UnixFd, Value,
};
use crate::wire::{Basic, ContainerKind, MessageWriter, WireOrder};

use byteorder::{BigEndian, LittleEndian};
use log::{debug, error};
use std::convert::TryFrom;

/// Options for [`encode_with`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub endianness: Endianness,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }
}

/// Marshals `values` in little-endian byte order. Without a signature, one
/// is guessed from the values.
pub fn encode(values: &[Value], signature: Option<&Signature>) -> Result<Message> {
    encode_with(values, signature, &EncodeOptions::default())
}

pub fn encode_with(
    values: &[Value],
    signature: Option<&Signature>,
    options: &EncodeOptions,
) -> Result<Message> {
    let signature = match signature {
        Some(sig) => sig.clone(),
        None => guess_signature(values)?,
    };
    debug!(
        "encoding {} values as {:?} ({:?})",
        values.len(),
        signature.as_str(),
        options.endianness
    );
    let res = match options.endianness {
        Endianness::Little => encode_body::<LittleEndian>(values, signature),
        Endianness::Big => encode_body::<BigEndian>(values, signature),
    };
    if let Err(e) = &res {
        error!("discarding message: {}", e);
    }
    res
}

fn encode_body<B: WireOrder>(values: &[Value], signature: Signature) -> Result<Message> {
    let mut writer = MessageWriter::<B>::new();
    append_sequence(&mut writer, &signature, values)?;
    writer.finish(signature)
}

/// Appends values against a sequence of complete types, the body or the
/// fields of a struct.
fn append_sequence<B: WireOrder>(
    w: &mut MessageWriter<B>,
    signature: &Signature,
    values: &[Value],
) -> Result<()> {
    let mut types = signature.iter();
    for value in values {
        let sig = types.next().ok_or_else(|| {
            Error::mismatch(format_args!(
                "fewer items in signature {:?} than arguments ({})",
                signature.as_str(),
                values.len()
            ))
        })?;
        append_value(w, &sig, value)?;
    }
    if types.next().is_some() {
        return Err(Error::mismatch(format_args!(
            "more items in signature {:?} than arguments ({})",
            signature.as_str(),
            values.len()
        )));
    }
    Ok(())
}

fn append_value<B: WireOrder>(
    w: &mut MessageWriter<B>,
    sig: &Signature,
    value: &Value,
) -> Result<()> {
    let code = sig
        .type_code()
        .ok_or_else(|| Error::invalid_signature(sig.as_str(), "empty"))?;
    match (code, value) {
        (TypeCode::Variant, _) => append_variant(w, value),
        (_, Value::Variant(_)) => Err(Error::mismatch(format_args!(
            "Variant value cannot be sent as {:?}",
            sig.as_str()
        ))),
        (TypeCode::Array, _) => append_array(w, sig, value),
        (TypeCode::Struct, Value::Struct(st)) => {
            let fields = sig
                .struct_signature()
                .ok_or_else(|| Error::invalid_signature(sig.as_str(), "not a struct"))?;
            if let Some(declared) = st.declared_signature() {
                if *declared != fields {
                    return Err(Error::mismatch(format_args!(
                        "struct declared as ({}) sent as {:?}",
                        declared,
                        sig.as_str()
                    )));
                }
            }
            w.with_container(ContainerKind::Struct, None, |w| {
                append_sequence(w, &fields, st.items())
            })
        }
        (code, value) if code.is_basic() => w.append_basic(to_basic(code, value)?),
        _ => Err(unexpected(sig, value)),
    }
}

fn unexpected(sig: &Signature, value: &Value) -> Error {
    Error::mismatch(format_args!(
        "{} value cannot be sent as {:?}",
        value.kind_name(),
        sig.as_str()
    ))
}

fn append_array<B: WireOrder>(
    w: &mut MessageWriter<B>,
    sig: &Signature,
    value: &Value,
) -> Result<()> {
    let element = sig
        .element_signature()
        .ok_or_else(|| Error::invalid_signature(sig.as_str(), "not an array"))?;
    match value {
        Value::Dict(dict) => {
            let (key_sig, value_sig) = sig
                .dict_entry_signatures()
                .ok_or_else(|| unexpected(sig, value))?;
            if let Some((k, v)) = dict.declared_signature() {
                if (k, v) != (&key_sig, &value_sig) {
                    return Err(Error::mismatch(format_args!(
                        "dict declared as a{{{}{}}} sent as {:?}",
                        k,
                        v,
                        sig.as_str()
                    )));
                }
            }
            w.with_container(ContainerKind::Array, Some(&element), |w| {
                for (k, v) in dict.iter() {
                    w.with_container(ContainerKind::DictEntry, None, |w| {
                        append_value(w, &key_sig, k)?;
                        append_value(w, &value_sig, v)
                    })?;
                }
                Ok(())
            })
        }
        Value::ByteArray(bytes) if element.type_code() == Some(TypeCode::Byte) => {
            w.append_byte_array(bytes.as_bytes())
        }
        Value::Array(array) if element.type_code() != Some(TypeCode::DictEntry) => {
            if let Some(declared) = array.declared_signature() {
                if *declared != element {
                    return Err(Error::mismatch(format_args!(
                        "array declared as a{} sent as {:?}",
                        declared,
                        sig.as_str()
                    )));
                }
            }
            w.with_container(ContainerKind::Array, Some(&element), |w| {
                for item in array.iter() {
                    append_value(w, &element, item)?;
                }
                Ok(())
            })
        }
        _ => Err(unexpected(sig, value)),
    }
}

/// Wraps a value in as many variant markers as it asks for: one per
/// `variant_level` (at least one, since the slot is a variant), or for an
/// explicit [`Variant`](crate::value::Variant) one more than its level.
fn append_variant<B: WireOrder>(w: &mut MessageWriter<B>, value: &Value) -> Result<()> {
    let (layers, inner_sig, inner) = match value {
        Value::Variant(var) => (
            var.variant_level().saturating_add(1),
            var.signature().clone(),
            var.inner(),
        ),
        other => (
            other.variant_level().max(1),
            guess_unwrapped_signature(other)?,
            other,
        ),
    };
    let v = Signature::basic(TypeCode::Variant);
    let mut handles = Vec::new();
    for layer in 1..=layers {
        let declared = if layer == layers { &inner_sig } else { &v };
        match w.open_container(ContainerKind::Variant, Some(declared)) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                if let Some(outer) = handles.into_iter().next() {
                    w.abandon_container(outer);
                }
                return Err(e);
            }
        }
    }
    match append_value(w, &inner_sig, inner) {
        Ok(()) => {
            while let Some(handle) = handles.pop() {
                w.close_container(handle)?;
            }
            Ok(())
        }
        Err(e) => {
            if let Some(outer) = handles.into_iter().next() {
                w.abandon_container(outer);
            }
            Err(e)
        }
    }
}

fn integer(code: TypeCode, value: &Value) -> Result<i128> {
    value.as_integer().ok_or_else(|| {
        Error::mismatch(format_args!(
            "{} value cannot be sent as {}",
            value.kind_name(),
            code.name()
        ))
    })
}

fn string_like<'v>(code: TypeCode, value: &'v Value) -> Result<&'v str> {
    let text = match value {
        Value::String(_) | Value::Utf8String(_) | Value::ObjectPath(_) => value.as_str(),
        Value::Signature(sig) if code == TypeCode::Signature => Some(sig.signature().as_str()),
        _ => None,
    };
    let text = text.ok_or_else(|| {
        Error::mismatch(format_args!(
            "{} value cannot be sent as {}",
            value.kind_name(),
            code.name()
        ))
    })?;
    validate_dbus_string(text)?;
    Ok(text)
}

/// Coerces a value to the basic type of its slot. Integers are
/// range-checked against the slot width rather than their own.
fn to_basic(code: TypeCode, value: &Value) -> Result<Basic<'_>> {
    let basic = match code {
        TypeCode::Byte => Basic::Byte(Byte::new(integer(code, value)?)?.get()),
        TypeCode::Boolean => match value {
            Value::Boolean(b) => Basic::Boolean(b.get()),
            _ => {
                return Err(Error::mismatch(format_args!(
                    "{} value cannot be sent as {}",
                    value.kind_name(),
                    code.name()
                )))
            }
        },
        TypeCode::Int16 => Basic::Int16(Int16::new(integer(code, value)?)?.get()),
        TypeCode::UInt16 => Basic::UInt16(UInt16::new(integer(code, value)?)?.get()),
        TypeCode::Int32 => Basic::Int32(Int32::new(integer(code, value)?)?.get()),
        TypeCode::UInt32 => Basic::UInt32(UInt32::new(integer(code, value)?)?.get()),
        TypeCode::Int64 => Basic::Int64(Int64::new(integer(code, value)?)?.get()),
        TypeCode::UInt64 => Basic::UInt64(UInt64::new(integer(code, value)?)?.get()),
        TypeCode::Double => match value.as_f64() {
            Some(d) => Basic::Double(d),
            None => Basic::Double(integer(code, value)? as f64),
        },
        TypeCode::String => Basic::String(string_like(code, value)?),
        TypeCode::ObjectPath => {
            let path = string_like(code, value)?;
            validate_object_path(path)?;
            Basic::ObjectPath(path)
        }
        TypeCode::Signature => {
            let sig = string_like(code, value)?;
            signature::validate(sig)?;
            Basic::Signature(sig)
        }
        TypeCode::UnixFd => match value {
            Value::UnixFd(fd) => Basic::UnixFd(fd.get()),
            other => {
                let n = integer(code, other)?;
                let fd = i32::try_from(n).map_err(|_| Error::OutOfRange {
                    value: n,
                    type_name: "UnixFd",
                })?;
                Basic::UnixFd(UnixFd::new(fd)?.get())
            }
        },
        _ => {
            return Err(Error::mismatch(format_args!(
                "{} is not a basic type",
                code.name()
            )))
        }
    };
    Ok(basic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::{Array, ByteArray, Dict, ObjectPath, Str, Struct, Variant};
    use test_log::test;

    fn sig(text: &str) -> Result<Signature> {
        Signature::new(text)
    }

    #[test]
    fn isai() -> Result<()> {
        let values = vec![
            Value::from(42i32),
            Value::from("hello"),
            Array::new(vec![1i32.into(), 2i32.into(), 3i32.into()]).into(),
        ];
        let mesg = encode(&values, Some(&sig("isai")?))?;
        assert_eq!(mesg.signature.as_str(), "isai");
        assert_eq!(
            mesg.data,
            vec![
                42, 0, 0, 0, // i
                5, 0, 0, 0, b'h', b'e', b'l', b'l', b'o', 0, 0, 0, // s, padded
                12, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, // ai
            ]
        );
        Ok(())
    }

    #[test]
    fn guessed_signature() -> Result<()> {
        let st = Struct::new(vec![Value::from(1i32), Value::from("a")])?;
        let mesg = encode(&[st.into()], None)?;
        assert_eq!(mesg.signature.as_str(), "(is)");
        assert_eq!(mesg.data, vec![1, 0, 0, 0, 1, 0, 0, 0, b'a', 0]);
        Ok(())
    }

    #[test]
    fn count_mismatch() -> Result<()> {
        let values = vec![Value::from(1i32), Value::from(2i32)];
        let e = encode(&values, Some(&sig("i")?)).unwrap_err();
        assert!(e.to_string().contains("fewer items"), "{}", e);
        let e = encode(&values, Some(&sig("iii")?)).unwrap_err();
        assert!(e.to_string().contains("more items"), "{}", e);

        let st = Struct::new(vec![Value::from(1i32)])?;
        let e = encode(&[st.into()], Some(&sig("(ii)")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn coercion_to_slot_width() -> Result<()> {
        let mesg = encode(&[Value::from(7i64)], Some(&sig("q")?))?;
        assert_eq!(mesg.data, vec![7, 0]);

        let e = encode(&[Value::from(70000i32)], Some(&sig("n")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Range);

        let mesg = encode(&[Value::from(2i32)], Some(&sig("d")?))?;
        assert_eq!(mesg.data, vec![0, 0, 0, 0, 0, 0, 0, 64]);

        let e = encode(&[Value::from(1.5)], Some(&sig("i")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn strings_for_paths_and_signatures() -> Result<()> {
        let mesg = encode(&[Value::from("/a"), Value::from("ai")], Some(&sig("og")?))?;
        assert_eq!(
            mesg.data,
            vec![2, 0, 0, 0, b'/', b'a', 0, 2, b'a', b'i', 0]
        );
        let e = encode(&[Value::from("a/")], Some(&sig("o")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Validation);
        let e = encode(&[Value::from("(")], Some(&sig("g")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Validation);

        let path = ObjectPath::new("/x")?;
        assert_eq!(encode(&[path.into()], None)?.signature.as_str(), "o");
        Ok(())
    }

    #[test]
    fn bad_strings() {
        let e = encode(&[Str::new("a\0b").into()], None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unicode);
        let e = encode(&[Str::new("\u{fffe}").into()], None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Unicode);
    }

    #[test]
    fn variant_levels() -> Result<()> {
        let one = encode(&[Value::from(37i32).with_variant_level(1)], None)?;
        assert_eq!(one.signature.as_str(), "v");
        assert_eq!(one.data, vec![1, b'i', 0, 0, 37, 0, 0, 0]);

        let two = encode(&[Value::from(37i32).with_variant_level(2)], None)?;
        assert_eq!(
            two.data,
            vec![1, b'v', 0, 1, b'i', 0, 0, 0, 37, 0, 0, 0],
            "two nested variant markers"
        );

        // A plain value in a v slot still gets one marker.
        let plain = encode(&[Value::from(37i32)], Some(&sig("v")?))?;
        assert_eq!(plain.data, one.data);

        // An explicit Variant with level 1 is two layers.
        let explicit = Variant::new(37i32)?.with_variant_level(1);
        assert_eq!(encode(&[explicit.into()], None)?.data, two.data);
        Ok(())
    }

    #[test]
    fn variant_level_ignored_in_concrete_slot() -> Result<()> {
        let mesg = encode(&[Value::from(5u32).with_variant_level(3)], Some(&sig("u")?))?;
        assert_eq!(mesg.data, vec![5, 0, 0, 0]);
        let e = encode(&[Variant::new(5u32)?.into()], Some(&sig("u")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn dicts() -> Result<()> {
        let mut dict = Dict::default();
        dict.insert("a", 1i32);
        let mesg = encode(&[dict.clone().into()], Some(&sig("a{si}")?))?;
        assert_eq!(
            mesg.data,
            vec![
                12, 0, 0, 0, 0, 0, 0, 0, // length, padding to the first entry
                1, 0, 0, 0, b'a', 0, 0, 0, 1, 0, 0, 0,
            ]
        );
        let e = encode(&[dict.into()], Some(&sig("ai")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn empty_containers() -> Result<()> {
        let e = encode(&[Array::default().into()], None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);

        let declared = Array::with_signature(vec![], sig("s")?)?;
        let mesg = encode(&[declared.into()], None)?;
        assert_eq!(mesg.signature.as_str(), "as");
        assert_eq!(mesg.data, vec![0, 0, 0, 0]);

        let mesg = encode(&[Dict::default().into()], Some(&sig("a{sv}")?))?;
        assert_eq!(mesg.data, vec![0, 0, 0, 0, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn declared_signature_conflicts() -> Result<()> {
        let array = Array::with_signature(vec![1i32.into()], sig("i")?)?;
        let e = encode(&[array.into()], Some(&sig("ax")?)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn byte_arrays() -> Result<()> {
        let mesg = encode(&[ByteArray::new(b"hi".to_vec()).into()], None)?;
        assert_eq!(mesg.signature.as_str(), "ay");
        assert_eq!(mesg.data, vec![2, 0, 0, 0, b'h', b'i']);
        Ok(())
    }

    #[test]
    fn big_endian() -> Result<()> {
        let options = EncodeOptions::new().endianness(Endianness::Big);
        let mesg = encode_with(&[Value::from(1u32)], None, &options)?;
        assert_eq!(mesg.endianness, Endianness::Big);
        assert_eq!(mesg.data, vec![0, 0, 0, 1]);
        Ok(())
    }

    #[test]
    fn unix_fds() -> Result<()> {
        let mesg = encode(&[UnixFd::new(4)?.into(), Value::from(9i32)], Some(&sig("hh")?))?;
        assert_eq!(mesg.fds, vec![4, 9]);
        assert_eq!(mesg.data, vec![0, 0, 0, 0, 1, 0, 0, 0]);
        assert!(encode(&[Value::from(-1i32)], Some(&sig("h")?)).is_err());
        Ok(())
    }

    #[test]
    fn too_many_variant_layers() {
        let deep = Value::from(1u8).with_variant_level(100);
        let e = encode(&[deep], None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Malformed);
    }
}
