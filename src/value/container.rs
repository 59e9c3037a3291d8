use super::Value;
use crate::error::{Error, Result};
use crate::guess::guess_value_signature;
use crate::signature::Signature;

use std::collections::HashMap;
use std::os::unix::io::RawFd;

/// Declared signatures only take part in equality when both sides declare
/// one; an undeclared signature can always be derived again.
fn signatures_agree<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn expect_single_type(signature: &Signature, what: &str) -> Result<()> {
    if signature.is_single_complete_type() {
        Ok(())
    } else {
        Err(Error::invalid_signature(
            signature.as_str(),
            format_args!("{} must be a single complete type", what),
        ))
    }
}

/// An array of bytes, `ay`, kept as one contiguous blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteArray {
    bytes: Vec<u8>,
    pub(super) variant_level: u32,
}

impl ByteArray {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            variant_level: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(bytes: Vec<u8>) -> Self {
        ByteArray::new(bytes)
    }
}

impl From<&[u8]> for ByteArray {
    fn from(bytes: &[u8]) -> Self {
        ByteArray::new(bytes)
    }
}

/// A homogeneous array. The element signature may be declared up front or
/// left to be guessed from the first element when the array is sent.
#[derive(Clone, Debug, Default)]
pub struct Array {
    items: Vec<Value>,
    element_signature: Option<Signature>,
    pub(super) variant_level: u32,
}

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            element_signature: None,
            variant_level: 0,
        }
    }

    pub fn with_signature(items: Vec<Value>, element: Signature) -> Result<Self> {
        expect_single_type(&element, "array element")?;
        Signature::array_of(&element)?;
        Ok(Self {
            items,
            element_signature: Some(element),
            variant_level: 0,
        })
    }

    pub fn push(&mut self, item: impl Into<Value>) {
        self.items.push(item.into());
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn declared_signature(&self) -> Option<&Signature> {
        self.element_signature.as_ref()
    }

    /// The declared element signature, or the one guessed from the first
    /// element.
    pub fn element_signature(&self) -> Result<Signature> {
        if let Some(sig) = &self.element_signature {
            return Ok(sig.clone());
        }
        match self.items.first() {
            Some(first) => guess_value_signature(first),
            None => Err(Error::mismatch(
                "cannot guess the element signature of an empty Array; declare one",
            )),
        }
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.variant_level == other.variant_level
            && self.items == other.items
            && signatures_agree(
                self.element_signature.as_ref(),
                other.element_signature.as_ref(),
            )
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Array::new(items)
    }
}

/// A basic-typed dict key in hashable form. Doubles compare by their bits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum KeyKind {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(u64),
    String(String),
    Utf8String(Vec<u8>),
    ObjectPath(String),
    Signature(String),
    UnixFd(RawFd),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DictKey {
    kind: KeyKind,
    variant_level: u32,
}

impl DictKey {
    /// `None` for container keys, which never appear in a valid dict.
    fn of(value: &Value) -> Option<DictKey> {
        let kind = match value {
            Value::Byte(v) => KeyKind::Byte(v.get()),
            Value::Boolean(v) => KeyKind::Boolean(v.get()),
            Value::Int16(v) => KeyKind::Int16(v.get()),
            Value::UInt16(v) => KeyKind::UInt16(v.get()),
            Value::Int32(v) => KeyKind::Int32(v.get()),
            Value::UInt32(v) => KeyKind::UInt32(v.get()),
            Value::Int64(v) => KeyKind::Int64(v.get()),
            Value::UInt64(v) => KeyKind::UInt64(v.get()),
            Value::Double(v) => KeyKind::Double(v.get().to_bits()),
            Value::String(v) => KeyKind::String(v.as_str().to_owned()),
            Value::Utf8String(v) => KeyKind::Utf8String(v.as_bytes().to_vec()),
            Value::ObjectPath(v) => KeyKind::ObjectPath(v.as_str().to_owned()),
            Value::Signature(v) => KeyKind::Signature(v.signature().as_str().to_owned()),
            Value::UnixFd(v) => KeyKind::UnixFd(v.get()),
            _ => return None,
        };
        Some(DictKey {
            kind,
            variant_level: value.variant_level(),
        })
    }
}

/// A mapping from basic-typed keys to values of one type, `a{kv}`.
///
/// Entries keep their insertion order; equality ignores it. Basic keys are
/// looked up through a hash index, so building a dict of `n` entries is
/// linear in `n`.
#[derive(Clone, Debug, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<DictKey, usize>,
    signature: Option<(Signature, Signature)>,
    pub(super) variant_level: u32,
}

impl Dict {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        let mut dict = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
            ..Self::default()
        };
        for (key, value) in entries {
            dict.insert(key, value);
        }
        dict
    }

    pub fn with_signature(
        entries: Vec<(Value, Value)>,
        key: Signature,
        value: Signature,
    ) -> Result<Self> {
        expect_single_type(&key, "dict key")?;
        expect_single_type(&value, "dict value")?;
        Signature::dict_of(&key, &value)?;
        let mut dict = Dict::new(entries);
        dict.signature = Some((key, value));
        Ok(dict)
    }

    fn position(&self, key: &Value) -> Option<usize> {
        match DictKey::of(key) {
            Some(k) => self.index.get(&k).copied(),
            // Container keys only ever equal other container keys.
            None => self.entries.iter().position(|(k, _)| k == key),
        }
    }

    /// Inserts an entry, returning the value previously stored under an
    /// equal key.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(ix) = self.position(&key) {
            return Some(std::mem::replace(&mut self.entries[ix].1, value));
        }
        if let Some(k) = DictKey::of(&key) {
            self.index.insert(k, self.entries.len());
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.position(key).map(|ix| &self.entries[ix].1)
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(Value, Value)> {
        self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (Value, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn declared_signature(&self) -> Option<(&Signature, &Signature)> {
        self.signature.as_ref().map(|(k, v)| (k, v))
    }

    /// The declared key and value signatures, or the ones guessed from the
    /// first entry.
    pub fn key_value_signatures(&self) -> Result<(Signature, Signature)> {
        if let Some((key, value)) = &self.signature {
            return Ok((key.clone(), value.clone()));
        }
        match self.entries.first() {
            Some((key, value)) => Ok((guess_value_signature(key)?, guess_value_signature(value)?)),
            None => Err(Error::mismatch(
                "cannot guess the key and value signatures of an empty Dict; declare them",
            )),
        }
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.variant_level == other.variant_level
            && self.entries.len() == other.entries.len()
            && signatures_agree(self.signature.as_ref(), other.signature.as_ref())
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

/// A fixed-length heterogeneous sequence, `(...)`. Never empty.
#[derive(Clone, Debug)]
pub struct Struct {
    items: Vec<Value>,
    signature: Option<Signature>,
    pub(super) variant_level: u32,
}

impl Struct {
    pub fn new(items: Vec<Value>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::mismatch("D-Bus structs must have at least one field"));
        }
        Ok(Self {
            items,
            signature: None,
            variant_level: 0,
        })
    }

    /// `fields` is the sequence of field types, without the parentheses.
    pub fn with_signature(items: Vec<Value>, fields: Signature) -> Result<Self> {
        let mut st = Struct::new(items)?;
        Signature::struct_of(&[fields.clone()])?;
        st.signature = Some(fields);
        Ok(st)
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn declared_signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// The declared field signatures, or the ones guessed from every field.
    pub fn field_signatures(&self) -> Result<Signature> {
        if let Some(sig) = &self.signature {
            return Ok(sig.clone());
        }
        let fields = self
            .items
            .iter()
            .map(guess_value_signature)
            .collect::<Result<Vec<_>>>()?;
        Signature::concat(&fields)
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.variant_level == other.variant_level
            && self.items == other.items
            && signatures_agree(self.signature.as_ref(), other.signature.as_ref())
    }
}

/// An explicit variant wrapper around exactly one value, `v`.
///
/// A `Variant` stands for one layer of wrapping; its own `variant_level`
/// counts further layers around it.
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    inner: Box<Value>,
    signature: Signature,
    pub(super) variant_level: u32,
}

impl Variant {
    /// Wraps `inner`, guessing its signature.
    pub fn new(inner: impl Into<Value>) -> Result<Self> {
        let inner = inner.into();
        let signature = guess_value_signature(&inner)?;
        Ok(Self {
            inner: Box::new(inner),
            signature,
            variant_level: 0,
        })
    }

    pub fn with_signature(inner: impl Into<Value>, signature: Signature) -> Result<Self> {
        expect_single_type(&signature, "variant contents")?;
        Ok(Self {
            inner: Box::new(inner.into()),
            signature,
            variant_level: 0,
        })
    }

    pub fn inner(&self) -> &Value {
        &self.inner
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn into_inner(self) -> Value {
        *self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::value::{Int32, Str};
    use test_log::test;

    #[test]
    fn array_signature_is_lazy() -> Result<()> {
        let mut array = Array::new(vec![]);
        assert_eq!(
            array.element_signature().unwrap_err().kind(),
            ErrorKind::EncodingMismatch
        );
        array.push(3i32);
        assert_eq!(array.element_signature()?.as_str(), "i");

        let declared = Array::with_signature(vec![], Signature::new("s")?)?;
        assert_eq!(declared.element_signature()?.as_str(), "s");
        assert!(Array::with_signature(vec![], Signature::new("ss")?).is_err());
        Ok(())
    }

    #[test]
    fn array_equality_ignores_undeclared_signature() -> Result<()> {
        let plain = Array::new(vec![Value::from(1i32)]);
        let declared = Array::with_signature(vec![Value::from(1i32)], Signature::new("i")?)?;
        assert_eq!(plain, declared);
        Ok(())
    }

    #[test]
    fn dict_insert_and_order_free_equality() -> Result<()> {
        let mut a = Dict::default();
        assert!(a.insert("a", 1i32).is_none());
        a.insert("b", 2i32);
        assert_eq!(a.insert("a", 3i32), Some(Value::from(1i32)));
        assert_eq!(a.len(), 2);

        let b = Dict::new(vec![
            (Value::from("b"), Value::from(2i32)),
            (Value::from("a"), Value::from(3i32)),
        ]);
        assert_eq!(a, b);
        assert_eq!(b.get(&Value::from("a")), Some(&Value::from(Int32::from(3))));

        let (k, v) = a.key_value_signatures()?;
        assert_eq!((k.as_str(), v.as_str()), ("s", "i"));
        assert!(Dict::default().key_value_signatures().is_err());
        Ok(())
    }

    #[test]
    fn dict_keys_are_indexed_by_kind_and_level() -> Result<()> {
        let mut dict = Dict::default();
        dict.insert(1u32, "u");
        dict.insert(1i32, "i");
        dict.insert(Value::from(1u32).with_variant_level(1), "v");
        dict.insert(0.5, "d");
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.get(&Value::from(1u32)), Some(&Value::from("u")));
        assert_eq!(dict.get(&Value::from(1i32)), Some(&Value::from("i")));
        assert_eq!(dict.get(&Value::from(0.5)), Some(&Value::from("d")));
        assert_eq!(dict.get(&Value::from(2u32)), None);

        assert_eq!(dict.insert(0.5, "e"), Some(Value::from("d")));
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.entries()[3].1, Value::from("e"));
        Ok(())
    }

    #[test]
    fn large_dict_builds_quickly() {
        let n = 200_000u32;
        let dict = Dict::new((0..n).map(|i| (Value::from(i), Value::from(i))).collect());
        assert_eq!(dict.len(), n as usize);
        assert_eq!(dict.get(&Value::from(n - 1)), Some(&Value::from(n - 1)));
        assert_eq!(dict, dict.clone());
    }

    #[test]
    fn dict_key_must_be_single_type() -> Result<()> {
        assert!(Dict::with_signature(vec![], Signature::new("s")?, Signature::new("v")?).is_ok());
        assert!(Dict::with_signature(vec![], Signature::new("ai")?, Signature::new("v")?).is_err());
        assert!(Dict::with_signature(vec![], Signature::new("ss")?, Signature::new("v")?).is_err());
        Ok(())
    }

    #[test]
    fn struct_signature_guessed_from_every_field() -> Result<()> {
        let st = Struct::new(vec![Value::from(1i32), Value::from(Str::new("a"))])?;
        assert_eq!(st.field_signatures()?.as_str(), "is");
        Ok(())
    }

    #[test]
    fn variant_guesses_inner_signature() -> Result<()> {
        let v = Variant::new(5u16)?;
        assert_eq!(v.signature().as_str(), "q");
        let nested = Variant::new(Value::from(5u16).with_variant_level(1))?;
        assert_eq!(nested.signature().as_str(), "v");
        assert!(Variant::with_signature(5u16, Signature::new("qq")?).is_err());
        Ok(())
    }
}
