//! D-Bus type signatures.
//!
//! A [`Signature`] is a validated string of zero or more *single complete
//! types*. `"ii"` is two complete types, `"(ii)"` is one, and the empty
//! signature is the valid signature of an empty argument list. Signatures
//! are validated once, when constructed, and are immutable afterwards, so
//! iterating one with [`Signature::iter`] never fails and can be restarted
//! at will.

use crate::error::{Error, Result};

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// Longest signature the wire format can carry.
pub const MAX_SIGNATURE_LENGTH: usize = 255;

/// Deepest permitted nesting of arrays.
pub const MAX_ARRAY_DEPTH: usize = 32;

/// Deepest permitted nesting of structs and dict entries.
pub const MAX_STRUCT_DEPTH: usize = 32;

/// The type code of a single element of a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    UnixFd,
    Array,
    Struct,
    DictEntry,
    Variant,
}

impl TypeCode {
    pub fn from_u8(code: u8) -> Option<TypeCode> {
        let code = match code {
            b'y' => TypeCode::Byte,
            b'b' => TypeCode::Boolean,
            b'n' => TypeCode::Int16,
            b'q' => TypeCode::UInt16,
            b'i' => TypeCode::Int32,
            b'u' => TypeCode::UInt32,
            b'x' => TypeCode::Int64,
            b't' => TypeCode::UInt64,
            b'd' => TypeCode::Double,
            b's' => TypeCode::String,
            b'o' => TypeCode::ObjectPath,
            b'g' => TypeCode::Signature,
            b'h' => TypeCode::UnixFd,
            b'a' => TypeCode::Array,
            b'(' => TypeCode::Struct,
            b'{' => TypeCode::DictEntry,
            b'v' => TypeCode::Variant,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_u8(self) -> u8 {
        match self {
            TypeCode::Byte => b'y',
            TypeCode::Boolean => b'b',
            TypeCode::Int16 => b'n',
            TypeCode::UInt16 => b'q',
            TypeCode::Int32 => b'i',
            TypeCode::UInt32 => b'u',
            TypeCode::Int64 => b'x',
            TypeCode::UInt64 => b't',
            TypeCode::Double => b'd',
            TypeCode::String => b's',
            TypeCode::ObjectPath => b'o',
            TypeCode::Signature => b'g',
            TypeCode::UnixFd => b'h',
            TypeCode::Array => b'a',
            TypeCode::Struct => b'(',
            TypeCode::DictEntry => b'{',
            TypeCode::Variant => b'v',
        }
    }

    /// Wire alignment of values of this type.
    pub fn alignment(self) -> usize {
        match self {
            TypeCode::Byte => 1,
            TypeCode::Boolean => 4,
            TypeCode::Int16 => 2,
            TypeCode::UInt16 => 2,
            TypeCode::Int32 => 4,
            TypeCode::UInt32 => 4,
            TypeCode::Int64 => 8,
            TypeCode::UInt64 => 8,
            TypeCode::Double => 8,
            TypeCode::String => 4,
            TypeCode::ObjectPath => 4,
            TypeCode::Signature => 1,
            TypeCode::UnixFd => 4,
            TypeCode::Array => 4,
            TypeCode::Struct => 8,
            TypeCode::DictEntry => 8,
            TypeCode::Variant => 1,
        }
    }

    /// Basic types are the ones permitted as dict keys.
    pub fn is_basic(self) -> bool {
        !matches!(
            self,
            TypeCode::Array | TypeCode::Struct | TypeCode::DictEntry | TypeCode::Variant
        )
    }

    /// Fixed types have a constant marshaled size.
    pub fn is_fixed(self) -> bool {
        self.is_basic()
            && !matches!(
                self,
                TypeCode::String | TypeCode::ObjectPath | TypeCode::Signature
            )
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Byte => "byte",
            TypeCode::Boolean => "boolean",
            TypeCode::Int16 => "int16",
            TypeCode::UInt16 => "uint16",
            TypeCode::Int32 => "int32",
            TypeCode::UInt32 => "uint32",
            TypeCode::Int64 => "int64",
            TypeCode::UInt64 => "uint64",
            TypeCode::Double => "double",
            TypeCode::String => "string",
            TypeCode::ObjectPath => "object path",
            TypeCode::Signature => "signature",
            TypeCode::UnixFd => "unix fd",
            TypeCode::Array => "array",
            TypeCode::Struct => "struct",
            TypeCode::DictEntry => "dict entry",
            TypeCode::Variant => "variant",
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.as_u8() as char, self.name())
    }
}

/// A validated D-Bus signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    /// Parses and validates `text`.
    pub fn new(text: impl Into<String>) -> Result<Signature> {
        let text = text.into();
        validate(&text)?;
        Ok(Signature(text))
    }

    /// Wraps text already known to be a valid signature, or a valid part of
    /// one (like the `{sv}` element of `a{sv}`).
    pub(crate) fn from_validated(text: impl Into<String>) -> Signature {
        Signature(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the single complete types of this signature.
    pub fn iter(&self) -> SignatureIter<'_> {
        SignatureIter {
            sig: &self.0,
            ix: 0,
        }
    }

    /// Type code of the first complete type.
    pub fn type_code(&self) -> Option<TypeCode> {
        self.0.bytes().next().and_then(TypeCode::from_u8)
    }

    pub fn is_single_complete_type(&self) -> bool {
        !self.is_empty() && complete_type_end(self.as_bytes(), 0) == self.len()
    }

    /// Element type of an array signature. For dict arrays this is the
    /// `{kv}` dict entry.
    pub fn element_signature(&self) -> Option<Signature> {
        match self.type_code() {
            Some(TypeCode::Array) if self.is_single_complete_type() => {
                Some(Signature::from_validated(&self.0[1..]))
            }
            _ => None,
        }
    }

    /// Field types of a struct or dict entry signature, as a sequence.
    pub fn struct_signature(&self) -> Option<Signature> {
        match self.type_code() {
            Some(TypeCode::Struct) | Some(TypeCode::DictEntry)
                if self.is_single_complete_type() =>
            {
                Some(Signature::from_validated(&self.0[1..self.len() - 1]))
            }
            _ => None,
        }
    }

    /// Key and value types of a dict array signature like `a{sv}`, or of a
    /// bare `{sv}` dict entry.
    pub fn dict_entry_signatures(&self) -> Option<(Signature, Signature)> {
        let entry = match self.type_code()? {
            TypeCode::Array => self.element_signature()?,
            TypeCode::DictEntry => self.clone(),
            _ => return None,
        };
        if entry.type_code() != Some(TypeCode::DictEntry) {
            return None;
        }
        let mut fields = entry.struct_signature()?.into_iter();
        let key = fields.next()?;
        let value = fields.next()?;
        Some((key, value))
    }

    pub fn is_dict(&self) -> bool {
        self.type_code() == Some(TypeCode::Array)
            && self.as_bytes().get(1).copied() == Some(b'{')
    }

    /// Signature of an array whose elements have signature `element`.
    pub fn array_of(element: &Signature) -> Result<Signature> {
        Signature::new(format!("a{}", element))
    }

    /// Signature of a dict with the given key and value types.
    pub fn dict_of(key: &Signature, value: &Signature) -> Result<Signature> {
        Signature::new(format!("a{{{}{}}}", key, value))
    }

    /// Signature of a struct with the given field types.
    pub fn struct_of<'a, I>(fields: I) -> Result<Signature>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let mut text = String::from("(");
        for field in fields {
            text.push_str(field.as_str());
        }
        text.push(')');
        Signature::new(text)
    }

    /// Concatenates complete types into one signature.
    pub fn concat<'a, I>(parts: I) -> Result<Signature>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let text: String = parts.into_iter().map(Signature::as_str).collect();
        Signature::new(text)
    }

    pub(crate) fn basic(code: TypeCode) -> Signature {
        debug_assert!(code.is_basic() || code == TypeCode::Variant);
        Signature(char::from(code.as_u8()).to_string())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Signature> {
        Signature::new(s)
    }
}

impl TryFrom<&str> for Signature {
    type Error = Error;

    fn try_from(s: &str) -> Result<Signature> {
        Signature::new(s)
    }
}

impl TryFrom<String> for Signature {
    type Error = Error;

    fn try_from(s: String) -> Result<Signature> {
        Signature::new(s)
    }
}

impl<'a> IntoIterator for &'a Signature {
    type Item = Signature;
    type IntoIter = SignatureIter<'a>;

    fn into_iter(self) -> SignatureIter<'a> {
        self.iter()
    }
}

impl IntoIterator for Signature {
    type Item = Signature;
    type IntoIter = std::vec::IntoIter<Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

/// Iterator over the single complete types of a [`Signature`].
#[derive(Clone, Debug)]
pub struct SignatureIter<'a> {
    sig: &'a str,
    ix: usize,
}

impl<'a> SignatureIter<'a> {
    /// The unconsumed tail of the signature.
    pub fn remaining(&self) -> &'a str {
        &self.sig[self.ix..]
    }
}

impl<'a> Iterator for SignatureIter<'a> {
    type Item = Signature;

    fn next(&mut self) -> Option<Signature> {
        if self.ix >= self.sig.len() {
            return None;
        }
        let start = self.ix;
        self.ix = complete_type_end(self.sig.as_bytes(), start);
        Some(Signature::from_validated(&self.sig[start..self.ix]))
    }
}

/// End offset of the complete type starting at `start`. The signature must
/// already be validated.
pub(crate) fn complete_type_end(sig: &[u8], start: usize) -> usize {
    let mut nesting = 0usize;
    let mut i = start;
    while i < sig.len() {
        match sig[i] {
            b'a' => {
                i += 1;
                continue;
            }
            b'(' | b'{' => nesting += 1,
            b')' | b'}' => nesting = nesting.saturating_sub(1),
            _ => (),
        }
        i += 1;
        if nesting == 0 {
            return i;
        }
    }
    sig.len()
}

struct Parser<'a> {
    text: &'a str,
    sig: &'a [u8],
    ix: usize,
}

impl<'a> Parser<'a> {
    fn fail<T>(&self, reason: impl fmt::Display) -> Result<T> {
        Err(Error::invalid_signature(
            self.text,
            format_args!("{} at offset {}", reason, self.ix),
        ))
    }

    fn complete_type(&mut self, array_depth: usize, struct_depth: usize) -> Result<TypeCode> {
        let byte = match self.sig.get(self.ix) {
            Some(byte) => *byte,
            None => return self.fail("incomplete type"),
        };
        let code = match TypeCode::from_u8(byte) {
            Some(code) => code,
            None if byte == b')' || byte == b'}' => {
                return self.fail(format_args!("unbalanced {:?}", byte as char))
            }
            None => return self.fail(format_args!("unknown type code {:?}", byte as char)),
        };

        match code {
            TypeCode::Array => {
                if array_depth >= MAX_ARRAY_DEPTH {
                    return self.fail("arrays nested too deeply");
                }
                self.ix += 1;
                if self.sig.get(self.ix) == Some(&b'{') {
                    self.dict_entry(array_depth + 1, struct_depth)?;
                } else {
                    self.complete_type(array_depth + 1, struct_depth)?;
                }
            }
            TypeCode::Struct => {
                if struct_depth >= MAX_STRUCT_DEPTH {
                    return self.fail("structs nested too deeply");
                }
                self.ix += 1;
                if self.sig.get(self.ix) == Some(&b')') {
                    return self.fail("empty struct");
                }
                loop {
                    match self.sig.get(self.ix) {
                        Some(b')') => break,
                        Some(_) => {
                            self.complete_type(array_depth, struct_depth + 1)?;
                        }
                        None => return self.fail("unterminated struct"),
                    }
                }
                self.ix += 1;
            }
            TypeCode::DictEntry => return self.fail("dict entry outside of an array"),
            _ => self.ix += 1,
        }

        Ok(code)
    }

    fn dict_entry(&mut self, array_depth: usize, struct_depth: usize) -> Result<()> {
        if struct_depth >= MAX_STRUCT_DEPTH {
            return self.fail("dict entries nested too deeply");
        }
        self.ix += 1;
        match self.sig.get(self.ix).copied().and_then(TypeCode::from_u8) {
            Some(code) if code.is_basic() => self.ix += 1,
            Some(_) => return self.fail("dict entry key must be a basic type"),
            None if self.sig.get(self.ix) == Some(&b'}') => {
                return self.fail("dict entry must have a key and a value")
            }
            None => return self.fail("invalid dict entry key"),
        }
        match self.sig.get(self.ix) {
            Some(b'}') | None => return self.fail("dict entry must have a key and a value"),
            Some(_) => {
                self.complete_type(array_depth, struct_depth + 1)?;
            }
        }
        if self.sig.get(self.ix) != Some(&b'}') {
            return self.fail("dict entry must have exactly two types");
        }
        self.ix += 1;
        Ok(())
    }
}

pub(crate) fn validate(text: &str) -> Result<()> {
    if text.len() > MAX_SIGNATURE_LENGTH {
        return Err(Error::invalid_signature(
            text,
            format_args!("longer than {} bytes", MAX_SIGNATURE_LENGTH),
        ));
    }
    let mut parser = Parser {
        text,
        sig: text.as_bytes(),
        ix: 0,
    };
    while parser.ix < parser.sig.len() {
        parser.complete_type(0, 0)?;
    }
    Ok(())
}
