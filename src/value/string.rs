use crate::error::{Error, Result};
use crate::names::validate_object_path;
use crate::signature::Signature;

use std::fmt;
use std::str::from_utf8;

/// Checks that `text` is acceptable as the payload of a D-Bus string: no
/// embedded nul and no Unicode noncharacters. Surrogates cannot occur in a
/// Rust `str`.
pub(crate) fn validate_dbus_string(text: &str) -> Result<()> {
    for (ix, c) in text.char_indices() {
        let reason = if c == '\0' {
            "embedded nul"
        } else if is_noncharacter(c) {
            "noncharacter code point"
        } else {
            continue;
        };
        return Err(Error::InvalidString {
            string: text.to_owned(),
            reason: format!("{} U+{:04X} at byte {}", reason, c as u32, ix),
        });
    }
    Ok(())
}

fn is_noncharacter(c: char) -> bool {
    let c = c as u32;
    (0xFDD0..=0xFDEF).contains(&c) || (c & 0xFFFE) == 0xFFFE
}

/// A UTF-8 string, `s`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Str {
    value: String,
    pub(super) variant_level: u32,
}

impl Str {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            variant_level: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl From<String> for Str {
    fn from(value: String) -> Self {
        Str::new(value)
    }
}

impl From<&str> for Str {
    fn from(value: &str) -> Self {
        Str::new(value)
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A string kept in its raw UTF-8 encoded form. Marshals exactly like
/// [`Str`]; decoding produces it when `utf8_strings` is requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Utf8String {
    bytes: Vec<u8>,
    pub(super) variant_level: u32,
}

impl Utf8String {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        from_utf8(&bytes)?;
        Ok(Self {
            bytes,
            variant_level: 0,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        // checked in new()
        from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// An object path, `o`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath {
    path: String,
    pub(super) variant_level: u32,
}

impl ObjectPath {
    /// Validates `path` against the object path grammar.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_object_path(&path)?;
        Ok(Self {
            path,
            variant_level: 0,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn into_string(self) -> String {
        self.path
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A signature carried as a value, `g`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SignatureValue {
    signature: Signature,
    pub(super) variant_level: u32,
}

impl SignatureValue {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Ok(Signature::new(text)?.into())
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn into_signature(self) -> Signature {
        self.signature
    }
}

impl From<Signature> for SignatureValue {
    fn from(signature: Signature) -> Self {
        Self {
            signature,
            variant_level: 0,
        }
    }
}
