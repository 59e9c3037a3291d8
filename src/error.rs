use std::collections::TryReserveError;
use std::fmt::Display;
use std::str::Utf8Error;

use serde::{de, ser};

pub type Result<T> = std::result::Result<T, Error>;

/// The broad category an [`Error`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed signature, object path, or bus/interface/member name.
    Validation,
    /// Integer outside the range of its declared width.
    Range,
    /// Signature and values do not fit together.
    EncodingMismatch,
    /// String payload that is not acceptable D-Bus UTF-8.
    Unicode,
    /// Buffer allocation failed.
    ResourceExhaustion,
    /// Wire data that violates the marshaling format.
    Malformed,
    /// Custom error raised through the serde bridge.
    Conversion,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid signature {signature:?}: {reason}")]
    InvalidSignature { signature: String, reason: String },
    #[error("invalid object path {path:?}: {reason}")]
    InvalidObjectPath { path: String, reason: &'static str },
    #[error("invalid {kind} {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },
    #[error("value {value} out of range for {type_name}")]
    OutOfRange {
        value: i128,
        type_name: &'static str,
    },
    #[error("{0}")]
    EncodingMismatch(String),
    #[error("invalid string {string:?}: {reason}")]
    InvalidString { string: String, reason: String },
    #[error("string is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("unable to allocate {0} bytes for message buffer")]
    NoMemory(usize),
    #[error("read past end of message at offset {0}")]
    IndexOutOfBounds(usize),
    #[error("{0} bytes of data left over after decoding")]
    LeftoverData(usize),
    #[error("invalid boolean value {0}")]
    InvalidBoolValue(u32),
    #[error("non-zero padding byte at offset {0}")]
    NonZeroPadding(usize),
    #[error("missing nul terminator at offset {0}")]
    MissingNul(usize),
    #[error("array of {0} bytes exceeds the maximum array length")]
    ArrayTooLong(usize),
    #[error("array element overran end of array: {0} > {1}")]
    ArrayElementOverrun(usize, usize),
    #[error("unrecognized type code {0:#04x}")]
    UnrecognizedTypeCode(u8),
    #[error("containers nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("unix fd index {0} not present in message")]
    MissingUnixFd(u32),
    #[error("error serializing: {0}")]
    Serializing(String),
    #[error("error deserializing: {0}")]
    Deserializing(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidSignature { .. }
            | Error::InvalidObjectPath { .. }
            | Error::InvalidName { .. } => ErrorKind::Validation,
            Error::OutOfRange { .. } => ErrorKind::Range,
            Error::EncodingMismatch(_) | Error::UnrecognizedTypeCode(_) => {
                ErrorKind::EncodingMismatch
            }
            Error::InvalidString { .. } | Error::Utf8(_) => ErrorKind::Unicode,
            Error::NoMemory(_) => ErrorKind::ResourceExhaustion,
            Error::IndexOutOfBounds(_)
            | Error::LeftoverData(_)
            | Error::InvalidBoolValue(_)
            | Error::NonZeroPadding(_)
            | Error::MissingNul(_)
            | Error::ArrayTooLong(_)
            | Error::ArrayElementOverrun(..)
            | Error::NestingTooDeep(_)
            | Error::MissingUnixFd(_) => ErrorKind::Malformed,
            Error::Serializing(_) | Error::Deserializing(_) => ErrorKind::Conversion,
        }
    }

    pub(crate) fn mismatch(msg: impl Display) -> Self {
        Error::EncodingMismatch(msg.to_string())
    }

    pub(crate) fn invalid_signature(signature: &str, reason: impl Display) -> Self {
        Error::InvalidSignature {
            signature: signature.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn no_memory(requested: usize, _: TryReserveError) -> Self {
        Error::NoMemory(requested)
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Serializing(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Deserializing(msg.to_string())
    }
}
