//! The wire-format primitives the encoder and decoder are driven over.
//!
//! [`MessageWriter`] appends basic values and opens and closes containers;
//! [`MessageIter`] walks a marshaled body, reading basic values and
//! recursing into containers. Neither knows anything about [`Value`]s; they
//! only know the D-Bus marshaling format: alignment, length prefixes,
//! nul-terminated strings and out-of-band file descriptors.
//!
//! [`Value`]: crate::value::Value

use crate::message::Endianness;
use crate::signature::TypeCode;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::os::unix::io::RawFd;

mod reader;
mod writer;

pub use reader::{DataBuffer, MessageIter};
pub use writer::{ContainerHandle, MessageWriter};

/// Longest permitted array, in bytes.
pub const MAX_ARRAY_LENGTH: usize = 64 * 1024 * 1024;

/// Deepest permitted nesting of containers of any kind, variants included.
pub const MAX_TOTAL_DEPTH: usize = 64;

/// A byte order the wire format supports.
pub trait WireOrder: ByteOrder {
    const ENDIANNESS: Endianness;
}

impl WireOrder for LittleEndian {
    const ENDIANNESS: Endianness = Endianness::Little;
}

impl WireOrder for BigEndian {
    const ENDIANNESS: Endianness = Endianness::Big;
}

/// The containers the writer can open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Struct,
    DictEntry,
    Variant,
}

impl ContainerKind {
    pub fn type_code(self) -> TypeCode {
        match self {
            ContainerKind::Array => TypeCode::Array,
            ContainerKind::Struct => TypeCode::Struct,
            ContainerKind::DictEntry => TypeCode::DictEntry,
            ContainerKind::Variant => TypeCode::Variant,
        }
    }
}

/// A single basic value as it is written to or read from the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Basic<'a> {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(&'a str),
    ObjectPath(&'a str),
    Signature(&'a str),
    UnixFd(RawFd),
}

impl<'a> Basic<'a> {
    pub fn type_code(&self) -> TypeCode {
        match self {
            Basic::Byte(_) => TypeCode::Byte,
            Basic::Boolean(_) => TypeCode::Boolean,
            Basic::Int16(_) => TypeCode::Int16,
            Basic::UInt16(_) => TypeCode::UInt16,
            Basic::Int32(_) => TypeCode::Int32,
            Basic::UInt32(_) => TypeCode::UInt32,
            Basic::Int64(_) => TypeCode::Int64,
            Basic::UInt64(_) => TypeCode::UInt64,
            Basic::Double(_) => TypeCode::Double,
            Basic::String(_) => TypeCode::String,
            Basic::ObjectPath(_) => TypeCode::ObjectPath,
            Basic::Signature(_) => TypeCode::Signature,
            Basic::UnixFd(_) => TypeCode::UnixFd,
        }
    }
}
