use super::{Basic, WireOrder, MAX_ARRAY_LENGTH, MAX_TOTAL_DEPTH};
use crate::align::align;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::names::validate_object_path;
use crate::signature::{self, complete_type_end, Signature, TypeCode};
use crate::value::validate_dbus_string;

use log::{error, trace};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::os::unix::io::RawFd;
use std::str::from_utf8;

/// The bytes of a message body and the read position within them, shared
/// by every [`MessageIter`] walking the body.
pub struct DataBuffer<'de> {
    data: &'de [u8],
    data_ix: usize,
    fds: &'de [RawFd],
}

impl<'de> DataBuffer<'de> {
    pub fn new(data: &'de [u8], fds: &'de [RawFd]) -> Self {
        Self {
            data,
            data_ix: 0,
            fds,
        }
    }

    pub fn from_message(mesg: &'de Message) -> Self {
        Self::new(&mesg.data, &mesg.fds)
    }

    pub fn position(&self) -> usize {
        self.data_ix
    }

    /// Fails if any of the body was left unread.
    pub fn complete(self) -> Result<()> {
        let leftover_data = self.data.len() - self.data_ix;
        if leftover_data != 0 {
            return Err(Error::LeftoverData(leftover_data));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Scope {
    /// A run of complete types read once each: the body, a struct, a dict
    /// entry or a variant.
    Sequence,
    /// Elements of one complete type, repeated until `end_ix`.
    Array { end_ix: usize },
}

/// Reads values out of a marshaled body following its signature.
///
/// Reading a value advances past it. [`recurse`](MessageIter::recurse)
/// borrows the iterator for the duration of a container, so the parent
/// resumes after the container once the child is dropped.
pub struct MessageIter<'a, 'de, B: WireOrder> {
    buffer: &'a mut DataBuffer<'de>,
    sig: &'de str,
    sig_ix: usize,
    scope: Scope,
    depth: usize,
    phantom: PhantomData<B>,
}

impl<'a, 'de, B: WireOrder> MessageIter<'a, 'de, B> {
    /// Iterates over a body with the given signature.
    pub fn new(buffer: &'a mut DataBuffer<'de>, signature: &'de Signature) -> Self {
        Self {
            buffer,
            sig: signature.as_str(),
            sig_ix: 0,
            scope: Scope::Sequence,
            depth: 0,
            phantom: PhantomData,
        }
    }

    pub fn has_next(&self) -> bool {
        match self.scope {
            Scope::Sequence => self.sig_ix < self.sig.len(),
            Scope::Array { end_ix } => self.buffer.data_ix < end_ix,
        }
    }

    /// Type of the value about to be read, or `None` at the end.
    pub fn arg_type(&self) -> Option<TypeCode> {
        if !self.has_next() {
            return None;
        }
        let ix = match self.scope {
            Scope::Sequence => self.sig_ix,
            Scope::Array { .. } => 0,
        };
        self.sig.as_bytes().get(ix).copied().and_then(TypeCode::from_u8)
    }

    /// Single complete type of the value about to be read.
    pub fn current_signature(&self) -> Option<Signature> {
        if !self.has_next() {
            return None;
        }
        match self.scope {
            Scope::Sequence => {
                let end = complete_type_end(self.sig.as_bytes(), self.sig_ix);
                Some(Signature::from_validated(&self.sig[self.sig_ix..end]))
            }
            Scope::Array { .. } => Some(Signature::from_validated(self.sig)),
        }
    }

    /// Type of the elements of the array being iterated.
    pub fn element_signature(&self) -> Option<Signature> {
        match self.scope {
            Scope::Array { .. } => Some(Signature::from_validated(self.sig)),
            Scope::Sequence => None,
        }
    }

    /// Every remaining type of a struct, dict entry or variant, as read off
    /// the wire.
    pub fn signature(&self) -> &'de str {
        self.sig
    }

    pub fn position(&self) -> usize {
        self.buffer.data_ix
    }

    fn take_sig(&mut self) -> Result<&'de str> {
        match self.scope {
            Scope::Sequence => {
                if self.sig_ix >= self.sig.len() {
                    return Err(Error::mismatch(format_args!(
                        "signature {:?} exhausted",
                        self.sig
                    )));
                }
                let start = self.sig_ix;
                self.sig_ix = complete_type_end(self.sig.as_bytes(), start);
                Ok(&self.sig[start..self.sig_ix])
            }
            Scope::Array { end_ix } => {
                if self.buffer.data_ix >= end_ix {
                    return Err(Error::ArrayElementOverrun(self.buffer.data_ix, end_ix));
                }
                Ok(self.sig)
            }
        }
    }

    fn read(&mut self, len: usize) -> Result<&'de [u8]> {
        let old_ix = self.buffer.data_ix;
        let new_ix = old_ix.saturating_add(len);
        // Index after the read must be valid for the read to be valid.
        if new_ix > self.buffer.data.len() {
            error!(
                "read of {} bytes at {} runs past end of {} byte body",
                len,
                old_ix,
                self.buffer.data.len()
            );
            return Err(Error::IndexOutOfBounds(new_ix));
        }
        self.buffer.data_ix = new_ix;
        Ok(&self.buffer.data[old_ix..new_ix])
    }

    fn align_reader(&mut self, alignment: usize) -> Result<()> {
        let start = self.buffer.data_ix;
        let pad = self.read(align(start, alignment) - start)?;
        if let Some(bad) = pad.iter().position(|b| *b != 0) {
            error!("non-zero padding at {}", start + bad);
            return Err(Error::NonZeroPadding(start + bad));
        }
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.align_reader(4)?;
        Ok(B::read_u32(self.read(4)?))
    }

    fn read_nul(&mut self) -> Result<()> {
        let ix = self.buffer.data_ix;
        if self.read(1)? != [0] {
            return Err(Error::MissingNul(ix));
        }
        Ok(())
    }

    fn read_str(&mut self) -> Result<&'de str> {
        let size = self.read_u32()? as usize;
        trace!("string of {} bytes at {}", size, self.buffer.data_ix);
        let bytes = self.read(size)?;
        self.read_nul()?;
        let text = from_utf8(bytes)?;
        validate_dbus_string(text)?;
        Ok(text)
    }

    fn read_signature(&mut self) -> Result<&'de str> {
        let size = self.read(1)?[0] as usize;
        let bytes = self.read(size)?;
        self.read_nul()?;
        let text = from_utf8(bytes)?;
        signature::validate(text)?;
        Ok(text)
    }

    /// Reads the next value, which must be of a basic type.
    pub fn get_basic(&mut self) -> Result<Basic<'de>> {
        let sig = self.take_sig()?;
        let first = sig.as_bytes().first().copied().unwrap_or_default();
        let code = TypeCode::from_u8(first).ok_or(Error::UnrecognizedTypeCode(first))?;
        if !code.is_basic() {
            return Err(Error::mismatch(format_args!(
                "expected a basic type, found {:?}",
                sig
            )));
        }
        self.align_reader(code.alignment())?;
        trace!("read '{}' at {}", code, self.buffer.data_ix);
        let value = match code {
            TypeCode::Byte => Basic::Byte(self.read(1)?[0]),
            TypeCode::Boolean => match self.read_u32()? {
                0 => Basic::Boolean(false),
                1 => Basic::Boolean(true),
                other => return Err(Error::InvalidBoolValue(other)),
            },
            TypeCode::Int16 => Basic::Int16(B::read_i16(self.read(2)?)),
            TypeCode::UInt16 => Basic::UInt16(B::read_u16(self.read(2)?)),
            TypeCode::Int32 => Basic::Int32(B::read_i32(self.read(4)?)),
            TypeCode::UInt32 => Basic::UInt32(self.read_u32()?),
            TypeCode::Int64 => Basic::Int64(B::read_i64(self.read(8)?)),
            TypeCode::UInt64 => Basic::UInt64(B::read_u64(self.read(8)?)),
            TypeCode::Double => Basic::Double(B::read_f64(self.read(8)?)),
            TypeCode::String => Basic::String(self.read_str()?),
            TypeCode::ObjectPath => {
                let path = self.read_str()?;
                validate_object_path(path)?;
                Basic::ObjectPath(path)
            }
            TypeCode::Signature => Basic::Signature(self.read_signature()?),
            TypeCode::UnixFd => {
                let index = self.read_u32()?;
                let fd = self
                    .buffer
                    .fds
                    .get(index as usize)
                    .copied()
                    .ok_or(Error::MissingUnixFd(index))?;
                Basic::UnixFd(fd)
            }
            other => {
                return Err(Error::mismatch(format_args!(
                    "expected a basic type, found '{}'",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// Reads an entire `ay` at once.
    pub fn read_byte_array(&mut self) -> Result<&'de [u8]> {
        if self.current_signature().as_ref().map(Signature::as_str) != Some("ay") {
            return Err(Error::mismatch(format_args!(
                "expected a byte array, found {:?}",
                self.current_signature()
            )));
        }
        self.take_sig()?;
        let len = self.read_u32()? as usize;
        if len > MAX_ARRAY_LENGTH {
            return Err(Error::ArrayTooLong(len));
        }
        self.read(len)
    }

    /// Enters the container about to be read.
    pub fn recurse<'b>(&'b mut self) -> Result<MessageIter<'b, 'de, B>> {
        let sig = self.take_sig()?;
        let depth = self.depth + 1;
        if depth > MAX_TOTAL_DEPTH {
            return Err(Error::NestingTooDeep(MAX_TOTAL_DEPTH));
        }
        let (sig, scope) = match sig.as_bytes()[0] {
            b'a' => {
                let len = self.read_u32()? as usize;
                if len > MAX_ARRAY_LENGTH {
                    return Err(Error::ArrayTooLong(len));
                }
                let element = &sig[1..];
                let alignment = element
                    .bytes()
                    .next()
                    .and_then(TypeCode::from_u8)
                    .map(TypeCode::alignment)
                    .unwrap_or(1);
                self.align_reader(alignment)?;
                let end_ix = self.buffer.data_ix + len;
                if end_ix > self.buffer.data.len() {
                    return Err(Error::IndexOutOfBounds(end_ix));
                }
                trace!("array of {} bytes at {}", len, self.buffer.data_ix);
                (element, Scope::Array { end_ix })
            }
            b'(' | b'{' => {
                self.align_reader(8)?;
                (&sig[1..sig.len() - 1], Scope::Sequence)
            }
            b'v' => {
                let contained = self.read_signature()?;
                if complete_type_end(contained.as_bytes(), 0) != contained.len()
                    || contained.is_empty()
                {
                    return Err(Error::invalid_signature(
                        contained,
                        "variant must hold a single complete type",
                    ));
                }
                trace!("variant of {:?} at {}", contained, self.buffer.data_ix);
                (contained, Scope::Sequence)
            }
            _ => {
                return Err(Error::mismatch(format_args!(
                    "expected a container, found {:?}",
                    sig
                )))
            }
        };
        Ok(MessageIter {
            buffer: &mut *self.buffer,
            sig,
            sig_ix: 0,
            scope,
            depth,
            phantom: PhantomData,
        })
    }

    /// Skips the value about to be read. Returns whether another follows.
    pub fn next(&mut self) -> Result<bool> {
        match self.arg_type() {
            None => return Ok(false),
            Some(code) if code.is_basic() => {
                self.get_basic()?;
            }
            Some(_) => self.recurse()?.finish()?,
        }
        Ok(self.has_next())
    }

    /// Leaves a container, skipping whatever was not read.
    pub fn finish(mut self) -> Result<()> {
        match self.scope {
            Scope::Sequence => {
                while self.next()? {}
                Ok(())
            }
            Scope::Array { end_ix } => match self.buffer.data_ix.cmp(&end_ix) {
                Ordering::Greater => Err(Error::ArrayElementOverrun(self.buffer.data_ix, end_ix)),
                _ => {
                    self.buffer.data_ix = end_ix;
                    Ok(())
                }
            },
        }
    }
}
