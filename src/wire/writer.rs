use super::{Basic, ContainerKind, WireOrder, MAX_ARRAY_LENGTH, MAX_TOTAL_DEPTH};
use crate::align::padding;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::signature::{Signature, TypeCode, MAX_SIGNATURE_LENGTH};

use log::{debug, error, trace};
use std::convert::TryFrom;
use std::marker::PhantomData;
use std::os::unix::io::RawFd;

/// Where an array's length must be backfilled once its contents are known.
///
/// `begin_ix` is after the padding that aligns the first element, which is
/// not counted in the length.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LengthToken {
    fill_ix: usize,
    begin_ix: usize,
}

#[derive(Debug)]
struct OpenContainer {
    kind: ContainerKind,
    restore_len: usize,
    restore_fds: usize,
    length: Option<LengthToken>,
}

/// Proof that a container is open. It must be handed back to
/// [`MessageWriter::close_container`] or
/// [`MessageWriter::abandon_container`], innermost first.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an open container must be closed or abandoned"]
pub struct ContainerHandle {
    depth: usize,
    kind: ContainerKind,
}

impl ContainerHandle {
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }
}

/// Appends marshaled data to a message body.
///
/// Every offset is absolute from the start of the body, so alignment
/// padding is known at the time each value is written.
pub struct MessageWriter<B: WireOrder> {
    data: Vec<u8>,
    fds: Vec<RawFd>,
    open: Vec<OpenContainer>,
    phantom: PhantomData<B>,
}

impl<B: WireOrder> Default for MessageWriter<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: WireOrder> MessageWriter<B> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            fds: Vec::new(),
            open: Vec::new(),
            phantom: PhantomData,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Makes room for `additional` more bytes, failing instead of aborting
    /// when the allocation cannot be satisfied.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.data
            .try_reserve(additional)
            .map_err(|e| Error::no_memory(self.data.len().saturating_add(additional), e))
    }

    fn pad_to(&mut self, alignment: usize) -> Result<()> {
        let pad = padding(self.data.len(), alignment);
        self.write(&[0u8; 8][..pad])
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        B::write_u32(&mut buf, value);
        self.write(&buf)
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        let len = u32::try_from(text.len()).map_err(|_| Error::ArrayTooLong(text.len()))?;
        self.write_u32(len)?;
        self.write(text.as_bytes())?;
        self.write(&[0])
    }

    fn write_signature(&mut self, text: &str) -> Result<()> {
        if text.len() > MAX_SIGNATURE_LENGTH {
            return Err(Error::invalid_signature(text, "too long"));
        }
        self.write(&[text.len() as u8])?;
        self.write(text.as_bytes())?;
        self.write(&[0])
    }

    /// Appends a single basic value, preceded by whatever padding its
    /// alignment requires.
    pub fn append_basic(&mut self, value: Basic<'_>) -> Result<()> {
        let code = value.type_code();
        self.pad_to(code.alignment())?;
        trace!(
            "write '{}' at {}",
            char::from(code.as_u8()),
            self.data.len()
        );
        match value {
            Basic::Byte(v) => self.write(&[v]),
            Basic::Boolean(v) => self.write_u32(v as u32),
            Basic::Int16(v) => {
                let mut buf = [0u8; 2];
                B::write_i16(&mut buf, v);
                self.write(&buf)
            }
            Basic::UInt16(v) => {
                let mut buf = [0u8; 2];
                B::write_u16(&mut buf, v);
                self.write(&buf)
            }
            Basic::Int32(v) => {
                let mut buf = [0u8; 4];
                B::write_i32(&mut buf, v);
                self.write(&buf)
            }
            Basic::UInt32(v) => self.write_u32(v),
            Basic::Int64(v) => {
                let mut buf = [0u8; 8];
                B::write_i64(&mut buf, v);
                self.write(&buf)
            }
            Basic::UInt64(v) => {
                let mut buf = [0u8; 8];
                B::write_u64(&mut buf, v);
                self.write(&buf)
            }
            Basic::Double(v) => {
                let mut buf = [0u8; 8];
                B::write_f64(&mut buf, v);
                self.write(&buf)
            }
            Basic::String(v) | Basic::ObjectPath(v) => self.write_str(v),
            Basic::Signature(v) => self.write_signature(v),
            Basic::UnixFd(fd) => {
                let index = self.fds.len() as u32;
                self.fds.push(fd);
                self.write_u32(index)
            }
        }
    }

    /// Appends an `ay` in one go.
    pub fn append_byte_array(&mut self, bytes: &[u8]) -> Result<()> {
        let sig = Signature::basic(TypeCode::Byte);
        let handle = self.open_container(ContainerKind::Array, Some(&sig))?;
        match self.write(bytes) {
            Ok(()) => self.close_container(handle),
            Err(e) => {
                self.abandon_container(handle);
                Err(e)
            }
        }
    }

    /// Opens a container.
    ///
    /// Arrays take the signature of their element type, variants the
    /// signature of the single complete type they hold. Structs and dict
    /// entries take none.
    pub fn open_container(
        &mut self,
        kind: ContainerKind,
        signature: Option<&Signature>,
    ) -> Result<ContainerHandle> {
        if self.open.len() >= MAX_TOTAL_DEPTH {
            return Err(Error::NestingTooDeep(MAX_TOTAL_DEPTH));
        }
        let restore_len = self.data.len();
        let restore_fds = self.fds.len();
        let result = self.write_container_header(kind, signature);
        let length = match result {
            Ok(length) => length,
            Err(e) => {
                self.data.truncate(restore_len);
                return Err(e);
            }
        };
        debug!(
            "open {:?} at {} (depth {})",
            kind,
            restore_len,
            self.open.len() + 1
        );
        self.open.push(OpenContainer {
            kind,
            restore_len,
            restore_fds,
            length,
        });
        Ok(ContainerHandle {
            depth: self.open.len(),
            kind,
        })
    }

    fn write_container_header(
        &mut self,
        kind: ContainerKind,
        signature: Option<&Signature>,
    ) -> Result<Option<LengthToken>> {
        match kind {
            ContainerKind::Array => {
                let element = single_complete_type(kind, signature)?;
                let alignment = element
                    .type_code()
                    .map(TypeCode::alignment)
                    .ok_or_else(|| Error::invalid_signature(element.as_str(), "empty"))?;
                self.pad_to(kind.type_code().alignment())?;
                let fill_ix = self.data.len();
                self.write(&[0u8; 4])?;
                // Element padding is present even when the array is empty.
                self.pad_to(alignment)?;
                Ok(Some(LengthToken {
                    fill_ix,
                    begin_ix: self.data.len(),
                }))
            }
            ContainerKind::Struct | ContainerKind::DictEntry => {
                if let Some(sig) = signature {
                    return Err(Error::mismatch(format_args!(
                        "{:?} does not take a signature, got {:?}",
                        kind,
                        sig.as_str()
                    )));
                }
                self.pad_to(kind.type_code().alignment())?;
                Ok(None)
            }
            ContainerKind::Variant => {
                let contained = single_complete_type(kind, signature)?;
                self.write_signature(contained.as_str())?;
                Ok(None)
            }
        }
    }

    fn pop(&mut self, handle: ContainerHandle) -> Result<OpenContainer> {
        if handle.depth != self.open.len() {
            return Err(Error::mismatch(format_args!(
                "closing {:?} at depth {} while depth {} is open",
                handle.kind,
                handle.depth,
                self.open.len()
            )));
        }
        self.open
            .pop()
            .ok_or_else(|| Error::mismatch("no container is open"))
    }

    /// Closes the innermost container, backfilling its length if it is an
    /// array.
    pub fn close_container(&mut self, handle: ContainerHandle) -> Result<()> {
        let container = self.pop(handle)?;
        if let Some(LengthToken { fill_ix, begin_ix }) = container.length {
            let length = self.data.len() - begin_ix;
            if length > MAX_ARRAY_LENGTH {
                self.data.truncate(container.restore_len);
                self.fds.truncate(container.restore_fds);
                return Err(Error::ArrayTooLong(length));
            }
            B::write_u32(&mut self.data[fill_ix..fill_ix + 4], length as u32);
        }
        debug!("close {:?} at {}", container.kind, self.data.len());
        Ok(())
    }

    /// Discards everything written since the container was opened, along
    /// with any file descriptors appended inside it.
    pub fn abandon_container(&mut self, handle: ContainerHandle) {
        // Abandon everything opened after `handle` as well.
        let keep = handle.depth.saturating_sub(1).min(self.open.len());
        if let Some(container) = self.open.drain(keep..).next() {
            error!(
                "abandoning {:?} opened at {}, discarding {} bytes",
                container.kind,
                container.restore_len,
                self.data.len() - container.restore_len
            );
            self.data.truncate(container.restore_len);
            self.fds.truncate(container.restore_fds);
        }
    }

    /// Runs `f` inside a freshly opened container, closing it on success
    /// and abandoning it on failure.
    pub fn with_container<T, F>(
        &mut self,
        kind: ContainerKind,
        signature: Option<&Signature>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let handle = self.open_container(kind, signature)?;
        match f(self) {
            Ok(res) => {
                self.close_container(handle)?;
                Ok(res)
            }
            Err(e) => {
                self.abandon_container(handle);
                Err(e)
            }
        }
    }

    /// Completes the body. Every container must have been closed.
    pub fn finish(self, signature: Signature) -> Result<Message> {
        if let Some(container) = self.open.last() {
            return Err(Error::mismatch(format_args!(
                "{:?} opened at {} was never closed",
                container.kind, container.restore_len
            )));
        }
        Ok(Message {
            data: self.data,
            signature,
            endianness: B::ENDIANNESS,
            fds: self.fds,
        })
    }
}

fn single_complete_type(kind: ContainerKind, signature: Option<&Signature>) -> Result<&Signature> {
    match signature {
        Some(sig) if sig.is_single_complete_type() => Ok(sig),
        Some(sig) => Err(Error::invalid_signature(
            sig.as_str(),
            format_args!("{:?} contents must be a single complete type", kind),
        )),
        None => Err(Error::mismatch(format_args!(
            "{:?} requires a signature for its contents",
            kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::message::Endianness;
    use byteorder::{BigEndian, LittleEndian};
    use test_log::test;

    type Writer = MessageWriter<LittleEndian>;

    fn sig(text: &str) -> Result<Signature> {
        Signature::new(text)
    }

    #[test]
    fn variant_of_int() -> Result<()> {
        let mut w = Writer::new();
        w.with_container(ContainerKind::Variant, Some(&sig("i")?), |w| {
            w.append_basic(Basic::Int32(37))
        })?;
        let mesg = w.finish(sig("v")?)?;
        assert_eq!(mesg.data, vec![1, 105, 0, 0, 37, 0, 0, 0]);
        assert_eq!(mesg.endianness, Endianness::Little);
        Ok(())
    }

    #[test]
    fn int_array() -> Result<()> {
        let mut w = Writer::new();
        w.with_container(ContainerKind::Array, Some(&sig("i")?), |w| {
            for i in 1..=4 {
                w.append_basic(Basic::Int32(i))?;
            }
            Ok(())
        })?;
        assert_eq!(
            w.finish(sig("ai")?)?.data,
            vec![16, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0],
            "array of 4 int32s"
        );
        Ok(())
    }

    #[test]
    fn double_array_in_variant() -> Result<()> {
        let mut w = Writer::new();
        let ad = sig("ad")?;
        let d = sig("d")?;
        w.with_container(ContainerKind::Variant, Some(&ad), |w| {
            w.with_container(ContainerKind::Array, Some(&d), |w| {
                for v in &[1.0, 2.0, 3.0, 4.0] {
                    w.append_basic(Basic::Double(*v))?;
                }
                Ok(())
            })
        })?;
        assert_eq!(
            w.finish(sig("v")?)?.data,
            vec![
                2, 97, 100, 0, 32, 0, 0, 0, 0, 0, 0, 0, 0, 0, 240, 63, 0, 0, 0, 0, 0, 0, 0, 64, 0,
                0, 0, 0, 0, 0, 8, 64, 0, 0, 0, 0, 0, 0, 16, 64
            ],
            "length excludes the padding before the first element"
        );
        Ok(())
    }

    #[test]
    fn nested_structs() -> Result<()> {
        let mut w = Writer::new();
        w.with_container(ContainerKind::Struct, None, |w| {
            w.append_basic(Basic::String("Hi"))?;
            w.append_basic(Basic::Double(0.2))?;
            w.with_container(ContainerKind::Struct, None, |w| {
                w.append_basic(Basic::String("Hello"))?;
                w.append_basic(Basic::Double(8.3))
            })
        })?;
        assert_eq!(
            w.finish(sig("(sd(sd))")?)?.data,
            vec![
                2, 0, 0, 0, 72, 105, 0, 0, 154, 153, 153, 153, 153, 153, 201, 63, 5, 0, 0, 0, 72,
                101, 108, 108, 111, 0, 0, 0, 0, 0, 0, 0, 154, 153, 153, 153, 153, 153, 32, 64
            ]
        );
        Ok(())
    }

    #[test]
    fn empty_array_keeps_element_padding() -> Result<()> {
        let mut w = Writer::new();
        w.append_basic(Basic::Int32(1))?;
        w.append_basic(Basic::Byte(9))?;
        let h = w.open_container(ContainerKind::Array, Some(&sig("x")?))?;
        w.close_container(h)?;
        assert_eq!(
            w.finish(sig("iyax")?)?.data,
            vec![1, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        Ok(())
    }

    #[test]
    fn containers_align_to_their_type_code() -> Result<()> {
        assert_eq!(ContainerKind::Array.type_code(), TypeCode::Array);
        assert_eq!(ContainerKind::Struct.type_code(), TypeCode::Struct);
        let mut w = Writer::new();
        w.append_basic(Basic::Byte(7))?;
        w.with_container(ContainerKind::Struct, None, |w| {
            w.append_basic(Basic::Byte(1))?;
            w.append_basic(Basic::Byte(2))
        })?;
        w.append_basic(Basic::Byte(3))?;
        w.with_container(ContainerKind::Array, Some(&sig("y")?), |w| {
            w.append_basic(Basic::Byte(4))
        })?;
        assert_eq!(
            w.finish(sig("y(yy)yay")?)?.data,
            vec![7, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 0, 1, 0, 0, 0, 4]
        );
        Ok(())
    }

    #[test]
    fn big_endian() -> Result<()> {
        let mut w = MessageWriter::<BigEndian>::new();
        w.append_basic(Basic::UInt16(0x0102))?;
        w.append_basic(Basic::Int32(1))?;
        w.append_basic(Basic::Signature("ai"))?;
        let mesg = w.finish(sig("qig")?)?;
        assert_eq!(mesg.data, vec![1, 2, 0, 0, 0, 0, 0, 1, 2, b'a', b'i', 0]);
        assert_eq!(mesg.endianness, Endianness::Big);
        Ok(())
    }

    #[test]
    fn abandon_discards_contents() -> Result<()> {
        let mut w = Writer::new();
        w.append_basic(Basic::Boolean(true))?;
        let outer = w.open_container(ContainerKind::Array, Some(&sig("h")?))?;
        w.append_basic(Basic::UnixFd(5))?;
        let _inner = w.open_container(ContainerKind::Variant, Some(&sig("s")?))?;
        w.abandon_container(outer);
        assert_eq!(w.depth(), 0);
        let mesg = w.finish(sig("b")?)?;
        assert_eq!(mesg.data, vec![1, 0, 0, 0]);
        assert!(mesg.fds.is_empty());
        Ok(())
    }

    #[test]
    fn failing_closure_abandons() -> Result<()> {
        let mut w = Writer::new();
        let res: Result<()> = w.with_container(ContainerKind::Struct, None, |w| {
            w.append_basic(Basic::Int64(3))?;
            Err(Error::mismatch("boom"))
        });
        assert!(res.is_err());
        assert!(w.is_empty());
        Ok(())
    }

    #[test]
    fn close_out_of_order() -> Result<()> {
        let mut w = Writer::new();
        let outer = w.open_container(ContainerKind::Struct, None)?;
        let _inner = w.open_container(ContainerKind::Struct, None)?;
        let e = w.close_container(outer).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncodingMismatch);
        Ok(())
    }

    #[test]
    fn unclosed_container() -> Result<()> {
        let mut w = Writer::new();
        let _h = w.open_container(ContainerKind::Struct, None)?;
        assert!(w.finish(sig("(i)")?).is_err());
        Ok(())
    }

    #[test]
    fn container_signatures_checked() -> Result<()> {
        let mut w = Writer::new();
        assert!(w.open_container(ContainerKind::Array, None).is_err());
        assert!(w
            .open_container(ContainerKind::Variant, Some(&sig("ii")?))
            .is_err());
        assert!(w
            .open_container(ContainerKind::Struct, Some(&sig("i")?))
            .is_err());
        assert!(w.is_empty());
        Ok(())
    }

    #[test]
    fn nesting_limit() -> Result<()> {
        let mut w = Writer::new();
        let mut handles = Vec::new();
        for _ in 0..MAX_TOTAL_DEPTH {
            handles.push(w.open_container(ContainerKind::Struct, None)?);
        }
        let e = w.open_container(ContainerKind::Struct, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Malformed);
        while let Some(h) = handles.pop() {
            w.close_container(h)?;
        }
        Ok(())
    }

    #[test]
    fn fds_are_indexed() -> Result<()> {
        let mut w = Writer::new();
        w.append_basic(Basic::UnixFd(7))?;
        w.append_basic(Basic::UnixFd(7))?;
        let mesg = w.finish(sig("hh")?)?;
        assert_eq!(mesg.data, vec![0, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(mesg.fds, vec![7, 7]);
        Ok(())
    }

    #[test]
    fn byte_array() -> Result<()> {
        let mut w = Writer::new();
        w.append_byte_array(b"abc")?;
        assert_eq!(w.finish(sig("ay")?)?.data, vec![3, 0, 0, 0, 97, 98, 99]);
        Ok(())
    }
}
