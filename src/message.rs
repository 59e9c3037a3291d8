use crate::signature::Signature;

use std::os::unix::io::RawFd;

/// Byte order of a marshaled message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// The endianness flag byte of a D-Bus message header.
    pub fn marker(self) -> u8 {
        match self {
            Endianness::Little => b'l',
            Endianness::Big => b'B',
        }
    }

    pub fn from_marker(marker: u8) -> Option<Endianness> {
        match marker {
            b'l' => Some(Endianness::Little),
            b'B' => Some(Endianness::Big),
            _ => None,
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

/// A marshaled message body together with everything needed to read it
/// back: its signature, its byte order and the file descriptors that
/// travel alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub data: Vec<u8>,
    pub signature: Signature,
    pub endianness: Endianness,
    pub fds: Vec<RawFd>,
}

impl Message {
    /// A little-endian body without file descriptors.
    pub fn new(data: Vec<u8>, signature: Signature) -> Message {
        Message {
            data,
            signature,
            endianness: Endianness::Little,
            fds: Vec::new(),
        }
    }
}
