use crate::error::{Error, Result};

use std::convert::TryFrom;
use std::os::unix::io::RawFd;

macro_rules! integer_kind {
    ($(#[$meta:meta])* $kind:ident, $prim:ty) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $kind {
            value: $prim,
            pub(super) variant_level: u32,
        }

        impl $kind {
            /// Range-checks `value` against the width of this kind.
            pub fn new(value: impl Into<i128>) -> Result<Self> {
                let value = value.into();
                let checked = <$prim>::try_from(value).map_err(|_| Error::OutOfRange {
                    value,
                    type_name: stringify!($kind),
                })?;
                Ok(Self {
                    value: checked,
                    variant_level: 0,
                })
            }

            pub fn get(self) -> $prim {
                self.value
            }
        }

        impl From<$prim> for $kind {
            fn from(value: $prim) -> Self {
                Self {
                    value,
                    variant_level: 0,
                }
            }
        }

        impl From<$kind> for $prim {
            fn from(v: $kind) -> $prim {
                v.value
            }
        }
    };
}

integer_kind!(
    /// An unsigned 8-bit integer, `y`.
    Byte,
    u8
);
integer_kind!(
    /// `n`
    Int16,
    i16
);
integer_kind!(
    /// `q`
    UInt16,
    u16
);
integer_kind!(
    /// `i`
    Int32,
    i32
);
integer_kind!(
    /// `u`
    UInt32,
    u32
);
integer_kind!(
    /// `x`
    Int64,
    i64
);
integer_kind!(
    /// `t`
    UInt64,
    u64
);

/// An IEEE 754 double, `d`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Double {
    value: f64,
    pub(super) variant_level: u32,
}

impl Double {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            variant_level: 0,
        }
    }

    pub fn get(self) -> f64 {
        self.value
    }
}

impl From<f64> for Double {
    fn from(value: f64) -> Self {
        Double::new(value)
    }
}

/// `b`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Boolean {
    value: bool,
    pub(super) variant_level: u32,
}

impl Boolean {
    pub fn new(value: bool) -> Self {
        Self {
            value,
            variant_level: 0,
        }
    }

    pub fn get(self) -> bool {
        self.value
    }
}

impl From<bool> for Boolean {
    fn from(value: bool) -> Self {
        Boolean::new(value)
    }
}

/// A Unix file descriptor, `h`.
///
/// On the wire the descriptor travels out of band; the body only holds its
/// index into the message's descriptor list. This type holds the descriptor
/// itself and does not own it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnixFd {
    fd: RawFd,
    pub(super) variant_level: u32,
}

impl UnixFd {
    pub fn new(fd: RawFd) -> Result<Self> {
        if fd < 0 {
            return Err(Error::OutOfRange {
                value: fd.into(),
                type_name: "UnixFd",
            });
        }
        Ok(Self {
            fd,
            variant_level: 0,
        })
    }

    pub fn get(self) -> RawFd {
        self.fd
    }
}
