//! Signature-driven marshaling of D-Bus message bodies.
//!
//! This crate maps between D-Bus wire data and a dynamically typed tree of
//! [`Value`]s. A message body is described by its [`Signature`], a string
//! of type codes such as `a{sv}` or `(iay)`; [`encode`] walks the signature
//! and the values together and produces the body bytes, and [`decode`]
//! reads them back. Actually sending the messages is outside of the scope of
//! this crate, as are authentication and bus-name handling.
//!
//! Every [`Value`] carries a `variant_level`: the number of variant
//! wrappers around it. A value with a `variant_level` of 2 placed in a `v`
//! slot is sent as a variant containing a variant containing the value,
//! and decoding can fold such wrappers back into the level (see
//! [`VariantUnpack`]) so that nested variants survive a round trip.
//!
//! When no signature is given, one is guessed from the values with
//! [`guess_signature`]. Containers may declare their own element
//! signatures, which is the only way to send an empty array or dict.
//!
//! Ordinary Rust types can be converted to and from [`Value`] trees with
//! [serde], using the [`convert`] module:
//!
//! ```
//! use dbus_marshal::{decode, encode, from_value, to_value, DecodeOptions};
//!
//! let message = encode(&[to_value(&(7u32, "seven"))?], None)?;
//! assert_eq!(message.signature.as_str(), "(us)");
//! let values = decode(&message, &DecodeOptions::new())?;
//! let back: (u32, String) = from_value(values[0].clone())?;
//! assert_eq!(back, (7, "seven".to_owned()));
//! # Ok::<(), dbus_marshal::Error>(())
//! ```
//!
//! The lower-level [`wire`] module exposes the cursor-style
//! [`MessageWriter`] and [`MessageIter`] the encoder and decoder are built
//! on.
//!
//! [serde]: https://serde.rs
//! [`Value`]: crate::value::Value
//! [`Signature`]: crate::signature::Signature
//! [`MessageWriter`]: crate::wire::MessageWriter
//! [`MessageIter`]: crate::wire::MessageIter

mod align;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod error;
pub mod guess;
pub mod message;
pub mod names;
pub mod signature;
pub mod value;
pub mod wire;

pub use convert::{from_value, to_value, to_value_with_policy};
pub use decode::{decode, DecodeOptions, VariantUnpack};
pub use encode::{encode, encode_with, EncodeOptions};
pub use error::{Error, ErrorKind, Result};
pub use guess::guess_signature;
pub use message::{Endianness, Message};
pub use signature::Signature;
pub use value::Value;
