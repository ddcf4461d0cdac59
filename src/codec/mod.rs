//! Body codecs - serialization of packet bodies.
//!
//! A packet names its body codec with a single byte carried on the wire:
//!
//! - [`BodyCodec::Raw`] (`0`) - unspecified; raw bodies pass through,
//!   typed bodies fall back to JSON
//! - [`BodyCodec::Json`] (`'j'`) - [`JsonCodec`]
//! - [`BodyCodec::MsgPack`] (`'m'`) - [`MsgPackCodec`]
//! - [`BodyCodec::Plain`] (`'s'`) - [`PlainCodec`], text as-is
//!
//! # Example
//!
//! ```
//! use tpwire::codec::BodyCodec;
//!
//! let bytes = BodyCodec::Json.encode(&vec![1, 2, 3]).unwrap();
//! let back: Vec<i32> = BodyCodec::Json.decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

mod json;
mod msgpack;
mod plain;
mod raw;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, WireError};

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use plain::PlainCodec;
pub use raw::{RawCodec, TextForm};

/// Codec used for typed bodies when the packet leaves it unspecified.
pub const DEFAULT_BODY_CODEC: BodyCodec = BodyCodec::Json;

/// Body codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BodyCodec {
    /// Unspecified / raw bytes.
    #[default]
    Raw = 0,
    /// JSON text.
    Json = b'j',
    /// MessagePack, struct-as-map.
    MsgPack = b'm',
    /// Plain text.
    Plain = b's',
}

impl BodyCodec {
    /// Look up a codec by its wire id.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(BodyCodec::Raw),
            b'j' => Ok(BodyCodec::Json),
            b'm' => Ok(BodyCodec::MsgPack),
            b's' => Ok(BodyCodec::Plain),
            other => Err(WireError::Codec(format!("unknown body codec id {}", other))),
        }
    }

    /// Wire id.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Codec name.
    pub fn name(self) -> &'static str {
        match self {
            BodyCodec::Raw => "raw",
            BodyCodec::Json => "json",
            BodyCodec::MsgPack => "msgpack",
            BodyCodec::Plain => "plain",
        }
    }

    /// The codec actually used for typed values.
    #[inline]
    pub fn resolve(self) -> Self {
        match self {
            BodyCodec::Raw => DEFAULT_BODY_CODEC,
            other => other,
        }
    }

    /// Marshal a typed value.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self.resolve() {
            BodyCodec::MsgPack => MsgPackCodec::encode(value),
            BodyCodec::Plain => PlainCodec::encode(value),
            _ => JsonCodec::encode(value),
        }
    }

    /// Unmarshal a typed value.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self.resolve() {
            BodyCodec::MsgPack => MsgPackCodec::decode(bytes),
            BodyCodec::Plain => PlainCodec::decode(bytes),
            _ => JsonCodec::decode(bytes),
        }
    }
}

impl TryFrom<u8> for BodyCodec {
    type Error = WireError;

    fn try_from(id: u8) -> Result<Self> {
        BodyCodec::from_id(id)
    }
}
