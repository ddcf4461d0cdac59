//! Packet data model.
//!
//! A [`Packet`] is one addressed message: sequence, type, URI, metadata,
//! body codec, body, transfer pipe and the encoded frame size. Packets are
//! mutable and owned by whoever is packing or unpacking them.
//!
//! # Example
//!
//! ```
//! use tpwire::packet::{Body, Packet, PacketType};
//! use tpwire::codec::BodyCodec;
//!
//! let mut packet = Packet::new(PacketType::Pull, 1, "/math/add?x=1");
//! packet.set_body_codec(BodyCodec::Json);
//! packet.set_body(Body::typed(vec![10, 2]));
//!
//! assert_eq!(packet.path(), "/math/add");
//! assert_eq!(packet.query().get("x"), Some("1"));
//! ```

mod body;
mod meta;

use std::fmt;

use serde::de::DeserializeOwned;

use crate::codec::BodyCodec;
use crate::error::{Result, WireError};
use crate::xfer::XferPipe;

pub use body::{Body, BodyValue};
pub use meta::{Meta, Query};

/// Packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PacketType {
    /// Request expecting a reply.
    #[default]
    Pull = 1,
    /// Reply to a pull.
    Reply = 2,
    /// Fire-and-forget.
    Push = 3,
}

impl PacketType {
    /// Decode from the wire value.
    pub fn from_wire(v: i32) -> Result<Self> {
        match v {
            1 => Ok(PacketType::Pull),
            2 => Ok(PacketType::Reply),
            3 => Ok(PacketType::Push),
            other => Err(WireError::Framing(format!("invalid packet type {}", other))),
        }
    }

    /// Wire value.
    #[inline]
    pub fn as_wire(self) -> i32 {
        self as i32
    }

    /// Upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Pull => "PULL",
            PacketType::Reply => "REPLY",
            PacketType::Push => "PUSH",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One message unit.
#[derive(Debug, Default)]
pub struct Packet {
    seq: u64,
    ptype: PacketType,
    uri: String,
    meta: Meta,
    body_codec: BodyCodec,
    body: Body,
    xfer_pipe: XferPipe,
    size: u32,
}

impl Packet {
    /// Create a packet with an empty body.
    pub fn new(ptype: PacketType, seq: u64, uri: impl Into<String>) -> Self {
        Self {
            seq,
            ptype,
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Create an empty packet whose body is a typed slot to decode into.
    pub fn with_body_slot<T: BodyValue + Default>() -> Self {
        Self {
            body: Body::typed(T::default()),
            ..Default::default()
        }
    }

    /// Sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Set the sequence number.
    #[inline]
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Packet type.
    #[inline]
    pub fn ptype(&self) -> PacketType {
        self.ptype
    }

    /// Set the packet type.
    #[inline]
    pub fn set_ptype(&mut self, ptype: PacketType) {
        self.ptype = ptype;
    }

    /// Full URI, query string included.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Set the URI.
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    /// URI path, everything before the first `?`.
    pub fn path(&self) -> &str {
        match self.uri.find('?') {
            Some(i) => &self.uri[..i],
            None => &self.uri,
        }
    }

    /// Parsed URI query.
    pub fn query(&self) -> Query {
        match self.uri.find('?') {
            Some(i) => Query::parse(&self.uri[i + 1..]),
            None => Query::new(),
        }
    }

    /// Metadata.
    #[inline]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Mutable metadata.
    #[inline]
    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// Replace the metadata.
    pub fn set_meta(&mut self, meta: Meta) {
        self.meta = meta;
    }

    /// Body codec.
    #[inline]
    pub fn body_codec(&self) -> BodyCodec {
        self.body_codec
    }

    /// Set the body codec.
    #[inline]
    pub fn set_body_codec(&mut self, codec: BodyCodec) {
        self.body_codec = codec;
    }

    /// Body.
    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Mutable body.
    #[inline]
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Take the body out, leaving it empty.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Decode a raw body with the packet's body codec.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            Body::Raw(b) => self.body_codec.decode(b),
            Body::Empty => self.body_codec.decode(&[]),
            Body::Typed(_) => Err(WireError::Codec(
                "body is already typed, use Body::downcast_ref".into(),
            )),
        }
    }

    /// Transfer pipe.
    #[inline]
    pub fn xfer_pipe(&self) -> &XferPipe {
        &self.xfer_pipe
    }

    /// Mutable transfer pipe.
    #[inline]
    pub fn xfer_pipe_mut(&mut self) -> &mut XferPipe {
        &mut self.xfer_pipe
    }

    /// Total encoded frame length of the last pack or unpack.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Set the frame size. Codecs call this.
    #[inline]
    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    /// Reset every field to its default, keeping the typed body slot with
    /// its value reset too.
    pub fn reset(&mut self) {
        let body = match std::mem::take(&mut self.body) {
            Body::Typed(mut value) => {
                value.clear();
                Body::Typed(value)
            }
            _ => Body::Empty,
        };
        *self = Self {
            body,
            ..Default::default()
        };
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seq={} uri={:?} codec={} pipe={:?} size={}",
            self.ptype,
            self.seq,
            self.uri,
            self.body_codec.name(),
            self.xfer_pipe.ids(),
            self.size
        )
    }
}
