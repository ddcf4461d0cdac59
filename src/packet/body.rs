//! Packet body: nothing, raw bytes, or a typed value.
//!
//! Typed values are marshaled with the packet's body codec on pack. On
//! unpack the caller may pre-load a typed slot (`Body::typed(T::default())`)
//! that the decoded bytes are unmarshaled into; without a slot the bytes are
//! kept raw and can be decoded later with [`Packet::decode_body`].
//!
//! [`Packet::decode_body`]: crate::packet::Packet::decode_body

use std::any::Any;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{BodyCodec, RawCodec};
use crate::error::Result;

/// A typed body value that can be (un)marshaled by any body codec.
///
/// Implemented for every `Serialize + DeserializeOwned + Default` type.
/// `Default` is the value an empty body decodes to.
pub trait BodyValue: Any + Send + Sync + fmt::Debug {
    /// Marshal the value.
    fn marshal(&self, codec: BodyCodec) -> Result<Vec<u8>>;

    /// Replace the value with the one decoded from `data`.
    ///
    /// On error the value is left untouched.
    fn unmarshal(&mut self, codec: BodyCodec, data: &[u8]) -> Result<()>;

    /// Reset to the default value.
    fn clear(&mut self);

    /// Upcast for downcasting by reference.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> BodyValue for T
where
    T: Serialize + DeserializeOwned + Default + Any + Send + Sync + fmt::Debug,
{
    fn marshal(&self, codec: BodyCodec) -> Result<Vec<u8>> {
        codec.encode(self)
    }

    fn unmarshal(&mut self, codec: BodyCodec, data: &[u8]) -> Result<()> {
        *self = codec.decode(data)?;
        Ok(())
    }

    fn clear(&mut self) {
        *self = T::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Packet body.
#[derive(Debug, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Already-serialized bytes, sent as-is.
    Raw(Bytes),
    /// A typed value marshaled with the packet's body codec.
    Typed(Box<dyn BodyValue>),
}

impl Body {
    /// Wrap a typed value.
    pub fn typed<T: BodyValue>(value: T) -> Self {
        Body::Typed(Box::new(value))
    }

    /// Wrap raw bytes.
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Body::Raw(bytes.into())
    }

    /// Whether there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Marshal to bytes.
    pub fn marshal(&self, codec: BodyCodec) -> Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Raw(b) => Ok(RawCodec::encode(b)),
            Body::Typed(v) => Ok(Bytes::from(v.marshal(codec)?)),
        }
    }

    /// Load decoded bytes into this body.
    ///
    /// A typed slot is unmarshaled in place, and reset to its default for
    /// empty bytes; otherwise the bytes are kept raw.
    pub fn unmarshal(&mut self, codec: BodyCodec, data: Bytes) -> Result<()> {
        match self {
            Body::Typed(v) => {
                if data.is_empty() {
                    v.clear();
                    return Ok(());
                }
                v.unmarshal(codec, &data)
            }
            _ => {
                *self = if data.is_empty() {
                    Body::Empty
                } else {
                    Body::Raw(RawCodec::decode(data))
                };
                Ok(())
            }
        }
    }

    /// Borrow the typed value, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Body::Typed(v) => v.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Take the typed value out, if it is a `T`.
    pub fn into_typed<T: 'static>(self) -> Option<T> {
        match self {
            Body::Typed(v) => v.into_any().downcast::<T>().ok().map(|b| *b),
            _ => None,
        }
    }

    /// Borrow raw bytes, if the body is raw.
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Body::Raw(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
    struct Args {
        #[serde(rename = "A")]
        a: i32,
        #[serde(rename = "B")]
        b: i32,
    }

    #[test]
    fn test_typed_marshal() {
        let body = Body::typed(Args { a: 10, b: 2 });
        let bytes = body.marshal(BodyCodec::Json).unwrap();
        assert_eq!(&bytes[..], br#"{"A":10,"B":2}"#);
    }

    #[test]
    fn test_unmarshal_into_slot() {
        let mut body = Body::typed(Args::default());
        body.unmarshal(BodyCodec::Json, Bytes::from_static(br#"{"A":1,"B":2}"#))
            .unwrap();
        assert_eq!(body.downcast_ref::<Args>(), Some(&Args { a: 1, b: 2 }));
    }

    #[test]
    fn test_failed_unmarshal_leaves_slot() {
        let mut body = Body::typed(Args { a: 7, b: 7 });
        let err = body.unmarshal(BodyCodec::Json, Bytes::from_static(b"{broken"));
        assert!(err.is_err());
        assert_eq!(body.downcast_ref::<Args>(), Some(&Args { a: 7, b: 7 }));
    }

    #[test]
    fn test_unmarshal_without_slot_keeps_raw() {
        let mut body = Body::Empty;
        body.unmarshal(BodyCodec::Json, Bytes::from_static(b"[1]"))
            .unwrap();
        assert_eq!(body.as_raw().map(|b| &b[..]), Some(&b"[1]"[..]));

        let mut body = Body::raw(&b"old"[..]);
        body.unmarshal(BodyCodec::Raw, Bytes::new()).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_empty_bytes_reset_slot() {
        let mut body = Body::typed(Args { a: 7, b: 7 });
        body.unmarshal(BodyCodec::Json, Bytes::new()).unwrap();
        assert_eq!(body.downcast_ref::<Args>(), Some(&Args::default()));
    }

    #[test]
    fn test_into_typed_wrong_type() {
        let body = Body::typed(5u32);
        assert!(body.into_typed::<String>().is_none());
        assert_eq!(Body::typed(5u32).into_typed::<u32>(), Some(5));
    }
}
