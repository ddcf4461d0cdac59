//! Raw body handling - bytes that are already serialized.
//!
//! Raw bodies pass through every binary framing untouched. Text framings
//! need a string form: valid UTF-8 is carried as is, anything else as
//! base64.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tpwire::codec::{RawCodec, TextForm};
//!
//! let body = Bytes::from_static(b"zero copy");
//! assert_eq!(RawCodec::encode(&body).as_ptr(), body.as_ptr());
//! assert_eq!(RawCodec::text_form(&[0xff, 0x00]), TextForm::Base64("/wA=".into()));
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

use crate::error::{Result, WireError};

/// String form of a raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextForm<'a> {
    /// The body is valid UTF-8.
    Utf8(&'a str),
    /// Standard base64 of a non-UTF-8 body.
    Base64(String),
}

/// Pass-through codec for raw bodies.
pub struct RawCodec;

impl RawCodec {
    /// Encode a raw body (zero-copy).
    #[inline]
    pub fn encode(body: &Bytes) -> Bytes {
        body.clone()
    }

    /// Decode a raw body (zero-copy).
    #[inline]
    pub fn decode(data: Bytes) -> Bytes {
        data
    }

    /// String form of a body for text framings.
    pub fn text_form(data: &[u8]) -> TextForm<'_> {
        match std::str::from_utf8(data) {
            Ok(s) => TextForm::Utf8(s),
            Err(_) => TextForm::Base64(STANDARD.encode(data)),
        }
    }

    /// Decode the base64 form produced by [`text_form`](Self::text_form).
    pub fn from_base64(s: &str) -> Result<Bytes> {
        STANDARD
            .decode(s)
            .map(Bytes::from)
            .map_err(|e| WireError::Framing(format!("base64 body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_zero_copy() {
        let original = Bytes::from_static(b"static data");
        let out = RawCodec::decode(RawCodec::encode(&original));
        assert_eq!(out.as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_text_form_utf8() {
        assert_eq!(RawCodec::text_form("héllo".as_bytes()), TextForm::Utf8("héllo"));
    }

    #[test]
    fn test_binary_data_preserved() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let TextForm::Base64(text) = RawCodec::text_form(&all_bytes) else {
            panic!("expected base64");
        };
        assert_eq!(RawCodec::from_base64(&text).unwrap(), all_bytes);
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            RawCodec::from_base64("!!"),
            Err(WireError::Framing(_))
        ));
    }
}
