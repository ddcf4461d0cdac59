//! Plain text body codec.
//!
//! A string value is written as its UTF-8 bytes without quoting. Any other
//! value falls back to its JSON text, so numbers and booleans read back
//! unchanged.

use serde_json::Value;

use crate::error::{Result, WireError};

/// Plain text codec.
pub struct PlainCodec;

impl PlainCodec {
    /// Encode a value as plain text.
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        match serde_json::to_value(value)? {
            Value::String(s) => Ok(s.into_bytes()),
            other => Ok(other.to_string().into_bytes()),
        }
    }

    /// Decode plain text into a value.
    ///
    /// Tries the text as a string first, then as JSON.
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| WireError::Codec(format!("plain body is not UTF-8: {}", e)))?;
        match serde_json::from_value(Value::String(text.to_string())) {
            Ok(v) => Ok(v),
            Err(_) => Ok(serde_json::from_str(text)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_unquoted() {
        assert_eq!(PlainCodec::encode("hello").unwrap(), b"hello");
        let s: String = PlainCodec::decode(b"hello").unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_number_fallback() {
        let bytes = PlainCodec::encode(&42u32).unwrap();
        assert_eq!(bytes, b"42");
        let n: u32 = PlainCodec::decode(&bytes).unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn test_invalid_utf8() {
        let result: Result<String> = PlainCodec::decode(&[0xff, 0xfe]);
        assert!(result.is_err());
    }
}
