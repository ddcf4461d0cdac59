//! JSON body codec using `serde_json`.

use crate::error::Result;

/// JSON codec for structured bodies.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_compact_output() {
        let mut map = BTreeMap::new();
        map.insert("A", 10);
        map.insert("B", 2);
        let bytes = JsonCodec::encode(&map).unwrap();
        assert_eq!(bytes, br#"{"A":10,"B":2}"#);
    }

    #[test]
    fn test_decode_error() {
        let result: Result<BTreeMap<String, i32>> = JsonCodec::decode(b"{not json");
        assert!(result.is_err());
    }
}
