//! Whole-body AES encryption filter.
//!
//! Packing seals the bytes into an [`Envelope`] and writes it as MsgPack.
//! Unpacking reads the envelope back and decrypts it. Any failure on the
//! way in is reported as [`WireError::Decrypt`].

use bytes::Bytes;

use super::cipher::{AesCipher, Envelope};
use super::XferFilter;
use crate::codec::MsgPackCodec;
use crate::error::{Result, WireError};

/// Transfer filter encrypting the whole body under a fixed key.
#[derive(Debug, Clone)]
pub struct AesFilter {
    id: u8,
    name: String,
    cipher: AesCipher,
}

impl AesFilter {
    /// Create a filter registered under `id`. The key must be 16, 24 or 32
    /// bytes.
    pub fn new(id: u8, key: &[u8]) -> Result<Self> {
        let cipher = AesCipher::new(key)?;
        Ok(Self {
            id,
            name: format!("aes-{}", cipher.bits()),
            cipher,
        })
    }

    /// Override the registered name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The underlying cipher.
    pub fn cipher(&self) -> &AesCipher {
        &self.cipher
    }
}

impl XferFilter for AesFilter {
    fn id(&self) -> u8 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_pack(&self, data: Bytes) -> Result<Bytes> {
        let envelope = self.cipher.seal(&data)?;
        Ok(Bytes::from(MsgPackCodec::encode(&envelope)?))
    }

    fn on_unpack(&self, data: Bytes) -> Result<Bytes> {
        let envelope: Envelope = MsgPackCodec::decode(&data)
            .map_err(|e| WireError::Decrypt(format!("malformed envelope: {}", e)))?;
        Ok(Bytes::from(self.cipher.open(&envelope)?))
    }
}
