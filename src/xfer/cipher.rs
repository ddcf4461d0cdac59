//! AES-CBC cipher shared by the byte-level encryption filter and the
//! body-level secure plugin.
//!
//! Ciphertext layout is `iv (16 bytes) || AES-CBC-PKCS#7(plaintext)` with a
//! fresh random IV per message. The key length (16, 24 or 32 bytes) selects
//! AES-128, AES-192 or AES-256.
//!
//! Encrypted payloads travel inside an [`Envelope`] tagged with a key
//! fingerprint (`hex(md5(key))`), so a peer holding a different key fails
//! with a clear version mismatch instead of a padding error.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};

/// AES block and IV length.
pub const IV_LEN: usize = 16;

/// Encrypted value with the fingerprint of the key that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Key fingerprint.
    pub version: String,
    /// Base64 of `iv || ciphertext`.
    pub ciphertext: String,
}

#[derive(Clone, Copy)]
enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

/// AES-CBC cipher under a fixed key.
#[derive(Clone)]
pub struct AesCipher {
    key: Vec<u8>,
    size: KeySize,
    version: String,
}

impl AesCipher {
    /// Create a cipher. The key must be 16, 24 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let size = match key.len() {
            16 => KeySize::Aes128,
            24 => KeySize::Aes192,
            32 => KeySize::Aes256,
            n => return Err(WireError::InvalidKey(n)),
        };
        Ok(Self {
            key: key.to_vec(),
            size,
            version: hex::encode(Md5::digest(key)),
        })
    }

    /// Key fingerprint carried in envelopes.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Key length in bits.
    pub fn bits(&self) -> usize {
        self.key.len() * 8
    }

    /// Encrypt to `iv || ciphertext`.
    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ct = match self.size {
            KeySize::Aes128 => encryptor::<aes::Aes128>(&self.key, &iv)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            KeySize::Aes192 => encryptor::<aes::Aes192>(&self.key, &iv)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            KeySize::Aes256 => encryptor::<aes::Aes256>(&self.key, &iv)?
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
        };

        let mut out = Vec::with_capacity(IV_LEN + ct.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Decrypt `iv || ciphertext`.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_LEN * 2 || data.len() % IV_LEN != 0 {
            return Err(WireError::Decrypt(format!(
                "ciphertext length {} is not a whole number of blocks after the IV",
                data.len()
            )));
        }
        let (iv, ct) = data.split_at(IV_LEN);
        let plain = match self.size {
            KeySize::Aes128 => decryptor::<aes::Aes128>(&self.key, iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
            KeySize::Aes192 => decryptor::<aes::Aes192>(&self.key, iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
            KeySize::Aes256 => decryptor::<aes::Aes256>(&self.key, iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
        };
        plain.map_err(|_| WireError::Decrypt("bad padding".into()))
    }

    /// Encrypt into an envelope.
    pub fn seal(&self, plain: &[u8]) -> Result<Envelope> {
        Ok(Envelope {
            version: self.version.clone(),
            ciphertext: STANDARD.encode(self.encrypt(plain)?),
        })
    }

    /// Decrypt an envelope produced under the same key.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.version != self.version {
            return Err(WireError::Decrypt(format!(
                "key version mismatch: got {:?}, want {:?}",
                envelope.version, self.version
            )));
        }
        let data = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| WireError::Decrypt(format!("ciphertext is not base64: {}", e)))?;
        self.decrypt(&data)
    }
}

impl fmt::Debug for AesCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCipher")
            .field("bits", &self.bits())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn encryptor<C>(key: &[u8], iv: &[u8]) -> Result<cbc::Encryptor<C>>
where
    cbc::Encryptor<C>: KeyIvInit,
    C: aes::cipher::BlockEncryptMut + aes::cipher::BlockCipher,
{
    cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| WireError::InvalidKey(key.len()))
}

fn decryptor<C>(key: &[u8], iv: &[u8]) -> Result<cbc::Decryptor<C>>
where
    cbc::Decryptor<C>: KeyIvInit,
    C: aes::cipher::BlockDecryptMut + aes::cipher::BlockCipher,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| WireError::InvalidKey(key.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY16: &[u8] = b"cipherkey1234567";

    #[test]
    fn test_key_lengths() {
        for (len, bits) in [(16, 128), (24, 192), (32, 256)] {
            let key = vec![7u8; len];
            let cipher = AesCipher::new(&key).unwrap();
            assert_eq!(cipher.bits(), bits);
            let ct = cipher.encrypt(b"payload").unwrap();
            assert_eq!(cipher.decrypt(&ct).unwrap(), b"payload");
        }
        assert!(matches!(
            AesCipher::new(&[0u8; 10]),
            Err(WireError::InvalidKey(10))
        ));
    }

    #[test]
    fn test_random_iv() {
        let cipher = AesCipher::new(KEY16).unwrap();
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), IV_LEN * 2);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let cipher = AesCipher::new(KEY16).unwrap();
        let env = cipher.seal(b"{\"A\":10,\"B\":2}").unwrap();
        assert_eq!(env.version, hex::encode(Md5::digest(KEY16)));
        assert_eq!(cipher.open(&env).unwrap(), b"{\"A\":10,\"B\":2}");
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = AesCipher::new(KEY16).unwrap();
        let b = AesCipher::new(b"anotherkey123456").unwrap();
        let env = a.seal(b"secret").unwrap();
        assert!(matches!(b.open(&env), Err(WireError::Decrypt(_))));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let cipher = AesCipher::new(KEY16).unwrap();
        let ct = cipher.encrypt(b"secret").unwrap();
        assert!(matches!(
            cipher.decrypt(&ct[..ct.len() - 1]),
            Err(WireError::Decrypt(_))
        ));
        assert!(matches!(
            cipher.decrypt(&ct[..IV_LEN]),
            Err(WireError::Decrypt(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = AesCipher::new(KEY16).unwrap();
        let dbg = format!("{:?}", cipher);
        assert!(!dbg.contains("cipherkey"));
        assert!(dbg.contains("128"));
    }
}
