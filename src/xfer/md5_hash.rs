//! MD5 checksum filter.
//!
//! Packing appends the 16-byte MD5 digest of the data; unpacking splits it
//! off and verifies it. Detects corruption and tampering in transit; not a
//! security boundary.

use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};

use super::XferFilter;
use crate::error::{Result, WireError};

/// Length of the appended digest.
pub const DIGEST_LEN: usize = 16;

/// Checksum filter appending an MD5 digest.
#[derive(Debug, Clone)]
pub struct Md5Hash {
    id: u8,
    name: String,
}

impl Md5Hash {
    /// Create a checksum filter registered under `id`.
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl XferFilter for Md5Hash {
    fn id(&self) -> u8 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_pack(&self, data: Bytes) -> Result<Bytes> {
        let digest = Md5::digest(&data);
        let mut out = BytesMut::with_capacity(data.len() + DIGEST_LEN);
        out.extend_from_slice(&data);
        out.extend_from_slice(&digest);
        Ok(out.freeze())
    }

    fn on_unpack(&self, data: Bytes) -> Result<Bytes> {
        if data.len() < DIGEST_LEN {
            return Err(WireError::Integrity(format!(
                "input of {} bytes is shorter than the {}-byte digest",
                data.len(),
                DIGEST_LEN
            )));
        }
        let split = data.len() - DIGEST_LEN;
        let content = data.slice(..split);
        if Md5::digest(&content)[..] != data[split..] {
            return Err(WireError::Integrity("checksum mismatch".into()));
        }
        Ok(content)
    }
}
