//! Error types for tpwire.
//!
//! [`WireError`] is the single error type returned by filters, codecs and
//! the heartbeat subsystem. [`CallError`] is the structured `{code, message}`
//! value a call site receives, and the value plugins return from their hooks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packet::Meta;

/// Unknown error.
pub const CODE_UNKNOWN_ERROR: i32 = -1;
/// Connection closed or broken.
pub const CODE_CONN_CLOSED: i32 = 102;
/// Malformed, tampered or undecodable packet.
pub const CODE_BAD_PACKET: i32 = 400;
/// Internal failure while (un)marshaling a body.
pub const CODE_INTERNAL_SERVER_ERROR: i32 = 500;

/// Metadata key carrying a propagated error code.
pub const META_STATUS_CODE: &str = "X-Status-Code";
/// Metadata key carrying a propagated error message.
pub const META_STATUS: &str = "X-Status";
/// Metadata key carrying a propagated error reason.
pub const META_STATUS_REASON: &str = "X-Status-Reason";

/// Main error type for all tpwire operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared length inconsistent with the stream, unknown protocol tag,
    /// or an undecodable frame header.
    #[error("Framing error: {0}")]
    Framing(String),

    /// A transfer pipe references a filter id that is not registered.
    #[error("Unknown transfer filter id: {0}")]
    UnknownFilter(u8),

    /// Two filters were registered under the same id.
    #[error("Duplicate transfer filter id {id} ({name})")]
    DuplicateFilter {
        /// The conflicting id.
        id: u8,
        /// Name of the filter that failed to register.
        name: String,
    },

    /// Filter id 0 is reserved for "no filter".
    #[error("Transfer filter id 0 is reserved ({0})")]
    ReservedFilterId(String),

    /// Checksum mismatch or undersized input.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Cipher-level failure while decrypting.
    #[error("Decrypt error: {0}")]
    Decrypt(String),

    /// AES key of unsupported length.
    #[error("Invalid cipher key length {0}, expected 16, 24 or 32 bytes")]
    InvalidKey(usize),

    /// Body marshal/unmarshal failure not covered by a concrete codec error.
    #[error("Codec error: {0}")]
    Codec(String),

    /// JSON body codec error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed heartbeat rate.
    #[error("Invalid heartbeat rate: {0:?}")]
    Negotiation(String),

    /// Error returned by a plugin hook or by the remote peer.
    #[error("Call error: {0}")]
    Call(CallError),

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl WireError {
    /// Whether the connection must be closed after this error.
    ///
    /// Framing and integrity failures mean the stream can no longer be
    /// trusted to be aligned on frame boundaries.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WireError::Io(_)
                | WireError::Framing(_)
                | WireError::UnknownFilter(_)
                | WireError::Integrity(_)
                | WireError::ConnectionClosed
        )
    }

    /// Numeric code reported to the call site.
    pub fn code(&self) -> i32 {
        match self {
            WireError::Io(_) | WireError::ConnectionClosed => CODE_CONN_CLOSED,
            WireError::Framing(_)
            | WireError::UnknownFilter(_)
            | WireError::Integrity(_)
            | WireError::Decrypt(_)
            | WireError::Negotiation(_) => CODE_BAD_PACKET,
            WireError::Codec(_)
            | WireError::Json(_)
            | WireError::MsgPackEncode(_)
            | WireError::MsgPackDecode(_) => CODE_INTERNAL_SERVER_ERROR,
            WireError::Call(e) => e.code,
            WireError::DuplicateFilter { .. }
            | WireError::ReservedFilterId(_)
            | WireError::InvalidKey(_) => CODE_UNKNOWN_ERROR,
        }
    }

    /// Convert into the structured error handed to a call site.
    pub fn to_call_error(&self) -> CallError {
        match self {
            WireError::Call(e) => e.clone(),
            other => CallError::new(other.code(), other.to_string()),
        }
    }
}

impl From<CallError> for WireError {
    fn from(e: CallError) -> Self {
        WireError::Call(e)
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;

/// Structured error with a numeric code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct CallError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional detail, usually the underlying error text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl CallError {
    /// Create an error without a reason.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: String::new(),
        }
    }

    /// Attach a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Fold this error into packet metadata, replacing any previous one.
    pub fn to_meta(&self, meta: &mut Meta) {
        meta.set(META_STATUS_CODE, self.code.to_string());
        meta.set(META_STATUS, self.message.clone());
        if self.reason.is_empty() {
            meta.delete(META_STATUS_REASON);
        } else {
            meta.set(META_STATUS_REASON, self.reason.clone());
        }
    }

    /// Extract an error previously folded into metadata.
    ///
    /// Returns `None` when no code is present, or the code is 0 or not a
    /// number.
    pub fn from_meta(meta: &Meta) -> Option<Self> {
        let code: i32 = meta.get(META_STATUS_CODE)?.parse().ok()?;
        if code == 0 {
            return None;
        }
        Some(Self {
            code,
            message: meta.get(META_STATUS).unwrap_or_default().to_string(),
            reason: meta
                .get(META_STATUS_REASON)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Remove any folded error from metadata.
    pub fn strip_meta(meta: &mut Meta) {
        meta.delete(META_STATUS_CODE);
        meta.delete(META_STATUS);
        meta.delete(META_STATUS_REASON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WireError::Framing("x".into()).is_fatal());
        assert!(WireError::Integrity("x".into()).is_fatal());
        assert!(WireError::UnknownFilter(7).is_fatal());
        assert!(WireError::ConnectionClosed.is_fatal());
        assert!(!WireError::Decrypt("x".into()).is_fatal());
        assert!(!WireError::Codec("x".into()).is_fatal());
        assert!(!WireError::Negotiation(String::new()).is_fatal());
    }

    #[test]
    fn test_codes() {
        assert_eq!(WireError::Integrity("x".into()).code(), CODE_BAD_PACKET);
        assert_eq!(WireError::ConnectionClosed.code(), CODE_CONN_CLOSED);
        assert_eq!(
            WireError::Codec("x".into()).code(),
            CODE_INTERNAL_SERVER_ERROR
        );
        let call = CallError::new(100_001, "decrypt ciphertext error");
        assert_eq!(WireError::Call(call.clone()).code(), 100_001);
        assert_eq!(WireError::Call(call.clone()).to_call_error(), call);
    }

    #[test]
    fn test_call_error_meta_roundtrip() {
        let mut meta = Meta::new();
        meta.add("trace", "abc");

        let err = CallError::new(404, "not found").with_reason("no route /x");
        err.to_meta(&mut meta);

        let back = CallError::from_meta(&meta).unwrap();
        assert_eq!(back, err);
        assert_eq!(meta.get("trace"), Some("abc"));

        CallError::strip_meta(&mut meta);
        assert!(CallError::from_meta(&meta).is_none());
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_call_error_zero_code_is_none() {
        let mut meta = Meta::new();
        meta.set(META_STATUS_CODE, "0");
        assert!(CallError::from_meta(&meta).is_none());

        meta.set(META_STATUS_CODE, "abc");
        assert!(CallError::from_meta(&meta).is_none());
    }

    #[test]
    fn test_to_call_error_message() {
        let err = WireError::Integrity("checksum mismatch".into());
        let call = err.to_call_error();
        assert_eq!(call.code, CODE_BAD_PACKET);
        assert!(call.message.contains("checksum mismatch"));
    }
}
