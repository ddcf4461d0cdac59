//! Body-level AES encryption plugin.
//!
//! Unlike the byte-level [`AesFilter`](crate::xfer::AesFilter), this plugin
//! works on the typed body. On write it marshals the body, encrypts it and
//! replaces the body with an [`Envelope`], which is then marshaled with the
//! packet's own body codec. On read it swaps the caller's typed body for an
//! envelope slot before the body is decoded, then decrypts and unmarshals
//! into the caller's body afterwards. If the envelope itself cannot be
//! decoded the caller's body is put back untouched.
//!
//! By default the plugin only acts on packets whose URI query carries
//! [`SECURE_QUERY_KEY`]; [`SecurePlugin::always`] acts on every packet.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tpwire::plugin::PluginChain;
//! use tpwire::secure::SecurePlugin;
//!
//! let plugin = SecurePlugin::new(100_001, b"cipherkey1234567").unwrap();
//! let chain = PluginChain::new().with(Arc::new(plugin));
//! assert_eq!(chain.names(), vec!["secure(encrypt&decrypt)"]);
//! ```

use bytes::Bytes;
use tracing::trace;

use crate::context::{ReadCtx, WriteCtx};
use crate::error::{CallError, Result, WireError};
use crate::packet::{Body, Query};
use crate::plugin::{HookResult, Plugin};
use crate::xfer::{AesCipher, Envelope};

/// Query parameter that turns on encryption for one packet.
pub const SECURE_QUERY_KEY: &str = "_secure";

/// Scratch key holding the caller's body between the read hooks.
const RAW_BODY_KEY: &str = "secure.raw_body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Always,
    Query,
}

/// AES body encryption plugin.
#[derive(Debug, Clone)]
pub struct SecurePlugin {
    name: &'static str,
    err_code: i32,
    cipher: AesCipher,
    activation: Activation,
    encrypt: bool,
    decrypt: bool,
}

impl SecurePlugin {
    fn build(
        name: &'static str,
        err_code: i32,
        key: &[u8],
        activation: Activation,
        encrypt: bool,
        decrypt: bool,
    ) -> Result<Self> {
        Ok(Self {
            name,
            err_code,
            cipher: AesCipher::new(key)?,
            activation,
            encrypt,
            decrypt,
        })
    }

    /// Encrypt and decrypt packets flagged with [`SECURE_QUERY_KEY`].
    ///
    /// The key must be 16, 24 or 32 bytes. `err_code` is the code of the
    /// [`CallError`] returned when a body cannot be processed.
    pub fn new(err_code: i32, key: &[u8]) -> Result<Self> {
        Self::build(
            "secure(encrypt&decrypt)",
            err_code,
            key,
            Activation::Query,
            true,
            true,
        )
    }

    /// Encrypt and decrypt every packet.
    pub fn always(err_code: i32, key: &[u8]) -> Result<Self> {
        Self::build("encrypt", err_code, key, Activation::Always, true, true)
    }

    /// Only encrypt outgoing flagged packets.
    pub fn encrypt_only(err_code: i32, key: &[u8]) -> Result<Self> {
        Self::build("encrypt", err_code, key, Activation::Query, true, false)
    }

    /// Only decrypt incoming flagged packets.
    pub fn decrypt_only(err_code: i32, key: &[u8]) -> Result<Self> {
        Self::build("decrypt", err_code, key, Activation::Query, false, true)
    }

    /// Key fingerprint carried in envelopes.
    pub fn version(&self) -> &str {
        self.cipher.version()
    }

    fn active(&self, query: &Query) -> bool {
        match self.activation {
            Activation::Always => true,
            Activation::Query => query.contains_key(SECURE_QUERY_KEY),
        }
    }

    fn call_error(&self, message: &str, reason: impl ToString) -> CallError {
        CallError::new(self.err_code, message).with_reason(reason.to_string())
    }
}

impl Plugin for SecurePlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn pre_write(&self, ctx: &mut WriteCtx<'_>) -> HookResult {
        if !self.encrypt || !self.active(&ctx.query()) {
            return Ok(());
        }
        let packet = ctx.output_mut();
        let plain = packet
            .body()
            .marshal(packet.body_codec())
            .map_err(|e| self.call_error("marshal raw body error", e))?;
        let envelope = self
            .cipher
            .seal(&plain)
            .map_err(|e| self.call_error("marshal raw body error", e))?;
        trace!(uri = packet.uri(), len = plain.len(), "encrypted body");
        packet.set_body(Body::typed(envelope));
        Ok(())
    }

    fn pre_read_body(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        if !self.decrypt || !self.active(&ctx.query()) {
            return Ok(());
        }
        let original = ctx.input_mut().take_body();
        ctx.scratch_mut().insert(RAW_BODY_KEY, original);
        ctx.input_mut().set_body(Body::typed(Envelope::default()));
        Ok(())
    }

    fn post_read_body(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        let Some(mut original) = ctx.scratch_mut().remove::<Body>(RAW_BODY_KEY) else {
            return Ok(());
        };
        let packet = ctx.input_mut();
        let envelope = packet
            .take_body()
            .into_typed::<Envelope>()
            .unwrap_or_default();

        let plain = match self.cipher.open(&envelope) {
            Ok(plain) => plain,
            Err(e) => {
                packet.set_body(original);
                return Err(self.call_error("decrypt ciphertext error", e));
            }
        };

        let result = original.unmarshal(packet.body_codec(), Bytes::from(plain));
        packet.set_body(original);
        result.map_err(|e| self.call_error("unmarshal raw body error", e))
    }

    fn read_body_failed(&self, ctx: &mut ReadCtx<'_>, err: &WireError) -> HookResult {
        let Some(original) = ctx.scratch_mut().remove::<Body>(RAW_BODY_KEY) else {
            return Ok(());
        };
        ctx.input_mut().set_body(original);
        Err(self.call_error("unmarshal raw body error", err))
    }
}
