//! Protocol hook points.
//!
//! A [`Plugin`] observes or rewrites packets at fixed points of the frame
//! codec's read and write paths:
//!
//! ```text
//! write: pre_write -> pack -> post_write
//! read:  read frame -> post_read_header -> pre_read_body -> unmarshal body -> post_read_body
//!                                                  \-> (error) -> read_body_failed
//! ```
//!
//! Every hook defaults to a no-op. A hook error aborts the rest of the
//! chain and is surfaced to the caller as a [`CallError`].

use std::sync::Arc;

use crate::context::{ReadCtx, WriteCtx};
use crate::error::{CallError, WireError};
use crate::session::Session;

/// Result of a plugin hook.
pub type HookResult = std::result::Result<(), CallError>;

/// A set of protocol hooks.
pub trait Plugin: Send + Sync + 'static {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Before the body is marshaled and the frame written.
    fn pre_write(&self, _ctx: &mut WriteCtx<'_>) -> HookResult {
        Ok(())
    }

    /// After the frame was written.
    fn post_write(&self, _ctx: &mut WriteCtx<'_>) -> HookResult {
        Ok(())
    }

    /// After the header fields were read, before any body hook.
    fn post_read_header(&self, _ctx: &mut ReadCtx<'_>) -> HookResult {
        Ok(())
    }

    /// Before the body bytes are unmarshaled into the packet's body.
    fn pre_read_body(&self, _ctx: &mut ReadCtx<'_>) -> HookResult {
        Ok(())
    }

    /// After the body was unmarshaled.
    fn post_read_body(&self, _ctx: &mut ReadCtx<'_>) -> HookResult {
        Ok(())
    }

    /// When `pre_read_body` or the body unmarshal failed; `post_read_body`
    /// will not run. Every plugin sees the failure. Returning an error
    /// replaces the one reported to the caller.
    fn read_body_failed(&self, _ctx: &mut ReadCtx<'_>, _err: &WireError) -> HookResult {
        Ok(())
    }

    /// When the runtime establishes a session.
    fn post_accept(&self, _session: &Arc<dyn Session>) -> HookResult {
        Ok(())
    }
}

/// Ordered list of plugins.
#[derive(Default, Clone)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.add(plugin);
        self
    }

    /// Number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run `pre_write` hooks.
    pub fn pre_write(&self, ctx: &mut WriteCtx<'_>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.pre_write(ctx))
    }

    /// Run `post_write` hooks.
    pub fn post_write(&self, ctx: &mut WriteCtx<'_>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.post_write(ctx))
    }

    /// Run `post_read_header` hooks.
    pub fn post_read_header(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.post_read_header(ctx))
    }

    /// Run `pre_read_body` hooks.
    pub fn pre_read_body(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.pre_read_body(ctx))
    }

    /// Run `post_read_body` hooks.
    pub fn post_read_body(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.post_read_body(ctx))
    }

    /// Run every `read_body_failed` hook. Returns the first error raised.
    pub fn read_body_failed(&self, ctx: &mut ReadCtx<'_>, err: &WireError) -> HookResult {
        let mut first = Ok(());
        for plugin in &self.plugins {
            let result = plugin.read_body_failed(ctx, err);
            if first.is_ok() {
                first = result;
            }
        }
        first
    }

    /// Run `post_accept` hooks.
    pub fn post_accept(&self, session: &Arc<dyn Session>) -> HookResult {
        self.plugins.iter().try_for_each(|p| p.post_accept(session))
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
