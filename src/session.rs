//! Session seam to the RPC runtime.
//!
//! The wire layer does not own connections. It only needs to know, per
//! session, whether it is still healthy, how to close it, where its public
//! store is, and how to send a heartbeat probe. A [`SessionSource`] hands
//! the heartbeat sweeps a snapshot of the live sessions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Swap;
use crate::error::Result;

/// Boxed future returned by session operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One live peer session.
pub trait Session: Send + Sync + 'static {
    /// Session id, for logging.
    fn id(&self) -> String;

    /// Whether the underlying connection is still usable.
    fn health(&self) -> bool;

    /// Close the session. Must be idempotent and cancel in-flight calls.
    fn close(&self);

    /// Per-session public store.
    fn public(&self) -> &Swap;

    /// Send a one-way packet to `uri` with an empty body.
    fn push(&self, uri: &str) -> BoxFuture<'_, Result<()>>;

    /// Send a request to `uri` with an empty body and wait for the reply.
    fn pull(&self, uri: &str) -> BoxFuture<'_, Result<()>>;
}

/// Source of live sessions for heartbeat sweeps.
pub trait SessionSource: Send + Sync + 'static {
    /// Snapshot of the sessions alive right now.
    ///
    /// Closing a returned session must not affect the snapshot.
    fn sessions(&self) -> Vec<Arc<dyn Session>>;
}
