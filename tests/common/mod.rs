//! Shared test doubles: in-memory sessions and a session source.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tpwire::context::Swap;
use tpwire::session::{BoxFuture, Session, SessionSource};
use tpwire::{Result, WireError};

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session that records the probes it was asked to send.
pub struct MockSession {
    id: String,
    healthy: AtomicBool,
    closed: AtomicBool,
    fail: AtomicBool,
    hang: AtomicBool,
    public: Swap,
    sent: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            public: Swap::new(),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Make the transport report the session as half-closed.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make every probe fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every probe wait forever.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Probes sent so far, as `"PUSH <uri>"` / `"PULL <uri>"`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn as_dyn(self: &Arc<Self>) -> Arc<dyn Session> {
        self.clone()
    }

    fn send(&self, kind: &str, uri: &str) -> BoxFuture<'_, Result<()>> {
        self.sent.lock().push(format!("{} {}", kind, uri));
        let fail = self.fail.load(Ordering::SeqCst) || self.is_closed();
        let hang = self.hang.load(Ordering::SeqCst);
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            if fail {
                return Err(WireError::ConnectionClosed);
            }
            Ok(())
        })
    }
}

impl Session for MockSession {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn public(&self) -> &Swap {
        &self.public
    }

    fn push(&self, uri: &str) -> BoxFuture<'_, Result<()>> {
        self.send("PUSH", uri)
    }

    fn pull(&self, uri: &str) -> BoxFuture<'_, Result<()>> {
        self.send("PULL", uri)
    }
}

/// Session registry that drops closed sessions from its snapshots.
#[derive(Default)]
pub struct MemorySessions {
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MemorySessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, session: Arc<MockSession>) {
        self.sessions.lock().push(session);
    }
}

impl SessionSource for MemorySessions {
    fn sessions(&self) -> Vec<Arc<dyn Session>> {
        self.sessions
            .lock()
            .iter()
            .filter(|s| !s.is_closed())
            .map(|s| s.clone() as Arc<dyn Session>)
            .collect()
    }
}
