//! Per-call contexts handed to plugin hooks, and the typed stores they use.
//!
//! - [`Swap`] is the long-lived, per-session store (heartbeat info lives
//!   here). It is shared between the I/O path and background sweeps.
//! - [`Scratch`] is scoped to one in-flight message and dropped with its
//!   context (the secure plugin stashes the caller's body here between the
//!   pre-read and post-read hooks).
//! - [`ReadCtx`] / [`WriteCtx`] bundle the packet being read or written,
//!   the owning session (if any) and a fresh scratch space.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::packet::{Packet, Query};
use crate::session::Session;

/// Thread-safe typed key-value store shared by one session.
#[derive(Default)]
pub struct Swap {
    entries: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Swap {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one.
    pub fn store<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(key.into(), Arc::new(value));
    }

    /// Load a value if present and of type `T`.
    pub fn load<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.entries.read().get(key)?.clone();
        value.downcast::<T>().ok()
    }

    /// Load a value, storing the one built by `init` if absent or of
    /// another type.
    pub fn load_or_store_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key) {
            if let Ok(v) = existing.clone().downcast::<T>() {
                return v;
            }
        }
        let value = Arc::new(init());
        entries.insert(key.to_string(), value.clone());
        value
    }

    /// Remove a value. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for Swap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut keys: Vec<_> = entries.keys().collect();
        keys.sort();
        f.debug_struct("Swap").field("keys", &keys).finish()
    }
}

/// Typed scratch space scoped to one message.
#[derive(Default)]
pub struct Scratch {
    entries: HashMap<&'static str, Box<dyn Any + Send>>,
}

impl Scratch {
    /// Create an empty scratch space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous one.
    pub fn insert<T: Any + Send>(&mut self, key: &'static str, value: T) {
        self.entries.insert(key, Box::new(value));
    }

    /// Borrow a value of type `T`.
    pub fn get<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    /// Take a value of type `T` out. A value of another type is left in
    /// place.
    pub fn remove<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        if !self.entries.get(key)?.is::<T>() {
            return None;
        }
        self.entries
            .remove(key)?
            .downcast::<T>()
            .ok()
            .map(|b| *b)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the scratch space is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scratch")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Context for reading one packet.
pub struct ReadCtx<'a> {
    input: &'a mut Packet,
    session: Option<Arc<dyn Session>>,
    scratch: Scratch,
}

impl<'a> ReadCtx<'a> {
    /// Create a context without a session.
    pub fn new(input: &'a mut Packet) -> Self {
        Self {
            input,
            session: None,
            scratch: Scratch::new(),
        }
    }

    /// Create a context bound to a session.
    pub fn with_session(input: &'a mut Packet, session: Arc<dyn Session>) -> Self {
        Self {
            input,
            session: Some(session),
            scratch: Scratch::new(),
        }
    }

    /// The packet being read.
    #[inline]
    pub fn input(&self) -> &Packet {
        self.input
    }

    /// Mutable access to the packet being read.
    #[inline]
    pub fn input_mut(&mut self) -> &mut Packet {
        self.input
    }

    /// The owning session.
    #[inline]
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// URI path of the packet.
    pub fn path(&self) -> &str {
        self.input.path()
    }

    /// Parsed URI query of the packet.
    pub fn query(&self) -> Query {
        self.input.query()
    }

    /// Per-message scratch space.
    #[inline]
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Mutable per-message scratch space.
    #[inline]
    pub fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }
}

/// Context for writing one packet.
pub struct WriteCtx<'a> {
    output: &'a mut Packet,
    session: Option<Arc<dyn Session>>,
    scratch: Scratch,
}

impl<'a> WriteCtx<'a> {
    /// Create a context without a session.
    pub fn new(output: &'a mut Packet) -> Self {
        Self {
            output,
            session: None,
            scratch: Scratch::new(),
        }
    }

    /// Create a context bound to a session.
    pub fn with_session(output: &'a mut Packet, session: Arc<dyn Session>) -> Self {
        Self {
            output,
            session: Some(session),
            scratch: Scratch::new(),
        }
    }

    /// The packet being written.
    #[inline]
    pub fn output(&self) -> &Packet {
        self.output
    }

    /// Mutable access to the packet being written.
    #[inline]
    pub fn output_mut(&mut self) -> &mut Packet {
        self.output
    }

    /// The owning session.
    #[inline]
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// URI path of the packet.
    pub fn path(&self) -> &str {
        self.output.path()
    }

    /// Parsed URI query of the packet.
    pub fn query(&self) -> Query {
        self.output.query()
    }

    /// Per-message scratch space.
    #[inline]
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Mutable per-message scratch space.
    #[inline]
    pub fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }
}
