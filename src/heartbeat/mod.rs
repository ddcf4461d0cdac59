//! Heartbeat liveness.
//!
//! Two cooperating roles keep long-lived sessions honest:
//!
//! - [`Ping`] (prober) sweeps all sessions at its own rate and probes the
//!   ones that have been idle for longer than that rate, closing any whose
//!   probe fails.
//! - [`Pong`] (responder) records the rate a prober declares, counts all
//!   non-heartbeat traffic as activity, and closes sessions that stay silent
//!   for twice their negotiated rate.
//!
//! Per-session state is a [`HeartbeatInfo`] kept in the session's public
//! [`Swap`] under [`HEARTBEAT_INFO_KEY`]. I/O hooks update it under a mutex;
//! sweeps only ever read a copy.
//!
//! Probes are addressed to [`HEARTBEAT_URI`] with the prober's rate in whole
//! seconds in the [`HEARTBEAT_QUERY_KEY`] query parameter:
//!
//! ```text
//! /heart/beat?hb_=60
//! ```

mod ping;
mod pong;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::context::Swap;
use crate::error::{Result, WireError};
use crate::session::Session;

pub use ping::Ping;
pub use pong::Pong;

/// Reserved heartbeat path.
pub const HEARTBEAT_URI: &str = "/heart/beat";

/// Heartbeat path used by older peers; accepted on read.
pub const LEGACY_HEARTBEAT_URI: &str = "/heartbeat";

/// Query parameter carrying the prober's rate in seconds.
pub const HEARTBEAT_QUERY_KEY: &str = "hb_";

/// Floor every negotiated rate is clamped up to, in seconds.
pub const MIN_RATE_SECOND: u64 = 3;

/// Public store key of the per-session heartbeat state.
pub const HEARTBEAT_INFO_KEY: &str = "_HB_";

/// Which side of the heartbeat a session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends probes.
    Prober,
    /// Answers probes and enforces timeouts.
    Responder,
}

/// Copy of one session's heartbeat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatInfo {
    /// Last time traffic was seen.
    pub last: Instant,
    /// Negotiated rate.
    pub rate: Duration,
    /// Role of the local side.
    pub role: Role,
}

impl HeartbeatInfo {
    /// Time since the last activity.
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last)
    }

    /// Whether a prober should probe: idle for at least one rate.
    pub fn needs_probe(&self, now: Instant) -> bool {
        self.idle(now) >= self.rate
    }

    /// Whether a responder should give up: idle for more than two rates.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.idle(now) > self.rate * 2
    }
}

/// Mutex-guarded heartbeat state shared by I/O hooks and sweeps.
#[derive(Debug)]
pub struct HeartbeatCell {
    info: Mutex<HeartbeatInfo>,
}

impl HeartbeatCell {
    /// Create state last touched now.
    pub fn new(role: Role, rate: Duration) -> Self {
        Self {
            info: Mutex::new(HeartbeatInfo {
                last: Instant::now(),
                rate,
                role,
            }),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> HeartbeatInfo {
        *self.info.lock()
    }

    /// Record activity now, optionally adopting a new rate.
    pub fn touch(&self, rate: Option<Duration>) {
        let mut info = self.info.lock();
        info.last = Instant::now();
        if let Some(rate) = rate {
            info.rate = rate;
        }
    }
}

/// Create (or reset) a session's heartbeat state.
pub fn init_info(swap: &Swap, role: Role, rate: Duration) {
    swap.store(HEARTBEAT_INFO_KEY, HeartbeatCell::new(role, rate));
}

/// A session's heartbeat state, if initialized.
pub fn get_info(swap: &Swap) -> Option<Arc<HeartbeatCell>> {
    swap.load::<HeartbeatCell>(HEARTBEAT_INFO_KEY)
}

/// Touch a healthy session's heartbeat state, if it has one.
pub(crate) fn touch_session(session: &Arc<dyn Session>, rate: Option<Duration>) {
    if !session.health() {
        return;
    }
    if let Some(cell) = get_info(session.public()) {
        cell.touch(rate);
    }
}

/// Parse a declared rate.
///
/// `""` is an error. Zero, negative and non-numeric values mean "no rate
/// change" and return 0. Anything else is the rate in seconds.
pub fn parse_rate_second(s: &str) -> Result<u64> {
    if s.is_empty() {
        return Err(WireError::Negotiation(s.to_string()));
    }
    match s.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Ok(0),
    }
}

/// Whether a URI path is a heartbeat path, current or legacy.
pub fn is_heartbeat_path(path: &str) -> bool {
    path == HEARTBEAT_URI || path == LEGACY_HEARTBEAT_URI
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sessions in the snapshot.
    pub visited: usize,
    /// Probes sent.
    pub probed: usize,
    /// Sessions closed.
    pub closed: usize,
}
