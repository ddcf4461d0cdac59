//! Heartbeat responder.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{
    get_info, init_info, is_heartbeat_path, parse_rate_second, touch_session, HeartbeatCell,
    Role, SweepStats, HEARTBEAT_INFO_KEY, HEARTBEAT_QUERY_KEY,
};
use crate::config::HeartbeatConfig;
use crate::context::{ReadCtx, WriteCtx};
use crate::error::{CallError, Result, CODE_BAD_PACKET};
use crate::packet::Query;
use crate::plugin::{HookResult, Plugin};
use crate::session::{Session, SessionSource};

/// Heartbeat responder plugin.
#[derive(Debug, Clone)]
pub struct Pong {
    initial_rate: Duration,
    min_rate: Duration,
}

impl Default for Pong {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

impl Pong {
    /// Create a responder with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a responder from configuration.
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self {
            initial_rate: config.clamp(config.responder_initial_rate),
            min_rate: config.rate_floor(),
        }
    }

    /// Rate assumed for a session until its peer declares one.
    pub fn initial_rate(&self) -> Duration {
        self.initial_rate
    }

    /// Apply a declared rate to a session.
    ///
    /// Missing or empty: error, nothing changes. Zero or invalid: activity
    /// only. Positive: activity plus the new rate, clamped to the floor.
    pub fn negotiate(&self, session: &dyn Session, rate: Option<&str>) -> Result<()> {
        let secs = parse_rate_second(rate.unwrap_or_default())?;
        let cell = session
            .public()
            .load_or_store_with(HEARTBEAT_INFO_KEY, || {
                HeartbeatCell::new(Role::Responder, self.initial_rate)
            });
        if secs == 0 {
            trace!(session = %session.id(), "heart-pong");
            cell.touch(None);
        } else {
            let rate = Duration::from_secs(secs).max(self.min_rate);
            trace!(session = %session.id(), rate_secs = rate.as_secs(), "heart-pong: set rate");
            cell.touch(Some(rate));
        }
        Ok(())
    }

    /// Handle a pull to the heartbeat URI. An invalid rate is replied to
    /// with a 400 error.
    pub fn handle_pull(
        &self,
        session: &dyn Session,
        query: &Query,
    ) -> std::result::Result<(), CallError> {
        let rate = query.get(HEARTBEAT_QUERY_KEY);
        self.negotiate(session, rate).map_err(|_| {
            CallError::new(CODE_BAD_PACKET, "Invalid Heartbeat Rate")
                .with_reason(rate.unwrap_or_default())
        })
    }

    /// Handle a push to the heartbeat URI. An invalid rate is only logged.
    pub fn handle_push(&self, session: &dyn Session, query: &Query) {
        let rate = query.get(HEARTBEAT_QUERY_KEY);
        if let Err(e) = self.negotiate(session, rate) {
            debug!(session = %session.id(), error = %e, "heart-pong: invalid heartbeat rate");
        }
    }

    /// Run one sweep over a snapshot of sessions.
    ///
    /// Closes unhealthy sessions and sessions silent for more than twice
    /// their rate. Returns the interval until the next sweep: the smallest
    /// rate among surviving sessions, or the initial rate if none.
    pub fn sweep(&self, source: &dyn SessionSource) -> (SweepStats, Duration) {
        let mut stats = SweepStats::default();
        let mut next: Option<Duration> = None;
        let now = Instant::now();

        for session in source.sessions() {
            stats.visited += 1;
            if !session.health() {
                warn!(session = %session.id(), "heartbeat: closing unhealthy session");
                session.close();
                stats.closed += 1;
                continue;
            }
            let Some(cell) = get_info(session.public()) else {
                continue;
            };
            let info = cell.snapshot();
            if info.is_expired(now) {
                warn!(
                    session = %session.id(),
                    idle_secs = info.idle(now).as_secs(),
                    rate_secs = info.rate.as_secs(),
                    "heartbeat: session timed out"
                );
                session.close();
                stats.closed += 1;
                continue;
            }
            next = Some(next.map_or(info.rate, |n| n.min(info.rate)));
        }
        (stats, next.unwrap_or(self.initial_rate))
    }

    /// Spawn the sweep loop.
    pub fn spawn(self: Arc<Self>, source: Arc<dyn SessionSource>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = self.initial_rate;
            loop {
                tokio::time::sleep(interval).await;
                let (stats, next) = self.sweep(source.as_ref());
                trace!(?stats, next_secs = next.as_secs(), "heartbeat: pong sweep");
                interval = next;
            }
        })
    }
}

impl Plugin for Pong {
    fn name(&self) -> &str {
        "heart-pong"
    }

    fn post_accept(&self, session: &Arc<dyn Session>) -> HookResult {
        init_info(session.public(), Role::Responder, self.initial_rate);
        Ok(())
    }

    fn post_read_header(&self, ctx: &mut ReadCtx<'_>) -> HookResult {
        if is_heartbeat_path(ctx.path()) {
            return Ok(());
        }
        if let Some(session) = ctx.session() {
            touch_session(session, None);
        }
        Ok(())
    }

    fn post_write(&self, ctx: &mut WriteCtx<'_>) -> HookResult {
        if is_heartbeat_path(ctx.path()) {
            return Ok(());
        }
        if let Some(session) = ctx.session() {
            touch_session(session, None);
        }
        Ok(())
    }
}
