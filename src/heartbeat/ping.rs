//! Heartbeat prober.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, Instant};
use tracing::{error, trace, warn};

use super::{get_info, init_info, is_heartbeat_path, touch_session, Role, SweepStats};
use super::HEARTBEAT_QUERY_KEY;
use crate::config::{HeartbeatConfig, PingMode};
use crate::context::{ReadCtx, WriteCtx};
use crate::plugin::{HookResult, Plugin};
use crate::session::{Session, SessionSource};

#[derive(Debug)]
struct PingState {
    rate: Duration,
    uri: String,
}

/// Heartbeat prober plugin.
#[derive(Debug)]
pub struct Ping {
    state: RwLock<PingState>,
    base_uri: String,
    min_rate: Duration,
    mode: PingMode,
}

impl Ping {
    /// Create a push-mode prober at `rate` with the default settings.
    pub fn new(rate: Duration) -> Self {
        Self::from_config(&HeartbeatConfig::default().rate(rate))
    }

    /// Create a prober from configuration.
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        let ping = Self {
            state: RwLock::new(PingState {
                rate: Duration::ZERO,
                uri: String::new(),
            }),
            base_uri: config.uri.clone(),
            min_rate: config.rate_floor(),
            mode: config.mode,
        };
        ping.set_rate(config.rate);
        ping
    }

    /// Change the rate, clamped to the floor. Also rewrites the probe URI.
    pub fn set_rate(&self, rate: Duration) {
        let rate = rate.max(self.min_rate);
        let mut state = self.state.write();
        state.rate = rate;
        state.uri = format!(
            "{}?{}={}",
            self.base_uri,
            HEARTBEAT_QUERY_KEY,
            rate.as_secs()
        );
    }

    /// Current rate.
    pub fn rate(&self) -> Duration {
        self.state.read().rate
    }

    /// Current probe URI.
    pub fn uri(&self) -> String {
        self.state.read().uri.clone()
    }

    /// Probe mode.
    pub fn mode(&self) -> PingMode {
        self.mode
    }

    /// Run one sweep over a snapshot of sessions.
    ///
    /// Unhealthy sessions are closed without probing. Sessions idle for at
    /// least their rate are probed concurrently; a failed probe closes the
    /// session, as does one that takes longer than the rate. Returns once
    /// every probe has finished or timed out.
    pub async fn sweep(&self, source: &dyn SessionSource) -> SweepStats {
        let mut stats = SweepStats::default();
        let now = Instant::now();
        let uri = self.uri();
        let rate = self.rate();
        let mut probes = JoinSet::new();

        for session in source.sessions() {
            stats.visited += 1;
            if !session.health() {
                warn!(session = %session.id(), "heartbeat: closing unhealthy session");
                session.close();
                stats.closed += 1;
                continue;
            }
            let Some(cell) = get_info(session.public()) else {
                init_info(session.public(), Role::Prober, rate);
                continue;
            };
            if !cell.snapshot().needs_probe(now) {
                continue;
            }

            stats.probed += 1;
            let uri = uri.clone();
            let mode = self.mode;
            probes.spawn(async move {
                let probe = match mode {
                    PingMode::Push => session.push(&uri),
                    PingMode::Pull => session.pull(&uri),
                };
                match timeout(rate, probe).await {
                    Ok(Ok(())) => {
                        trace!(session = %session.id(), "heartbeat: ping");
                        cell.touch(None);
                        false
                    }
                    Ok(Err(e)) => {
                        error!(session = %session.id(), error = %e, "heartbeat: ping fail");
                        session.close();
                        true
                    }
                    Err(_) => {
                        error!(
                            session = %session.id(),
                            timeout_secs = rate.as_secs(),
                            "heartbeat: ping timed out"
                        );
                        session.close();
                        true
                    }
                }
            });
        }

        while let Some(joined) = probes.join_next().await {
            if let Ok(true) = joined {
                stats.closed += 1;
            }
        }
        stats
    }

    /// Spawn the sweep loop. Each round sleeps for the current rate first.
    pub fn spawn(self: Arc<Self>, source: Arc<dyn SessionSource>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.rate()).await;
                let stats = self.sweep(source.as_ref()).await;
                trace!(?stats, "heartbeat: ping sweep");
            }
        })
    }
}

impl Plugin for Ping {
    fn name(&self) -> &str {
        "heart-ping"
    }

    fn post_accept(&self, session: &Arc<dyn Session>) -> HookResult {
        init_info(session.public(), Role::Prober, self.rate());
        Ok(())
    }

    fn post_write(&self, ctx: &mut WriteCtx<'_>) -> HookResult {
        if is_heartbeat_path(ctx.path()) {
            return Ok(());
        }
        if let Some(session) = ctx.session() {
            touch_session(session, Some(self.rate()));
        }
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
}
