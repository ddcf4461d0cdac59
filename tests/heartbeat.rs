//! Heartbeat tests over in-memory sessions with a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::advance;

use common::{init_tracing, MemorySessions, MockSession};
use tpwire::config::{HeartbeatConfig, PingMode};
use tpwire::context::{ReadCtx, WriteCtx};
use tpwire::error::CODE_BAD_PACKET;
use tpwire::heartbeat::{get_info, HeartbeatInfo, Ping, Pong, Role, SweepStats};
use tpwire::packet::{Packet, PacketType, Query};
use tpwire::plugin::{Plugin, PluginChain};
use tpwire::session::Session;
use tpwire::WireError;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn info(session: &MockSession) -> HeartbeatInfo {
    get_info(session.public()).unwrap().snapshot()
}

/// Responder session that has negotiated `rate` seconds.
fn responder_session(pong: &Pong, sessions: &MemorySessions, id: &str, rate: u64) -> Arc<MockSession> {
    let session = MockSession::new(id);
    sessions.add(session.clone());
    pong.post_accept(&session.as_dyn()).unwrap();
    pong.handle_push(session.as_ref(), &Query::parse(&format!("hb_={}", rate)));
    session
}

/// A silent session is closed only once idle for more than twice its rate.
#[tokio::test(start_paused = true)]
async fn test_responder_timeout_twice_rate() {
    init_tracing();
    let pong = Pong::new();
    let sessions = MemorySessions::new();
    let session = responder_session(&pong, &sessions, "s1", 5);
    assert_eq!(info(&session).rate, secs(5));
    assert_eq!(info(&session).role, Role::Responder);

    advance(secs(10)).await;
    let (stats, next) = pong.sweep(sessions.as_ref());
    assert_eq!(stats.closed, 0);
    assert_eq!(next, secs(5));
    assert!(!session.is_closed());

    advance(secs(1)).await;
    let (stats, next) = pong.sweep(sessions.as_ref());
    assert_eq!(
        stats,
        SweepStats {
            visited: 1,
            probed: 0,
            closed: 1
        }
    );
    assert!(session.is_closed());
    assert_eq!(next, pong.initial_rate());
}

/// Ordinary traffic counts as activity; heartbeat-path traffic through the
/// generic hooks does not.
#[tokio::test(start_paused = true)]
async fn test_responder_traffic_keeps_alive() {
    let pong = Pong::new();
    let sessions = MemorySessions::new();
    let session = responder_session(&pong, &sessions, "s1", 5);

    for seq in 0..15 {
        advance(secs(4)).await;
        let mut packet = Packet::new(PacketType::Pull, seq, "/math/add");
        let mut ctx = ReadCtx::with_session(&mut packet, session.as_dyn());
        pong.post_read_header(&mut ctx).unwrap();
        pong.sweep(sessions.as_ref());
        assert!(!session.is_closed(), "closed after {} rounds", seq);
    }

    for seq in 0..3 {
        advance(secs(4)).await;
        let mut packet = Packet::new(PacketType::Push, seq, "/heart/beat?hb_=5");
        let mut ctx = WriteCtx::with_session(&mut packet, session.as_dyn());
        pong.post_write(&mut ctx).unwrap();
    }
    pong.sweep(sessions.as_ref());
    assert!(session.is_closed());
}

/// Rate negotiation: positive values adopt (clamped), zero only touches,
/// empty is rejected without touching.
#[tokio::test(start_paused = true)]
async fn test_responder_negotiation() {
    let pong = Pong::new();
    let session = MockSession::new("s1");

    // No info yet: created on first heartbeat.
    pong.negotiate(session.as_ref(), Some("5")).unwrap();
    let start = info(&session);
    assert_eq!(start.rate, secs(5));
    assert_eq!(start.role, Role::Responder);

    advance(secs(2)).await;
    let err = pong.negotiate(session.as_ref(), Some("")).unwrap_err();
    assert!(matches!(err, WireError::Negotiation(_)));
    assert!(pong.negotiate(session.as_ref(), None).is_err());
    assert_eq!(info(&session), start);

    pong.negotiate(session.as_ref(), Some("0")).unwrap();
    let touched = info(&session);
    assert_eq!(touched.rate, secs(5));
    assert_eq!(touched.last, start.last + secs(2));

    pong.negotiate(session.as_ref(), Some("1")).unwrap();
    assert_eq!(info(&session).rate, secs(3));

    pong.negotiate(session.as_ref(), Some("abc")).unwrap();
    assert_eq!(info(&session).rate, secs(3));
}

/// A pull with a missing rate is answered with a 400 error; a push is not.
#[tokio::test(start_paused = true)]
async fn test_responder_invalid_rate() {
    let pong = Pong::new();
    let session = MockSession::new("s1");

    let err = pong
        .handle_pull(session.as_ref(), &Query::parse("hb_="))
        .unwrap_err();
    assert_eq!(err.code, CODE_BAD_PACKET);
    assert_eq!(err.message, "Invalid Heartbeat Rate");

    assert!(pong.handle_pull(session.as_ref(), &Query::new()).is_err());

    pong.handle_push(session.as_ref(), &Query::parse("hb_="));
    assert!(get_info(session.public()).is_none());

    pong.handle_pull(session.as_ref(), &Query::parse("hb_=12"))
        .unwrap();
    assert_eq!(info(&session).rate, secs(12));
}

/// The next sweep runs after the smallest surviving rate.
#[tokio::test(start_paused = true)]
async fn test_responder_next_interval() {
    let pong = Pong::from_config(&HeartbeatConfig::default().responder_initial_rate(secs(30)));
    let sessions = MemorySessions::new();
    let (_, next) = pong.sweep(sessions.as_ref());
    assert_eq!(next, secs(30));

    let fast = responder_session(&pong, &sessions, "fast", 5);
    let _slow = responder_session(&pong, &sessions, "slow", 20);
    let (_, next) = pong.sweep(sessions.as_ref());
    assert_eq!(next, secs(5));

    fast.set_healthy(false);
    let (stats, next) = pong.sweep(sessions.as_ref());
    assert_eq!(stats.closed, 1);
    assert_eq!(next, secs(20));
}

/// The prober probes idle sessions, closes failed or unhealthy ones and
/// adopts sessions it has not seen.
#[tokio::test(start_paused = true)]
async fn test_prober_sweep() {
    init_tracing();
    let ping = Ping::new(secs(5));
    let sessions = MemorySessions::new();

    let ok = MockSession::new("ok");
    let failing = MockSession::new("failing");
    let unhealthy = MockSession::new("unhealthy");
    for s in [&ok, &failing, &unhealthy] {
        ping.post_accept(&s.as_dyn()).unwrap();
        sessions.add(s.clone());
    }
    let unseen = MockSession::new("unseen");
    sessions.add(unseen.clone());
    failing.set_fail(true);
    unhealthy.set_healthy(false);

    advance(secs(5)).await;
    let stats = ping.sweep(sessions.as_ref()).await;
    assert_eq!(
        stats,
        SweepStats {
            visited: 4,
            probed: 2,
            closed: 2
        }
    );
    assert_eq!(ok.sent(), vec!["PUSH /heart/beat?hb_=5"]);
    assert!(!ok.is_closed());
    assert!(failing.is_closed());
    assert!(unhealthy.is_closed());
    assert!(unhealthy.sent().is_empty());
    assert!(unseen.sent().is_empty());
    assert_eq!(info(&unseen).role, Role::Prober);

    // A successful probe counts as activity.
    let stats = ping.sweep(sessions.as_ref()).await;
    assert_eq!(stats.visited, 2);
    assert_eq!(stats.probed, 0);
}

/// A probe that never completes is abandoned after one rate and closes its
/// session without holding up the others.
#[tokio::test(start_paused = true)]
async fn test_prober_stuck_session_times_out() {
    let ping = Ping::new(secs(5));
    let sessions = MemorySessions::new();
    let stuck = MockSession::new("stuck");
    let ok = MockSession::new("ok");
    for s in [&stuck, &ok] {
        ping.post_accept(&s.as_dyn()).unwrap();
        sessions.add(s.clone());
    }
    stuck.set_hang(true);

    advance(secs(5)).await;
    let started = tokio::time::Instant::now();
    let stats = ping.sweep(sessions.as_ref()).await;
    assert_eq!(started.elapsed(), secs(5));
    assert_eq!(
        stats,
        SweepStats {
            visited: 2,
            probed: 2,
            closed: 1
        }
    );
    assert!(stuck.is_closed());
    assert!(!ok.is_closed());
}

/// Outgoing traffic postpones the next probe.
#[tokio::test(start_paused = true)]
async fn test_prober_traffic_postpones_probe() {
    let ping = Ping::new(secs(5));
    let sessions = MemorySessions::new();
    let session = MockSession::new("s1");
    sessions.add(session.clone());
    let chain = PluginChain::new().with(Arc::new(Ping::new(secs(5))));
    chain.post_accept(&session.as_dyn()).unwrap();

    advance(secs(4)).await;
    let mut packet = Packet::new(PacketType::Push, 1, "/notify");
    chain
        .post_write(&mut WriteCtx::with_session(&mut packet, session.as_dyn()))
        .unwrap();

    advance(secs(4)).await;
    assert_eq!(ping.sweep(sessions.as_ref()).await.probed, 0);

    advance(secs(1)).await;
    assert_eq!(ping.sweep(sessions.as_ref()).await.probed, 1);
}

/// Pull mode probes with a pull on the configured URI.
#[tokio::test(start_paused = true)]
async fn test_prober_pull_mode() {
    let cfg = HeartbeatConfig::default()
        .rate(secs(5))
        .uri("/heartbeat")
        .mode(PingMode::Pull);
    let ping = Ping::from_config(&cfg);
    let sessions = MemorySessions::new();
    let session = MockSession::new("s1");
    sessions.add(session.clone());
    ping.post_accept(&session.as_dyn()).unwrap();

    advance(secs(5)).await;
    ping.sweep(sessions.as_ref()).await;
    assert_eq!(session.sent(), vec!["PULL /heartbeat?hb_=5"]);
}

/// Background loops probe and expire sessions on their own.
#[tokio::test(start_paused = true)]
async fn test_spawned_loops() {
    let ping_sessions = MemorySessions::new();
    let ping = Arc::new(Ping::new(secs(5)));
    let probed = MockSession::new("probed");
    ping_sessions.add(probed.clone());
    ping.post_accept(&probed.as_dyn()).unwrap();
    let ping_task = ping.clone().spawn(ping_sessions);

    let pong_sessions = MemorySessions::new();
    let pong = Arc::new(Pong::new());
    let silent = responder_session(&pong, &pong_sessions, "silent", 5);
    let pong_task = pong.clone().spawn(pong_sessions);

    tokio::time::sleep(secs(61)).await;

    assert!(!probed.sent().is_empty());
    assert!(probed
        .sent()
        .iter()
        .all(|s| s == "PUSH /heart/beat?hb_=5"));
    assert!(!probed.is_closed());
    assert!(silent.is_closed());

    ping_task.abort();
    pong_task.abort();
}
