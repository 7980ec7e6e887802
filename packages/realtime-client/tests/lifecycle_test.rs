//! Integration tests for the connection lifecycle
//!
//! Covers idempotent connects, deliberate vs. abnormal closure, the
//! exponential backoff schedule and its ceiling, and the state-change
//! notification stream. Every test drives the channel over the in-memory
//! mock transport under a paused tokio clock.

mod common;

use std::time::Duration;

use codedeck_realtime_client::{ConnectionState, StateChange, CLOSE_NORMAL};

use common::{open_client, settle, spawn_client};

fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<StateChange>,
) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(change) = rx.try_recv() {
        states.push(change.state);
    }
    states
}

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_open_and_notifies() {
    let (client, connector, mut acceptor) = spawn_client();
    let mut events = client.state_changes();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(!client.is_connected());

    client.connect();
    let _server = acceptor.accept().await;
    settle().await;

    assert_eq!(client.state(), ConnectionState::Open);
    assert!(client.is_connected());
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(
        drain_events(&mut events),
        vec![ConnectionState::Connecting, ConnectionState::Open]
    );

    let stats = client.stats();
    assert_eq!(stats.connects, 1);
    assert!(stats.last_connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let (client, connector, mut acceptor) = spawn_client();

    // Two back-to-back connects must not create a second transport
    client.connect();
    client.connect();
    let _server = acceptor.accept().await;
    settle().await;

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Open);

    // Connecting again while open is also a no-op
    client.connect();
    settle().await;
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deliberate_disconnect_uses_normal_close_and_suppresses_reconnect() {
    let (client, connector, _acceptor, server) = open_client().await;
    let mut events = client.state_changes();

    client.disconnect();
    settle().await;

    assert_eq!(server.client_close_code(), Some(CLOSE_NORMAL));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(
        drain_events(&mut events),
        vec![ConnectionState::Closing, ConnectionState::Closed]
    );

    // No reconnection is ever scheduled after a deliberate close
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_transport_is_noop() {
    let (client, connector, _acceptor) = spawn_client();
    let mut events = client.state_changes();

    client.disconnect();
    settle().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(drain_events(&mut events).is_empty());
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_schedules_reconnect() {
    let (client, connector, mut acceptor, server) = open_client().await;

    server.close(1006);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    // The reconnect fires after the base interval and succeeds
    let _server2 = acceptor.accept().await;
    settle().await;
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(connector.connect_count(), 2);

    let instants = connector.connect_instants();
    let delay = instants[1] - instants[0];
    assert!(
        delay >= Duration::from_millis(3000) && delay <= Duration::from_millis(3010),
        "first reconnect delay was {:?}",
        delay
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_growth_and_ceiling() {
    let (client, connector, _acceptor, server) = open_client().await;

    // Drop the connection and refuse every reconnect: five automatic
    // attempts spaced 3000 * 1.5^n apart, then nothing
    connector.refuse_all_connects();
    server.close(1006);
    tokio::time::sleep(Duration::from_secs(120)).await;

    // 1 initial + 5 automatic attempts
    assert_eq!(connector.connect_count(), 6);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.stats().reconnects_scheduled, 5);

    let instants = connector.connect_instants();
    let gaps: Vec<Duration> = instants.windows(2).map(|w| w[1] - w[0]).collect();

    // The first gap includes the instant of the abnormal close itself
    assert!(gaps[0] >= Duration::from_millis(3000) && gaps[0] <= Duration::from_millis(3010));
    assert_eq!(gaps[1], Duration::from_millis(4500));
    assert_eq!(gaps[2], Duration::from_millis(6750));
    assert_eq!(gaps[3], Duration::from_millis(10125));
    assert_eq!(gaps[4], Duration::from_millis(15188));

    // No sixth attempt, ever
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.connect_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_connect_resumes_after_exhaustion() {
    let (client, connector, mut acceptor, server) = open_client().await;

    connector.refuse_all_connects();
    server.close(1006);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connect_count(), 6);

    // A caller-initiated connect starts over
    connector.refuse_next_connects(0);
    client.connect();
    let _server2 = acceptor.accept().await;
    settle().await;

    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(connector.connect_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (client, connector, _acceptor, server) = open_client().await;

    server.close(1006);
    settle().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    // A reconnect is pending; a deliberate disconnect cancels it
    client.disconnect();
    settle().await;

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_connect_retries_like_abnormal_close() {
    let (client, connector, mut acceptor) = spawn_client();

    connector.refuse_next_connects(1);
    client.connect();
    settle().await;
    assert_eq!(client.state(), ConnectionState::Closed);

    // The retry lands after the base interval and succeeds
    let _server = acceptor.accept().await;
    settle().await;
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_reemits_state_without_transition() {
    let (client, _connector, _acceptor, server) = open_client().await;
    let mut events = client.state_changes();

    server.push_error("read timed out");
    settle().await;

    // The error alone re-broadcasts the current state; only the close that
    // may follow drives a transition
    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(drain_events(&mut events), vec![ConnectionState::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_does_not_break_the_connection() {
    let (client, _connector, _acceptor, server) = open_client().await;

    server.push_text("{definitely not json");
    server.push_text("[]");
    settle().await;

    assert_eq!(client.state(), ConnectionState::Open);
    assert_eq!(client.stats().frames_received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_frame_is_informational() {
    let (client, _connector, _acceptor, server) = open_client().await;

    server.push_json(serde_json::json!({
        "type": "error",
        "data": {"message": "subscription limit reached"}
    }));
    settle().await;

    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_with_normal_code_does_not_reconnect() {
    let (client, connector, _acceptor, server) = open_client().await;

    // A server-side close with the deliberate code is honored as final
    server.close(CLOSE_NORMAL);
    settle().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(connector.connect_count(), 1);
}
