//! Common test utilities for realtime client integration tests
//!
//! All tests run under a paused tokio clock, so timer-driven behavior
//! (reconnect backoff) is deterministic and instant.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use codedeck_realtime_client::{ConnectionState, RealtimeClient};
use codedeck_shared_config::RealtimeConfig;
use codedeck_test_utils::{MockAcceptor, MockConnector, MockServerHandle};

/// Endpoint used by every test; never dialed for real
pub const TEST_ENDPOINT: &str = "ws://realtime.test/api/realtime";

pub fn test_config() -> RealtimeConfig {
    RealtimeConfig::with_endpoint(TEST_ENDPOINT)
}

/// Spawn a client over a fresh mock connector, without connecting
pub fn spawn_client() -> (RealtimeClient, Arc<MockConnector>, MockAcceptor) {
    let (connector, acceptor) = MockConnector::new();
    let client = RealtimeClient::spawn(test_config(), connector.clone());
    (client, connector, acceptor)
}

/// Spawn a client and drive it to `Open`, returning the server handle
pub async fn open_client() -> (
    RealtimeClient,
    Arc<MockConnector>,
    MockAcceptor,
    MockServerHandle,
) {
    let (client, connector, mut acceptor) = spawn_client();
    client.connect();
    let server = acceptor.accept().await;
    settle().await;
    assert_eq!(client.state(), ConnectionState::Open);
    (client, connector, acceptor, server)
}

/// Let the channel actor drain its command queue
///
/// Under the paused clock this only advances virtual time once every task
/// has gone idle, so it acts as a deterministic synchronization point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
