//! Shared test utilities for the Codedeck workspace
//!
//! This crate provides an in-memory realtime transport so that the client
//! test suites can drive connections, frames and closures without a network
//! dependency.
//!
//! # Mocks
//!
//! - [`MockConnector`] - scriptable connector: counts and optionally refuses
//!   connection attempts
//! - [`MockAcceptor`] - receives one [`MockServerHandle`] per accepted
//!   connection
//! - [`MockServerHandle`] - the server side of one mock connection: inspect
//!   frames the client sent, inject frames, errors and closures
//!
//! # Example
//!
//! ```rust,ignore
//! use codedeck_test_utils::MockConnector;
//!
//! #[tokio::test]
//! async fn test_with_mock_transport() {
//!     let (connector, mut acceptor) = MockConnector::new();
//!     let client = RealtimeClient::spawn(config, connector);
//!
//!     client.connect();
//!     let mut server = acceptor.accept().await;
//!     server.push_json(serde_json::json!({"type": "auth_success"}));
//! }
//! ```

mod realtime;

pub use realtime::{MockAcceptor, MockConnector, MockServerHandle, MockTransport};
