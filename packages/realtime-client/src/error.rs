//! Realtime client error types

use thiserror::Error;

/// Errors produced by the realtime transport layer
///
/// None of these surface to callers of the public handle methods; the
/// channel absorbs them and reports through the state stream and logs.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// Establishing the transport connection failed
    #[error("failed to connect realtime transport: {0}")]
    Connect(String),

    /// Transmitting a frame failed
    #[error("failed to send realtime frame: {0}")]
    Send(String),

    /// The transport is closed
    #[error("realtime transport is closed")]
    Closed,

    /// Frame serialization failed
    #[error("failed to encode realtime frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for realtime transport operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;
