//! Realtime update channel client for the Codedeck dashboard
//!
//! This crate owns the dashboard's persistent connection to the Codedeck
//! realtime endpoint: it authenticates, multiplexes topic subscriptions for
//! the resources currently on screen (tasks, task logs, task status,
//! projects), queues outbound traffic while disconnected, and reconnects
//! with exponential backoff after an abnormal closure.
//!
//! # Example
//!
//! ```rust,no_run
//! use codedeck_realtime_client::{RealtimeClient, ResourceKind, UpdatePayload};
//! use codedeck_shared_config::RealtimeConfig;
//!
//! # async fn example() {
//! let client = RealtimeClient::websocket(RealtimeConfig::default());
//! client.set_auth_token("access-token");
//!
//! // A guard keeps the subscription alive for the owning scope
//! let _binding = client.bind(ResourceKind::TaskStatus, 42, |event| {
//!     if let UpdatePayload::TaskStatus(status) = &event.payload {
//!         println!("task 42 is now {:?}", status.state);
//!     }
//! });
//!
//! // Elsewhere, a status indicator watches the connection
//! let mut states = client.state_changes();
//! while let Ok(change) = states.recv().await {
//!     println!("realtime: {}", change.state);
//! }
//! # }
//! ```
//!
//! Handle methods never fail: connection problems are absorbed internally
//! and observable only through the state-change stream and logs.

mod backoff;
mod binding;
mod channel;
mod error;
mod messages;
mod models;
mod registry;
mod transport;

pub use backoff::ReconnectPolicy;
pub use binding::{BindingSet, SubscriptionGuard};
pub use channel::{ClientStats, ConnectionState, RealtimeClient, StateChange};
pub use error::{RealtimeError, RealtimeResult};
pub use messages::{AuthData, Frame, ResourceId, ResourceKind, TopicKey};
pub use models::{
    LogLine, ProjectTaskCounts, ProjectUpdate, TaskLogsUpdate, TaskState, TaskStatusUpdate,
    TaskUpdate, UpdateEvent, UpdatePayload,
};
pub use registry::{Handler, HandlerId, SubscriptionRegistry};
pub use transport::{
    Connector, Transport, TransportEvent, WsConnector, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
