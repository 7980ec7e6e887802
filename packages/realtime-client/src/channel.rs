//! The realtime channel: connection lifecycle, queuing and dispatch
//!
//! A single actor task owns the transport, the subscription registry and the
//! outbound queue; cloneable [`RealtimeClient`] handles feed it commands over
//! an unbounded channel. Because every piece of channel logic runs on that
//! one task, state transitions, queue drains and handler dispatch are
//! naturally serialized.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use codedeck_shared_config::RealtimeConfig;

use crate::backoff::ReconnectPolicy;
use crate::error::RealtimeError;
use crate::messages::{Frame, ResourceId, ResourceKind, TopicKey};
use crate::models::{UpdateEvent, UpdatePayload};
use crate::registry::{Handler, HandlerId, SubscriptionRegistry};
use crate::transport::{Connector, Transport, TransportEvent, WsConnector, CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Capacity of the state-change broadcast channel
const STATE_EVENTS_CAPACITY: usize = 64;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Notification emitted on every connection state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub state: ConnectionState,
}

/// Counters describing channel activity since construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientStats {
    /// Frames transmitted successfully
    pub frames_sent: u64,

    /// Frames received from the server (including discarded ones)
    pub frames_received: u64,

    /// Automatic reconnection attempts scheduled
    pub reconnects_scheduled: u64,

    /// Successful connection opens
    pub connects: u64,

    /// Unix ms timestamp of the most recent successful open
    pub last_connected_at: Option<i64>,
}

#[derive(Default)]
struct StatsInner {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects_scheduled: AtomicU64,
    connects: AtomicU64,
    last_connected_ms: AtomicI64,
}

impl StatsInner {
    fn snapshot(&self) -> ClientStats {
        let last = self.last_connected_ms.load(Ordering::Relaxed);
        ClientStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            last_connected_at: (last != 0).then_some(last),
        }
    }
}

enum Command {
    Connect,
    Disconnect,
    SetAuthToken(String),
    Subscribe {
        resource: ResourceKind,
        id: ResourceId,
        handler_id: HandlerId,
        handler: Handler,
    },
    Unsubscribe {
        resource: ResourceKind,
        id: ResourceId,
        handler_id: Option<HandlerId>,
    },
}

/// Handle to the realtime channel
///
/// Cheap to clone; the application's composition root constructs exactly one
/// channel and hands clones of this handle to whoever needs realtime data.
/// Every method returns immediately: outcomes are observed through delivered
/// updates and the state-change stream, never through return values.
///
/// # Example
///
/// ```rust,no_run
/// use codedeck_realtime_client::{RealtimeClient, ResourceKind};
/// use codedeck_shared_config::RealtimeConfig;
///
/// # async fn example() {
/// let client = RealtimeClient::websocket(RealtimeConfig::default());
/// client.set_auth_token("access-token");
///
/// // Connects lazily on first demand
/// client.subscribe(ResourceKind::Task, 42, |event| {
///     println!("task update: {:?}", event.payload);
/// });
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<StateChange>,
    stats: Arc<StatsInner>,
    next_handler_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state())
            .finish()
    }
}

impl RealtimeClient {
    /// Spawn the channel actor with a custom transport connector
    pub fn spawn(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let (events_tx, _) = broadcast::channel(STATE_EVENTS_CAPACITY);
        let stats = Arc::new(StatsInner::default());

        let actor = ChannelActor {
            policy: ReconnectPolicy::from_config(&config),
            endpoint: config.endpoint,
            connector,
            commands: command_rx,
            state_tx,
            events_tx: events_tx.clone(),
            state: ConnectionState::Closed,
            transport: None,
            registry: SubscriptionRegistry::new(),
            outbound: VecDeque::new(),
            auth_token: None,
            attempts: 0,
            reconnect_at: None,
            stats: stats.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            state_rx,
            events_tx,
            stats,
            next_handler_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Spawn the channel actor over a real WebSocket connection
    pub fn websocket(config: RealtimeConfig) -> Self {
        Self::spawn(config, Arc::new(WsConnector::new()))
    }

    /// Store the auth token; if the connection is open, re-authenticate
    /// immediately
    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.send_command(Command::SetAuthToken(token.into()));
    }

    /// Open the connection; a no-op while connecting or already open
    pub fn connect(&self) {
        self.send_command(Command::Connect);
    }

    /// Deliberately close the connection and cancel any pending reconnect
    pub fn disconnect(&self) {
        self.send_command(Command::Disconnect);
    }

    /// Register a handler for updates on one topic
    ///
    /// If the channel is closed this triggers a lazy connect. The returned
    /// token identifies the registration for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(
        &self,
        resource: ResourceKind,
        id: impl Into<ResourceId>,
        handler: F,
    ) -> HandlerId
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let handler_id = HandlerId::new(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.send_command(Command::Subscribe {
            resource,
            id: id.into(),
            handler_id,
            handler: Arc::new(handler),
        });
        handler_id
    }

    /// Remove one handler from a topic; the last removal also unsubscribes
    /// the topic on the server
    pub fn unsubscribe(
        &self,
        resource: ResourceKind,
        id: impl Into<ResourceId>,
        handler_id: HandlerId,
    ) {
        self.send_command(Command::Unsubscribe {
            resource,
            id: id.into(),
            handler_id: Some(handler_id),
        });
    }

    /// Remove every handler for a topic and unsubscribe it on the server
    pub fn unsubscribe_topic(&self, resource: ResourceKind, id: impl Into<ResourceId>) {
        self.send_command(Command::Unsubscribe {
            resource,
            id: id.into(),
            handler_id: None,
        });
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// True iff the connection is open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to connection state transitions
    ///
    /// Every transition is broadcast, so observers (e.g. a connection
    /// indicator) need only a receiver, not the client itself.
    pub fn state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.events_tx.subscribe()
    }

    /// Snapshot of channel activity counters
    pub fn stats(&self) -> ClientStats {
        self.stats.snapshot()
    }

    fn send_command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Realtime channel actor is gone, dropping command");
        }
    }
}

enum LoopEvent {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    ReconnectDue,
}

struct ChannelActor {
    endpoint: String,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<StateChange>,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    registry: SubscriptionRegistry,
    outbound: VecDeque<Frame>,
    auth_token: Option<String>,
    policy: ReconnectPolicy,
    attempts: u32,
    reconnect_at: Option<Instant>,
    stats: Arc<StatsInner>,
}

impl ChannelActor {
    async fn run(mut self) {
        loop {
            let event = {
                let commands = &mut self.commands;
                let transport = &mut self.transport;
                let reconnect_at = self.reconnect_at;

                tokio::select! {
                    cmd = commands.recv() => LoopEvent::Command(cmd),
                    transport_event = async {
                        match transport.as_mut() {
                            Some(t) => t.recv().await,
                            None => std::future::pending::<Option<TransportEvent>>().await,
                        }
                    } => LoopEvent::Transport(transport_event),
                    _ = async {
                        match reconnect_at {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => LoopEvent::ReconnectDue,
                }
            };

            match event {
                LoopEvent::Command(Some(command)) => self.handle_command(command).await,
                LoopEvent::Command(None) => {
                    // All handles dropped: tear down quietly
                    if let Some(mut transport) = self.transport.take() {
                        let _ = transport.close(CLOSE_NORMAL).await;
                    }
                    tracing::debug!("Realtime channel actor stopped");
                    break;
                }
                LoopEvent::Transport(transport_event) => {
                    self.handle_transport_event(transport_event).await;
                }
                LoopEvent::ReconnectDue => {
                    self.reconnect_at = None;
                    tracing::debug!(attempt = self.attempts, "Reconnecting realtime channel");
                    self.connect().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect().await,
            Command::Disconnect => self.disconnect().await,
            Command::SetAuthToken(token) => {
                self.auth_token = Some(token.clone());
                if self.state == ConnectionState::Open {
                    self.send_frame(Frame::auth(token)).await;
                }
            }
            Command::Subscribe {
                resource,
                id,
                handler_id,
                handler,
            } => {
                let key = TopicKey::new(resource, id.clone());
                tracing::debug!(topic = %key, "Subscribing");
                self.registry.insert(key, handler_id, handler);

                match self.state {
                    ConnectionState::Open => {
                        self.send_frame(Frame::subscribe(resource, id)).await;
                    }
                    // Lazy connect on first demand; the registry replay on
                    // open transmits the subscribe frame
                    ConnectionState::Closed => self.connect().await,
                    ConnectionState::Connecting | ConnectionState::Closing => {}
                }
            }
            Command::Unsubscribe {
                resource,
                id,
                handler_id,
            } => {
                let key = TopicKey::new(resource, id.clone());
                let emptied = match handler_id {
                    Some(handler_id) => self.registry.remove_handler(&key, handler_id),
                    None => self.registry.remove_topic(&key),
                };

                // Only the removal that empties the topic notifies the
                // server, and only if the server ever saw the subscribe
                if emptied {
                    tracing::debug!(topic = %key, "Topic unsubscribed");
                    if self.state == ConnectionState::Open {
                        self.send_frame(Frame::unsubscribe(resource, id)).await;
                    }
                }
            }
        }
    }

    async fn connect(&mut self) {
        // Idempotent: never create a second transport
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            return;
        }

        self.reconnect_at = None;
        self.set_state(ConnectionState::Connecting);

        match self.connector.connect(&self.endpoint).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.attempts = 0;
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .last_connected_ms
                    .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
                self.set_state(ConnectionState::Open);
                self.on_open().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %self.endpoint, "Realtime connect failed");
                self.set_state(ConnectionState::Closed);
                self.schedule_reconnect();
            }
        }
    }

    async fn disconnect(&mut self) {
        // The deliberate close is the one path that cancels reconnection
        self.reconnect_at = None;

        let Some(mut transport) = self.transport.take() else {
            return;
        };

        self.set_state(ConnectionState::Closing);
        if let Err(e) = transport.close(CLOSE_NORMAL).await {
            tracing::debug!(error = %e, "Error closing realtime transport");
        }
        self.set_state(ConnectionState::Closed);
    }

    /// Runs synchronously within the open transition: auth first, then a
    /// subscribe replay for every live topic, then the queued backlog in
    /// FIFO order. New traffic cannot interleave before the drain completes.
    async fn on_open(&mut self) {
        if let Some(token) = self.auth_token.clone() {
            self.send_frame(Frame::auth(token)).await;
        }

        for key in self.registry.topics() {
            self.send_frame(Frame::subscribe(key.resource, key.id)).await;
        }

        let backlog: Vec<Frame> = self.outbound.drain(..).collect();
        for frame in backlog {
            self.send_frame(frame).await;
        }
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(text)) => self.handle_frame(&text),
            Some(TransportEvent::Error(error)) => {
                // The error itself does not change state; the close event
                // that usually follows drives the transition
                tracing::warn!(error = %error, "Realtime transport error");
                self.emit_state();
            }
            Some(TransportEvent::Closed { code }) => self.handle_close(code),
            None => self.handle_close(CLOSE_ABNORMAL),
        }
    }

    fn handle_close(&mut self, code: u16) {
        self.transport = None;
        self.set_state(ConnectionState::Closed);

        if code == CLOSE_NORMAL {
            tracing::debug!("Realtime connection closed");
        } else {
            tracing::warn!(code, "Realtime connection closed abnormally");
            self.schedule_reconnect();
        }
    }

    fn handle_frame(&mut self, text: &str) {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Discarding unparseable realtime frame");
                return;
            }
        };

        match frame {
            Frame::AuthSuccess => {
                tracing::debug!("Realtime authentication acknowledged");
            }
            Frame::Subscribed { resource, id } => {
                tracing::debug!(topic = %TopicKey::new(resource, id), "Subscription acknowledged");
            }
            Frame::Unsubscribed { resource, id } => {
                tracing::debug!(topic = %TopicKey::new(resource, id), "Unsubscription acknowledged");
            }
            Frame::Update {
                resource,
                id,
                data,
                timestamp,
            } => {
                let key = TopicKey::new(resource, id.clone());
                match UpdatePayload::decode(resource, data) {
                    Ok(payload) => {
                        let event = UpdateEvent {
                            resource,
                            id,
                            payload,
                            timestamp,
                        };
                        let delivered = self.registry.dispatch(&key, &event);
                        if delivered == 0 {
                            tracing::debug!(topic = %key, "Update for topic with no subscribers");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(topic = %key, error = %e, "Discarding update with invalid payload");
                    }
                }
            }
            Frame::Error { data } => {
                tracing::warn!(?data, "Realtime server reported an error");
            }
            Frame::Auth { .. } | Frame::Subscribe { .. } | Frame::Unsubscribe { .. } => {
                tracing::debug!("Ignoring client-bound frame echoed by server");
            }
        }
    }

    /// Transmit a frame, or queue it for the next open connection
    ///
    /// A frame that fails to transmit is re-queued rather than dropped.
    async fn send_frame(&mut self, frame: Frame) {
        if self.state == ConnectionState::Open {
            if let Some(transport) = self.transport.as_mut() {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %RealtimeError::Encode(e), "Dropping unencodable frame");
                        return;
                    }
                };

                match transport.send(text).await {
                    Ok(()) => {
                        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Realtime send failed, queueing frame");
                        self.outbound.push_back(frame);
                    }
                }
                return;
            }
        }

        self.outbound.push_back(frame);
    }

    fn schedule_reconnect(&mut self) {
        // At most one pending reconnect timer
        if self.reconnect_at.is_some() {
            return;
        }

        match self.policy.delay(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.stats.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    attempt = self.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling realtime reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                // Terminal until a caller explicitly reconnects
                tracing::warn!(
                    attempts = self.attempts,
                    "Realtime reconnect attempts exhausted"
                );
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Realtime state transition");
        }
        self.state = state;
        self.state_tx.send_replace(state);
        self.emit_state();
    }

    fn emit_state(&self) {
        let _ = self.events_tx.send(StateChange { state: self.state });
    }
}
