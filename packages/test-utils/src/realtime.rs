//! In-memory realtime transport mocks

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use codedeck_realtime_client::{
    Connector, RealtimeError, RealtimeResult, Transport, TransportEvent,
};

/// Scriptable in-memory connector
///
/// Each successful `connect` produces a [`MockTransport`] for the client and
/// a matching [`MockServerHandle`] delivered through the [`MockAcceptor`].
pub struct MockConnector {
    accepted_tx: mpsc::UnboundedSender<MockServerHandle>,
    connect_count: AtomicUsize,
    refusals: AtomicUsize,
    connect_instants: Mutex<Vec<Instant>>,
}

impl MockConnector {
    /// Create a connector and the acceptor receiving its connections
    pub fn new() -> (Arc<Self>, MockAcceptor) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                accepted_tx,
                connect_count: AtomicUsize::new(0),
                refusals: AtomicUsize::new(0),
                connect_instants: Mutex::new(Vec::new()),
            }),
            MockAcceptor { accepted_rx },
        )
    }

    /// Total connection attempts observed, refused ones included
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next_connects(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Refuse every future connection attempt
    pub fn refuse_all_connects(&self) {
        self.refusals.store(usize::MAX, Ordering::SeqCst);
    }

    /// Timestamps of every connection attempt, in order
    ///
    /// Uses `tokio::time::Instant` so paused-clock tests see deterministic
    /// spacing.
    pub fn connect_instants(&self) -> Vec<Instant> {
        self.connect_instants.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> RealtimeResult<Box<dyn Transport>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_instants.lock().unwrap().push(Instant::now());

        let remaining = self.refusals.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.refusals.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(RealtimeError::Connect("mock connect refused".into()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let close_code = Arc::new(Mutex::new(None));
        let fail_sends = Arc::new(AtomicBool::new(false));

        let handle = MockServerHandle {
            sent_rx,
            events_tx,
            close_code: close_code.clone(),
            fail_sends: fail_sends.clone(),
        };

        // The acceptor may already be gone in shutdown tests
        let _ = self.accepted_tx.send(handle);

        Ok(Box::new(MockTransport {
            sent_tx,
            events_rx,
            close_code,
            fail_sends,
        }))
    }
}

/// Receives the server side of each accepted mock connection
pub struct MockAcceptor {
    accepted_rx: mpsc::UnboundedReceiver<MockServerHandle>,
}

impl MockAcceptor {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> MockServerHandle {
        self.accepted_rx
            .recv()
            .await
            .expect("mock connector dropped")
    }
}

/// Client side of a mock connection
pub struct MockTransport {
    sent_tx: mpsc::UnboundedSender<String>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    close_code: Arc<Mutex<Option<u16>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> RealtimeResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RealtimeError::Send("mock send failure".into()));
        }
        self.sent_tx.send(text).map_err(|_| RealtimeError::Closed)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self, code: u16) -> RealtimeResult<()> {
        *self.close_code.lock().unwrap() = Some(code);
        Ok(())
    }
}

/// Server side of a mock connection
pub struct MockServerHandle {
    sent_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    close_code: Arc<Mutex<Option<u16>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockServerHandle {
    /// Wait for the next frame transmitted by the client, parsed as JSON
    pub async fn next_frame(&mut self) -> Option<serde_json::Value> {
        self.sent_rx
            .recv()
            .await
            .map(|text| serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Pop an already-transmitted frame without waiting
    pub fn try_frame(&mut self) -> Option<serde_json::Value> {
        self.sent_rx
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Pop every already-transmitted frame
    pub fn drain_frames(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Deliver a JSON frame to the client
    pub fn push_json(&self, value: serde_json::Value) {
        self.push_text(&value.to_string());
    }

    /// Deliver a raw text frame to the client
    pub fn push_text(&self, text: &str) {
        let _ = self.events_tx.send(TransportEvent::Frame(text.to_string()));
    }

    /// Surface a transport-level error to the client
    pub fn push_error(&self, message: &str) {
        let _ = self
            .events_tx
            .send(TransportEvent::Error(message.to_string()));
    }

    /// Close the connection from the server side with the given close code
    pub fn close(&self, code: u16) {
        let _ = self.events_tx.send(TransportEvent::Closed { code });
    }

    /// Close code the client used to close this connection, if it did
    pub fn client_close_code(&self) -> Option<u16> {
        *self.close_code.lock().unwrap()
    }

    /// Make subsequent client sends fail until reset
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}
