//! Transport abstraction and the WebSocket implementation
//!
//! The channel core talks to the network through the [`Connector`] and
//! [`Transport`] traits so that tests can drive it with an in-memory
//! transport. Production code uses [`WsConnector`], backed by
//! tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{RealtimeError, RealtimeResult};

/// Close code used for a deliberate, caller-initiated disconnect
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer vanished without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Events surfaced by a transport connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A text frame arrived
    Frame(String),

    /// The connection closed with the given close code
    Closed { code: u16 },

    /// A transport-level error occurred; a close usually follows
    Error(String),
}

/// One established message-oriented connection
#[async_trait]
pub trait Transport: Send {
    /// Transmit a text frame
    async fn send(&mut self, text: String) -> RealtimeResult<()>;

    /// Receive the next transport event; `None` after the stream has ended
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close the connection with the given close code
    async fn close(&mut self, code: u16) -> RealtimeResult<()>;
}

/// Factory for transport connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection to the given endpoint
    async fn connect(&self, endpoint: &str) -> RealtimeResult<Box<dyn Transport>>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> RealtimeResult<Box<dyn Transport>> {
        let (stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        tracing::debug!(
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket connection established"
        );

        Ok(Box::new(WsTransport { stream }))
    }
}

/// WebSocket transport over a (possibly TLS) TCP stream
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> RealtimeResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RealtimeError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(TransportEvent::Frame(text)),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(CLOSE_ABNORMAL);
                    return Some(TransportEvent::Closed { code });
                }
                // Pings are answered by tungstenite; binary frames are not
                // part of this protocol
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Binary(_)))
                | Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Some(TransportEvent::Error(e.to_string())),
                None => return Some(TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                }),
            }
        }
    }

    async fn close(&mut self, code: u16) -> RealtimeResult<()> {
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await
            .map_err(|e| RealtimeError::Send(e.to_string()))
    }
}
