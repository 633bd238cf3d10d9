//! # Upstream Transport
//!
//! The stream player writes to a [`Transport`]: anything with an open/closed
//! state and a way to push a binary or text frame. The player never creates or
//! closes the transport; it only checks [`Transport::state`] before writing.
//!
//! [`WebSocketTransport`] is the production implementation. It connects with
//! tokio-tungstenite and splits the socket into two tasks:
//! - **writer**: drains an unbounded channel into the socket, so `send` never
//!   blocks or awaits
//! - **reader**: logs whatever the remote end sends and notices the close
//!
//! When either task ends the transport is marked `Closed`. There is no
//! reconnect.

use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Readiness of a transport, in WebSocket terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Connecting => "connecting",
            TransportState::Open => "open",
            TransportState::Closing => "closing",
            TransportState::Closed => "closed",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransportState::Connecting,
            1 => TransportState::Open,
            2 => TransportState::Closing,
            _ => TransportState::Closed,
        }
    }
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Raw bytes (PCM payloads)
    Binary(Vec<u8>),
    /// UTF-8 text (control events)
    Text(String),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(bytes) => bytes.len(),
            Frame::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(bytes) => Message::binary(bytes),
            Frame::Text(text) => Message::text(text),
        }
    }
}

/// Text payload of [`ControlEvent::Interrupt`].
pub const INTERRUPT_EVENT: &str = r#"{"event":"interrupt"}"#;

/// Control messages shared by the sending and receiving side.
///
/// Serialized as `{"event":"interrupt"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    Interrupt,
}

impl ControlEvent {
    pub fn to_frame(&self) -> Frame {
        match self {
            ControlEvent::Interrupt => Frame::Text(INTERRUPT_EVENT.to_string()),
        }
    }
}

/// A message channel the player can write to.
pub trait Transport: Send + Sync {
    /// Current readiness.
    fn state(&self) -> TransportState;

    /// Queue a frame for delivery.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }
}

/// Shared, atomically updated transport state.
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: TransportState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: TransportState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// WebSocket client transport.
pub struct WebSocketTransport {
    url: String,
    state: SharedState,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Open a WebSocket to `url`, failing if the handshake takes longer than
    /// `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        debug!("Connecting upstream transport to {}", url);

        let (stream, _response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, source) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let state = SharedState::new(TransportState::Open);

        let writer = tokio::spawn(write_loop(sink, outbound_rx, state.clone()));
        let reader = tokio::spawn(read_loop(source, state.clone()));

        info!("Upstream transport connected to {}", url);

        Ok(Self {
            url: url.to_string(),
            state,
            outbound,
            reader,
            writer,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a close handshake. Frames queued before this call are still
    /// delivered.
    pub fn close(&self) {
        if self.state.get() == TransportState::Open {
            self.state.set(TransportState::Closing);
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

impl Transport for WebSocketTransport {
    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.state.get() != TransportState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(frame.into())
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_loop<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Message>, state: SharedState)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!("Upstream write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    state.set(TransportState::Closed);
    debug!("Upstream writer stopped");
}

async fn read_loop<S, E>(mut source: S, state: SharedState)
where
    S: futures_util::Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Close(reason)) => {
                info!("Upstream closed the connection: {:?}", reason);
                break;
            }
            Ok(Message::Text(text)) => debug!("Upstream message: {}", text),
            Ok(Message::Binary(data)) => debug!("Upstream sent {} binary bytes", data.len()),
            Ok(_) => {}
            Err(e) => {
                warn!("Upstream read failed: {}", e);
                break;
            }
        }
    }
    state.set(TransportState::Closed);
    debug!("Upstream reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_interrupt_event_payload() {
        assert_eq!(
            ControlEvent::Interrupt.to_frame(),
            Frame::Text(r#"{"event":"interrupt"}"#.to_string())
        );
        let parsed: ControlEvent = serde_json::from_str(INTERRUPT_EVENT).unwrap();
        assert_eq!(parsed, ControlEvent::Interrupt);
        assert_eq!(serde_json::to_string(&ControlEvent::Interrupt).unwrap(), INTERRUPT_EVENT);
    }

    #[test]
    fn test_state_round_trip() {
        let state = SharedState::new(TransportState::Connecting);
        for s in [TransportState::Open, TransportState::Closing, TransportState::Closed] {
            state.set(s);
            assert_eq!(state.get(), s);
        }
    }

    #[tokio::test]
    async fn test_frames_reach_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
                received.push(msg);
            }
            received
        });

        let transport = WebSocketTransport::connect(&format!("ws://{}", addr), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(transport.is_open());

        transport.send(Frame::Binary(vec![1, 2, 3, 4])).unwrap();
        transport.send(ControlEvent::Interrupt.to_frame()).unwrap();
        transport.close();
        assert_eq!(transport.state(), TransportState::Closing);
        assert_eq!(transport.send(Frame::Binary(vec![0])), Err(TransportError::NotOpen));

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], Message::binary(vec![1, 2, 3, 4]));
        assert_eq!(received[1], Message::text(r#"{"event":"interrupt"}"#));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketTransport::connect(&format!("ws://{}", addr), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
