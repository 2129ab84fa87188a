//! Upgraded WebSocket as a registry [`Connection`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use wsrelay_core::{Connection, Frame, FrameKind, TransportError};

/// Write half of an upgraded socket.
///
/// The registry serializes frame writes per member; the mutex here only
/// orders a write against a concurrent `close` from the read loop.
pub struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    write_timeout: Duration,
    closed: AtomicBool,
}

impl WsConnection {
    /// Wrap the write half of `socket`. Every write must finish within
    /// `write_timeout` or the member is evicted.
    pub fn new(sink: SplitSink<WebSocket, Message>, write_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let message = message_from_frame(frame)?;
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.write_timeout)),
        }
    }
}

/// Encode a relayed frame as a WebSocket message of the same kind.
pub fn message_from_frame(frame: &Frame) -> Result<Message, TransportError> {
    match frame.kind {
        FrameKind::Text => {
            let text = std::str::from_utf8(&frame.payload)
                .map_err(|e| TransportError::Encoding(e.to_string()))?;
            Ok(Message::Text(text.into()))
        }
        FrameKind::Binary => Ok(Message::Binary(frame.payload.clone())),
    }
}

/// Decode an inbound message into a relayable frame.
///
/// Control messages (ping, pong, close) yield `None`.
pub fn frame_from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::text(text)),
        Message::Binary(data) => Some(Frame::binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}
