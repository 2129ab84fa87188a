//! Transport seam between the registry and a concrete duplex connection.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::frame::Frame;

/// Errors a transport can report for a single write or close.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// The write did not complete within the transport's deadline.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying socket reported an error.
    #[error("write failed: {0}")]
    Write(String),

    /// The frame could not be expressed on this transport.
    #[error("frame encoding failed: {0}")]
    Encoding(String),
}

/// A member connection as seen by the registry.
///
/// The registry never writes to one connection from two places at once; it
/// serializes `send` per identity with a [`NamedLocker`](crate::NamedLocker).
/// Implementations must still be `Sync` because the handle is shared with the
/// connection's own read loop.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write one frame. Any error evicts the member.
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;
}
