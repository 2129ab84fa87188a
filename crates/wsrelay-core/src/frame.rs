//! Relayed frame value.

use bytes::Bytes;

/// Kind of a relayed data frame. Control frames are never relayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl FrameKind {
    /// Lowercase name, used as a log/metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

/// One frame as read from a member connection and written to every member of
/// its group. Cloning shares the payload buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind, preserved end to end.
    pub kind: FrameKind,
    /// Raw payload bytes, never inspected.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from its parts.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Text, payload)
    }

    /// Binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Binary, payload)
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
