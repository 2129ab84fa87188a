//! Connection identity newtype.
//!
//! Every membership in the registry is keyed by a [`ConnectionId`], a newtype
//! around the string form of a random (v4) UUID. Keeping it distinct from the
//! group name `String` prevents swapping the two at call sites.

use std::fmt;
use uuid::Uuid;

/// Opaque, process-unique identifier of one connection's group membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new random ID (UUID v4, 122 random bits).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ConnectionId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
