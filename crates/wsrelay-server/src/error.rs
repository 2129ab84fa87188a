//! Server startup and runtime errors.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while resolving, binding or serving the listen address.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured listen address could not be resolved.
    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidListenAddress {
        /// Address as configured.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Resolved address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
