//! # wsrelay-core
//!
//! Connection-group registry and broadcast fan-out for ws-relay.
//!
//! - **Identities**: [`ConnectionId`], a random 128-bit token per membership
//! - **Frames**: [`Frame`] carries an opaque frame kind + payload
//! - **Transport seam**: the [`Connection`] trait (`send` / `close`)
//! - **Per-connection write locking**: [`NamedLocker`]
//! - **Registry**: [`SocketPool`] (register, broadcast, unregister, eviction)
//! - **Observability**: `tracing` events and `metrics` counters, see [`metrics`]

#![deny(unsafe_code)]

pub mod connection;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod named_locker;
pub mod pool;
pub mod testing;

pub use connection::{Connection, TransportError};
pub use frame::{Frame, FrameKind};
pub use ids::ConnectionId;
pub use named_locker::{NamedGuard, NamedLocker};
pub use pool::{Delivery, Registration, SocketPool};
