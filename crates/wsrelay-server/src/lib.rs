//! # wsrelay-server
//!
//! Axum HTTP + `WebSocket` front end for the ws-relay group registry.
//!
//! - `GET /{socket}`: upgrade, register into the group named by the path,
//!   relay every inbound data frame to the whole group
//! - `GET /_/health` and `GET /_/metrics` for operators
//! - Per-write deadline on every outbound frame
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::RelayServer;
