//! WebSocket transport: the [`Connection`](wsrelay_core::Connection) adapter
//! over an upgraded socket and the per-connection read loop.

pub mod connection;
pub mod handler;
