//! Server configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default `":3000"`). A leading `:` binds every interface.
    pub listen: String,
    /// Maximum concurrent WebSocket connections, `0` for no limit.
    pub max_connections: usize,
    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,
    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Deadline for one outbound write, in seconds.
    pub write_timeout_secs: u64,
    /// How long shutdown waits for connections to drain, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ":3000".into(),
            max_connections: 0,
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            write_timeout_secs: 10,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Resolve [`listen`](Self::listen) to a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let invalid = |reason: String| ServerError::InvalidListenAddress {
            addr: self.listen.clone(),
            reason,
        };

        let listen = self.listen.trim();
        let qualified = if listen.starts_with(':') {
            format!("0.0.0.0{listen}")
        } else {
            listen.to_owned()
        };

        qualified
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("resolved to no addresses".into()))
    }

    /// Per-write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Drain deadline on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen, ":3000");
    }

    #[test]
    fn default_max_connections_is_unlimited() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 0);
    }

    #[test]
    fn default_buffer_sizes() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.read_buffer_size, 1024);
        assert_eq!(cfg.write_buffer_size, 1024);
    }

    #[test]
    fn default_max_message_size() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn default_timeouts() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.write_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn port_only_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn explicit_host() {
        let cfg = ServerConfig {
            listen: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        };
        let addr = cfg.socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 0);
    }

    #[test]
    fn invalid_listen_is_rejected() {
        for listen in ["", "3000", "localhost:notaport", ":99999"] {
            let cfg = ServerConfig {
                listen: listen.into(),
                ..ServerConfig::default()
            };
            let err = cfg.socket_addr().unwrap_err();
            assert!(
                matches!(err, ServerError::InvalidListenAddress { .. }),
                "{listen:?} should be rejected"
            );
        }
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.listen, cfg.listen);
        assert_eq!(back.max_connections, cfg.max_connections);
        assert_eq!(back.write_timeout_secs, cfg.write_timeout_secs);
        assert_eq!(back.max_message_size, cfg.max_message_size);
    }

    #[test]
    fn deserialize_partial_uses_defaults() {
        let json = r#"{"listen":"10.0.0.1:8080","max_connections":5}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.listen, "10.0.0.1:8080");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.read_buffer_size, 1024);
        assert_eq!(cfg.shutdown_timeout_secs, 30);
    }
}
