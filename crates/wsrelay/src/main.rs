//! # ws-relay
//!
//! Relay server binary: parses flags, installs logging and metrics, and runs
//! the HTTP/WebSocket server until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use wsrelay_core::logging;
use wsrelay_server::{RelayServer, ServerConfig};

/// Relay every WebSocket frame to all clients connected on the same path.
#[derive(Parser, Debug)]
#[command(name = "ws-relay", version, about = "WebSocket group relay")]
struct Cli {
    /// Address to listen on; `:PORT` binds every interface.
    #[arg(long, env = "LISTEN", default_value = ":3000")]
    listen: String,

    /// Log level: trace, debug, info, warn, error or fatal.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Maximum concurrent connections (0 for no limit).
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Seconds a single outbound write may take before the client is dropped.
    #[arg(long, env = "WRITE_TIMEOUT_SECS", default_value_t = 10)]
    write_timeout_secs: u64,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen.clone(),
            max_connections: self.max_connections,
            write_timeout_secs: self.write_timeout_secs,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let level = logging::parse_level(&args.log_level)
        .ok_or_else(|| {
            anyhow!(
                "unknown level {:?}, expected one of {:?}",
                args.log_level,
                logging::LEVELS
            )
        })
        .context("parsing log-level")?;
    logging::init_subscriber(level);

    let metrics_handle = wsrelay_server::metrics::install_recorder();
    let config = args.server_config();
    let shutdown_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config).with_metrics(metrics_handle);

    let (addr, handle) = match server.listen().await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!(error = %e, "starting server");
            return Err(e).context("starting server");
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, "ws-relay started");

    wait_for_signal().await?;

    tracing::info!("Shutting down...");
    let drain = server.spawn_drain_watch();
    let _ = server
        .shutdown()
        .graceful_shutdown(vec![handle, drain], shutdown_timeout)
        .await;

    tracing::info!(
        remaining = server.pool().connection_count(),
        "Shutdown complete"
    );
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("listening for ctrl-c"),
        _ = term.recv() => Ok(()),
    }
}

/// Resolve on Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")
}
