//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use wsrelay_core::SocketPool;
use wsrelay_core::metrics::WS_UPGRADES_REJECTED_TOTAL;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::handle_socket;

/// How often [`RelayServer::spawn_drain_watch`] rechecks the pool.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Group registry.
    pub pool: Arc<SocketPool>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// One permit per admitted socket, `None` when unlimited.
    pub slots: Option<Arc<Semaphore>>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    pool: Arc<SocketPool>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    slots: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let slots = (config.max_connections > 0)
            .then(|| Arc::new(Semaphore::new(config.max_connections)));
        Self {
            config: Arc::new(config),
            pool: Arc::new(SocketPool::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            slots,
        }
    }

    /// Serve `/_/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            pool: self.pool.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            slots: self.slots.clone(),
        };

        Router::new()
            .route("/_/health", get(health_handler))
            .route("/_/metrics", get(metrics_handler))
            .route("/{socket}", get(relay_handler))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the accept loop's task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local_addr, "listening");
        Ok((local_addr, handle))
    }

    /// Spawn a task that finishes once every connection has unregistered.
    pub fn spawn_drain_watch(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            while pool.connection_count() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
    }

    /// Get the group registry.
    pub fn pool(&self) -> &Arc<SocketPool> {
        &self.pool
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Connection slots, if `max_connections` is set.
    pub fn slots(&self) -> Option<&Arc<Semaphore>> {
        self.slots.as_ref()
    }
}

/// GET /{socket}
async fn relay_handler(
    Path(socket): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !wants_upgrade(&headers) {
        return (StatusCode::BAD_REQUEST, "this is a socket").into_response();
    }

    // The permit is taken before the handshake and held until the read loop
    // exits, so concurrent upgrades cannot overshoot the limit.
    let permit = match state
        .slots
        .clone()
        .map(Semaphore::try_acquire_owned)
        .transpose()
    {
        Ok(permit) if !state.shutdown.is_shutting_down() => permit,
        _ => {
            let limit = state.config.max_connections;
            warn!(socket = socket.as_str(), limit, "refusing socket");
            counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "capacity").increment(1);
            return (StatusCode::SERVICE_UNAVAILABLE, "server is full").into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(socket = socket.as_str(), error = %rejection, "upgrading socket");
            counter!(WS_UPGRADES_REJECTED_TOTAL, "reason" => "handshake").increment(1);
            return rejection.into_response();
        }
    };

    let failed_socket = socket.clone();
    ws.read_buffer_size(state.config.read_buffer_size)
        .write_buffer_size(state.config.write_buffer_size)
        .max_message_size(state.config.max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(socket = failed_socket.as_str(), error = %e, "upgrading socket");
        })
        .on_upgrade(move |ws| async move {
            handle_socket(ws, socket, state).await;
            drop(permit);
        })
}

/// Whether any `Connection` header value mentions `upgrade`.
fn wants_upgrade(headers: &HeaderMap) -> bool {
    headers.get_all(header::CONNECTION).iter().any(|value| {
        value
            .to_str()
            .is_ok_and(|v| v.to_ascii_lowercase().contains("upgrade"))
    })
}

/// GET /_/health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let groups = state.pool.group_count().await;
    let resp = health::health_check(state.start_time, state.pool.connection_count(), groups);
    Json(resp)
}

/// GET /_/metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
