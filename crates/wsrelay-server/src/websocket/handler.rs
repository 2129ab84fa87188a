//! Per-connection read loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use tracing::{debug, error, instrument};
use wsrelay_core::Connection;

use super::connection::{WsConnection, frame_from_message};
use crate::server::AppState;

/// Serve one upgraded socket as a member of `group`.
///
/// Registers the connection, relays every data frame it sends to the whole
/// group, and unregisters it when the peer closes, a read fails or the server
/// shuts down.
#[instrument(skip_all, fields(socket = %group))]
pub async fn handle_socket(socket: WebSocket, group: String, state: AppState) {
    let (sink, mut stream) = socket.split();
    let conn = Arc::new(WsConnection::new(sink, state.config.write_timeout()));
    let registration = state.pool.register(&group, conn.clone()).await;
    let id = registration.id().clone();
    let token = state.shutdown.token();

    loop {
        let next = tokio::select! {
            () = token.cancelled() => {
                debug!(id = %id, "server shutting down");
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(message)) => {
                if let Some(frame) = frame_from_message(message) {
                    let _ = state.pool.broadcast(&group, &frame).await;
                }
            }
            Some(Err(e)) => {
                error!(id = %id, socket = group.as_str(), error = %e, "reading from connection");
                break;
            }
        }
    }

    let _ = registration.unregister().await;
    if let Err(e) = conn.close().await {
        debug!(id = %id, error = %e, "closing socket");
    }
}
