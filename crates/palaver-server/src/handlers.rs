//! Connection handlers for the Palaver server.
//!
//! One tokio task per WebSocket connection: inbound text frames are
//! decoded and fed to the connection's [`Session`]; the session's outbound
//! queue is pumped back to the socket. Everything else (auth gate, room
//! operations, disconnect fan-out) lives in the session itself.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use palaver_core::{ChatCore, Session};
use palaver_protocol::{codec, ProtocolError, ServerEvent};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The realtime core.
    pub core: Arc<ChatCore>,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(core: Arc<ChatCore>, config: Config) -> Result<()> {
    let state = Arc::new(AppState {
        core,
        config: config.clone(),
    });

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Palaver server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // The session's outbound queue; also registered in the connection
    // registry on authentication, so room fan-out lands here too.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut session = Session::new(state.core.clone(), outbound_tx.clone());
    let connection_id = session.connection_id();

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Pump queued outbound events to the socket
            Some(event) = outbound_rx.recv() => {
                metrics::record_event("outbound");
                let frame = codec::encode_event(&event);
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.limits.max_frame_size {
                            warn!(connection = %connection_id, size = text.len(), "Dropping oversized frame");
                            metrics::record_error("oversized_frame");
                            continue;
                        }
                        metrics::record_event("inbound");

                        match codec::decode_event(&text) {
                            Ok(event) => {
                                let was_authenticated = session.user_id().is_some();
                                session.handle(event).await;
                                if !was_authenticated && session.user_id().is_some() {
                                    metrics::record_authentication();
                                }
                            }
                            Err(ProtocolError::Malformed(e)) => {
                                debug!(connection = %connection_id, error = %e, "Dropping malformed frame");
                                metrics::record_error("malformed_frame");
                            }
                            Err(ProtocolError::UnknownEvent(e)) => {
                                debug!(connection = %connection_id, error = %e, "Unknown event type");
                                metrics::record_error("unknown_event");
                                let _ = outbound_tx.send(ServerEvent::error("Unknown message type"));
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // The protocol is text-only
                        debug!(connection = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Unregister, flip presence, and notify the user's rooms.
    session.close().await;

    debug!(connection = %connection_id, "WebSocket disconnected");
}
