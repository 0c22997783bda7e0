use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionRegistry, Inbound};
use crate::relay::{self, RelayStats};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionRegistry>,
    pub stats: Arc<RelayStats>,
    pub inbound_tx: mpsc::Sender<Inbound>,
    pub heartbeat: Duration,
    pub max_frame_bytes: usize,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let connections = Arc::new(ConnectionRegistry::new(
        config.max_send_queue,
        config.client_timeout(),
    ));
    let stats = Arc::new(RelayStats::default());

    let cleanup = connection::start_cleanup_task(Arc::clone(&connections), config.cleanup_interval());

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(1024);
    let relay = relay::spawn_relay(Arc::clone(&connections), Arc::clone(&stats), inbound_rx);

    let app_state = AppState {
        connections,
        stats,
        inbound_tx,
        heartbeat: config.heartbeat_interval(),
        max_frame_bytes: config.max_frame_bytes,
    };

    let router = build_router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Signaling server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    Ok(ServerHandle {
        local_addr,
        server,
        relay,
        cleanup,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
    relay: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections and tear down background tasks.
    pub fn shutdown(self) {
        self.server.abort();
        self.cleanup.abort();
        self.relay.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.connections.register();
    tracing::info!(connection_id = %connection_id, "WebSocket connection opened");

    connection::handle_ws_connection(
        socket,
        connection_id,
        rx,
        state.connections,
        state.inbound_tx,
        state.heartbeat,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.stats.sessions(),
        "connections": state.connections.count(),
        "rejected_frames": state.stats.rejected_frames(),
        "dropped_events": state.stats.dropped_events(),
    }))
}
