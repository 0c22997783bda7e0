use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rendezvous_core::{ConnectionId, EventSink, ServerEvent};
use tokio::sync::mpsc;

/// What a connection task reports to the relay worker.
#[derive(Debug)]
pub enum Inbound {
    /// One text frame received from the peer.
    Frame(ConnectionId, String),
    /// The connection is gone. Sent exactly once, after its last frame.
    Closed(ConnectionId),
}

/// A live WebSocket connection.
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    last_seen: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            last_seen: AtomicU64::new(now_secs()),
        }
    }

    /// Any inbound traffic counts as proof of life.
    pub fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected peers, addressed by connection id.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new connection and return its ID + outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let connection = Arc::new(Connection::new(id.clone(), tx));
        self.connections.insert(id.clone(), connection);
        (id, rx)
    }

    /// Remove a connection. Dropping its sender ends the writer task.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Queue a frame for one connection. Drops the frame if the queue is full.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        let Some(connection) = self.get(id) else {
            return false;
        };
        match connection.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of connected peers.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Remove connections that have been silent past the timeout.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                tracing::info!(connection_id = %id, "Cleaned up dead connection");
            }
        }
        removed
    }
}

impl EventSink for ConnectionRegistry {
    fn emit(&self, to: &ConnectionId, event: ServerEvent) {
        match event.encode() {
            Ok(frame) => {
                if !self.send_to(to, frame) {
                    tracing::debug!(connection_id = %to, event = event.name(), "Event not delivered");
                }
            }
            Err(e) => {
                tracing::warn!(connection_id = %to, error = %e, "Failed to encode event");
            }
        }
    }
}

/// Drive one WebSocket connection: split into reader/writer, heartbeat,
/// and report the disconnect once both halves are done.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ConnectionRegistry>,
    inbound: mpsc::Sender<Inbound>,
    heartbeat: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket + periodic ping
    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_id, "Sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader task: forward text frames to the relay, track liveness
    let reader_id = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader_inbound = inbound.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Some(connection) = reader_registry.get(&reader_id) {
                connection.touch();
            }
            match msg {
                WsMessage::Text(text) => {
                    let frame = Inbound::Frame(reader_id.clone(), text.to_string());
                    if reader_inbound.send(frame).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {} // axum answers pings itself
            }
        }
    });

    // Whichever half finishes first takes the other down with it
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    registry.unregister(&connection_id);
    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
    let _ = inbound.send(Inbound::Closed(connection_id)).await;
}

/// Start a background task that periodically sweeps dead connections.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_connections();
            if removed > 0 {
                tracing::info!(removed = removed, "Dead connection cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendezvous_core::{DisconnectReason, Token};

    fn registry(queue: usize) -> ConnectionRegistry {
        ConnectionRegistry::new(queue, Duration::from_secs(90))
    }

    #[test]
    fn register_and_unregister() {
        let registry = registry(32);
        assert_eq!(registry.count(), 0);

        let (id1, _rx1) = registry.register();
        let (id2, _rx2) = registry.register();
        assert_ne!(id1, id2);
        assert_eq!(registry.count(), 2);

        assert!(registry.unregister(&id1));
        assert!(!registry.unregister(&id1));
        assert_eq!(registry.count(), 1);

        registry.unregister(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn send_to_specific_connection() {
        let registry = registry(32);
        let (id, mut rx) = registry.register();
        let (_other, mut other_rx) = registry.register();

        assert!(registry.send_to(&id, "test message".into()));
        assert_eq!(rx.recv().await.unwrap(), "test message");
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_connection_is_noop() {
        let registry = registry(32);
        assert!(!registry.send_to(&ConnectionId::new(), "test".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = registry(2);
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, "msg1".into()));
        assert!(registry.send_to(&id, "msg2".into()));
        assert!(!registry.send_to(&id, "msg3".into()));
    }

    #[test]
    fn unregister_closes_outbound_queue() {
        let registry = registry(4);
        let (id, mut rx) = registry.register();
        let connection = registry.get(&id).unwrap();

        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(registry.get(&id).is_none());
        drop(connection);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn emit_encodes_event_frame() {
        let registry = registry(4);
        let (id, mut rx) = registry.register();

        registry.emit(&id, ServerEvent::SessionToken(Token::from_raw("abc12345")));
        registry.emit(&id, ServerEvent::DisconnectRequest(DisconnectReason::Replaced));

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first, serde_json::json!({"event": "session-token", "data": "abc12345"}));
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second, serde_json::json!({"event": "disconnect-request", "data": "Replaced"}));
    }

    #[test]
    fn touch_keeps_connection_alive() {
        let registry = registry(1);
        let (id, _rx) = registry.register();
        let connection = registry.get(&id).unwrap();
        connection.touch();
        assert!(connection.is_alive(Duration::from_secs(90)));
    }

    #[test]
    fn cleanup_removes_silent_connections() {
        let registry = registry(32);
        let (id, _rx) = registry.register();
        let (_fresh, _fresh_rx) = registry.register();

        registry.get(&id).unwrap().last_seen.store(0, Ordering::Relaxed);

        assert_eq!(registry.cleanup_dead_connections(), 1);
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&id).is_none());
    }
}
