//! The relay worker: sole owner of signaling state.
//!
//! Every inbound frame and disconnect from every connection funnels into
//! one channel and is applied here in order, so lookup-then-mutate
//! sequences never interleave.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rendezvous_core::{ClientEvent, Signaling};
use tokio::sync::mpsc;

use crate::connection::{ConnectionRegistry, Inbound};

/// Counters published by the relay worker for the health endpoint.
#[derive(Debug, Default)]
pub struct RelayStats {
    sessions: AtomicUsize,
    rejected_frames: AtomicU64,
    dropped_events: AtomicU64,
}

impl RelayStats {
    /// Open sessions as of the last processed event.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    /// Frames that failed to decode.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames.load(Ordering::Relaxed)
    }

    /// Decoded events the state machine dropped or refused.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

pub struct Relay {
    signaling: Signaling,
    connections: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
}

impl Relay {
    pub fn new(connections: Arc<ConnectionRegistry>, stats: Arc<RelayStats>) -> Self {
        Self {
            signaling: Signaling::new(),
            connections,
            stats,
        }
    }

    pub fn signaling(&self) -> &Signaling {
        &self.signaling
    }

    /// Apply one inbound message.
    pub fn process(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Frame(connection_id, raw) => {
                let event = match ClientEvent::decode(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        self.stats.rejected_frames.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "Dropping undecodable frame"
                        );
                        return;
                    }
                };
                let name = event.name();
                tracing::debug!(connection_id = %connection_id, event = name, "Event received");
                if let Err(err) = self.signaling.handle(&connection_id, event, &*self.connections) {
                    self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        connection_id = %connection_id,
                        event = name,
                        kind = err.error_kind(),
                        "Event dropped: {err}"
                    );
                }
            }
            Inbound::Closed(connection_id) => {
                self.signaling.disconnect(&connection_id, &*self.connections);
            }
        }
        self.stats
            .sessions
            .store(self.signaling.registry().len(), Ordering::Relaxed);
    }

    /// Process messages until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) {
        while let Some(inbound) = rx.recv().await {
            self.process(inbound);
        }
        tracing::info!("Relay channel closed");
    }
}

/// Spawn the relay worker on its own task.
pub fn spawn_relay(
    connections: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    rx: mpsc::Receiver<Inbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(Relay::new(connections, stats).run(rx))
}
