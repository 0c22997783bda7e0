//! Signaling state machine.
//!
//! One handler per protocol event plus one for disconnect. Each handler
//! resolves the sender's role from the registry, applies at most one
//! state change, and emits routed events through an [`EventSink`].

use crate::errors::SignalingError;
use crate::ids::{ConnectionId, Token};
use crate::protocol::{ClientEvent, DisconnectReason, ServerEvent};
use crate::registry::{Role, SessionRegistry};

/// Outbound side of the transport.
///
/// Delivery is fire-and-forget; emitting to a connection that no longer
/// exists is a no-op.
pub trait EventSink {
    fn emit(&self, to: &ConnectionId, event: ServerEvent);
}

/// Owns the session registry and reacts to peer events.
#[derive(Debug, Default)]
pub struct Signaling {
    registry: SessionRegistry,
}

impl Signaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Route one decoded event from `from`.
    pub fn handle(
        &mut self,
        from: &ConnectionId,
        event: ClientEvent,
        sink: &dyn EventSink,
    ) -> Result<(), SignalingError> {
        match event {
            ClientEvent::SessionStart => {
                self.session_start(from, sink);
                Ok(())
            }
            ClientEvent::SendOffer(offer) => self.send_offer(from, offer, sink),
            ClientEvent::AckAnswer => self.ack_answer(from, sink),
            ClientEvent::ReceiverJoin(token) => self.receiver_join(from, token, sink),
            ClientEvent::SendAnswer(answer) => self.send_answer(from, answer, sink),
        }
    }

    pub fn session_start(&mut self, from: &ConnectionId, sink: &dyn EventSink) {
        let (token, created) = self.registry.open_session(from);
        if created {
            tracing::info!(
                connection_id = %from,
                sessions = self.registry.len(),
                "Session started"
            );
            sink.emit(from, ServerEvent::SessionToken(token));
        } else {
            tracing::info!(connection_id = %from, "Session resumed");
        }
    }

    pub fn send_offer(
        &mut self,
        from: &ConnectionId,
        offer: serde_json::Value,
        sink: &dyn EventSink,
    ) -> Result<(), SignalingError> {
        if self.registry.role_of(from) != Role::Initiator {
            return Err(SignalingError::InitiatorNotFound(from.clone()));
        }
        let receiver = self
            .registry
            .session(from)
            .and_then(|s| s.receiver.clone())
            .ok_or_else(|| SignalingError::NoReceiver(from.clone()))?;
        sink.emit(&receiver, ServerEvent::SendOffer(offer));
        Ok(())
    }

    pub fn ack_answer(
        &mut self,
        from: &ConnectionId,
        sink: &dyn EventSink,
    ) -> Result<(), SignalingError> {
        let session = self
            .registry
            .acknowledge(from)
            .ok_or_else(|| SignalingError::InitiatorNotFound(from.clone()))?;
        // An unpaired session acknowledges into the void.
        if let Some(receiver) = session.receiver.clone() {
            sink.emit(&receiver, ServerEvent::AckAnswer);
        }
        Ok(())
    }

    pub fn receiver_join(
        &mut self,
        from: &ConnectionId,
        token: Token,
        sink: &dyn EventSink,
    ) -> Result<(), SignalingError> {
        let Some(initiator) = self.registry.find_initiator_by_token(&token) else {
            sink.emit(
                from,
                ServerEvent::DisconnectRequest(DisconnectReason::InvalidToken),
            );
            return Err(SignalingError::InvalidToken(token));
        };

        let replaced = self
            .registry
            .bind_receiver(&initiator, from)
            .ok_or_else(|| SignalingError::InitiatorNotFound(initiator.clone()))?;
        if let Some(previous) = replaced {
            tracing::info!(
                connection_id = %previous,
                initiator = %initiator,
                "Receiver replaced"
            );
            sink.emit(
                &previous,
                ServerEvent::DisconnectRequest(DisconnectReason::Replaced),
            );
        }

        tracing::info!(connection_id = %from, initiator = %initiator, "Receiver joined");
        sink.emit(&initiator, ServerEvent::ReceiverJoined);
        Ok(())
    }

    pub fn send_answer(
        &mut self,
        from: &ConnectionId,
        answer: serde_json::Value,
        sink: &dyn EventSink,
    ) -> Result<(), SignalingError> {
        let Some(initiator) = self.registry.find_initiator_by_receiver(from) else {
            sink.emit(
                from,
                ServerEvent::DisconnectRequest(DisconnectReason::InvalidToken),
            );
            return Err(SignalingError::ReceiverNotBound(from.clone()));
        };
        sink.emit(&initiator, ServerEvent::SendAnswer(answer));
        Ok(())
    }

    /// React to the transport reporting that `from` is gone.
    pub fn disconnect(&mut self, from: &ConnectionId, sink: &dyn EventSink) {
        match self.registry.role_of(from) {
            Role::Initiator => {
                // Also a receiver elsewhere: drop those bindings too.
                self.registry.detach_receiver(from);
                let Some(session) = self.registry.remove_session(from) else {
                    return;
                };
                if !session.acknowledged {
                    if let Some(receiver) = &session.receiver {
                        sink.emit(
                            receiver,
                            ServerEvent::DisconnectRequest(DisconnectReason::PeerDisconnected),
                        );
                    }
                }
                tracing::info!(
                    connection_id = %from,
                    token = %session.token,
                    acknowledged = session.acknowledged,
                    sessions = self.registry.len(),
                    "Session ended"
                );
            }
            Role::Receiver(_) => {
                let initiators = self.registry.detach_receiver(from);
                tracing::info!(
                    connection_id = %from,
                    sessions = initiators.len(),
                    "Receiver left"
                );
            }
            Role::Unbound => {}
        }
    }
}
