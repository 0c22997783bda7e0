//! In-memory session registry.
//!
//! Sessions are keyed by the initiator's connection id. A secondary index
//! maps each bound receiver to the initiators it is bound to, in bind order;
//! it is updated together with every change to a session's `receiver`.

use std::collections::HashMap;

use crate::ids::{ConnectionId, Token};

/// Server-side record pairing one initiator with at most one receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: Token,
    pub receiver: Option<ConnectionId>,
    pub acknowledged: bool,
}

impl Session {
    fn new(token: Token) -> Self {
        Self {
            token,
            receiver: None,
            acknowledged: false,
        }
    }
}

/// Role a connection currently plays, inferred from registry membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Neither owns a session nor is bound to one.
    Unbound,
    /// Owns a session.
    Initiator,
    /// Bound as receiver of the given initiator's session.
    Receiver(ConnectionId),
}

/// Open sessions keyed by initiator, plus the receiver reverse index.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    /// Receiver to the initiators it is bound to, in bind order.
    receivers: HashMap<ConnectionId, Vec<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, initiator: &ConnectionId) -> Option<&Session> {
        self.sessions.get(initiator)
    }

    /// Token not held by any live session.
    pub fn generate_token(&self) -> Token {
        self.generate_token_with(Token::random)
    }

    /// Draw candidates from `source` until one is free.
    pub fn generate_token_with(&self, mut source: impl FnMut() -> Token) -> Token {
        loop {
            let token = source();
            if self.find_initiator_by_token(&token).is_none() {
                return token;
            }
            tracing::debug!(token = %token, "Token collision, regenerating");
        }
    }

    pub fn find_initiator_by_token(&self, token: &Token) -> Option<ConnectionId> {
        self.sessions
            .iter()
            .find(|(_, session)| &session.token == token)
            .map(|(id, _)| id.clone())
    }

    /// Initiator whose session `receiver` was bound to first, if any.
    pub fn find_initiator_by_receiver(&self, receiver: &ConnectionId) -> Option<ConnectionId> {
        self.receivers
            .get(receiver)
            .and_then(|initiators| initiators.first().cloned())
    }

    /// Resolve the role `conn` plays right now.
    pub fn role_of(&self, conn: &ConnectionId) -> Role {
        if self.sessions.contains_key(conn) {
            Role::Initiator
        } else if let Some(initiator) = self.find_initiator_by_receiver(conn) {
            Role::Receiver(initiator)
        } else {
            Role::Unbound
        }
    }

    /// Create a session for `initiator`, or return the token of the one it
    /// already has.
    pub fn create_session(&mut self, initiator: &ConnectionId) -> Token {
        self.open_session(initiator).0
    }

    /// Like [`create_session`](Self::create_session), also reporting
    /// whether a new session was created.
    pub fn open_session(&mut self, initiator: &ConnectionId) -> (Token, bool) {
        if let Some(existing) = self.sessions.get(initiator) {
            return (existing.token.clone(), false);
        }
        let token = self.generate_token();
        self.sessions
            .insert(initiator.clone(), Session::new(token.clone()));
        (token, true)
    }

    pub fn remove_session(&mut self, initiator: &ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(initiator)?;
        if let Some(receiver) = &session.receiver {
            self.unindex(receiver, initiator);
        }
        Some(session)
    }

    /// Bind `receiver` to the session of `initiator`, returning the
    /// receiver it replaced. Returns `None` without binding when the
    /// session does not exist.
    ///
    /// Bindings `receiver` holds in other sessions are left in place.
    pub fn bind_receiver(
        &mut self,
        initiator: &ConnectionId,
        receiver: &ConnectionId,
    ) -> Option<Option<ConnectionId>> {
        let session = self.sessions.get_mut(initiator)?;
        let replaced = session.receiver.replace(receiver.clone());
        if let Some(old) = &replaced {
            self.unindex(old, initiator);
        }
        self.receivers
            .entry(receiver.clone())
            .or_default()
            .push(initiator.clone());
        Some(replaced)
    }

    /// Unbind the receiver of `initiator`'s session, if any.
    pub fn clear_receiver(&mut self, initiator: &ConnectionId) -> Option<ConnectionId> {
        let receiver = self.sessions.get_mut(initiator)?.receiver.take()?;
        self.unindex(&receiver, initiator);
        Some(receiver)
    }

    /// Unbind `receiver` from every session it is bound to, returning
    /// those sessions' initiators in bind order.
    pub fn detach_receiver(&mut self, receiver: &ConnectionId) -> Vec<ConnectionId> {
        let initiators = self.receivers.remove(receiver).unwrap_or_default();
        for initiator in &initiators {
            if let Some(session) = self.sessions.get_mut(initiator) {
                session.receiver = None;
            }
        }
        initiators
    }

    /// Mark the answer of `initiator`'s session as acknowledged.
    pub fn acknowledge(&mut self, initiator: &ConnectionId) -> Option<&Session> {
        let session = self.sessions.get_mut(initiator)?;
        session.acknowledged = true;
        Some(session)
    }

    fn unindex(&mut self, receiver: &ConnectionId, initiator: &ConnectionId) {
        if let Some(initiators) = self.receivers.get_mut(receiver) {
            initiators.retain(|id| id != initiator);
            if initiators.is_empty() {
                self.receivers.remove(receiver);
            }
        }
    }
}
