use crate::ids::{ConnectionId, Token};

/// Reasons a signaling event was dropped or refused.
///
/// None of these are fatal: the relay logs them and carries on serving
/// every other session.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("no session for initiator {0}")]
    InitiatorNotFound(ConnectionId),
    #[error("session of {0} has no receiver bound")]
    NoReceiver(ConnectionId),
    #[error("no session holds token {0}")]
    InvalidToken(Token),
    #[error("{0} is not bound to any session")]
    ReceiverNotBound(ConnectionId),
}

impl SignalingError {
    /// Short classification string for log fields.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InitiatorNotFound(_) => "initiator_not_found",
            Self::NoReceiver(_) => "no_receiver",
            Self::InvalidToken(_) => "invalid_token",
            Self::ReceiverNotBound(_) => "receiver_not_bound",
        }
    }
}

/// Failure to decode an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
