//! Signaling protocol events and their JSON frame encoding.
//!
//! Every frame is a JSON object `{ "event": <name>, "data": <payload> }`.
//! `data` is absent for events without a payload. Offer and answer
//! payloads are opaque and relayed untouched.

use serde::{Deserialize, Serialize};

use crate::errors::FrameError;
use crate::ids::Token;

/// Events a peer sends to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Begin (or resume) a session as initiator.
    SessionStart,
    /// Initiator's offer for the bound receiver.
    SendOffer(serde_json::Value),
    /// Initiator confirms it accepted the receiver's answer.
    AckAnswer,
    /// Pair with the initiator holding this token.
    ReceiverJoin(Token),
    /// Receiver's answer for its initiator.
    SendAnswer(serde_json::Value),
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::SendOffer(_) => "send-offer",
            Self::AckAnswer => "ack-answer",
            Self::ReceiverJoin(_) => "receiver-join",
            Self::SendAnswer(_) => "send-answer",
        }
    }
}

/// Why the relay asks a peer to disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    #[serde(rename = "Invalid token")]
    InvalidToken,
    #[serde(rename = "Replaced")]
    Replaced,
    #[serde(rename = "Peer disconnected")]
    PeerDisconnected,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "Invalid token",
            Self::Replaced => "Replaced",
            Self::PeerDisconnected => "Peer disconnected",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events the relay sends to a peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Token issued for a newly created session.
    SessionToken(Token),
    /// Offer relayed from the initiator.
    SendOffer(serde_json::Value),
    /// Initiator acknowledged the answer.
    AckAnswer,
    /// A receiver paired with the initiator's session.
    ReceiverJoined,
    /// Answer relayed from the receiver.
    SendAnswer(serde_json::Value),
    /// The peer should stop and disconnect.
    DisconnectRequest(DisconnectReason),
}

impl ServerEvent {
    /// Encode as one outbound text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionToken(_) => "session-token",
            Self::SendOffer(_) => "send-offer",
            Self::AckAnswer => "ack-answer",
            Self::ReceiverJoined => "receiver-joined",
            Self::SendAnswer(_) => "send-answer",
            Self::DisconnectRequest(_) => "disconnect-request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_unit_event_without_data() {
        let event = ClientEvent::decode(r#"{"event":"session-start"}"#).unwrap();
        assert_eq!(event, ClientEvent::SessionStart);
    }

    #[test]
    fn decode_receiver_join_carries_token() {
        let event = ClientEvent::decode(r#"{"event":"receiver-join","data":"abc12345"}"#).unwrap();
        assert_eq!(event, ClientEvent::ReceiverJoin(Token::from_raw("abc12345")));
    }

    #[test]
    fn decode_offer_keeps_payload_untouched() {
        let frame = r#"{"event":"send-offer","data":{"sdp":"X","type":"offer","extra":[1,2,3]}}"#;
        let event = ClientEvent::decode(frame).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendOffer(json!({"sdp": "X", "type": "offer", "extra": [1, 2, 3]}))
        );
    }

    #[test]
    fn decode_rejects_unknown_event() {
        assert!(ClientEvent::decode(r#"{"event":"session-token","data":"abc12345"}"#).is_err());
        assert!(ClientEvent::decode(r#"{"event":"nope"}"#).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(ClientEvent::decode("not json").is_err());
        assert!(ClientEvent::decode(r#"{"data":"abc12345"}"#).is_err());
    }

    #[test]
    fn decode_rejects_non_string_token() {
        assert!(ClientEvent::decode(r#"{"event":"receiver-join","data":42}"#).is_err());
    }

    #[test]
    fn encode_disconnect_request_uses_reason_text() {
        let frame = ServerEvent::DisconnectRequest(DisconnectReason::PeerDisconnected)
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "disconnect-request", "data": "Peer disconnected"}));
    }

    #[test]
    fn encode_unit_event_omits_data() {
        let frame = ServerEvent::ReceiverJoined.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "receiver-joined"}));
    }

    #[test]
    fn encode_session_token() {
        let frame = ServerEvent::SessionToken(Token::from_raw("abc12345")).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "session-token", "data": "abc12345"}));
    }

    #[test]
    fn names_match_wire_tags() {
        let events = [
            ServerEvent::SessionToken(Token::from_raw("abc12345")),
            ServerEvent::SendOffer(json!({})),
            ServerEvent::AckAnswer,
            ServerEvent::ReceiverJoined,
            ServerEvent::SendAnswer(json!({})),
            ServerEvent::DisconnectRequest(DisconnectReason::Replaced),
        ];
        for event in events {
            let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
            assert_eq!(value["event"], event.name());
        }
    }

    #[test]
    fn reason_display_matches_wire() {
        for reason in [
            DisconnectReason::InvalidToken,
            DisconnectReason::Replaced,
            DisconnectReason::PeerDisconnected,
        ] {
            let wire = serde_json::to_value(reason).unwrap();
            assert_eq!(wire, reason.to_string());
        }
    }
}
