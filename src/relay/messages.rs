//! Signaling wire events
//!
//! Every WebSocket text frame carries one event:
//! `{ "event": "<name>", "data": <payload> }`.

use serde::{Deserialize, Serialize};

use crate::session::{PathDescriptor, Sdp, SessionId};

// ============================================================================
// Client -> Relay
// ============================================================================

/// Events a browser client sends to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Register a new session with the sender as host
    CreateSession(SessionId),

    /// Join an existing session as peer
    JoinSession(SessionId),

    /// Host's handshake offer
    Offer(OfferPayload),

    /// Peer's handshake answer
    Answer(AnswerPayload),

    /// Network path candidate from either side
    Candidate(CandidatePayload),
}

impl ClientEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession(_) => "create-session",
            Self::JoinSession(_) => "join-session",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
        }
    }

    /// Session the event is addressed to
    pub fn session_id(&self) -> &str {
        match self {
            Self::CreateSession(id) | Self::JoinSession(id) => id,
            Self::Offer(p) => &p.session_id,
            Self::Answer(p) => &p.session_id,
            Self::Candidate(p) => &p.session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub offer: Sdp,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub answer: Sdp,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub candidate: PathDescriptor,
    pub session_id: SessionId,
}

// ============================================================================
// Relay -> Client
// ============================================================================

/// Events the relay sends to a browser client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Acknowledges `create-session` to the host
    SessionCreated(SessionId),

    /// A request could not be satisfied; human-readable reason
    SessionError(String),

    /// Tells the host a peer joined
    ReceiverJoined(SessionId),

    /// The other participant left; the session is gone
    SessionEnded,

    /// Host's offer, forwarded or replayed to the peer
    Offer(ForwardedOffer),

    /// Peer's answer, forwarded to the host
    Answer(ForwardedAnswer),

    /// Candidate from the other participant
    Candidate(ForwardedCandidate),
}

impl ServerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated(_) => "session-created",
            Self::SessionError(_) => "session-error",
            Self::ReceiverJoined(_) => "receiver-joined",
            Self::SessionEnded => "session-ended",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedOffer {
    pub offer: Sdp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedAnswer {
    pub answer: Sdp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedCandidate {
    pub candidate: PathDescriptor,
}
