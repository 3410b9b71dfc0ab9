//! Session types for the signaling relay

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Length of generated session ids
pub const SESSION_ID_LEN: usize = 8;

/// Longest session id accepted from a client
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Alphabet for generated session ids (base36, lowercase)
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// Identifiers
// ============================================================================

/// Session identifier shared by host and peer (usually part of the session link)
pub type SessionId = String;

/// Opaque handshake description (offer or answer), relayed verbatim
pub type Sdp = serde_json::Value;

/// Opaque network path candidate, relayed verbatim
pub type PathDescriptor = serde_json::Value;

/// Identity of one live transport connection.
///
/// Assigned by the transport layer when a client connects; a reconnecting
/// client gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of a session a connection plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Created the session and sends the offer
    Host,
    /// Joined an existing session and answers
    Peer,
}

impl Role {
    /// The opposite role
    pub fn other(self) -> Role {
        match self {
            Role::Host => Role::Peer,
            Role::Peer => Role::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Host registered, no peer yet
    Created,
    /// Peer registered
    Joined,
    /// Terminal; only ever observed on a session that was removed
    Closed,
}

/// A host/peer pairing mediated by the relay during the handshake
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id
    pub id: SessionId,

    /// Connection that created the session
    pub host: ConnectionId,

    /// Connection that joined, if any
    pub peer: Option<ConnectionId>,

    /// Last offer sent by the host, replayed to a peer that joins later
    pub pending_offer: Option<Sdp>,

    /// Current state
    pub state: SessionState,

    /// Creation time (used for expiry of unjoined sessions)
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session owned by `host`
    pub fn new(id: impl Into<SessionId>, host: ConnectionId) -> Self {
        Self {
            id: id.into(),
            host,
            peer: None,
            pending_offer: None,
            state: SessionState::Created,
            created_at: Utc::now(),
        }
    }

    /// Connection playing `role`, if present
    pub fn participant(&self, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Host => Some(self.host),
            Role::Peer => self.peer,
        }
    }

    /// Whether an unjoined session has outlived `ttl`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.state == SessionState::Created && now - self.created_at >= ttl
    }

    /// Serializable view for status endpoints
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            state: self.state,
            has_pending_offer: self.pending_offer.is_some(),
            created_at: self.created_at,
        }
    }
}

/// Public view of a session (no connection ids, no handshake payloads)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub state: SessionState,
    pub has_pending_offer: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Registry errors. Display strings are sent to clients as `session-error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Session already exists")]
    DuplicateSession(SessionId),

    #[error("Session not found")]
    SessionNotFound(SessionId),

    #[error("Session is full")]
    SessionFull(SessionId),

    #[error("Already participating in this session")]
    AlreadyParticipant(SessionId),
}

impl RegistryError {
    /// Session the failed operation targeted
    pub fn session_id(&self) -> &str {
        match self {
            Self::DuplicateSession(id)
            | Self::SessionNotFound(id)
            | Self::SessionFull(id)
            | Self::AlreadyParticipant(id) => id,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Generate a fresh random session id (8 lowercase alphanumerics)
pub fn generate_session_id() -> SessionId {
    let mut n = Uuid::new_v4().as_u128();
    let base = SESSION_ID_ALPHABET.len() as u128;
    let mut id = String::with_capacity(SESSION_ID_LEN);
    for _ in 0..SESSION_ID_LEN {
        id.push(SESSION_ID_ALPHABET[(n % base) as usize] as char);
        n /= base;
    }
    id
}

/// Session ids chosen by a client are limited to 64 characters of
/// `[A-Za-z0-9_-]`
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Build the link a host shares with the receiving side
pub fn session_link(public_url: &str, session_id: &str) -> String {
    format!("{}/receiver/{}", public_url.trim_end_matches('/'), session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_session_id() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id(&generate_session_id()));
        assert!(is_valid_session_id("Drop_2024-abc"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("bad id"));
        assert!(!is_valid_session_id("../etc"));
        assert!(!is_valid_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)));
    }

    #[test]
    fn test_session_link() {
        assert_eq!(
            session_link("http://localhost:5173/", "abc123"),
            "http://localhost:5173/receiver/abc123"
        );
    }

    #[test]
    fn test_expiry_only_applies_to_unjoined() {
        let mut session = Session::new("s1", ConnectionId::new());
        let later = session.created_at + Duration::seconds(120);

        assert!(session.is_expired(later, Duration::seconds(60)));
        assert!(!session.is_expired(later, Duration::seconds(600)));

        session.state = SessionState::Joined;
        assert!(!session.is_expired(later, Duration::seconds(60)));
    }
}
