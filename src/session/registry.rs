//! Session Registry
//!
//! Owns the mapping from session id to session state plus an explicit
//! connection -> (session, role) index. Pure data: no I/O, no locking.
//! The relay coordinator is the single owner and funnels every mutation
//! through these methods.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::types::{
    ConnectionId, RegistryError, Role, Sdp, Session, SessionId, SessionState,
};

/// In-memory session registry
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Live sessions indexed by id
    sessions: HashMap<SessionId, Session>,

    /// Sessions each connection participates in, with its role
    memberships: HashMap<ConnectionId, HashMap<SessionId, Role>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Register a new session hosted by `host`
    pub fn create(&mut self, id: &str, host: ConnectionId) -> Result<&Session, RegistryError> {
        if self.sessions.contains_key(id) {
            return Err(RegistryError::DuplicateSession(id.to_string()));
        }

        self.memberships
            .entry(host)
            .or_default()
            .insert(id.to_string(), Role::Host);

        let session = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id, host));

        Ok(session)
    }

    /// Attach `peer` to an existing session
    pub fn join(&mut self, id: &str, peer: ConnectionId) -> Result<&Session, RegistryError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;

        if session.host == peer {
            return Err(RegistryError::AlreadyParticipant(id.to_string()));
        }
        if session.peer.is_some() {
            return Err(RegistryError::SessionFull(id.to_string()));
        }

        session.peer = Some(peer);
        session.state = SessionState::Joined;

        self.memberships
            .entry(peer)
            .or_default()
            .insert(id.to_string(), Role::Peer);

        Ok(session)
    }

    /// Cache the host's offer for replay to a late-joining peer
    pub fn record_offer(&mut self, id: &str, sdp: Sdp) -> Result<&Session, RegistryError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;

        session.pending_offer = Some(sdp);
        Ok(session)
    }

    /// Take the cached offer, if any
    pub fn consume_pending_offer(&mut self, id: &str) -> Option<Sdp> {
        self.sessions
            .get_mut(id)
            .and_then(|session| session.pending_offer.take())
    }

    /// Remove a session. Idempotent: returns `None` if already gone.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let mut session = self.sessions.remove(id)?;

        let participants = [Some(session.host), session.peer];
        for conn in participants.into_iter().flatten() {
            if let Some(owned) = self.memberships.get_mut(&conn) {
                owned.remove(id);
                if owned.is_empty() {
                    self.memberships.remove(&conn);
                }
            }
        }

        session.state = SessionState::Closed;
        Some(session)
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Get a session by id
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Role of `conn` within session `id`
    pub fn role_of(&self, id: &str, conn: ConnectionId) -> Option<Role> {
        self.memberships
            .get(&conn)
            .and_then(|owned| owned.get(id))
            .copied()
    }

    /// All sessions `conn` takes part in, sorted by id
    pub fn find_by_connection(&self, conn: ConnectionId) -> Vec<(SessionId, Role)> {
        let mut found: Vec<(SessionId, Role)> = self
            .memberships
            .get(&conn)
            .map(|owned| owned.iter().map(|(id, role)| (id.clone(), *role)).collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Ids of unjoined sessions older than `ttl`
    pub fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_expired(now, ttl))
            .map(|s| s.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of every live session
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_duplicate() {
        let mut registry = SessionRegistry::new();
        let host = ConnectionId::new();
        let other = ConnectionId::new();

        registry.create("abc", host).unwrap();
        let err = registry.create("abc", other).unwrap_err();

        assert_eq!(err, RegistryError::DuplicateSession("abc".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("abc").unwrap().host, host);
        assert!(registry.find_by_connection(other).is_empty());
    }

    #[test]
    fn test_join_missing_and_full() {
        let mut registry = SessionRegistry::new();
        let host = ConnectionId::new();
        let peer = ConnectionId::new();
        let late = ConnectionId::new();

        assert_eq!(
            registry.join("nope", peer).unwrap_err(),
            RegistryError::SessionNotFound("nope".to_string())
        );

        registry.create("abc", host).unwrap();
        let session = registry.join("abc", peer).unwrap();
        assert_eq!(session.state, SessionState::Joined);
        assert_eq!(session.peer, Some(peer));

        assert_eq!(
            registry.join("abc", late).unwrap_err(),
            RegistryError::SessionFull("abc".to_string())
        );
        assert_eq!(registry.get("abc").unwrap().peer, Some(peer));
    }

    #[test]
    fn test_host_cannot_join_own_session() {
        let mut registry = SessionRegistry::new();
        let host = ConnectionId::new();
        registry.create("abc", host).unwrap();

        assert!(matches!(
            registry.join("abc", host),
            Err(RegistryError::AlreadyParticipant(_))
        ));
        assert_eq!(registry.get("abc").unwrap().state, SessionState::Created);
    }

    #[test]
    fn test_offer_cache() {
        let mut registry = SessionRegistry::new();
        registry.create("abc", ConnectionId::new()).unwrap();

        let offer = json!({"type": "offer", "sdp": "v=0"});
        registry.record_offer("abc", offer.clone()).unwrap();

        assert_eq!(registry.consume_pending_offer("abc"), Some(offer));
        assert_eq!(registry.consume_pending_offer("abc"), None);
        assert!(registry.record_offer("missing", json!({})).is_err());
    }

    #[test]
    fn test_roles_and_lookup() {
        let mut registry = SessionRegistry::new();
        let host = ConnectionId::new();
        let peer = ConnectionId::new();

        registry.create("b", host).unwrap();
        registry.create("a", host).unwrap();
        registry.join("a", peer).unwrap();

        assert_eq!(registry.role_of("a", host), Some(Role::Host));
        assert_eq!(registry.role_of("a", peer), Some(Role::Peer));
        assert_eq!(registry.role_of("b", peer), None);

        assert_eq!(
            registry.find_by_connection(host),
            vec![("a".to_string(), Role::Host), ("b".to_string(), Role::Host)]
        );
        assert_eq!(
            registry.find_by_connection(peer),
            vec![("a".to_string(), Role::Peer)]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = SessionRegistry::new();
        let host = ConnectionId::new();
        let peer = ConnectionId::new();
        registry.create("abc", host).unwrap();
        registry.join("abc", peer).unwrap();

        let removed = registry.remove("abc").unwrap();
        assert_eq!(removed.state, SessionState::Closed);
        assert!(registry.remove("abc").is_none());
        assert!(registry.is_empty());
        assert!(registry.find_by_connection(host).is_empty());
        assert!(registry.find_by_connection(peer).is_empty());
    }

    #[test]
    fn test_expired_lists_only_stale_unjoined() {
        let mut registry = SessionRegistry::new();
        registry.create("lonely", ConnectionId::new()).unwrap();
        registry.create("paired", ConnectionId::new()).unwrap();
        registry.join("paired", ConnectionId::new()).unwrap();

        let later = Utc::now() + Duration::seconds(3600);
        assert_eq!(registry.expired(later, Duration::seconds(60)), vec!["lonely".to_string()]);
        assert!(registry.expired(Utc::now(), Duration::seconds(60)).is_empty());
    }
}
