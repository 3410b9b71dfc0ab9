//! Relay Server
//!
//! Routes handshake events between the two connections of a session.
//! The server owns the `SessionRegistry` and the connection -> outbox map;
//! when spawned it runs as a single task and every connection reaches it
//! through a `RelayHandle`, so session data is never shared across tasks.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

use super::handle::{RelayCommand, RelayHandle, COMMAND_BUFFER};
use super::messages::{
    AnswerPayload, CandidatePayload, ClientEvent, ForwardedAnswer, ForwardedCandidate,
    ForwardedOffer, OfferPayload, ServerEvent,
};
use crate::session::{ConnectionId, RegistryError, Role, SessionRegistry};

/// Per-connection queue of events to deliver
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Reason sent to a host whose unjoined session expired
pub const SESSION_EXPIRED_REASON: &str = "Session expired";

const NOT_A_PARTICIPANT: &str = "Not a participant in this session";

// ============================================================================
// Relay Server
// ============================================================================

/// Handshake router
pub struct RelayServer {
    registry: SessionRegistry,
    connections: HashMap<ConnectionId, Outbox>,
    session_ttl: Option<Duration>,
}

impl RelayServer {
    /// Create a relay. `session_ttl` bounds how long a session may wait for
    /// a peer; `None` keeps unjoined sessions until the host disconnects.
    pub fn new(session_ttl: Option<Duration>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            connections: HashMap::new(),
            session_ttl,
        }
    }

    /// Read access to the registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Register a live connection and where to deliver its events
    pub fn connect(&mut self, conn: ConnectionId, outbox: Outbox) {
        tracing::debug!(connection_id = %conn, "Client connected");
        self.connections.insert(conn, outbox);
    }

    /// Tear down every session `conn` participates in. Idempotent.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let removed_connection = self.connections.remove(&conn).is_some();

        for (session_id, role) in self.registry.find_by_connection(conn) {
            let survivor = self
                .registry
                .get(&session_id)
                .and_then(|s| s.participant(role.other()));

            if let Some(survivor) = survivor {
                self.send(survivor, ServerEvent::SessionEnded);
            }

            self.registry.remove(&session_id);
            tracing::info!(
                session_id = %session_id,
                connection_id = %conn,
                role = %role,
                "Session closed"
            );
        }

        if removed_connection {
            tracing::debug!(connection_id = %conn, "Client disconnected");
        }
    }

    // ========================================================================
    // Event Routing
    // ========================================================================

    /// Route one event received from `conn`
    pub fn handle_event(&mut self, conn: ConnectionId, event: ClientEvent) {
        tracing::debug!(
            connection_id = %conn,
            session_id = %event.session_id(),
            event = event.name(),
            "Signaling event"
        );

        match event {
            ClientEvent::CreateSession(id) => self.handle_create_session(conn, &id),
            ClientEvent::JoinSession(id) => self.handle_join_session(conn, &id),
            ClientEvent::Offer(payload) => self.handle_offer(conn, payload),
            ClientEvent::Answer(payload) => self.handle_answer(conn, payload),
            ClientEvent::Candidate(payload) => self.handle_candidate(conn, payload),
        }
    }

    fn handle_create_session(&mut self, conn: ConnectionId, id: &str) {
        match self.registry.create(id, conn) {
            Ok(_) => {
                tracing::info!(session_id = %id, connection_id = %conn, "Session created");
                self.send(conn, ServerEvent::SessionCreated(id.to_string()));
            }
            Err(e) => self.reject(conn, e),
        }
    }

    fn handle_join_session(&mut self, conn: ConnectionId, id: &str) {
        let host = match self.registry.join(id, conn) {
            Ok(session) => session.host,
            Err(e) => return self.reject(conn, e),
        };

        tracing::info!(session_id = %id, connection_id = %conn, "Peer joined session");
        self.send(host, ServerEvent::ReceiverJoined(id.to_string()));

        if let Some(offer) = self.registry.consume_pending_offer(id) {
            tracing::debug!(session_id = %id, "Replaying cached offer to peer");
            self.send(conn, ServerEvent::Offer(ForwardedOffer { offer }));
        }
    }

    fn handle_offer(&mut self, conn: ConnectionId, payload: OfferPayload) {
        let OfferPayload { offer, session_id } = payload;

        match self.registry.role_of(&session_id, conn) {
            Some(Role::Host) => {}
            Some(Role::Peer) => {
                return self.refuse(conn, &session_id, "Only the host can send an offer");
            }
            None => {
                if self.registry.get(&session_id).is_none() {
                    return self.reject(conn, RegistryError::SessionNotFound(session_id));
                }
                return self.refuse(conn, &session_id, NOT_A_PARTICIPANT);
            }
        }

        let peer = match self.registry.record_offer(&session_id, offer.clone()) {
            Ok(session) => session.peer,
            Err(e) => return self.reject(conn, e),
        };

        if let Some(peer) = peer {
            self.send(peer, ServerEvent::Offer(ForwardedOffer { offer }));
        }
    }

    fn handle_answer(&mut self, conn: ConnectionId, payload: AnswerPayload) {
        let AnswerPayload { answer, session_id } = payload;

        let Some(session) = self.registry.get(&session_id) else {
            return self.reject(conn, RegistryError::SessionNotFound(session_id));
        };

        match self.registry.role_of(&session_id, conn) {
            Some(Role::Peer) => {}
            Some(Role::Host) => {
                return self.refuse(conn, &session_id, "Only the peer can send an answer");
            }
            None => return self.refuse(conn, &session_id, NOT_A_PARTICIPANT),
        }

        let host = session.host;
        self.send(host, ServerEvent::Answer(ForwardedAnswer { answer }));
    }

    fn handle_candidate(&mut self, conn: ConnectionId, payload: CandidatePayload) {
        let CandidatePayload { candidate, session_id } = payload;

        let Some(session) = self.registry.get(&session_id) else {
            return self.reject(conn, RegistryError::SessionNotFound(session_id));
        };

        let Some(role) = self.registry.role_of(&session_id, conn) else {
            return self.refuse(conn, &session_id, NOT_A_PARTICIPANT);
        };

        if let Some(target) = session.participant(role.other()) {
            self.send(target, ServerEvent::Candidate(ForwardedCandidate { candidate }));
        }
    }

    // ========================================================================
    // Expiry & Teardown
    // ========================================================================

    /// Drop unjoined sessions older than the TTL. Returns how many went.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.session_ttl else {
            return 0;
        };

        let expired = self.registry.expired(now, ttl);
        for id in &expired {
            if let Some(session) = self.registry.remove(id) {
                self.send(session.host, ServerEvent::SessionError(SESSION_EXPIRED_REASON.to_string()));
                tracing::debug!(session_id = %id, "Expired unjoined session");
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Cleaned up expired sessions");
        }

        expired.len()
    }

    /// End every session and forget every connection
    pub fn close_all(&mut self) {
        for id in self.registry.session_ids() {
            if let Some(session) = self.registry.remove(&id) {
                let participants = [Some(session.host), session.peer];
                for conn in participants.into_iter().flatten() {
                    self.send(conn, ServerEvent::SessionEnded);
                }
            }
        }
        self.connections.clear();
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    fn send(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&conn) {
            Some(outbox) => {
                let name = event.name();
                if outbox.send(event).is_err() {
                    tracing::debug!(connection_id = %conn, event = name, "Outbox closed, event dropped");
                    return false;
                }
                true
            }
            None => {
                tracing::debug!(connection_id = %conn, event = event.name(), "Unknown connection, event dropped");
                false
            }
        }
    }

    fn reject(&self, conn: ConnectionId, error: RegistryError) {
        tracing::warn!(
            connection_id = %conn,
            session_id = %error.session_id(),
            reason = %error,
            "Signaling request rejected"
        );
        self.send(conn, ServerEvent::SessionError(error.to_string()));
    }

    /// Answer a message sent in the wrong role. The session is left as is.
    fn refuse(&self, conn: ConnectionId, session_id: &str, reason: &str) {
        tracing::warn!(
            connection_id = %conn,
            session_id = %session_id,
            reason,
            "Signaling message refused"
        );
        self.send(conn, ServerEvent::SessionError(reason.to_string()));
    }

    // ========================================================================
    // Task
    // ========================================================================

    /// Run the relay as its own task. `sweep_interval` drives expiry checks.
    pub fn spawn(self, sweep_interval: StdDuration) -> (RelayHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx, sweep_interval));
        (RelayHandle::new(tx), task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<RelayCommand>, sweep_interval: StdDuration) {
        let sweeping = self.session_ttl.is_some();
        let mut ticker = tokio::time::interval(sweep_interval.max(StdDuration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            session_ttl_secs = self.session_ttl.map(|t| t.num_seconds()),
            "Relay started"
        );

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.dispatch(command) {
                        break;
                    }
                }
                _ = ticker.tick(), if sweeping => {
                    self.sweep_expired(Utc::now());
                }
            }
        }

        self.close_all();
        tracing::info!("Relay stopped");
    }

    /// Apply one command. Returns `false` when the relay should stop.
    fn dispatch(&mut self, command: RelayCommand) -> bool {
        match command {
            RelayCommand::Connect { conn, outbox } => self.connect(conn, outbox),
            RelayCommand::Event { conn, event } => self.handle_event(conn, event),
            RelayCommand::Disconnect { conn } => self.disconnect(conn),
            RelayCommand::Summary { session_id, reply } => {
                let _ = reply.send(self.registry.get(&session_id).map(|s| s.summary()));
            }
            RelayCommand::Stats { reply } => {
                let _ = reply.send((self.registry.len(), self.connections.len()));
            }
            RelayCommand::Shutdown { reply } => {
                self.close_all();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
