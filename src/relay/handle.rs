//! Relay Handle
//!
//! Cloneable front door to the relay task. Every operation becomes a
//! `RelayCommand` on one mpsc queue, so the relay applies them in order.

use tokio::sync::{mpsc, oneshot};

use super::messages::ClientEvent;
use super::server::Outbox;
use crate::session::{ConnectionId, SessionId, SessionSummary};

/// Capacity of the command queue
pub(crate) const COMMAND_BUFFER: usize = 1024;

/// Relay handle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Relay is not running")]
    Unavailable,
}

/// Commands processed by the relay task
pub(crate) enum RelayCommand {
    Connect {
        conn: ConnectionId,
        outbox: Outbox,
    },
    Event {
        conn: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        conn: ConnectionId,
    },
    Summary {
        session_id: SessionId,
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
    Stats {
        reply: oneshot::Sender<(usize, usize)>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running relay
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub(crate) fn new(tx: mpsc::Sender<RelayCommand>) -> Self {
        Self { tx }
    }

    async fn submit(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx.send(command).await.map_err(|_| RelayError::Unavailable)
    }

    /// Register a connection and its outbox
    pub async fn connect(&self, conn: ConnectionId, outbox: Outbox) -> Result<(), RelayError> {
        self.submit(RelayCommand::Connect { conn, outbox }).await
    }

    /// Forward a client event
    pub async fn dispatch(&self, conn: ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        self.submit(RelayCommand::Event { conn, event }).await
    }

    /// Report that a connection went away
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RelayError> {
        self.submit(RelayCommand::Disconnect { conn }).await
    }

    /// Public view of one session
    pub async fn session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RelayCommand::Summary {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RelayError::Unavailable)
    }

    /// `(live sessions, live connections)`
    pub async fn stats(&self) -> Result<(usize, usize), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RelayCommand::Stats { reply }).await?;
        rx.await.map_err(|_| RelayError::Unavailable)
    }

    /// End all sessions and stop the relay task
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RelayCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| RelayError::Unavailable)
    }
}
