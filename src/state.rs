//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::relay::{RelayHandle, RelayServer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    relay: RelayHandle,
}

impl AppState {
    /// Create the state and start the relay task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let (relay, _task) = RelayServer::new(config.session_ttl()).spawn(config.sweep_interval());

        Self {
            inner: Arc::new(AppStateInner { config, relay }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the relay handle
    pub fn relay(&self) -> &RelayHandle {
        &self.inner.relay
    }

    /// End every session and stop the relay.
    ///
    /// Returns how many sessions were still open; 0 if the relay had
    /// already stopped.
    pub async fn shutdown(&self) -> usize {
        let relay = &self.inner.relay;
        let (sessions, connections) = match relay.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Relay already stopped: {}", e);
                return 0;
            }
        };

        tracing::info!(sessions, connections, "Ending open sessions");
        match relay.shutdown().await {
            Ok(()) => {
                tracing::info!("Relay stopped");
                sessions
            }
            Err(e) => {
                tracing::warn!("Relay stopped before shutdown: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{ClientEvent, ServerEvent};
    use crate::session::ConnectionId;

    #[tokio::test]
    async fn test_shutdown_reports_and_ends_sessions() {
        let state = AppState::new(Config::default());
        let (outbox, mut inbox) = tokio::sync::mpsc::unbounded_channel();
        let host = ConnectionId::new();

        state.relay().connect(host, outbox).await.unwrap();
        state
            .relay()
            .dispatch(host, ClientEvent::CreateSession("s1".into()))
            .await
            .unwrap();

        assert_eq!(state.shutdown().await, 1);
        assert_eq!(inbox.recv().await, Some(ServerEvent::SessionCreated("s1".into())));
        assert_eq!(inbox.recv().await, Some(ServerEvent::SessionEnded));

        assert_eq!(state.shutdown().await, 0);
    }
}
