//! Signaling socket
//!
//! `GET /socket` upgrades to a WebSocket. Each connection gets a fresh
//! `ConnectionId`; text frames are decoded into `ClientEvent`s and handed to
//! the relay, and whatever the relay queues for the connection is written
//! back as text frames. Closing the socket is the implicit disconnect.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::relay::{ClientEvent, RelayHandle, ServerEvent};
use crate::session::ConnectionId;
use crate::state::AppState;

async fn socket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let relay = state.relay().clone();
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        serve_connection(relay, sink, stream).await;
    })
}

/// Pump one client connection until either side goes away
pub async fn serve_connection<W, R, E>(relay: RelayHandle, mut sink: W, mut stream: R)
where
    W: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let conn = ConnectionId::new();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();

    if let Err(e) = relay.connect(conn, outbox).await {
        tracing::error!(connection_id = %conn, "Cannot register connection: {}", e);
        return;
    }
    tracing::info!(connection_id = %conn, "WebSocket opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(event = event.name(), "Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if relay.dispatch(conn, event).await.is_err() {
                        tracing::warn!(connection_id = %conn, "Relay stopped; closing connection");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn, "Ignoring invalid signaling message: {}", e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %conn, "Socket error: {}", e);
                break;
            }
        }
    }

    if relay.disconnect(conn).await.is_err() {
        tracing::debug!(connection_id = %conn, "Relay already stopped");
    }
    writer.abort();
    tracing::info!(connection_id = %conn, "WebSocket closed");
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(socket_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayServer;
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;

    struct TestClient {
        frames: fmpsc::UnboundedSender<Result<Message, String>>,
        received: fmpsc::UnboundedReceiver<Message>,
        task: tokio::task::JoinHandle<()>,
    }

    impl TestClient {
        fn connect(relay: &RelayHandle) -> Self {
            let (frames, stream) = fmpsc::unbounded();
            let (sink, received) = fmpsc::unbounded();
            let task = tokio::spawn(serve_connection(relay.clone(), sink, stream));
            Self { frames, received, task }
        }

        fn send(&self, json: serde_json::Value) {
            self.frames
                .unbounded_send(Ok(Message::Text(json.to_string())))
                .unwrap();
        }

        async fn next_event(&mut self) -> serde_json::Value {
            let frame = tokio::time::timeout(Duration::from_secs(1), self.received.next())
                .await
                .expect("timed out waiting for event")
                .expect("socket closed");
            match frame {
                Message::Text(text) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_signaling_over_socket() {
        let (relay, _task) = RelayServer::new(None).spawn(Duration::from_secs(60));
        let mut host = TestClient::connect(&relay);
        let mut peer = TestClient::connect(&relay);

        host.send(serde_json::json!({"event": "create-session", "data": "abc123"}));
        assert_eq!(
            host.next_event().await,
            serde_json::json!({"event": "session-created", "data": "abc123"})
        );

        host.send(serde_json::json!({
            "event": "offer",
            "data": {"offer": {"type": "offer", "sdp": "v=0"}, "sessionId": "abc123"}
        }));
        peer.send(serde_json::json!({"event": "join-session", "data": "abc123"}));

        assert_eq!(
            host.next_event().await,
            serde_json::json!({"event": "receiver-joined", "data": "abc123"})
        );
        assert_eq!(
            peer.next_event().await,
            serde_json::json!({"event": "offer", "data": {"offer": {"type": "offer", "sdp": "v=0"}}})
        );

        host.frames.unbounded_send(Ok(Message::Close(None))).unwrap();
        host.task.await.unwrap();

        assert_eq!(
            peer.next_event().await,
            serde_json::json!({"event": "session-ended"})
        );
    }

    #[tokio::test]
    async fn test_invalid_message_is_ignored() {
        let (relay, _task) = RelayServer::new(None).spawn(Duration::from_secs(60));
        let mut client = TestClient::connect(&relay);

        client.send(serde_json::json!({"event": "bogus"}));
        client.send(serde_json::json!({"event": "join-session", "data": "nope"}));

        assert_eq!(
            client.next_event().await,
            serde_json::json!({"event": "session-error", "data": "Session not found"})
        );
    }

    #[tokio::test]
    async fn test_stream_error_disconnects() {
        let (relay, _task) = RelayServer::new(None).spawn(Duration::from_secs(60));
        let client = TestClient::connect(&relay);

        client.send(serde_json::json!({"event": "create-session", "data": "s1"}));
        client.frames.unbounded_send(Err("reset".to_string())).unwrap();
        client.task.await.unwrap();

        assert_eq!(relay.stats().await.unwrap(), (0, 0));
    }
}
