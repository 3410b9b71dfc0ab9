//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<usize>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, sessions, connections) = match state.relay().stats().await {
        Ok((sessions, connections)) => ("healthy", Some(sessions), Some(connections)),
        Err(e) => {
            tracing::warn!("Health check could not reach relay: {}", e);
            ("degraded", None, None)
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "webdrop-server",
        sessions,
        connections,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
