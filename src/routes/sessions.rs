//! Session Routes
//!
//! Endpoints:
//! - POST /api/v1/sessions - Mint a session id and shareable link
//! - GET /api/v1/sessions/:session_id - Get session status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::session::{
    generate_session_id, is_valid_session_id, session_link, SessionId, SessionSummary,
};
use crate::state::AppState;

/// Response for a freshly minted session id
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    pub session_id: SessionId,
    pub session_link: String,
}

/// Mint a session id.
///
/// Nothing is registered until the host sends `create-session` over the socket.
async fn new_session(State(state): State<AppState>) -> (StatusCode, Json<NewSessionResponse>) {
    let session_id = generate_session_id();
    let link = session_link(&state.config().relay.public_url, &session_id);

    tracing::debug!(session_id = %session_id, "Minted session id");

    (
        StatusCode::CREATED,
        Json(NewSessionResponse {
            session_id,
            session_link: link,
        }),
    )
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionSummary>> {
    if !is_valid_session_id(&session_id) {
        return Err(AppError::BadRequest(format!(
            "Invalid session id: {:?}",
            session_id
        )));
    }

    state
        .relay()
        .session_summary(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new_session))
        .route("/:session_id", get(get_session))
}
