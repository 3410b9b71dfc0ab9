//! ICE server discovery
//!
//! Both clients fetch the same reflection servers before building their
//! peer connection.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IceServer {
    pub urls: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
}

async fn ice_servers(State(state): State<AppState>) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: state
            .config()
            .ice
            .stun_urls
            .iter()
            .map(|urls| IceServer { urls: urls.clone() })
            .collect(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ice_servers))
}
