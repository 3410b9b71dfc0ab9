//! Route modules for the WebDrop relay

pub mod health;
pub mod ice;
pub mod sessions;
pub mod signal;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/socket", signal::router())
        .nest("/api/v1/sessions", sessions::router())
        .nest("/api/v1/ice-servers", ice::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
