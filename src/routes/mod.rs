//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the drawing websocket, the room maintenance
//! endpoints, and a health probe. Static assets are served elsewhere.

pub mod admin;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// `?room=` query shared by the websocket and the clear endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    pub room: Option<String>,
}

impl RoomQuery {
    /// Requested room name, or `default` when absent or blank.
    #[must_use]
    pub fn room_or(self, default: &str) -> String {
        self.room
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/clear", get(admin::clear_by_query))
        .route("/api/rooms/{room}/clear", post(admin::clear_by_path))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
