//! Room maintenance endpoints.
//!
//! `GET /clear?room=` and `POST /api/rooms/{room}/clear` empty a room's
//! history and tell every connection in it. Presence is untouched.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::info;

use super::RoomQuery;
use crate::frame::{self, Data, Frame};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

pub async fn clear_by_query(
    State(state): State<AppState>,
    Query(params): Query<RoomQuery>,
) -> Result<Json<serde_json::Value>, AdminError> {
    let room = params.room_or(&state.config.default_room);
    clear_room(&state, &room).await
}

pub async fn clear_by_path(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<Json<serde_json::Value>, AdminError> {
    clear_room(&state, &room).await
}

async fn clear_room(state: &AppState, name: &str) -> Result<Json<serde_json::Value>, AdminError> {
    let Some(handle) = state.existing_room(name).await else {
        return Err(AdminError::RoomNotFound(name.to_owned()));
    };

    {
        let mut room = handle.lock().await;
        room.store.clear();
        let cleared = Frame::request(frame::HISTORY_CLEAR, Data::new()).with_room(room.name());
        let notified = room.broadcast(&cleared, None);
        info!(room = %name, notified, "admin: cleared room");
    }

    drop(handle);
    state.evict_if_idle(name).await;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
