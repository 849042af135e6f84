use axum::body::to_bytes;
use uuid::Uuid;

use super::*;
use crate::operation::{OperationBody, OperationDraft, Stroke, StrokeMode};
use crate::state::test_helpers::{connect, test_app_state};

fn stroke() -> OperationDraft {
    OperationDraft {
        temp_id: Some("t-1".into()),
        body: OperationBody::Stroke(Stroke { mode: StrokeMode::Brush, color: "#000000".into(), thickness: 4.0, points: vec![] }),
    }
}

#[tokio::test]
async fn clear_unknown_room_is_not_found() {
    let state = test_app_state();
    let err = clear_by_path(State(state.clone()), Path("ghost".into())).await.unwrap_err();
    assert!(matches!(err, AdminError::RoomNotFound(ref name) if name == "ghost"));
    assert_eq!(state.room_count().await, 0);

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"], "room not found: ghost");
}

#[tokio::test]
async fn clear_empties_store_and_notifies_every_client() {
    let state = test_app_state();
    let (a, mut rx_a) = connect(&state, "lobby").await;
    let (_b, mut rx_b) = connect(&state, "lobby").await;
    state.room("lobby").await.lock().await.store.add_operation(a, stroke());

    let Json(body) = clear_by_path(State(state.clone()), Path("lobby".into())).await.unwrap();
    assert_eq!(body, json!({ "ok": true }));

    for rx in [&mut rx_a, &mut rx_b] {
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.syscall, frame::HISTORY_CLEAR);
        assert!(frame.parent_id.is_none());
        assert!(rx.try_recv().is_err(), "admin clear sends no resync");
    }

    let room = state.room("lobby").await;
    let room = room.lock().await;
    assert!(room.store.is_empty());
    assert_eq!(room.store.alias_count(), 0);
    assert_eq!(room.presence.len(), 2);
}

#[tokio::test]
async fn clear_by_query_defaults_room() {
    let state = test_app_state();
    let (client, mut rx) = connect(&state, "default").await;
    state.room("default").await.lock().await.store.add_operation(client, stroke());

    let result = clear_by_query(State(state.clone()), Query(RoomQuery::default())).await;
    assert!(result.is_ok());
    assert_eq!(rx.try_recv().map(|f| f.syscall).ok().as_deref(), Some(frame::HISTORY_CLEAR));
}

#[tokio::test]
async fn clear_of_unattended_room_evicts_it() {
    let state = test_app_state();
    let name = Uuid::new_v4().to_string();
    state.room(&name).await.lock().await.store.add_operation(Uuid::new_v4(), stroke());

    clear_by_path(State(state.clone()), Path(name.clone())).await.unwrap();

    assert!(state.existing_room(&name).await.is_none());
}
