use uuid::Uuid;

use super::test_helpers::{connect, test_app_state};
use super::*;
use crate::operation::{OperationBody, OperationDraft, Stroke, StrokeMode};

fn blank_stroke() -> OperationDraft {
    OperationDraft {
        temp_id: None,
        body: OperationBody::Stroke(Stroke { mode: StrokeMode::Brush, color: "#000000".into(), thickness: 4.0, points: vec![] }),
    }
}

#[tokio::test]
async fn room_is_created_once() {
    let state = test_app_state();
    let a = state.room("lobby").await;
    let b = state.room("lobby").await;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(state.room_count().await, 1);
}

#[tokio::test]
async fn existing_room_does_not_create() {
    let state = test_app_state();
    assert!(state.existing_room("ghost").await.is_none());
    assert_eq!(state.room_count().await, 0);
}

#[tokio::test]
async fn rooms_are_independent() {
    let state = test_app_state();
    let (author, _rx) = connect(&state, "a").await;
    state.room("a").await.lock().await.store.add_operation(author, blank_stroke());

    let b = state.room("b").await;
    let b = b.lock().await;
    assert!(b.store.is_empty());
    assert!(b.presence.is_empty());
}

#[tokio::test]
async fn evict_skips_held_rooms() {
    let state = test_app_state();
    let handle = state.room("lobby").await;
    assert!(!state.evict_if_idle("lobby").await);
    drop(handle);
    assert!(state.evict_if_idle("lobby").await);
    assert_eq!(state.room_count().await, 0);
}

#[tokio::test]
async fn evict_skips_rooms_with_clients_or_history() {
    let state = test_app_state();
    let (client, _rx) = connect(&state, "lobby").await;
    assert!(!state.evict_if_idle("lobby").await);

    {
        let room = state.room("lobby").await;
        let mut room = room.lock().await;
        room.store.add_operation(client, blank_stroke());
        room.part(client);
    }
    assert!(!state.evict_if_idle("lobby").await);

    state.room("lobby").await.lock().await.store.clear();
    assert!(state.evict_if_idle("lobby").await);
}

#[tokio::test]
async fn evict_unknown_room_is_false() {
    let state = test_app_state();
    assert!(!state.evict_if_idle(&Uuid::new_v4().to_string()).await);
}
