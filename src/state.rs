//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the server config and a map of live rooms. Each room has its own
//! operation store, presence registry, and connected clients behind one
//! mutex.
//!
//! LOCK ORDER
//! ==========
//! The outer `rooms` lock is taken before any room mutex, never after.
//! Handlers clone the room handle out of the map, drop the outer lock, then
//! lock the room.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::ServerConfig;
use crate::services::room::Room;

/// Handle to one room. Cloning shares the room.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config: Arc::new(config), rooms: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Get the named room, creating it on first use.
    pub async fn room(&self, name: &str) -> SharedRoom {
        if let Some(room) = self.rooms.read().await.get(name) {
            return room.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.to_owned())
            .or_insert_with(|| {
                info!(room = %name, "created room");
                Arc::new(Mutex::new(Room::new(name)))
            })
            .clone()
    }

    /// Get the named room only if it already exists.
    pub async fn existing_room(&self, name: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Drop the named room if nobody holds a handle to it and it has no
    /// history. Callers must release their own handle first.
    pub async fn evict_if_idle(&self, name: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(name) else {
            return false;
        };
        // The map's own reference is the only one; no handler can obtain a
        // new one while the write lock is held.
        if Arc::strong_count(room) > 1 {
            return false;
        }
        if !room.lock().await.is_idle() {
            return false;
        }
        rooms.remove(name);
        info!(room = %name, "evicted room from memory");
        true
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::frame::Frame;

    /// Create a test `AppState` with default config.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    /// Attach a fresh connection to a room and return its id and inbox.
    pub async fn connect(state: &AppState, room: &str) -> (Uuid, mpsc::Receiver<Frame>) {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(state.config.client_channel_capacity);
        state.room(room).await.lock().await.join(client_id, tx);
        (client_id, rx)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
