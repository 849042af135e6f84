//! Room — one shared drawing surface and the connections attached to it.
//!
//! DESIGN
//! ======
//! A room owns its operation store, its presence registry, and the outbound
//! channel of every connected client. The whole struct sits behind one
//! `tokio::sync::Mutex` (see `state::AppState`), which is the single-writer
//! boundary: a handler mutates the store and enqueues every resulting frame
//! while holding the lock, so all connections observe frames in log order.
//!
//! Sends are `try_send` only. A full channel drops the frame for that client;
//! the next `sync:state` brings it back in line.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::operation::ConnectionId;
use crate::services::oplog::OperationStore;
use crate::services::presence::{Participant, PresenceRegistry};

pub struct Room {
    name: String,
    pub store: OperationStore,
    pub presence: PresenceRegistry,
    clients: HashMap<ConnectionId, mpsc::Sender<Frame>>,
}

impl Room {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: OperationStore::new(),
            presence: PresenceRegistry::new(),
            clients: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a connection and register its participant record.
    pub fn join(&mut self, client_id: ConnectionId, tx: mpsc::Sender<Frame>) -> Participant {
        self.clients.insert(client_id, tx);
        let participant = self.presence.join(client_id);
        info!(room = %self.name, %client_id, clients = self.clients.len(), "room: client joined");
        participant
    }

    /// Detach a connection. Its operations stay in the log; only its pending
    /// temp id aliases are dropped.
    pub fn part(&mut self, client_id: ConnectionId) -> Option<Participant> {
        self.clients.remove(&client_id);
        self.store.forget_author(client_id);
        let participant = self.presence.leave(client_id);
        info!(room = %self.name, %client_id, remaining = self.clients.len(), "room: client left");
        participant
    }

    /// Enqueue a frame for every connection except `exclude`. Returns the
    /// number of connections that accepted it.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for (client_id, tx) in &self.clients {
            if exclude == Some(*client_id) {
                continue;
            }
            if self.enqueue(*client_id, tx, frame) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Enqueue a frame for one connection.
    pub fn send_to(&self, client_id: ConnectionId, frame: &Frame) -> bool {
        let Some(tx) = self.clients.get(&client_id) else {
            debug!(room = %self.name, %client_id, syscall = %frame.syscall, "room: send to unknown client");
            return false;
        };
        self.enqueue(client_id, tx, frame)
    }

    fn enqueue(&self, client_id: ConnectionId, tx: &mpsc::Sender<Frame>, frame: &Frame) -> bool {
        match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(room = %self.name, %client_id, syscall = %frame.syscall, error = %e, "room: dropped frame");
                false
            }
        }
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// No connections and nothing to undo or redo.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.clients.is_empty() && !self.store.can_undo() && !self.store.can_redo()
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
