//! Operation store — authoritative append-only log with undo/redo.
//!
//! DESIGN
//! ======
//! The log is a `Vec<Operation>` in causal (handling) order with an
//! `id -> position` index for direct lookup. Undo pops the log tail onto the
//! redo stack and redo pops it back, so only the tail ever moves and the
//! index stays valid with O(1) maintenance. Both stacks belong to one room,
//! not to an author: any participant's undo removes the most recent action
//! regardless of who drew it.
//!
//! Temporary client ids live in a separate alias map (`temp_id -> id`) rather
//! than on the stored operation. Lookups try the key as a live durable id
//! first, then the alias map. An alias is never created over a live durable
//! id or over an alias still in use, so the first operation to claim a key
//! keeps it. Aliases are pruned when the operation is finalized, undone, or
//! cleared, or when their author leaves.
//!
//! The store has no internal locking. Callers serialize access (see
//! `services::room`).

use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::operation::{ConnectionId, Operation, OperationDraft, OperationId, OperationUpdate, Point};

#[derive(Debug, Clone, Copy)]
struct Alias {
    id: OperationId,
    author: ConnectionId,
}

/// One room's operation history.
#[derive(Debug, Default)]
pub struct OperationStore {
    log: Vec<Operation>,
    positions: HashMap<OperationId, usize>,
    redo: Vec<Operation>,
    aliases: HashMap<String, Alias>,
}

impl OperationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Append a new operation under a freshly allocated id. Records the
    /// draft's temp id as an alias and invalidates the redo stack.
    pub fn add_operation(&mut self, author: ConnectionId, draft: OperationDraft) -> OperationId {
        let id = Uuid::new_v4();
        let temp_id = draft.temp_id.clone();
        if let Some(temp_id) = &temp_id {
            if self.resolve(temp_id).is_some() {
                debug!(%id, temp_id = %temp_id, "oplog: temp id already claimed, no alias");
            } else {
                self.aliases.insert(temp_id.clone(), Alias { id, author });
            }
        }

        let op = Operation::from_draft(id, author, draft);
        let kind = op.kind();
        let points = op.points().len();
        self.positions.insert(id, self.log.len());
        self.log.push(op);
        self.redo.clear();

        debug!(%id, temp_id = temp_id.as_deref().unwrap_or("none"), kind, points, "oplog: added operation");
        id
    }

    /// Concatenate points onto the stroke addressed by `key` (durable id or
    /// temp id). Returns false, leaving the log untouched, when the key is
    /// unknown or the batch is empty. Shapes match but carry no points.
    pub fn append_points(&mut self, key: &str, points: &[Point]) -> bool {
        if points.is_empty() {
            return false;
        }
        self.update_operation(key, &[OperationUpdate::PointsAppended(points.to_vec())])
    }

    /// Apply partial updates to the operation addressed by `key`. Returns
    /// whether the key matched an operation in the log.
    pub fn update_operation(&mut self, key: &str, updates: &[OperationUpdate]) -> bool {
        let Some(id) = self.resolve(key) else {
            debug!(key, total = self.log.len(), "oplog: lookup miss");
            return false;
        };
        let Some(op) = self.get_mut(id) else {
            return false;
        };

        for update in updates {
            if !op.apply(update) {
                debug!(key, kind = op.kind(), "oplog: update does not apply to operation kind");
            }
        }
        true
    }

    /// Move the most recent operation onto the redo stack.
    pub fn undo(&mut self) -> Option<Operation> {
        let op = self.log.pop()?;
        self.positions.remove(&op.id);
        self.prune_aliases_for(op.id);
        self.redo.push(op.clone());
        debug!(id = %op.id, remaining = self.log.len(), "oplog: undo");
        Some(op)
    }

    /// Move the most recently undone operation back onto the log tail.
    pub fn redo(&mut self) -> Option<Operation> {
        let op = self.redo.pop()?;
        self.positions.insert(op.id, self.log.len());
        self.log.push(op.clone());
        debug!(id = %op.id, total = self.log.len(), "oplog: redo");
        Some(op)
    }

    /// Empty the log, both stacks, and every alias.
    pub fn clear(&mut self) {
        info!(operations = self.log.len(), undone = self.redo.len(), "oplog: clear");
        self.log.clear();
        self.positions.clear();
        self.redo.clear();
        self.aliases.clear();
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Resolve a durable id or temp id to the durable id of a live operation.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<OperationId> {
        if let Ok(id) = key.parse::<OperationId>() {
            if self.positions.contains_key(&id) {
                return Some(id);
            }
        }
        self.aliases.get(key).map(|alias| alias.id)
    }

    /// Drop the temp id alias of a finalized operation. Later messages must
    /// use the durable id.
    pub fn confirm(&mut self, id: OperationId) {
        self.prune_aliases_for(id);
    }

    /// Drop aliases created by a connection that has gone away. Its
    /// operations stay in the log as they are.
    pub fn forget_author(&mut self, author: ConnectionId) {
        self.aliases.retain(|_, alias| alias.author != author);
    }

    fn prune_aliases_for(&mut self, id: OperationId) {
        self.aliases.retain(|_, alias| alias.id != id);
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Owned copy of the log, safe to send while the log keeps changing.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Operation> {
        self.log.clone()
    }

    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&Operation> {
        self.positions.get(&id).and_then(|&pos| self.log.get(pos))
    }

    fn get_mut(&mut self, id: OperationId) -> Option<&mut Operation> {
        let pos = *self.positions.get(&id)?;
        self.log.get_mut(pos)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.log.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of operations waiting on the redo stack.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Number of live temp id aliases.
    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

#[cfg(test)]
#[path = "oplog_test.rs"]
mod tests;
