//! Client replica — one participant's local copy of a room.
//!
//! ARCHITECTURE
//! ============
//! The replica draws optimistically: a new operation is inserted locally under
//! a temporary id before the server has seen it, and the outbound
//! `stroke:start` carries that temp id. The server's echo relabels the entry
//! to its durable id. Everything the replica sends is returned as a `Frame`
//! for the caller to put on the wire; everything it receives goes through
//! `apply`.
//!
//! ENTRY STATES
//! ============
//! Pending (temp id only) → Confirmed (durable id) → points accumulate →
//! finalized by `stroke:end` → removed by undo or clear. A `sync:state`
//! snapshot replaces every entry except the operation currently being drawn,
//! which keeps its local body.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use tracing::debug;

use crate::frame::{self, Data, Frame, Status, json, to_data};
use crate::operation::{
    ConnectionId, FinalFields, Operation, OperationBody, OperationDraft, OperationId, OperationUpdate, Point,
    Properties, Shape, ShapeVariant, Stroke, StrokeMode,
};
use crate::services::presence::Participant;

/// Unsent points that trigger a `stroke:points` batch.
pub const POINT_BATCH_SIZE: usize = 5;

const TEMP_ID_SUFFIX_LEN: usize = 6;

/// `t-<unix millis>-<6 lowercase alphanumerics>`.
#[must_use]
pub fn new_temp_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("t-{millis}-{suffix}")
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Drawn locally, not yet acknowledged. Holds the temp id.
    Pending(String),
    Confirmed(OperationId),
}

/// One operation as the replica knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub identity: Identity,
    pub author: Option<ConnectionId>,
    pub body: OperationBody,
}

impl Entry {
    fn confirmed(op: Operation) -> Self {
        Self { identity: Identity::Confirmed(op.id), author: Some(op.author), body: op.body }
    }

    #[must_use]
    pub fn id(&self) -> Option<OperationId> {
        match self.identity {
            Identity::Confirmed(id) => Some(id),
            Identity::Pending(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.identity, Identity::Pending(_))
    }
}

/// Last known pointer position of a peer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCursor {
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
}

/// The operation this replica is drawing right now.
#[derive(Debug)]
struct Active {
    temp_id: String,
    id: Option<OperationId>,
    /// Points drawn locally but not yet sent.
    unsent: Vec<Point>,
}

impl Active {
    /// Key the server knows this operation by.
    fn wire_key(&self) -> String {
        self.id.map_or_else(|| self.temp_id.clone(), |id| id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    operations: Vec<Operation>,
}

#[derive(Debug, Deserialize)]
struct Init {
    #[serde(default)]
    operations: Vec<Operation>,
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(rename = "self")]
    me: Participant,
}

#[derive(Debug, Deserialize)]
struct Echo {
    #[serde(flatten)]
    operation: Operation,
    #[serde(default)]
    temp_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointsBatch {
    id: String,
    points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Finalized {
    id: String,
    #[serde(flatten)]
    fields: FinalFields,
}

#[derive(Debug, Deserialize)]
struct Departed {
    client_id: ConnectionId,
}

#[derive(Debug, Deserialize)]
struct Undone {
    id: OperationId,
}

#[derive(Debug, Deserialize)]
struct CursorMoved {
    client_id: ConnectionId,
    #[serde(flatten)]
    cursor: RemoteCursor,
}

// =============================================================================
// REPLICA
// =============================================================================

#[derive(Debug, Default)]
pub struct Replica {
    client_id: Option<ConnectionId>,
    entries: Vec<Entry>,
    active: Option<Active>,
    participants: Vec<Participant>,
    cursors: HashMap<ConnectionId, RemoteCursor>,
}

impl Replica {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection id assigned by the server, known after `session:init`.
    #[must_use]
    pub fn client_id(&self) -> Option<ConnectionId> {
        self.client_id
    }

    /// Entries in render order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, id: OperationId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id() == Some(id))
    }

    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    #[must_use]
    pub fn cursor(&self, client_id: ConnectionId) -> Option<&RemoteCursor> {
        self.cursors.get(&client_id)
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    // =========================================================================
    // LOCAL ACTIONS
    // =========================================================================

    /// Start a freehand stroke at `start`.
    pub fn begin_stroke(&mut self, mode: StrokeMode, color: &str, thickness: f64, start: Point) -> Frame {
        let body = OperationBody::Stroke(Stroke { mode, color: color.to_owned(), thickness, points: vec![start] });
        self.begin(body)
    }

    /// Add a point to the active stroke. Returns a `stroke:points` frame once
    /// a full batch is waiting.
    pub fn extend_stroke(&mut self, point: Point) -> Option<Frame> {
        let index = self.active_index()?;
        let OperationBody::Stroke(stroke) = &mut self.entries[index].body else {
            return None;
        };
        stroke.points.push(point);
        let active = self.active.as_mut()?;
        active.unsent.push(point);
        if active.unsent.len() >= POINT_BATCH_SIZE { self.flush_points() } else { None }
    }

    /// Flush any unsent points and end the active stroke.
    pub fn finish_stroke(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.flush_points().into_iter().collect();
        if let Some(active) = self.active.take() {
            frames.push(Frame::request(frame::STROKE_END, Data::new()).with_data("id", active.wire_key()));
        }
        frames
    }

    /// Start a drag-to-size shape.
    pub fn begin_shape(&mut self, variant: ShapeVariant, color: &str, thickness: f64, properties: Properties) -> Frame {
        let body = OperationBody::Shape(Shape { variant, color: color.to_owned(), thickness, properties });
        self.begin(body)
    }

    /// Merge geometry into the active shape locally. Nothing is sent until
    /// `finish_shape`.
    pub fn update_shape(&mut self, properties: &Properties) -> bool {
        let Some(index) = self.active_index() else {
            return false;
        };
        self.entries[index].body.apply(&OperationUpdate::PropertiesMerged(properties.clone()))
    }

    /// Merge final geometry into the active shape and end it.
    pub fn finish_shape(&mut self, properties: Properties) -> Option<Frame> {
        self.update_shape(&properties);
        let active = self.active.take()?;
        let fields = FinalFields { properties: Some(properties), ..FinalFields::default() };
        let mut data = to_data(&fields);
        data.insert("id".into(), active.wire_key().into());
        Some(Frame::request(frame::STROKE_END, data))
    }

    /// Create a shape in one gesture (text, image, click-placed shapes):
    /// start and end go out together.
    pub fn place_shape(
        &mut self,
        variant: ShapeVariant,
        color: &str,
        thickness: f64,
        properties: Properties,
    ) -> Vec<Frame> {
        let start = self.begin_shape(variant, color, thickness, properties);
        let mut frames = vec![start];
        frames.extend(self.finish_shape(Properties::new()));
        frames
    }

    #[must_use]
    pub fn undo(&self) -> Frame {
        Frame::request(frame::HISTORY_UNDO, Data::new())
    }

    #[must_use]
    pub fn redo(&self) -> Frame {
        Frame::request(frame::HISTORY_REDO, Data::new())
    }

    #[must_use]
    pub fn clear(&self) -> Frame {
        Frame::request(frame::HISTORY_CLEAR, Data::new())
    }

    #[must_use]
    pub fn request_sync(&self) -> Frame {
        Frame::request(frame::SYNC_REQUEST, Data::new())
    }

    #[must_use]
    pub fn move_cursor(&self, x: f64, y: f64) -> Frame {
        Frame::request(frame::CURSOR_MOVED, Data::new()).with_data("x", x).with_data("y", y)
    }

    fn begin(&mut self, body: OperationBody) -> Frame {
        let temp_id = new_temp_id();
        let draft = OperationDraft { temp_id: Some(temp_id.clone()), body: body.clone() };
        self.entries.push(Entry { identity: Identity::Pending(temp_id.clone()), author: self.client_id, body });
        self.active = Some(Active { temp_id, id: None, unsent: Vec::new() });
        Frame::request(frame::STROKE_START, to_data(&draft))
    }

    fn flush_points(&mut self) -> Option<Frame> {
        let active = self.active.as_mut()?;
        if active.unsent.is_empty() {
            return None;
        }
        let points = std::mem::take(&mut active.unsent);
        Some(
            Frame::request(frame::STROKE_POINTS, Data::new())
                .with_data("id", active.wire_key())
                .with_data("points", json(&points)),
        )
    }

    fn active_index(&self) -> Option<usize> {
        let active = self.active.as_ref()?;
        match active.id {
            Some(id) => self.index_of_id(id),
            None => self.index_of_pending(&active.temp_id),
        }
    }

    fn index_of_id(&self, id: OperationId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == Some(id))
    }

    fn index_of_pending(&self, temp_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(&e.identity, Identity::Pending(t) if t == temp_id))
    }

    /// Entry addressed by a wire key: a durable id or one of our temp ids.
    fn index_of_key(&self, key: &str) -> Option<usize> {
        match key.parse::<OperationId>() {
            Ok(id) => self.index_of_id(id),
            Err(_) => self.index_of_pending(key),
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one frame received from the server.
    pub fn apply(&mut self, msg: &Frame) {
        if msg.status == Status::Error || msg.syscall == frame::GATEWAY_ERROR {
            debug!(syscall = %msg.syscall, message = msg.str_field(frame::FRAME_MESSAGE), "replica: server error");
            return;
        }

        let result = match msg.syscall.as_str() {
            frame::SESSION_INIT => msg.decode_data().map(|init: Init| self.on_init(init)),
            frame::PRESENCE_JOINED => msg.decode_data().map(|p: Participant| self.on_joined(p)),
            frame::PRESENCE_LEFT => msg.decode_data().map(|left: Departed| self.on_left(left.client_id)),
            frame::CURSOR_MOVED => msg.decode_data().map(|c: CursorMoved| {
                self.cursors.insert(c.client_id, c.cursor);
            }),
            frame::STROKE_START => msg.decode_data().map(|echo: Echo| self.on_start(echo)),
            frame::STROKE_POINTS => msg.decode_data().map(|batch: PointsBatch| self.on_points(batch)),
            frame::STROKE_END => msg.decode_data().map(|end: Finalized| self.on_end(end)),
            frame::HISTORY_UNDO => msg.decode_data().map(|undone: Undone| self.on_undo(undone.id)),
            frame::HISTORY_REDO => match msg.data.get("operation") {
                Some(raw) => serde_json::from_value(raw.clone()).map(|op: Operation| self.on_redo(op)),
                None => Ok(()),
            },
            frame::HISTORY_CLEAR => {
                self.entries.clear();
                self.active = None;
                Ok(())
            }
            frame::SYNC_STATE => msg.decode_data().map(|s: Snapshot| self.resync(s.operations)),
            other => {
                debug!(syscall = other, "replica: ignored frame");
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(syscall = %msg.syscall, error = %e, "replica: undecodable frame");
        }
    }

    fn on_init(&mut self, init: Init) {
        self.client_id = Some(init.me.id);
        self.participants = init.participants;
        self.resync(init.operations);
    }

    fn on_joined(&mut self, participant: Participant) {
        self.participants.retain(|p| p.id != participant.id);
        self.participants.push(participant);
    }

    fn on_left(&mut self, client_id: ConnectionId) {
        self.participants.retain(|p| p.id != client_id);
        self.cursors.remove(&client_id);
    }

    fn on_start(&mut self, echo: Echo) {
        let Echo { operation, temp_id } = echo;
        let id = operation.id;
        let known = self.index_of_id(id).is_some();
        let owned = temp_id.as_deref().and_then(|t| self.index_of_pending(t));

        match (owned, known) {
            (Some(index), false) => {
                self.entries[index].identity = Identity::Confirmed(id);
                self.entries[index].author = Some(operation.author);
            }
            (Some(index), true) => {
                // Already confirmed through a resync; the pending copy is stale.
                self.entries.remove(index);
            }
            (None, false) => self.entries.push(Entry::confirmed(operation)),
            (None, true) => debug!(%id, "replica: duplicate start ignored"),
        }

        if let (Some(active), Some(t)) = (self.active.as_mut(), temp_id.as_deref()) {
            if active.temp_id == t {
                active.id = Some(id);
            }
        }
    }

    fn on_points(&mut self, batch: PointsBatch) {
        let Some(index) = self.index_of_key(&batch.id) else {
            debug!(key = %batch.id, "replica: points for unknown operation");
            return;
        };
        self.entries[index].body.apply(&OperationUpdate::PointsAppended(batch.points));
    }

    fn on_end(&mut self, end: Finalized) {
        let Some(index) = self.index_of_key(&end.id) else {
            debug!(key = %end.id, "replica: end for unknown operation");
            return;
        };
        for update in end.fields.to_updates() {
            self.entries[index].body.apply(&update);
        }
    }

    fn on_undo(&mut self, id: OperationId) {
        self.entries.retain(|e| e.id() != Some(id));
        if self.active.as_ref().is_some_and(|a| a.id == Some(id)) {
            self.active = None;
        }
    }

    fn on_redo(&mut self, op: Operation) {
        if self.index_of_id(op.id).is_none() {
            self.entries.push(Entry::confirmed(op));
        }
    }

    /// Replace confirmed entries with the server's snapshot. The active
    /// operation keeps its local body, and stays after the snapshot while it
    /// is still pending. Finished pending entries are dropped: either the
    /// snapshot already holds them or their echo will add them back.
    fn resync(&mut self, operations: Vec<Operation>) {
        let local_active = self
            .active_index()
            .map(|i| (self.entries[i].identity.clone(), self.entries[i].body.clone()));
        let drawing = match &local_active {
            Some((Identity::Pending(temp_id), _)) => Some(temp_id.clone()),
            Some((Identity::Confirmed(_), _)) | None => None,
        };
        let pending: Vec<Entry> = self
            .entries
            .drain(..)
            .filter(|e| matches!(&e.identity, Identity::Pending(t) if drawing.as_ref() == Some(t)))
            .collect();

        self.entries = operations.into_iter().map(Entry::confirmed).collect();

        match local_active {
            Some((Identity::Confirmed(id), body)) => match self.index_of_id(id) {
                Some(index) => self.entries[index].body = body,
                // Undone or cleared while we were drawing.
                None => self.active = None,
            },
            Some((Identity::Pending(_), _)) | None => {}
        }

        let snapshot_len = self.entries.len();
        self.entries.extend(pending);
        debug!(confirmed = snapshot_len, total = self.entries.len(), "replica: resynced");
    }
}

#[cfg(test)]
#[path = "replica_test.rs"]
mod tests;
