//! WebSocket handler — bidirectional frame relay for one room.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, joins the room named by `?room=`, and
//! enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Frames queued by the room (including this client's own echoes) → forward
//!
//! Handler functions are pure business logic: they validate, mutate the room,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns and
//! applies the Outcome while still holding the room lock, so every client's
//! queue receives frames in log order.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `session:init` to the client, `presence:joined` to peers
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (sender echo / peers / resync)
//! 4. Close → `presence:left` to peers → cleanup → evict idle room

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::RoomQuery;
use crate::frame::{self, Data, ErrorCode, Frame, Status, json, to_data};
use crate::operation::{ConnectionId, FinalFields, OperationDraft, OperationId, Point};
use crate::services::presence::Participant;
use crate::services::room::Room;
use crate::state::{AppState, SharedRoom};

// =============================================================================
// ERRORS
// =============================================================================

/// Faults in an inbound frame. Protocol faults are answered to the sender;
/// payload faults are logged and dropped without a reply.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl ErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::Payload(_) => "E_INVALID_PAYLOAD",
        }
    }
}

/// Malformed lifecycle payloads.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("operation key missing")]
    MissingKey,
    #[error("points missing or empty")]
    MissingPoints,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// done+data to the sender (with `parent_id`), request+data to peers.
    Broadcast(Data),
    /// `Broadcast`, then a `sync:state` snapshot to every client.
    BroadcastThenSync(Data),
    /// request+data to peers only. No reply to the sender.
    BroadcastExcludeSender(Data),
    /// `sync:state` snapshot to the sender only.
    SyncSender,
    /// Nothing to send.
    Silent,
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CursorPayload {
    x: f64,
    y: f64,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<RoomQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let room_name = params.room_or(&state.config.default_room);
    ws.on_upgrade(move |socket| run_ws(socket, state, room_name))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, room_name: String) {
    let client_id = Uuid::new_v4();

    // Per-connection queue. Everything the room sends this client goes here.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_channel_capacity);

    let room = state.room(&room_name).await;
    join_room(&room, client_id, client_tx).await;
    info!(%client_id, room = %room_name, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&room, client_id, text.as_str()).await;
                        if send_all(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_room(&room, client_id).await;
    drop(room);
    state.evict_if_idle(&room_name).await;
    info!(%client_id, room = %room_name, "ws: client disconnected");
}

/// Attach a client: `session:init` to it, `presence:joined` to its peers.
async fn join_room(room: &SharedRoom, client_id: ConnectionId, client_tx: mpsc::Sender<Frame>) -> Participant {
    let mut room = room.lock().await;
    let me = room.join(client_id, client_tx);

    let mut init = Data::new();
    init.insert("operations".into(), json(&room.store.snapshot()));
    init.insert("participants".into(), json(&room.presence.list()));
    init.insert("self".into(), json(&me));
    room.send_to(client_id, &Frame::request(frame::SESSION_INIT, init).with_room(room.name()));

    let joined = Frame::request(frame::PRESENCE_JOINED, to_data(&me)).with_room(room.name());
    room.broadcast(&joined, Some(client_id));
    me
}

/// Detach a client and tell the remaining peers.
async fn leave_room(room: &SharedRoom, client_id: ConnectionId) {
    let mut room = room.lock().await;
    if room.part(client_id).is_none() {
        return;
    }
    let left = Frame::request(frame::PRESENCE_LEFT, Data::new())
        .with_room(room.name())
        .with_data("client_id", client_id.to_string());
    room.broadcast(&left, None);
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame. Room traffic is queued on the
/// client channels; the returned frames are gateway errors for the sender.
async fn process_inbound_text(room: &SharedRoom, client_id: ConnectionId, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = DispatchError::InvalidJson(e.to_string());
            return vec![Frame::request(frame::GATEWAY_ERROR, frame::error_data(&err))];
        }
    };

    let mut room = room.lock().await;

    // Stamp the connection identity and room; clients cannot spoof either.
    req.from = Some(client_id.to_string());
    req.room = Some(room.name().to_owned());

    debug!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.prefix() {
        "stroke" => handle_stroke(&mut room, client_id, &req),
        "history" => handle_history(&mut room, &req),
        "cursor" => handle_cursor(&room, client_id, &req),
        "sync" => handle_sync(&req),
        _ => Err(DispatchError::UnknownSyscall(req.syscall.clone())),
    };

    match result {
        Ok(outcome) => {
            apply_outcome(&room, client_id, &req, outcome);
            vec![]
        }
        Err(DispatchError::Payload(e)) => {
            warn!(%client_id, syscall = %req.syscall, error = %e, "ws: dropped malformed payload");
            vec![]
        }
        Err(e) => {
            warn!(%client_id, syscall = %req.syscall, error = %e, "ws: rejected frame");
            vec![req.error_from(&e)]
        }
    }
}

/// Enqueue the frames an outcome calls for. Runs under the room lock.
fn apply_outcome(room: &Room, client_id: ConnectionId, req: &Frame, outcome: Outcome) {
    match outcome {
        Outcome::Broadcast(data) => broadcast_all(room, client_id, req, data),
        Outcome::BroadcastThenSync(data) => {
            broadcast_all(room, client_id, req, data);
            room.broadcast(&sync_frame(room), None);
        }
        Outcome::BroadcastExcludeSender(data) => {
            let frame = Frame::request(&req.syscall, data).with_room(room.name());
            room.broadcast(&frame, Some(client_id));
        }
        Outcome::SyncSender => {
            let mut frame = sync_frame(room);
            frame.parent_id = Some(req.id);
            room.send_to(client_id, &frame);
        }
        Outcome::Silent => {}
    }
}

fn broadcast_all(room: &Room, client_id: ConnectionId, req: &Frame, data: Data) {
    let peer_frame = Frame::request(&req.syscall, data.clone()).with_room(room.name());
    room.send_to(client_id, &req.done_with(data));
    room.broadcast(&peer_frame, Some(client_id));
}

fn sync_frame(room: &Room) -> Frame {
    let mut data = Data::new();
    data.insert("operations".into(), json(&room.store.snapshot()));
    Frame::request(frame::SYNC_STATE, data).with_room(room.name())
}

// =============================================================================
// STROKE HANDLERS
// =============================================================================

fn handle_stroke(room: &mut Room, client_id: ConnectionId, req: &Frame) -> Result<Outcome, DispatchError> {
    match req.op() {
        "start" => {
            let draft: OperationDraft =
                req.decode_data().map_err(|e| PayloadError::InvalidOperation(e.to_string()))?;
            let temp_id = draft.temp_id.clone();
            let id = room.store.add_operation(client_id, draft);

            let mut data = room.store.get(id).map(to_data).unwrap_or_default();
            if let Some(temp_id) = temp_id {
                data.insert("temp_id".into(), temp_id.into());
            }
            data.insert("client_id".into(), client_id.to_string().into());
            Ok(Outcome::Broadcast(data))
        }
        "points" => {
            let key = operation_key(req)?;
            let points = batch_points(req)?;
            room.store.append_points(&key, &points);
            let Some(id) = peer_key(room, &key) else {
                debug!(%client_id, key = %key, "ws: points for released temp id not forwarded");
                return Ok(Outcome::Silent);
            };

            let mut data = Data::new();
            data.insert("client_id".into(), client_id.to_string().into());
            data.insert("id".into(), id.to_string().into());
            data.insert("points".into(), json(&points));
            Ok(Outcome::BroadcastExcludeSender(data))
        }
        "end" => {
            let key = operation_key(req)?;
            let fields: FinalFields =
                req.decode_data().map_err(|e| PayloadError::InvalidOperation(e.to_string()))?;
            room.store.update_operation(&key, &fields.to_updates());
            let Some(id) = peer_key(room, &key) else {
                debug!(%client_id, key = %key, "ws: end for released temp id not forwarded");
                return Ok(Outcome::Silent);
            };
            room.store.confirm(id);

            let mut data = to_data(&fields);
            data.insert("id".into(), id.to_string().into());
            data.insert("client_id".into(), client_id.to_string().into());
            Ok(Outcome::BroadcastThenSync(data))
        }
        _ => Err(DispatchError::UnknownSyscall(req.syscall.clone())),
    }
}

/// `id` field of a points/end payload: durable id or temp id.
fn operation_key(req: &Frame) -> Result<String, PayloadError> {
    req.str_field("id")
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .ok_or(PayloadError::MissingKey)
}

fn batch_points(req: &Frame) -> Result<Vec<Point>, PayloadError> {
    let Some(raw) = req.data.get("points") else {
        return Err(PayloadError::MissingPoints);
    };
    match serde_json::from_value::<Vec<Point>>(raw.clone()) {
        Ok(points) if !points.is_empty() => Ok(points),
        _ => Err(PayloadError::MissingPoints),
    }
}

/// Id to show peers for `key`: the durable id it resolves to, or the key
/// itself when it is a durable id the log no longer holds. A temp id that no
/// longer resolves has no id peers could know.
fn peer_key(room: &Room, key: &str) -> Option<OperationId> {
    if let Some(id) = room.store.resolve(key) {
        return Some(id);
    }
    match key.parse::<OperationId>() {
        Ok(id) => Some(id),
        Err(_) => None,
    }
}

// =============================================================================
// HISTORY HANDLERS
// =============================================================================

fn handle_history(room: &mut Room, req: &Frame) -> Result<Outcome, DispatchError> {
    match req.op() {
        "undo" => {
            let Some(op) = room.store.undo() else {
                debug!(room = %room.name(), "ws: undo on empty log");
                return Ok(Outcome::Silent);
            };
            let mut data = Data::new();
            data.insert("id".into(), op.id.to_string().into());
            Ok(Outcome::BroadcastThenSync(data))
        }
        "redo" => {
            let Some(op) = room.store.redo() else {
                debug!(room = %room.name(), "ws: redo on empty stack");
                return Ok(Outcome::Silent);
            };
            let mut data = Data::new();
            data.insert("operation".into(), json(&op));
            Ok(Outcome::BroadcastThenSync(data))
        }
        "clear" => {
            room.store.clear();
            Ok(Outcome::BroadcastThenSync(Data::new()))
        }
        _ => Err(DispatchError::UnknownSyscall(req.syscall.clone())),
    }
}

// =============================================================================
// CURSOR HANDLER
// =============================================================================

fn handle_cursor(room: &Room, client_id: ConnectionId, req: &Frame) -> Result<Outcome, DispatchError> {
    if req.op() != "moved" {
        return Err(DispatchError::UnknownSyscall(req.syscall.clone()));
    }
    let cursor: CursorPayload = req.decode_data().map_err(|e| PayloadError::InvalidCursor(e.to_string()))?;
    let participant = room
        .presence
        .get(client_id)
        .cloned()
        .unwrap_or_else(|| Participant::for_connection(client_id));

    let mut data = Data::new();
    data.insert("client_id".into(), client_id.to_string().into());
    data.insert("name".into(), participant.name.into());
    data.insert("color".into(), participant.color.into());
    data.insert("x".into(), cursor.x.into());
    data.insert("y".into(), cursor.y.into());
    Ok(Outcome::BroadcastExcludeSender(data))
}

// =============================================================================
// SYNC HANDLER
// =============================================================================

fn handle_sync(req: &Frame) -> Result<Outcome, DispatchError> {
    match req.op() {
        "request" => Ok(Outcome::SyncSender),
        _ => Err(DispatchError::UnknownSyscall(req.syscall.clone())),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_all(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), ()> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error || frame.syscall == frame::GATEWAY_ERROR {
        let code = frame.str_field(frame::FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(frame::FRAME_MESSAGE).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send error frame");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
