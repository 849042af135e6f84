//! Presence registry — who is connected to a room.
//!
//! Participants are created on connect and dropped on disconnect. Nothing is
//! persisted; a restart starts from an empty registry. Display attributes are
//! derived from the connection id alone, so the same id always renders with
//! the same name and color.

use serde::{Deserialize, Serialize};

use crate::operation::ConnectionId;

const NAME_PREFIX: &str = "User-";
const NAME_ID_CHARS: usize = 4;
const HUE_RANGE: u32 = 360;
const SATURATION_PCT: u32 = 70;
const LIGHTNESS_PCT: u32 = 50;

/// One connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ConnectionId,
    pub name: String,
    pub color: String,
}

impl Participant {
    #[must_use]
    pub fn for_connection(id: ConnectionId) -> Self {
        let seed = id.to_string();
        Self { id, name: display_name(&seed), color: seed_color(&seed) }
    }
}

/// `User-` followed by the first four characters of the seed.
#[must_use]
pub fn display_name(seed: &str) -> String {
    let short: String = seed.chars().take(NAME_ID_CHARS).collect();
    format!("{NAME_PREFIX}{short}")
}

/// Hue from `h = (h * 31 + code_unit) mod 360` over the UTF-16 code units of
/// the seed, rendered at fixed saturation and lightness.
#[must_use]
pub fn seed_color(seed: &str) -> String {
    let hue = seed
        .encode_utf16()
        .fold(0u32, |h, unit| (h * 31 + u32::from(unit)) % HUE_RANGE);
    format!("hsl({hue},{SATURATION_PCT}%,{LIGHTNESS_PCT}%)")
}

/// Connected participants in join order.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    participants: Vec<Participant>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-registering an id replaces its record.
    pub fn join(&mut self, id: ConnectionId) -> Participant {
        let participant = Participant::for_connection(id);
        self.participants.retain(|p| p.id != id);
        self.participants.push(participant.clone());
        participant
    }

    /// Remove a connection, returning its record if it was present.
    pub fn leave(&mut self, id: ConnectionId) -> Option<Participant> {
        let pos = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(pos))
    }

    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Owned copy of every participant, in join order.
    #[must_use]
    pub fn list(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
