mod render_state;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use render_state::{DedupKey, RenderState, Transition};
pub use store::{
    ClearOutcome, JsonRoomStateStore, RoomStateRecord, RoomStateStore, RoomUpdate, UpsertAction,
    UpsertOutcome,
};

pub const DEFAULT_ROOM: &str = "control_room";
pub const GUEST_USER: &str = "guest";

/// Rooms a scan may steer toward or a user may walk into.
pub const KNOWN_ROOMS: [&str; 7] = [
    "home",
    "study",
    "workshop",
    "boathouse",
    "control_room",
    "the_deck",
    "deep_core",
];

pub fn is_known_room(room: &str) -> bool {
    KNOWN_ROOMS.contains(&room)
}

/// Owner of persisted room state. Anonymous callers share the guest slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn resolve(identity: Option<&str>) -> Self {
        match identity.map(str::trim) {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::guest(),
        }
    }

    pub fn guest() -> Self {
        Self(GUEST_USER.to_string())
    }

    pub fn is_guest(&self) -> bool {
        self.0 == GUEST_USER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
