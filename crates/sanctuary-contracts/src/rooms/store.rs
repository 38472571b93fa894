use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::render_state::DedupKey;
use super::UserId;
use crate::error::{StoreError, StoreResult};
use crate::payload::{fallback_payload, validate, A2uiPayload};

/// One persisted `(user, room)` slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateRecord {
    pub user_id: UserId,
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_component: Option<String>,
    /// Serialized JSON object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_props: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    /// Epoch millis, strictly increasing per record.
    pub last_updated: i64,
}

impl RoomStateRecord {
    /// `None` when the record carries no visual payload (objective-only).
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match (&self.active_component, &self.component_props) {
            (Some(component), Some(_)) => Some(DedupKey::new(component, self.last_updated)),
            _ => None,
        }
    }

    /// The stored payload, re-validated. Records written by an older or
    /// misbehaving writer resolve to the fallback terminal.
    pub fn payload(&self) -> Option<A2uiPayload> {
        let component = self.active_component.as_deref()?;
        let props = self.component_props.as_deref()?;
        Some(
            validate(component, Some(&Value::String(props.to_string())))
                .unwrap_or_else(|_| fallback_payload()),
        )
    }
}

/// A UI write. Component and props always travel together; objective and
/// status only overwrite when present.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomUpdate {
    pub component: String,
    pub props_json: String,
    pub objective: Option<String>,
    pub status: Option<String>,
}

impl RoomUpdate {
    pub fn from_payload(payload: &A2uiPayload) -> Self {
        Self {
            component: payload.component.as_str().to_string(),
            props_json: payload.props_json(),
            objective: None,
            status: None,
        }
    }

    pub fn with_objective(mut self, objective: Option<String>) -> Self {
        self.objective = objective.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status.filter(|value| !value.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub record: RoomStateRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared { removed: usize },
    NoOp,
}

pub trait RoomStateStore: Send + Sync {
    fn upsert_room_update(
        &self,
        user: &UserId,
        room: &str,
        update: RoomUpdate,
    ) -> StoreResult<UpsertOutcome>;

    fn update_objective(
        &self,
        user: &UserId,
        room: &str,
        objective: &str,
    ) -> StoreResult<UpsertOutcome>;

    fn get_room_state(&self, user: &UserId, room: &str) -> StoreResult<Option<RoomStateRecord>>;

    fn list_room_states(&self, user: &UserId) -> StoreResult<Vec<RoomStateRecord>>;

    /// Removes the caller's own record. Anonymous callers are refused.
    fn clear_room_state(&self, identity: Option<&UserId>, room: &str)
        -> StoreResult<ClearOutcome>;

    /// Operator recovery: removes the room's records for every user with no
    /// identity check. Only reachable from the local CLI; never expose it
    /// over a network surface.
    fn admin_clear_room(&self, room: &str) -> StoreResult<ClearOutcome>;
}

/// Room state kept in a single JSON document keyed by `user/room`.
///
/// The document is re-read under the lock before every write, so several
/// handles over one file see each other's records. Concurrent writers in
/// separate processes race; the later write wins.
#[derive(Debug)]
pub struct JsonRoomStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonRoomStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Map<String, Value>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Poisoned("room state"))?;
        let mut document = read_document(&self.path)?;
        let out = apply(&mut document)?;
        write_document(&self.path, &document)?;
        Ok(out)
    }

    fn snapshot(&self) -> StoreResult<Map<String, Value>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Poisoned("room state"))?;
        read_document(&self.path)
    }

    fn patch(
        &self,
        user: &UserId,
        room: &str,
        edit: impl FnOnce(&mut RoomStateRecord),
    ) -> StoreResult<UpsertOutcome> {
        self.mutate(|document| {
            let key = record_key(user, room);
            let existing = match document.get(&key) {
                Some(value) => Some(serde_json::from_value::<RoomStateRecord>(value.clone())?),
                None => None,
            };
            let action = if existing.is_some() {
                UpsertAction::Updated
            } else {
                UpsertAction::Created
            };
            let mut record = existing.unwrap_or_else(|| RoomStateRecord {
                user_id: user.clone(),
                room_id: room.to_string(),
                active_component: None,
                component_props: None,
                current_objective: None,
                current_status: None,
                last_updated: 0,
            });
            edit(&mut record);
            record.last_updated = next_timestamp(record.last_updated);
            document.insert(key, serde_json::to_value(&record)?);
            Ok(UpsertOutcome { action, record })
        })
    }
}

impl RoomStateStore for JsonRoomStateStore {
    fn upsert_room_update(
        &self,
        user: &UserId,
        room: &str,
        update: RoomUpdate,
    ) -> StoreResult<UpsertOutcome> {
        let outcome = self.patch(user, room, |record| {
            record.active_component = Some(update.component);
            record.component_props = Some(update.props_json);
            if update.objective.is_some() {
                record.current_objective = update.objective;
            }
            if update.status.is_some() {
                record.current_status = update.status;
            }
        })?;
        tracing::debug!(
            user = %user,
            room,
            action = ?outcome.action,
            "room state persisted"
        );
        Ok(outcome)
    }

    fn update_objective(
        &self,
        user: &UserId,
        room: &str,
        objective: &str,
    ) -> StoreResult<UpsertOutcome> {
        self.patch(user, room, |record| {
            record.current_objective = Some(objective.to_string());
        })
    }

    fn get_room_state(&self, user: &UserId, room: &str) -> StoreResult<Option<RoomStateRecord>> {
        let document = self.snapshot()?;
        match document.get(&record_key(user, room)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    fn list_room_states(&self, user: &UserId) -> StoreResult<Vec<RoomStateRecord>> {
        let document = self.snapshot()?;
        let mut records = Vec::new();
        for value in document.values() {
            let record: RoomStateRecord = serde_json::from_value(value.clone())?;
            if &record.user_id == user {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(records)
    }

    fn clear_room_state(
        &self,
        identity: Option<&UserId>,
        room: &str,
    ) -> StoreResult<ClearOutcome> {
        let user = identity.ok_or(StoreError::Unauthorised)?;
        self.mutate(|document| {
            Ok(match document.remove(&record_key(user, room)) {
                Some(_) => ClearOutcome::Cleared { removed: 1 },
                None => ClearOutcome::NoOp,
            })
        })
    }

    fn admin_clear_room(&self, room: &str) -> StoreResult<ClearOutcome> {
        let outcome = self.mutate(|document| {
            let before = document.len();
            document.retain(|_, value| {
                value.get("roomId").and_then(Value::as_str) != Some(room)
            });
            let removed = before - document.len();
            Ok(if removed > 0 {
                ClearOutcome::Cleared { removed }
            } else {
                ClearOutcome::NoOp
            })
        })?;
        tracing::warn!(room, outcome = ?outcome, "admin cleared room state");
        Ok(outcome)
    }
}

fn record_key(user: &UserId, room: &str) -> String {
    format!("{}/{room}", user.as_str())
}

fn next_timestamp(previous: i64) -> i64 {
    chrono::Utc::now().timestamp_millis().max(previous + 1)
}

fn read_document(path: &Path) -> StoreResult<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(object) => Ok(object),
        _ => Ok(Map::new()),
    }
}

pub(crate) fn write_document(path: &Path, document: &Map<String, Value>) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
    }
    let rendered = serde_json::to_string_pretty(&Value::Object(document.clone()))?;
    std::fs::write(path, rendered).map_err(|err| StoreError::io(path, err))
}
