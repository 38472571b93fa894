use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sanctuary_contracts::ledger::{
    format_ledger_summary, LedgerEntry, LedgerStore, NewLedgerEntry, DEFAULT_FETCH_LIMIT,
};
use sanctuary_contracts::payload::{normalise_tool_payload, A2uiPayload, Origin};
use sanctuary_contracts::rooms::{
    ClearOutcome, RenderState, RoomStateRecord, RoomStateStore, RoomUpdate, Transition,
    UpsertAction, UpsertOutcome, UserId, DEFAULT_ROOM,
};
use serde_json::{Map, Value};

use crate::sink::NarrativeSink;

pub const TOOL_UPDATE_ROOM_UI: &str = "update_room_ui";
pub const TOOL_FETCH_LEDGER: &str = "fetch_ledger";
pub const MAX_FETCH_LIMIT: usize = 100;

/// Arguments of the `update_room_ui` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRoomUi {
    pub component: String,
    pub props: Value,
    /// Blank means "stay in the current room".
    pub new_room_id: String,
    pub objective: Option<String>,
    pub status: Option<String>,
}

impl UpdateRoomUi {
    pub fn new(component: impl Into<String>, props: Value, new_room_id: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props,
            new_room_id: new_room_id.into(),
            objective: None,
            status: None,
        }
    }

    pub fn for_payload(payload: &A2uiPayload, new_room_id: impl Into<String>) -> Self {
        Self::new(payload.component.as_str(), payload.props_value(), new_room_id)
    }

    fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let text = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let Some(component) = text("component") else {
            bail!("{TOOL_UPDATE_ROOM_UI} requires 'component'");
        };
        Ok(Self {
            component,
            props: args.get("props").cloned().unwrap_or(Value::Null),
            new_room_id: text("newRoomId").unwrap_or_default(),
            objective: text("objective"),
            status: text("status"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistStatus {
    Saved { action: UpsertAction, attempts: u32 },
    /// Both attempts failed; the wall shows the payload but the store does not.
    NotSaved { reason: String },
}

impl PersistStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistStatus::Saved { .. })
    }
}

/// What one projection did.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomUiResult {
    pub payload: A2uiPayload,
    pub origin: Origin,
    pub room: String,
    pub room_changed: bool,
    pub persist: PersistStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    RoomUi(RoomUiResult),
    Ledger(String),
}

struct WallState {
    current_room: String,
    render: RenderState,
}

/// Owns the wall of the current room and drives every write to it.
pub struct Orchestrator {
    user: UserId,
    rooms: Arc<dyn RoomStateStore>,
    ledger: Arc<dyn LedgerStore>,
    sink: Arc<dyn NarrativeSink>,
    persist_backoff: Duration,
    wall: Mutex<WallState>,
}

impl Orchestrator {
    pub fn new(
        user: UserId,
        rooms: Arc<dyn RoomStateStore>,
        ledger: Arc<dyn LedgerStore>,
        sink: Arc<dyn NarrativeSink>,
    ) -> Self {
        Self {
            user,
            rooms,
            ledger,
            sink,
            persist_backoff: Duration::from_millis(250),
            wall: Mutex::new(WallState {
                current_room: DEFAULT_ROOM.to_string(),
                render: RenderState::Idle,
            }),
        }
    }

    pub fn with_persist_backoff(mut self, backoff: Duration) -> Self {
        self.persist_backoff = backoff;
        self
    }

    pub fn with_room(self, room: impl Into<String>) -> Self {
        self.lock_wall().current_room = room.into();
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn sink(&self) -> &Arc<dyn NarrativeSink> {
        &self.sink
    }

    pub fn current_room(&self) -> String {
        self.lock_wall().current_room.clone()
    }

    pub fn current_payload(&self) -> Option<A2uiPayload> {
        self.lock_wall().render.current().cloned()
    }

    pub fn render_state(&self) -> RenderState {
        self.lock_wall().render.clone()
    }

    /// Validates, navigates, projects locally, then persists.
    pub fn update_room_ui(&self, request: UpdateRoomUi) -> RoomUiResult {
        let normalised = normalise_tool_payload(&request.component, &request.props);
        if let Origin::Fallback(reason) = &normalised.origin {
            tracing::warn!(component = %request.component, "rejected room payload: {reason}");
        }

        let (previous, room) = {
            let mut wall = self.lock_wall();
            let previous = wall.current_room.clone();
            let target = request.new_room_id.trim();
            if !target.is_empty() {
                wall.current_room = target.to_string();
            }
            wall.render.apply_local(normalised.payload.clone());
            (previous, wall.current_room.clone())
        };
        let room_changed = previous != room;
        if room_changed {
            tracing::info!(from = %previous, to = %room, "room changed");
            self.sink.on_room_change(&previous, &room);
        }
        self.sink.on_projection(&room, &normalised.payload);

        let update = RoomUpdate::from_payload(&normalised.payload)
            .with_objective(request.objective)
            .with_status(request.status);
        let persist = self.persist(&room, &normalised.payload, update);

        RoomUiResult {
            payload: normalised.payload,
            origin: normalised.origin,
            room,
            room_changed,
            persist,
        }
    }

    /// Persists `payload` to `room` without navigating. The wall only shows
    /// it when `room` is the current room.
    pub fn pin_to_room(&self, room: &str, payload: A2uiPayload) -> RoomUiResult {
        let on_wall = {
            let mut wall = self.lock_wall();
            let on_wall = wall.current_room == room;
            if on_wall {
                wall.render.apply_local(payload.clone());
            }
            on_wall
        };
        if on_wall {
            self.sink.on_projection(room, &payload);
        }
        let persist = self.persist(room, &payload, RoomUpdate::from_payload(&payload));
        RoomUiResult {
            payload,
            origin: Origin::Direct,
            room: room.to_string(),
            room_changed: false,
            persist,
        }
    }

    /// Re-reads the current room's record and renders it if it is new.
    pub fn rehydrate(&self) -> Result<Transition> {
        let room = self.current_room();
        let record = self
            .rooms
            .get_room_state(&self.user, &room)
            .with_context(|| format!("failed to read room state for {room}"))?;
        Ok(self.reconcile(&room, record.as_ref()))
    }

    /// Navigates without projecting, then shows whatever the room holds.
    pub fn enter_room(&self, room: &str) -> Result<Transition> {
        let room = room.trim();
        if room.is_empty() {
            bail!("room id is empty");
        }
        let previous = std::mem::replace(&mut self.lock_wall().current_room, room.to_string());
        if previous != room {
            self.sink.on_room_change(&previous, room);
        }
        self.rehydrate()
    }

    pub fn update_objective(&self, objective: &str) -> Result<UpsertOutcome> {
        let room = self.current_room();
        let outcome = self
            .rooms
            .update_objective(&self.user, &room, objective)
            .with_context(|| format!("failed to update objective for {room}"))?;
        self.reconcile(&room, Some(&outcome.record));
        Ok(outcome)
    }

    /// Removes the caller's record for the current room and clears the wall.
    pub fn clear(&self) -> Result<ClearOutcome> {
        let room = self.current_room();
        let outcome = self
            .rooms
            .clear_room_state(Some(&self.user), &room)
            .with_context(|| format!("failed to clear {room}"))?;
        self.reconcile(&room, None);
        Ok(outcome)
    }

    pub fn room_record(&self) -> Result<Option<RoomStateRecord>> {
        let room = self.current_room();
        Ok(self.rooms.get_room_state(&self.user, &room)?)
    }

    pub fn fetch_ledger(&self, limit: Option<usize>) -> Result<String> {
        Ok(format_ledger_summary(&self.recent_ledger(limit)?))
    }

    /// `limit` is clamped to `1..=MAX_FETCH_LIMIT`; zero or `None` reads
    /// the default page.
    pub fn recent_ledger(&self, limit: Option<usize>) -> Result<Vec<LedgerEntry>> {
        let limit = limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_FETCH_LIMIT)
            .min(MAX_FETCH_LIMIT);
        self.ledger
            .recent(&self.user, limit)
            .context("failed to read ledger")
    }

    pub fn log_spend(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let entry = self
            .ledger
            .log_spend(&self.user, entry)
            .context("failed to log ledger entry")?;
        tracing::info!(entry_id = %entry.id, amount = entry.amount_gbp, "ledger entry logged");
        self.sink.on_ledger_entry(&entry);
        Ok(entry)
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Runs a `{"tool": ..., "args": {...}}` envelope.
    pub fn dispatch_tool_call(&self, raw: &str) -> Result<ToolResult> {
        let envelope: Value = serde_json::from_str(raw).context("tool call is not valid JSON")?;
        let Some(tool) = envelope.get("tool").and_then(Value::as_str) else {
            bail!("tool call has no 'tool' name");
        };
        let args = envelope
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        match tool {
            TOOL_UPDATE_ROOM_UI => Ok(ToolResult::RoomUi(
                self.update_room_ui(UpdateRoomUi::from_args(&args)?),
            )),
            TOOL_FETCH_LEDGER => {
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|limit| usize::try_from(limit).unwrap_or(MAX_FETCH_LIMIT));
                Ok(ToolResult::Ledger(self.fetch_ledger(limit)?))
            }
            other => bail!("unknown tool '{other}'"),
        }
    }

    /// Writes with one retry. Runs without the wall lock; the wall only
    /// adopts the stored key if it still shows `payload` in `room`.
    fn persist(&self, room: &str, payload: &A2uiPayload, update: RoomUpdate) -> PersistStatus {
        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self
                .rooms
                .upsert_room_update(&self.user, room, update.clone())
            {
                Ok(outcome) => break Ok(outcome),
                Err(err) if attempts < 2 => {
                    tracing::warn!(room, "room state write failed, retrying: {err}");
                    thread::sleep(self.persist_backoff);
                }
                Err(err) => break Err(err),
            }
        };

        match result {
            Ok(outcome) => {
                let mut wall = self.lock_wall();
                if room == wall.current_room && wall.render.current() == Some(payload) {
                    wall.render.confirm(&outcome.record);
                }
                PersistStatus::Saved {
                    action: outcome.action,
                    attempts,
                }
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::warn!(room, "room state not saved: {reason}");
                self.sink.on_state_not_saved(room, &reason);
                PersistStatus::NotSaved { reason }
            }
        }
    }

    fn reconcile(&self, room: &str, record: Option<&RoomStateRecord>) -> Transition {
        let transition = {
            let mut wall = self.lock_wall();
            if wall.current_room != room {
                return Transition::Unchanged;
            }
            wall.render.reconcile(record)
        };
        if let Transition::Rendered(payload) = &transition {
            self.sink.on_projection(room, payload);
        }
        transition
    }

    fn lock_wall(&self) -> MutexGuard<'_, WallState> {
        self.wall.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
