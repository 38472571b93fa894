use std::sync::{Arc, Mutex};

use sanctuary_contracts::events::{
    EventPayload, EventWriter, CHAT, LEDGER_ENTRY_LOGGED, PROJECTION, ROOM_CHANGED,
    SCAN_COMPLETED, STATE_NOT_SAVED,
};
use sanctuary_contracts::ledger::LedgerEntry;
use sanctuary_contracts::messages::Role;
use sanctuary_contracts::payload::{A2uiPayload, ScanAnalysis};
use serde_json::{json, Value};

/// Listener for everything the engine shows or says. All hooks default to no-ops.
pub trait NarrativeSink: Send + Sync {
    fn on_room_change(&self, _from: &str, _to: &str) {}
    fn on_projection(&self, _room: &str, _payload: &A2uiPayload) {}
    fn on_state_not_saved(&self, _room: &str, _reason: &str) {}
    fn on_chat(&self, _role: Role, _content: &str) {}
    fn on_scan_completed(&self, _room: &str, _analysis: &ScanAnalysis) {}
    fn on_ledger_entry(&self, _entry: &LedgerEntry) {}
}

/// Discards everything.
pub struct SilentSink;

impl NarrativeSink for SilentSink {}

/// Writes each hook as a line in the session's `events.jsonl`.
pub struct EventLogSink {
    events: EventWriter,
}

impl EventLogSink {
    pub fn new(events: EventWriter) -> Self {
        Self { events }
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = self.events.emit(event_type, payload) {
            tracing::warn!("failed to write {event_type} event: {err:#}");
        }
    }
}

impl NarrativeSink for EventLogSink {
    fn on_room_change(&self, from: &str, to: &str) {
        self.emit(ROOM_CHANGED, json!({ "from": from, "to": to }));
    }

    fn on_projection(&self, room: &str, payload: &A2uiPayload) {
        self.emit(
            PROJECTION,
            json!({
                "room_id": room,
                "component": payload.component.as_str(),
                "props": payload.props_value(),
            }),
        );
    }

    fn on_state_not_saved(&self, room: &str, reason: &str) {
        self.emit(STATE_NOT_SAVED, json!({ "room_id": room, "reason": reason }));
    }

    fn on_chat(&self, role: Role, content: &str) {
        self.emit(CHAT, json!({ "role": role, "content": content }));
    }

    fn on_scan_completed(&self, room: &str, analysis: &ScanAnalysis) {
        self.emit(
            SCAN_COMPLETED,
            json!({
                "room_id": room,
                "scan_target": analysis.scan_target,
                "alignment_score": analysis.alignment_score,
                "document_detected": analysis.document_detected,
                "unreadable": analysis.is_unreadable(),
            }),
        );
    }

    fn on_ledger_entry(&self, entry: &LedgerEntry) {
        self.emit(
            LEDGER_ENTRY_LOGGED,
            json!({
                "entry_id": entry.id,
                "amount_gbp": entry.amount_gbp,
                "allocation": entry.allocation,
                "merchant": entry.merchant,
            }),
        );
    }
}

/// Forwards every hook to each inner sink in order.
#[derive(Default, Clone)]
pub struct Fanout {
    sinks: Vec<Arc<dyn NarrativeSink>>,
}

impl Fanout {
    pub fn new(sinks: Vec<Arc<dyn NarrativeSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NarrativeSink>) {
        self.sinks.push(sink);
    }
}

impl NarrativeSink for Fanout {
    fn on_room_change(&self, from: &str, to: &str) {
        self.sinks.iter().for_each(|sink| sink.on_room_change(from, to));
    }

    fn on_projection(&self, room: &str, payload: &A2uiPayload) {
        self.sinks.iter().for_each(|sink| sink.on_projection(room, payload));
    }

    fn on_state_not_saved(&self, room: &str, reason: &str) {
        self.sinks
            .iter()
            .for_each(|sink| sink.on_state_not_saved(room, reason));
    }

    fn on_chat(&self, role: Role, content: &str) {
        self.sinks.iter().for_each(|sink| sink.on_chat(role, content));
    }

    fn on_scan_completed(&self, room: &str, analysis: &ScanAnalysis) {
        self.sinks
            .iter()
            .for_each(|sink| sink.on_scan_completed(room, analysis));
    }

    fn on_ledger_entry(&self, entry: &LedgerEntry) {
        self.sinks.iter().for_each(|sink| sink.on_ledger_entry(entry));
    }
}

/// One captured hook call.
#[derive(Debug, Clone, PartialEq)]
pub enum Narration {
    RoomChange { from: String, to: String },
    Projection { room: String, payload: A2uiPayload },
    StateNotSaved { room: String },
    Chat { role: Role, content: String },
    ScanCompleted { room: String },
    LedgerEntry { id: String },
}

/// Keeps hook calls in memory, for callers that inspect them afterwards.
#[derive(Default)]
pub struct RecordingSink {
    log: Mutex<Vec<Narration>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Narration> {
        match self.log.lock() {
            Ok(mut log) => std::mem::take(&mut *log),
            Err(_) => Vec::new(),
        }
    }

    pub fn projections(&self) -> Vec<A2uiPayload> {
        self.snapshot()
            .into_iter()
            .filter_map(|item| match item {
                Narration::Projection { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn chat_lines(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|item| match item {
                Narration::Chat { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Narration> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn record(&self, item: Narration) {
        if let Ok(mut log) = self.log.lock() {
            log.push(item);
        }
    }
}

impl NarrativeSink for RecordingSink {
    fn on_room_change(&self, from: &str, to: &str) {
        self.record(Narration::RoomChange {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    fn on_projection(&self, room: &str, payload: &A2uiPayload) {
        self.record(Narration::Projection {
            room: room.to_string(),
            payload: payload.clone(),
        });
    }

    fn on_state_not_saved(&self, room: &str, _reason: &str) {
        self.record(Narration::StateNotSaved {
            room: room.to_string(),
        });
    }

    fn on_chat(&self, role: Role, content: &str) {
        self.record(Narration::Chat {
            role,
            content: content.to_string(),
        });
    }

    fn on_scan_completed(&self, room: &str, _analysis: &ScanAnalysis) {
        self.record(Narration::ScanCompleted {
            room: room.to_string(),
        });
    }

    fn on_ledger_entry(&self, entry: &LedgerEntry) {
        self.record(Narration::LedgerEntry {
            id: entry.id.clone(),
        });
    }
}
