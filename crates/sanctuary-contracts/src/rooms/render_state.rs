//! Two-phase view of what the room wall is showing.
//!
//! A tool call is applied locally first; the persisted record arriving
//! later is reconciled against the dedup key so one logical update renders
//! exactly once.

use std::fmt;

use super::store::RoomStateRecord;
use crate::payload::A2uiPayload;

/// `"{activeComponent}-{lastUpdated}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(component: &str, last_updated: i64) -> Self {
        Self(format!("{component}-{last_updated}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    Showing {
        payload: A2uiPayload,
        /// `None` until the persisted copy is confirmed.
        dedup_key: Option<DedupKey>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Rendered(A2uiPayload),
    Unchanged,
    Cleared,
}

impl RenderState {
    pub fn current(&self) -> Option<&A2uiPayload> {
        match self {
            RenderState::Idle => None,
            RenderState::Showing { payload, .. } => Some(payload),
        }
    }

    pub fn dedup_key(&self) -> Option<&DedupKey> {
        match self {
            RenderState::Idle => None,
            RenderState::Showing { dedup_key, .. } => dedup_key.as_ref(),
        }
    }

    /// Optimistic phase.
    pub fn apply_local(&mut self, payload: A2uiPayload) {
        *self = RenderState::Showing {
            payload,
            dedup_key: None,
        };
    }

    /// Adopts the key of the record that was just written for the payload
    /// already on screen, so the echo of that write is not rendered again.
    pub fn confirm(&mut self, record: &RoomStateRecord) {
        if let RenderState::Showing { dedup_key, .. } = self {
            *dedup_key = record.dedup_key();
        }
    }

    pub fn reconcile(&mut self, record: Option<&RoomStateRecord>) -> Transition {
        let Some(record) = record else {
            if matches!(self, RenderState::Idle) {
                return Transition::Unchanged;
            }
            *self = RenderState::Idle;
            return Transition::Cleared;
        };
        let (Some(key), Some(payload)) = (record.dedup_key(), record.payload()) else {
            return Transition::Unchanged;
        };
        if self.dedup_key() == Some(&key) {
            return Transition::Unchanged;
        }
        // Same payload under a newer timestamp (e.g. an objective edit):
        // take the key, skip the re-render.
        if self.current() == Some(&payload) {
            self.adopt_key(key);
            return Transition::Unchanged;
        }
        *self = RenderState::Showing {
            payload: payload.clone(),
            dedup_key: Some(key),
        };
        Transition::Rendered(payload)
    }

    fn adopt_key(&mut self, key: DedupKey) {
        if let RenderState::Showing { dedup_key, .. } = self {
            *dedup_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::components::ComponentId;
    use crate::rooms::UserId;

    fn record(header: &str, last_updated: i64) -> RoomStateRecord {
        RoomStateRecord {
            user_id: UserId::guest(),
            room_id: "control_room".to_string(),
            active_component: Some("BunkerTerminal".to_string()),
            component_props: Some(json!({"header": header, "lines": []}).to_string()),
            current_objective: None,
            current_status: None,
            last_updated,
        }
    }

    #[test]
    fn same_key_renders_once() {
        let mut state = RenderState::default();
        let rec = record("H", 100);
        assert!(matches!(state.reconcile(Some(&rec)), Transition::Rendered(_)));
        assert_eq!(state.reconcile(Some(&rec)), Transition::Unchanged);
        assert_eq!(state.dedup_key().map(DedupKey::as_str), Some("BunkerTerminal-100"));
    }

    #[test]
    fn new_key_renders_again() {
        let mut state = RenderState::default();
        state.reconcile(Some(&record("H", 100)));
        assert!(matches!(
            state.reconcile(Some(&record("H2", 101))),
            Transition::Rendered(_)
        ));
    }

    #[test]
    fn absent_record_clears_payload_and_key_together() {
        let mut state = RenderState::default();
        state.reconcile(Some(&record("H", 100)));
        assert_eq!(state.reconcile(None), Transition::Cleared);
        assert_eq!(state, RenderState::Idle);
        assert!(state.dedup_key().is_none());
        assert_eq!(state.reconcile(None), Transition::Unchanged);
    }

    #[test]
    fn objective_only_record_is_ignored() {
        let mut state = RenderState::default();
        state.reconcile(Some(&record("H", 100)));
        let mut objective_only = record("H", 200);
        objective_only.active_component = None;
        assert_eq!(state.reconcile(Some(&objective_only)), Transition::Unchanged);
        assert_eq!(state.dedup_key().map(DedupKey::as_str), Some("BunkerTerminal-100"));
    }

    #[test]
    fn confirmed_local_apply_does_not_rerender_its_echo() {
        let mut state = RenderState::default();
        let rec = record("H", 100);
        let payload = rec.payload().unwrap_or_else(crate::payload::fallback_payload);
        state.apply_local(payload);
        assert!(state.dedup_key().is_none());
        state.confirm(&rec);
        assert_eq!(state.reconcile(Some(&rec)), Transition::Unchanged);
    }

    #[test]
    fn unconfirmed_echo_with_identical_payload_is_absorbed() {
        let mut state = RenderState::default();
        let rec = record("H", 100);
        state.apply_local(A2uiPayload::new(
            ComponentId::BunkerTerminal,
            json!({"header": "H", "lines": []}),
        ));
        assert_eq!(state.reconcile(Some(&rec)), Transition::Unchanged);
        assert_eq!(state.dedup_key().map(DedupKey::as_str), Some("BunkerTerminal-100"));
    }
}
