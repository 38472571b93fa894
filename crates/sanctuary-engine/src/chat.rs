use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Local;
use sanctuary_contracts::components::ComponentId;
use sanctuary_contracts::ledger::{
    archive_payload, extract_spend, ledger_payload, LedgerEntry, NewLedgerEntry,
    DEFAULT_FETCH_LIMIT,
};
use sanctuary_contracts::messages::{ChatMessage, MessageLog, Role, DEFAULT_RECENT_LIMIT};
use sanctuary_contracts::payload::{find_payload, strip_json, A2uiPayload};
use sanctuary_contracts::rooms::DEFAULT_ROOM;
use serde_json::json;

use crate::orchestrator::{Orchestrator, RoomUiResult, UpdateRoomUi};
use crate::prompts::{chat_prompt, SYSTEM_PROMPT};
use crate::providers::ModelRoute;
use crate::telemetry::{handshake_message, TelemetrySource};

pub const PROTOCOL_ZERO_TRIGGER: &str = "INITIATE PROTOCOL ZERO";
pub const PROTOCOL_ZERO_REPLY: &str =
    ">> WARNING: SEAVIEW SAFETY PROTOCOLS OVERRIDDEN.\n>> INITIATING DEEP CORE SEQUENCE...";
pub const DEEP_CORE: &str = "deep_core";
pub const UPLINK_ERROR_REPLY: &str = "UPLINK ERROR. RETRY.";
pub const EMPTY_REPLY: &str = "Acknowledged. Updating display.";
pub const LEDGER_EMPTY_REPLY: &str =
    "LEDGER ACCESS GRANTED. No entries found in database. Upload a receipt to begin tracking.";

const LEDGER_KEYWORDS: [&str; 3] = ["ledger", "purchases", "spending"];

/// How a chat turn was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    ProtocolZero,
    LedgerArchive,
    Model,
    UplinkError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub kind: TurnKind,
    pub reply: String,
    pub projections: Vec<RoomUiResult>,
    pub ledger_entry: Option<LedgerEntry>,
}

impl ChatTurn {
    fn new(kind: TurnKind, reply: impl Into<String>) -> Self {
        Self {
            kind,
            reply: reply.into(),
            projections: Vec::new(),
            ledger_entry: None,
        }
    }
}

/// One user's conversation with the core.
pub struct ChatSession {
    orchestrator: Arc<Orchestrator>,
    text: ModelRoute,
    messages: Arc<MessageLog>,
    seq: AtomicU64,
    uplink: OnceLock<String>,
}

impl ChatSession {
    pub fn new(orchestrator: Arc<Orchestrator>, text: ModelRoute, messages: Arc<MessageLog>) -> Self {
        Self {
            orchestrator,
            text,
            messages,
            seq: AtomicU64::new(0),
            uplink: OnceLock::new(),
        }
    }

    /// Reads the island sensors once per session and announces the uplink.
    /// The handshake rides along with every later model prompt.
    pub fn open_uplink(&self, source: &dyn TelemetrySource) -> Option<&str> {
        if self.uplink.get().is_some() {
            return None;
        }
        let telemetry = match source.read() {
            Ok(telemetry) => telemetry,
            Err(err) => {
                tracing::warn!(source = source.name(), "sensor uplink unavailable: {err:#}");
                return None;
            }
        };
        let handshake = self.uplink.get_or_init(|| handshake_message(&telemetry));
        self.orchestrator.sink().on_chat(Role::System, handshake);
        Some(handshake.as_str())
    }

    pub fn uplink(&self) -> Option<&str> {
        self.uplink.get().map(String::as_str)
    }

    pub fn text_route(&self) -> &ModelRoute {
        &self.text
    }

    pub fn set_text_route(&mut self, route: ModelRoute) {
        self.text = route;
    }

    pub fn handle_message(&self, content: &str) -> ChatTurn {
        let content = content.trim();
        if content.to_uppercase().contains(PROTOCOL_ZERO_TRIGGER) {
            self.remember(Role::User, content);
            return self.protocol_zero();
        }
        if is_ledger_request(content) {
            self.remember(Role::User, content);
            return self.ledger_archive();
        }

        // Recent turns are read before this one is stored.
        let history = self.history();
        self.remember(Role::User, content);
        let mut projections = Vec::new();
        if let Some(found) = find_payload(content) {
            projections.push(self.project(&found.payload));
        }

        let prompt = chat_prompt(
            Local::now(),
            &self.orchestrator.current_room(),
            self.uplink(),
            &history,
            content,
        );
        let raw = match self.text.generate_text(Some(SYSTEM_PROMPT), &prompt, false) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(model = %self.text.model, "chat completion failed: {err:#}");
                self.orchestrator
                    .sink()
                    .on_chat(Role::Assistant, UPLINK_ERROR_REPLY);
                let mut turn = ChatTurn::new(TurnKind::UplinkError, UPLINK_ERROR_REPLY);
                self.record_spend(content, &mut turn, &mut projections);
                turn.projections = projections;
                return turn;
            }
        };

        if let Some(found) = find_payload(&raw) {
            projections.push(self.project(&found.payload));
        }
        let cleaned = strip_json(&raw);
        let reply = if cleaned.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            cleaned
        };
        self.say(&reply);

        let mut turn = ChatTurn::new(TurnKind::Model, reply);
        self.record_spend(content, &mut turn, &mut projections);
        turn.projections = projections;
        turn
    }

    // The spend is the user's; it is logged whether or not the model answered.
    fn record_spend(
        &self,
        content: &str,
        turn: &mut ChatTurn,
        projections: &mut Vec<RoomUiResult>,
    ) {
        let Some(spend) = extract_spend(content) else {
            return;
        };
        let logged = self.orchestrator.log_spend(NewLedgerEntry {
            amount_gbp: spend.amount,
            allocation: spend.allocation,
            date: Local::now().format("%Y-%m-%d").to_string(),
            ..NewLedgerEntry::default()
        });
        match logged {
            Ok(entry) => {
                projections.push(
                    self.orchestrator
                        .pin_to_room(DEFAULT_ROOM, ledger_payload(&entry)),
                );
                turn.ledger_entry = Some(entry);
            }
            Err(err) => tracing::warn!("chat spend not logged: {err:#}"),
        }
    }

    fn protocol_zero(&self) -> ChatTurn {
        self.say(PROTOCOL_ZERO_REPLY);
        let card = A2uiPayload::new(
            ComponentId::ArtifactCard,
            json!({
                "type": "Myth",
                "title": "PROTOCOL ZERO: ISABELLA",
                "content": "She is the ghost in the machine. Requires clearance Level 0.",
            }),
        );
        let mut turn = ChatTurn::new(TurnKind::ProtocolZero, PROTOCOL_ZERO_REPLY);
        turn.projections.push(
            self.orchestrator
                .update_room_ui(UpdateRoomUi::for_payload(&card, DEEP_CORE)),
        );
        turn
    }

    fn ledger_archive(&self) -> ChatTurn {
        let entries = match self.orchestrator.recent_ledger(Some(DEFAULT_FETCH_LIMIT)) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("ledger read failed: {err:#}");
                self.say(UPLINK_ERROR_REPLY);
                return ChatTurn::new(TurnKind::UplinkError, UPLINK_ERROR_REPLY);
            }
        };
        if entries.is_empty() {
            self.say(LEDGER_EMPTY_REPLY);
            return ChatTurn::new(TurnKind::LedgerArchive, LEDGER_EMPTY_REPLY);
        }
        let reply = format!(
            "LEDGER ACCESS GRANTED. {} entries manifested on wall.",
            entries.len()
        );
        self.say(&reply);
        let mut turn = ChatTurn::new(TurnKind::LedgerArchive, reply);
        turn.projections.push(
            self.orchestrator
                .pin_to_room(DEFAULT_ROOM, archive_payload(&entries)),
        );
        turn
    }

    // Payloads found in chat land in the current room.
    fn project(&self, payload: &A2uiPayload) -> RoomUiResult {
        self.orchestrator
            .update_room_ui(UpdateRoomUi::for_payload(payload, ""))
    }

    fn say(&self, reply: &str) {
        self.orchestrator.sink().on_chat(Role::Assistant, reply);
        self.remember(Role::Assistant, reply);
    }

    fn remember(&self, role: Role, content: &str) {
        if role == Role::User {
            self.orchestrator.sink().on_chat(role, content);
        }
        let source_id = self.next_source_id();
        if let Err(err) =
            self.messages
                .save(self.orchestrator.user(), role, content, Some(&source_id))
        {
            tracing::warn!("chat message not saved: {err}");
        }
    }

    fn history(&self) -> Vec<ChatMessage> {
        match self
            .messages
            .recent(self.orchestrator.user(), DEFAULT_RECENT_LIMIT)
        {
            Ok(mut recent) => {
                recent.reverse();
                recent
            }
            Err(err) => {
                tracing::warn!("chat history unavailable: {err}");
                Vec::new()
            }
        }
    }

    fn next_source_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{seq}", chrono::Utc::now().timestamp_millis())
    }
}

pub fn is_ledger_request(content: &str) -> bool {
    let lowered = content.to_lowercase();
    LEDGER_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

#[cfg(test)]
mod tests {
    use sanctuary_contracts::ledger::JsonLedgerStore;
    use sanctuary_contracts::rooms::{JsonRoomStateStore, UserId};

    use std::sync::Mutex;

    use super::*;
    use crate::providers::{ModelProvider, TextRequest, VisionRequest};
    use crate::sink::{Narration, RecordingSink};
    use crate::telemetry::{DryrunTelemetry, IslandTelemetry};

    /// Fixed reply; `None` fails the call. Keeps every prompt it was sent.
    struct Scripted {
        reply: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl ModelProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn analyse_image(&self, _request: &VisionRequest) -> anyhow::Result<String> {
            anyhow::bail!("text only")
        }

        fn generate_text(&self, request: &TextRequest) -> anyhow::Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(request.prompt.clone());
            }
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => anyhow::bail!("timed out"),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        sink: Arc<RecordingSink>,
        messages: Arc<MessageLog>,
        provider: Arc<Scripted>,
        session: ChatSession,
    }

    fn fixture(reply: Option<&'static str>) -> anyhow::Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let sink = Arc::new(RecordingSink::new());
        let orchestrator = Arc::new(Orchestrator::new(
            UserId::new("eleanor"),
            Arc::new(JsonRoomStateStore::new(dir.path().join("rooms.json"))),
            Arc::new(JsonLedgerStore::new(dir.path().join("ledger.json"))),
            sink.clone(),
        ));
        let messages = Arc::new(MessageLog::new(dir.path().join("messages.json")));
        let provider = Arc::new(Scripted {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        let session = ChatSession::new(
            orchestrator,
            ModelRoute::new(provider.clone(), "scripted-1"),
            messages.clone(),
        );
        Ok(Fixture {
            _dir: dir,
            sink,
            messages,
            provider,
            session,
        })
    }

    #[test]
    fn protocol_zero_moves_to_deep_core() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        let turn = fx.session.handle_message("please initiate protocol zero now");
        assert_eq!(turn.kind, TurnKind::ProtocolZero);
        assert_eq!(turn.reply, PROTOCOL_ZERO_REPLY);
        assert_eq!(turn.projections[0].room, DEEP_CORE);
        assert!(turn.projections[0].room_changed);
        assert_eq!(turn.projections[0].payload.props["type"], "Myth");
        Ok(())
    }

    #[test]
    fn empty_ledger_intercept_replies_without_projection() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        let turn = fx.session.handle_message("Show my SPENDING");
        assert_eq!(turn.kind, TurnKind::LedgerArchive);
        assert_eq!(turn.reply, LEDGER_EMPTY_REPLY);
        assert!(turn.projections.is_empty());
        Ok(())
    }

    #[test]
    fn ledger_intercept_pins_archive_to_control_room() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        fx.session.orchestrator.enter_room("study")?;
        fx.session.orchestrator.log_spend(NewLedgerEntry {
            amount_gbp: 12.5,
            allocation: "Rope".to_string(),
            merchant: Some("Chandlery".to_string()),
            date: "2026-10-01".to_string(),
            ..NewLedgerEntry::default()
        })?;
        let turn = fx.session.handle_message("what did the ledger record?");
        assert_eq!(turn.reply, "LEDGER ACCESS GRANTED. 1 entries manifested on wall.");
        let archive = &turn.projections[0];
        assert_eq!(archive.room, DEFAULT_ROOM);
        assert!(!archive.room_changed);
        assert_eq!(archive.payload.props["header"], "SEAVIEW LEDGER ARCHIVES");
        assert_eq!(fx.session.orchestrator.current_room(), "study");
        Ok(())
    }

    #[test]
    fn model_payload_is_dispatched_and_stripped_from_reply() -> anyhow::Result<()> {
        let fx = fixture(Some(
            "Pinning it now.\n```json\n{\"component\":\"SystemAlert\",\"props\":{\"message\":\"Storm inbound\"}}\n```",
        ))?;
        let turn = fx.session.handle_message("Warn me about the weather");
        assert_eq!(turn.kind, TurnKind::Model);
        assert_eq!(turn.reply, "Pinning it now.");
        assert_eq!(turn.projections.len(), 1);
        assert_eq!(turn.projections[0].payload.component, ComponentId::SystemAlert);
        assert_eq!(fx.sink.projections().len(), 1);
        Ok(())
    }

    #[test]
    fn payload_only_reply_is_acknowledged() -> anyhow::Result<()> {
        let fx = fixture(Some("{\"component\":\"BunkerSimulation\",\"props\":{}}"))?;
        let turn = fx.session.handle_message("run the simulation");
        assert_eq!(turn.reply, EMPTY_REPLY);
        Ok(())
    }

    #[test]
    fn chat_spend_logs_and_pins_ledger_to_control_room() -> anyhow::Result<()> {
        let fx = fixture(Some("Noted."))?;
        let turn = fx.session.handle_message("Allocate £500 to the lifeboat fund.");
        let Some(entry) = turn.ledger_entry else {
            panic!("expected a ledger entry");
        };
        assert_eq!(entry.amount_gbp, 500.0);
        assert_eq!(entry.allocation, "the lifeboat fund");
        assert_eq!(entry.verified_by, "Julian");
        let ledger = &turn.projections[0];
        assert_eq!(ledger.room, DEFAULT_ROOM);
        assert_eq!(ledger.payload.props["entryId"], entry.id.as_str());
        Ok(())
    }

    #[test]
    fn model_failure_reports_uplink_error() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        let turn = fx.session.handle_message("hello?");
        assert_eq!(turn.kind, TurnKind::UplinkError);
        assert_eq!(turn.reply, UPLINK_ERROR_REPLY);
        assert!(fx.sink.chat_lines().contains(&UPLINK_ERROR_REPLY.to_string()));
        Ok(())
    }

    #[test]
    fn turns_are_persisted_for_named_users() -> anyhow::Result<()> {
        let fx = fixture(Some("Evening."))?;
        fx.session.handle_message("Good evening");
        let history = fx.messages.history(&UserId::new("eleanor"), 10)?;
        let contents: Vec<&str> = history.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["Good evening", "Evening."]);
        Ok(())
    }

    #[test]
    fn ledger_keywords_match_anywhere() {
        assert!(is_ledger_request("recent Purchases please"));
        assert!(!is_ledger_request("send £5 to the fund"));
    }

    #[test]
    fn spend_is_logged_even_when_the_uplink_fails() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        let turn = fx.session.handle_message("Spent £20 to fuel.");
        assert_eq!(turn.kind, TurnKind::UplinkError);
        let Some(entry) = turn.ledger_entry else {
            panic!("expected a ledger entry");
        };
        assert_eq!(entry.amount_gbp, 20.0);
        assert_eq!(entry.allocation, "fuel");
        assert_eq!(turn.projections[0].room, DEFAULT_ROOM);
        Ok(())
    }

    struct Offline;

    impl TelemetrySource for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn read(&self) -> anyhow::Result<IslandTelemetry> {
            anyhow::bail!("no route to host")
        }
    }

    #[test]
    fn sensor_uplink_opens_once_and_reaches_the_model() -> anyhow::Result<()> {
        let fx = fixture(Some("Welcome back."))?;
        assert!(fx.session.open_uplink(&Offline).is_none());
        assert!(fx.session.uplink().is_none());

        let handshake = fx.session.open_uplink(&DryrunTelemetry).map(str::to_string);
        let Some(handshake) = handshake else {
            panic!("expected a handshake");
        };
        assert!(handshake.starts_with("[SYSTEM EVENT: SENSOR UPLINK ESTABLISHED]"));
        assert!(fx.session.open_uplink(&DryrunTelemetry).is_none());
        assert!(fx.sink.snapshot().contains(&Narration::Chat {
            role: Role::System,
            content: handshake.clone(),
        }));

        fx.session.handle_message("Morning, Brian.");
        let prompts = fx.provider.prompts.lock().unwrap();
        assert!(prompts[0].contains(&handshake));
        Ok(())
    }
}
