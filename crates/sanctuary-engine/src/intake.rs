use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use image::DynamicImage;
use sanctuary_contracts::ledger::{ledger_payload, parse_currency_amount, LedgerEntry, NewLedgerEntry};
use sanctuary_contracts::messages::Role;
use sanctuary_contracts::payload::{
    extract_json_object, normalise_scan_choice, A2uiPayload, FramingPolicy, ScanAnalysis,
    ScanFraming,
};
use serde_json::Value;

use crate::config::SanctuaryConfig;
use crate::downscale::{downscale, downscale_file, DownscaleAttempt, Downscaled};
use crate::orchestrator::{Orchestrator, RoomUiResult, UpdateRoomUi};
use crate::prompts::{scan_choice_prompt, vision_analysis_prompt, SYSTEM_PROMPT};
use crate::providers::ModelRoute;

pub const LEDGER_UPDATED_LINE: &str = ">> FINANCIAL DATA EXTRACTED. LEDGER UPDATED.";
pub const UNCATEGORISED: &str = "Uncategorised";

/// Where the projected scan payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    /// The style-choice reply, remapped onto the scan.
    Model,
    /// The reply failed or was unusable.
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A financial document: a ledger entry was logged and its card shown.
    Ledger {
        entry: LedgerEntry,
        result: RoomUiResult,
    },
    Projected {
        analysis: ScanAnalysis,
        source: ChoiceSource,
        result: RoomUiResult,
    },
    /// Vision failed, or a receipt could not be logged; the
    /// encryption-error terminal was shown.
    Unreadable { result: RoomUiResult },
    /// Another scan is still running.
    Busy,
}

impl ScanOutcome {
    pub fn payload(&self) -> Option<&A2uiPayload> {
        match self {
            ScanOutcome::Ledger { result, .. }
            | ScanOutcome::Projected { result, .. }
            | ScanOutcome::Unreadable { result } => Some(&result.payload),
            ScanOutcome::Busy => None,
        }
    }
}

/// Image in, one projection out. Only one scan runs at a time.
pub struct IntakePipeline {
    orchestrator: Arc<Orchestrator>,
    vision: ModelRoute,
    text: ModelRoute,
    attempts: Vec<DownscaleAttempt>,
    max_bytes: usize,
    policy: FramingPolicy,
    analysing: AtomicBool,
}

struct AnalysingGuard<'a>(&'a AtomicBool);

impl Drop for AnalysingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IntakePipeline {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        vision: ModelRoute,
        text: ModelRoute,
        config: &SanctuaryConfig,
    ) -> Self {
        Self {
            orchestrator,
            vision,
            text,
            attempts: config.downscale_attempts.clone(),
            max_bytes: config.downscale_max_bytes,
            policy: config.framing,
            analysing: AtomicBool::new(false),
        }
    }

    pub fn set_vision_route(&mut self, route: ModelRoute) {
        self.vision = route;
    }

    pub fn set_text_route(&mut self, route: ModelRoute) {
        self.text = route;
    }

    pub fn is_analysing(&self) -> bool {
        self.analysing.load(Ordering::Acquire)
    }

    pub fn scan_file(&self, path: &Path) -> ScanOutcome {
        self.run(|| downscale_file(path, &self.attempts, self.max_bytes))
    }

    pub fn scan_image(&self, image: &DynamicImage) -> ScanOutcome {
        self.run(|| downscale(image, &self.attempts, self.max_bytes))
    }

    fn begin(&self) -> Option<AnalysingGuard<'_>> {
        self.analysing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AnalysingGuard(&self.analysing))
    }

    fn run(&self, prepare: impl FnOnce() -> Result<Downscaled>) -> ScanOutcome {
        let Some(_guard) = self.begin() else {
            tracing::info!("scan rejected: analysis already in flight");
            return ScanOutcome::Busy;
        };

        let image = match prepare() {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!("image preparation failed: {err:#}");
                return self.unreadable();
            }
        };
        for report in &image.attempts {
            tracing::debug!(
                max_dim = report.attempt.max_dim,
                width = report.width,
                height = report.height,
                bytes = report.estimated_bytes,
                "downscale"
            );
        }

        let prompt = vision_analysis_prompt(Local::now());
        let analysis = match self
            .vision
            .analyse_image(&prompt, image.mime_type(), &image.base64)
        {
            Ok(raw) => ScanAnalysis::from_model_text(&raw),
            Err(err) => {
                tracing::warn!(model = %self.vision.model, "vision analysis failed: {err:#}");
                return self.unreadable();
            }
        };
        if analysis.is_unreadable() {
            tracing::warn!("vision reply was not a JSON object");
            return self.unreadable();
        }

        let current_room = self.orchestrator.current_room();
        let framing = ScanFraming::new(analysis, self.policy, current_room, image.data_url());
        let resolved_room = framing.resolved_room().to_string();
        self.orchestrator
            .sink()
            .on_scan_completed(&resolved_room, &framing.analysis);

        if let Some(outcome) = self.try_ledger(&framing, &image) {
            return outcome;
        }

        let (payload, source) = self.choose_projection(&framing);
        let result = self
            .orchestrator
            .update_room_ui(UpdateRoomUi::for_payload(&payload, resolved_room.as_str()));
        self.orchestrator.sink().on_chat(
            Role::Assistant,
            &format!("SYSTEM: Visual scan complete. Vibe: {resolved_room}. Telemetry displayed on HUD."),
        );
        ScanOutcome::Projected {
            analysis: framing.analysis,
            source,
            result,
        }
    }

    // Document with a readable total: log it and show the ledger card only.
    // A failed write ends the scan on the error terminal.
    fn try_ledger(&self, framing: &ScanFraming, image: &Downscaled) -> Option<ScanOutcome> {
        let analysis = &framing.analysis;
        if !analysis.document_detected {
            return None;
        }
        let amount = analysis.total.as_deref().and_then(parse_currency_amount)?;
        let allocation = analysis
            .category
            .clone()
            .or_else(|| analysis.merchant.clone())
            .unwrap_or_else(|| UNCATEGORISED.to_string());
        let date = analysis
            .date
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());

        let entry = match self.orchestrator.log_spend(NewLedgerEntry {
            amount_gbp: amount,
            allocation,
            merchant: analysis.merchant.clone(),
            date,
            scan_id: Some(image.scan_id()),
            verified_by: None,
        }) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("document detected but ledger write failed: {err:#}");
                return Some(self.unreadable());
            }
        };
        let result = self
            .orchestrator
            .pin_to_room(framing.resolved_room(), ledger_payload(&entry));
        self.orchestrator
            .sink()
            .on_chat(Role::Assistant, LEDGER_UPDATED_LINE);
        Some(ScanOutcome::Ledger { entry, result })
    }

    fn choose_projection(&self, framing: &ScanFraming) -> (A2uiPayload, ChoiceSource) {
        let prompt = scan_choice_prompt(&framing.terminal_lines(), framing.resolved_room());
        let reply = match self.text.generate_text(Some(SYSTEM_PROMPT), &prompt, true) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(model = %self.text.model, "style choice failed: {err:#}");
                return (framing.default_payload(), ChoiceSource::Default);
            }
        };
        let choice = extract_json_object(&reply)
            .map(|extracted| Value::Object(extracted.object))
            .and_then(|value| normalise_scan_choice(&value, framing));
        match choice {
            Some(payload) => (payload, ChoiceSource::Model),
            None => {
                tracing::debug!("style choice unusable, using scan default");
                (framing.default_payload(), ChoiceSource::Default)
            }
        }
    }

    // Encryption-error terminal; no style call is made for it.
    fn unreadable(&self) -> ScanOutcome {
        let payload = ScanFraming::new(
            ScanAnalysis::unreadable(),
            self.policy,
            self.orchestrator.current_room(),
            "",
        )
        .terminal_payload();
        let result = self
            .orchestrator
            .update_room_ui(UpdateRoomUi::for_payload(&payload, ""));
        ScanOutcome::Unreadable { result }
    }
}
