use serde_json::{json, Map, Value};

use super::extract::extract_json_object;
use super::normalise::unwrap_props;
use super::policy::FramingPolicy;
use super::A2uiPayload;
use crate::components::{ArtifactKind, ComponentId};
use crate::rooms::is_known_room;

pub const UNKNOWN_TARGET: &str = "UNKNOWN TARGET";
pub const NO_VERDICT: &str = "NO VERDICT";
pub const ENCRYPTION_ERROR_LINES: [&str; 2] = [">> ENCRYPTION ERROR", ">> RETRY SCAN"];
const RULE: &str = "--------------------------------";

/// Structured reading of a vision reply. Every field is optional on the
/// wire; wrong types are treated as absent rather than failing the scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanAnalysis {
    pub scan_target: String,
    pub alignment_score: Option<f64>,
    pub verdict: String,
    pub telemetry_lines: Option<Vec<String>>,
    pub room_vibe: Option<String>,
    pub document_detected: bool,
    pub merchant: Option<String>,
    pub total: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    unreadable: bool,
}

impl ScanAnalysis {
    /// The analysis used when the vision reply could not be read at all.
    pub fn unreadable() -> Self {
        Self {
            scan_target: UNKNOWN_TARGET.to_string(),
            verdict: NO_VERDICT.to_string(),
            unreadable: true,
            ..Self::default()
        }
    }

    pub fn is_unreadable(&self) -> bool {
        self.unreadable
    }

    pub fn from_model_text(raw: &str) -> Self {
        match extract_json_object(raw) {
            Some(extracted) => Self::from_object(&extracted.object),
            None => Self::unreadable(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(object) => Self::from_object(object),
            _ => Self::unreadable(),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty() && *value != "null")
                .map(str::to_string)
        };
        let telemetry_lines = object.get("telemetry_lines").and_then(Value::as_array).map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        Self {
            scan_target: text("scan_target").unwrap_or_else(|| UNKNOWN_TARGET.to_string()),
            alignment_score: object
                .get("alignment_score")
                .and_then(Value::as_f64)
                .filter(|score| score.is_finite())
                .map(|score| score.clamp(0.0, 100.0)),
            verdict: text("verdict").unwrap_or_else(|| NO_VERDICT.to_string()),
            telemetry_lines,
            room_vibe: text("room_vibe").filter(|room| is_known_room(room)),
            document_detected: match object.get("document_detected") {
                Some(Value::Bool(flag)) => *flag,
                Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
                _ => false,
            },
            merchant: text("merchant"),
            total: text("total"),
            date: text("date"),
            category: text("category"),
            unreadable: false,
        }
    }
}

/// Renders an alignment score the way the HUD prints it: whole numbers
/// without a decimal point, `N/A` when absent.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) if value.fract() == 0.0 => format!("{value:.0}"),
        Some(value) => value.to_string(),
        None => "N/A".to_string(),
    }
}

/// Everything derived from one scan that the projection choices need.
#[derive(Debug, Clone)]
pub struct ScanFraming {
    pub analysis: ScanAnalysis,
    pub policy: FramingPolicy,
    pub current_room: String,
    pub image_url: String,
}

impl ScanFraming {
    pub fn new(
        analysis: ScanAnalysis,
        policy: FramingPolicy,
        current_room: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            analysis,
            policy,
            current_room: current_room.into(),
            image_url: image_url.into(),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.analysis.alignment_score
    }

    pub fn resolved_room(&self) -> &str {
        self.analysis
            .room_vibe
            .as_deref()
            .unwrap_or(&self.current_room)
    }

    pub fn header(&self) -> &'static str {
        self.policy.header(self.score())
    }

    pub fn glitch_level(&self) -> f64 {
        self.policy.glitch_level(self.score())
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        if self.policy.is_divergent(self.score()) {
            ArtifactKind::Signal
        } else {
            ArtifactKind::Reflection
        }
    }

    /// Framed telemetry, or the encryption-error placeholder when the scan
    /// carried no telemetry.
    pub fn terminal_lines(&self) -> Vec<String> {
        let analysis = &self.analysis;
        match (&analysis.telemetry_lines, analysis.unreadable) {
            (Some(telemetry), false) => {
                let mut lines = vec![
                    format!("SCAN TARGET: {}", analysis.scan_target),
                    format!("ALIGNMENT: {}%", format_score(analysis.alignment_score)),
                    format!("VERDICT: {}", analysis.verdict),
                    RULE.to_string(),
                ];
                lines.extend(telemetry.iter().cloned());
                lines.push(RULE.to_string());
                lines.push(format!("ROOM VIBE: {}", self.resolved_room()));
                lines
            }
            _ => ENCRYPTION_ERROR_LINES.iter().map(|line| line.to_string()).collect(),
        }
    }

    pub fn artifact_content(&self) -> String {
        let analysis = &self.analysis;
        let telemetry = analysis
            .telemetry_lines
            .as_ref()
            .map(|lines| lines.join(" | "))
            .unwrap_or_else(|| "N/A".to_string());
        [
            analysis.verdict.clone(),
            String::new(),
            format!("Alignment: {}%", format_score(analysis.alignment_score)),
            format!("Telemetry: {telemetry}"),
        ]
        .join("\n")
    }

    pub fn terminal_payload(&self) -> A2uiPayload {
        A2uiPayload::new(
            ComponentId::BunkerTerminal,
            json!({
                "header": self.header(),
                "lines": self.terminal_lines(),
                "glitchLevel": self.glitch_level(),
            }),
        )
    }

    pub fn cortex_payload(&self) -> A2uiPayload {
        self.cortex_with(
            &self.analysis.scan_target,
            &self.artifact_content(),
            ArtifactKind::Reflection,
        )
    }

    /// What gets projected when the style-choice reply is unusable.
    pub fn default_payload(&self) -> A2uiPayload {
        if self.policy.prefers_artifact(self.score()) {
            self.cortex_with(
                &self.analysis.scan_target,
                &self.artifact_content(),
                self.artifact_kind(),
            )
        } else {
            self.terminal_payload()
        }
    }

    fn cortex_with(&self, title: &str, content: &str, kind: ArtifactKind) -> A2uiPayload {
        A2uiPayload::new(
            ComponentId::CortexArtifact,
            json!({
                "title": title,
                "content": content,
                "type": kind.as_str(),
                "imageUrl": self.image_url,
                "caption": self.analysis.scan_target,
                "persistImage": false,
            }),
        )
    }
}

/// Remaps a style-choice reply onto the scan. Terminal requests are
/// downgraded to an image card unless the score is divergent; artifact
/// requests always become image cards. Anything else is `None`.
pub fn normalise_scan_choice(value: &Value, framing: &ScanFraming) -> Option<A2uiPayload> {
    let object = value.as_object()?;
    let props = unwrap_props(object.get("props"));
    let string_prop = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);

    match object.get("component").and_then(Value::as_str)?.trim() {
        "BunkerTerminal" => {
            if framing.policy.prefers_artifact(framing.score()) {
                return Some(framing.cortex_payload());
            }
            let lines: Vec<String> = match props.get("lines") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Some(Value::String(text)) => text
                    .split('\n')
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            let lines = if lines.is_empty() {
                framing.terminal_lines()
            } else {
                lines
            };
            Some(A2uiPayload::new(
                ComponentId::BunkerTerminal,
                json!({
                    "header": string_prop("header").unwrap_or_else(|| framing.header().to_string()),
                    "lines": lines,
                    "glitchLevel": props
                        .get("glitchLevel")
                        .and_then(Value::as_f64)
                        .unwrap_or_else(|| framing.glitch_level()),
                }),
            ))
        }
        "ArtifactCard" => {
            let title = string_prop("title").unwrap_or_else(|| framing.analysis.scan_target.clone());
            let content = string_prop("content").unwrap_or_else(|| framing.artifact_content());
            let kind = props
                .get("type")
                .and_then(Value::as_str)
                .and_then(ArtifactKind::from_name)
                .unwrap_or_else(|| framing.artifact_kind());
            Some(framing.cortex_with(&title, &content, kind))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::components::{resolve, Projection};

    fn framing(analysis: Value) -> ScanFraming {
        ScanFraming::new(
            ScanAnalysis::from_value(&analysis),
            FramingPolicy::default(),
            "control_room",
            "data:image/jpeg;base64,AAAA",
        )
    }

    #[test]
    fn lenient_parse_defaults_and_clamps() {
        let analysis = ScanAnalysis::from_value(&json!({
            "alignment_score": 140,
            "telemetry_lines": ["LUMENS: HIGH", 7, "ORIGIN: UNKNOWN"],
            "room_vibe": "the_moon",
            "merchant": "null",
        }));
        assert_eq!(analysis.scan_target, UNKNOWN_TARGET);
        assert_eq!(analysis.verdict, NO_VERDICT);
        assert_eq!(analysis.alignment_score, Some(100.0));
        assert_eq!(
            analysis.telemetry_lines,
            Some(vec!["LUMENS: HIGH".to_string(), "ORIGIN: UNKNOWN".to_string()])
        );
        assert_eq!(analysis.room_vibe, None);
        assert_eq!(analysis.merchant, None);
        assert!(!analysis.is_unreadable());
    }

    #[test]
    fn non_object_reply_is_unreadable() {
        assert!(ScanAnalysis::from_model_text("the camera saw fog").is_unreadable());
        assert!(ScanAnalysis::from_value(&json!([1, 2])).is_unreadable());
    }

    #[test]
    fn telemetry_is_framed_with_score_and_room() {
        let framing = framing(json!({
            "scan_target": "FESTIVAL BANNER",
            "alignment_score": 40,
            "verdict": "DIVERGENCE DETECTED.",
            "telemetry_lines": ["A", "B"],
            "room_vibe": "the_deck",
        }));
        assert_eq!(
            framing.terminal_lines(),
            vec![
                "SCAN TARGET: FESTIVAL BANNER",
                "ALIGNMENT: 40%",
                "VERDICT: DIVERGENCE DETECTED.",
                RULE,
                "A",
                "B",
                RULE,
                "ROOM VIBE: the_deck",
            ]
        );
        assert_eq!(framing.resolved_room(), "the_deck");
        assert_eq!(
            framing.artifact_content(),
            "DIVERGENCE DETECTED.\n\nAlignment: 40%\nTelemetry: A | B"
        );
    }

    #[test]
    fn missing_telemetry_uses_encryption_placeholder() {
        let framing = framing(json!({"alignment_score": 70}));
        assert_eq!(framing.terminal_lines(), ENCRYPTION_ERROR_LINES.to_vec());
        assert!(framing.artifact_content().ends_with("Telemetry: N/A"));
    }

    #[test]
    fn high_score_terminal_request_is_downgraded_to_card() {
        let framing = framing(json!({"scan_target": "OAK", "alignment_score": 90, "telemetry_lines": ["x"]}));
        let choice = json!({"component": "BunkerTerminal", "props": {"header": "H", "lines": ["l"]}});
        let payload = normalise_scan_choice(&choice, &framing);
        let Some(payload) = payload else {
            panic!("expected a payload");
        };
        assert_eq!(payload.component, ComponentId::CortexArtifact);
        assert_eq!(payload.props["type"], json!("Reflection"));
        assert_eq!(payload.props["persistImage"], json!(false));
        assert!(matches!(resolve(&payload), Projection::Cortex(_)));
    }

    #[test]
    fn divergent_terminal_request_keeps_terminal_with_defaults() {
        let framing = framing(json!({"alignment_score": 20, "telemetry_lines": ["A"]}));
        let choice = json!({"component": "BunkerTerminal", "props": {"lines": "one\n\ntwo"}});
        let payload = normalise_scan_choice(&choice, &framing);
        assert_eq!(
            payload.map(|payload| payload.props_value()),
            Some(json!({
                "header": "VISUAL CORTEX: DIVERGENCE DETECTED",
                "lines": ["one", "two"],
                "glitchLevel": 0.8,
            }))
        );
    }

    #[test]
    fn artifact_request_becomes_cortex_card_with_scan_defaults() {
        let framing = framing(json!({"scan_target": "COIN", "alignment_score": 10}));
        let choice = json!({"component": "ArtifactCard", "props": "{\"type\": \"Gossip\"}"});
        let payload = normalise_scan_choice(&choice, &framing);
        let props = payload.map(|payload| payload.props).unwrap_or_default();
        assert_eq!(props["title"], json!("COIN"));
        assert_eq!(props["type"], json!("Signal"));
        assert_eq!(props["caption"], json!("COIN"));
    }

    #[test]
    fn other_components_are_not_remapped() {
        let framing = framing(json!({}));
        assert!(normalise_scan_choice(&json!({"component": "SystemAlert"}), &framing).is_none());
        assert!(normalise_scan_choice(&json!("text"), &framing).is_none());
    }

    #[test]
    fn default_payload_follows_divergence() {
        let divergent = framing(json!({"alignment_score": 30, "telemetry_lines": ["A", "B"]}));
        let payload = divergent.default_payload();
        assert_eq!(payload.component, ComponentId::BunkerTerminal);
        assert_eq!(payload.props["glitchLevel"], json!(0.8));

        let calm = framing(json!({"alignment_score": 65}));
        assert_eq!(calm.default_payload().component, ComponentId::CortexArtifact);
    }

    #[test]
    fn scores_print_like_the_hud() {
        assert_eq!(format_score(Some(40.0)), "40");
        assert_eq!(format_score(Some(72.5)), "72.5");
        assert_eq!(format_score(None), "N/A");
    }
}
