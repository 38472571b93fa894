use serde_json::Value;

use super::registry::{
    decode_props, AlertProps, AlertSeverity, ArtifactProps, ChoiceProps, ComponentId, CortexProps,
    ImagePanelProps, LedgerProps, ResourceMonitorProps, TerminalProps,
};
use crate::payload::A2uiPayload;

/// A payload resolved against the registry into its typed prop contract.
///
/// Anything that fails its contract resolves to the checksum-error terminal,
/// so a caller holding a `Projection` always has something drawable.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Terminal(TerminalProps),
    Artifact(ArtifactProps),
    Alert(AlertProps),
    ImagePanel(ImagePanelProps),
    Ledger(LedgerProps),
    Cortex(CortexProps),
    Choice(ChoiceProps),
    ResourceMonitor(ResourceMonitorProps),
    Simulation,
}

impl Projection {
    pub fn component(&self) -> ComponentId {
        match self {
            Projection::Terminal(_) => ComponentId::BunkerTerminal,
            Projection::Artifact(_) => ComponentId::ArtifactCard,
            Projection::Alert(_) => ComponentId::SystemAlert,
            Projection::ImagePanel(_) => ComponentId::ImagePanel,
            Projection::Ledger(_) => ComponentId::BunkerLedger,
            Projection::Cortex(_) => ComponentId::CortexArtifact,
            Projection::Choice(_) => ComponentId::ChoiceCard,
            Projection::ResourceMonitor(_) => ComponentId::ResourceMonitor,
            Projection::Simulation => ComponentId::BunkerSimulation,
        }
    }
}

pub fn resolve(payload: &A2uiPayload) -> Projection {
    let props = &payload.props;
    let resolved = match payload.component {
        ComponentId::BunkerTerminal => decode_props(props).map(Projection::Terminal),
        ComponentId::ArtifactCard => decode_props(props).map(Projection::Artifact),
        ComponentId::SystemAlert => decode_props(props).map(Projection::Alert),
        ComponentId::ImagePanel => decode_props(props).map(Projection::ImagePanel),
        ComponentId::BunkerLedger => decode_props(props).map(Projection::Ledger),
        ComponentId::CortexArtifact => decode_props(props).map(Projection::Cortex),
        ComponentId::ChoiceCard => decode_props(props).map(Projection::Choice),
        ComponentId::ResourceMonitor => decode_props(props).map(Projection::ResourceMonitor),
        ComponentId::BunkerSimulation => Ok(Projection::Simulation),
    };
    resolved.unwrap_or_else(|err| {
        tracing::debug!(component = %payload.component, "projection fell back: {err}");
        Projection::Terminal(TerminalProps::checksum_error())
    })
}

/// Renders a projection as plain terminal text.
pub fn render_lines(projection: &Projection) -> Vec<String> {
    match projection {
        Projection::Terminal(props) => {
            let lowered = props.header.to_ascii_lowercase();
            let header = if lowered.contains("telemetry") || lowered.contains("scanner") {
                format!("[SCANNER UPLINK // RAW TELEMETRY] {}", props.header)
            } else {
                props.header.clone()
            };
            let mut out = vec![header];
            if props.glitch_level.unwrap_or(0.0) > 0.0 {
                out.push(format!(
                    "!! SIGNAL DEGRADED ({:.0}%)",
                    props.glitch_level.unwrap_or(0.0) * 100.0
                ));
            }
            out.extend(props.lines.iter().map(|line| format!("> {line}")));
            out
        }
        Projection::Artifact(props) => vec![
            format!("[{}] {}", props.kind.as_str().to_ascii_uppercase(), props.title),
            props.content.clone(),
        ],
        Projection::Alert(props) => {
            let level = match props.severity {
                Some(AlertSeverity::Critical) => "CRITICAL",
                _ => "WARNING",
            };
            let mut out = vec![format!("!! {level}: {}", props.message)];
            if props.show_restore_feed {
                out.push("[ RESTORE FEED ]".to_string());
            }
            out
        }
        Projection::ImagePanel(props) => {
            let mut out = Vec::new();
            if let Some(title) = &props.title {
                out.push(title.clone());
            }
            out.push(format!("<image {}>", summarize_url(&props.image_url)));
            if let Some(caption) = &props.caption {
                out.push(caption.clone());
            }
            out
        }
        Projection::Ledger(props) => {
            let mut out = vec![
                "BUNKER LEDGER".to_string(),
                format!("AMOUNT: {}", format_gbp(props.amount_gbp)),
                format!("ALLOCATION: {}", props.allocation),
            ];
            if let Some(date) = &props.date {
                out.push(format!("DATE: {date}"));
            }
            if let Some(verified) = &props.verified_by {
                out.push(format!("VERIFIED BY: {verified}"));
            }
            match &props.signed_by {
                Some(signer) => out.push(format!("SIGNED: {signer}")),
                None => out.push("AWAITING SIGNATURE".to_string()),
            }
            out
        }
        Projection::Cortex(props) => {
            let kind = props.kind.map(|kind| kind.as_str()).unwrap_or("Reflection");
            let mut out = vec![format!(
                "[VISUAL CORTEX // {}] {}",
                kind.to_ascii_uppercase(),
                props.title
            )];
            if let Some(url) = &props.image_url {
                out.push(format!("<image {}>", summarize_url(url)));
            }
            out.extend(props.content.lines().map(str::to_string));
            out
        }
        Projection::Choice(props) => {
            let mut out = vec![props.question.clone()];
            out.extend(
                props
                    .options
                    .iter()
                    .enumerate()
                    .map(|(idx, option)| format!("  {}. {option}", idx + 1)),
            );
            out
        }
        Projection::ResourceMonitor(props) => {
            let mut out = vec![props
                .title
                .clone()
                .unwrap_or_else(|| "RESOURCE MONITOR".to_string())];
            out.extend(
                props
                    .data
                    .iter()
                    .map(|row| format!("{:<18} {:>6.1}", row.label, row.value)),
            );
            if let Some(total) = props.total_spend {
                out.push(format!("TOTAL SPEND: {}", format_gbp(total)));
            }
            out
        }
        Projection::Simulation => vec!["BUNKER SIMULATION: RUNNING".to_string()],
    }
}

pub fn format_gbp(amount: f64) -> String {
    format!("£{amount:.2}")
}

fn summarize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("data:") {
        let mime = rest.split(';').next().unwrap_or("image");
        return format!("inline {mime}");
    }
    url.to_string()
}

/// Convenience for callers holding raw persisted props.
pub fn resolve_value(component: ComponentId, props: Value) -> Projection {
    resolve(&A2uiPayload::new(component, props))
}
