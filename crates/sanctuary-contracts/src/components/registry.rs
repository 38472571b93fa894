use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CHECKSUM_ERROR_LINE: &str = "CHECKSUM ERROR // PACKET RECONSTRUCTION ACTIVE";
pub const RETRY_INTAKE_LINE: &str = "RETRY SIGNAL INTAKE";

/// The closed set of components the client knows how to draw.
///
/// Identifiers are persisted verbatim in `RoomStateRecord::active_component`,
/// so the serde names must never drift from [`ComponentId::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentId {
    BunkerTerminal,
    ArtifactCard,
    SystemAlert,
    ImagePanel,
    BunkerLedger,
    CortexArtifact,
    ChoiceCard,
    ResourceMonitor,
    BunkerSimulation,
}

impl ComponentId {
    pub const ALL: [ComponentId; 9] = [
        ComponentId::BunkerTerminal,
        ComponentId::ArtifactCard,
        ComponentId::SystemAlert,
        ComponentId::ImagePanel,
        ComponentId::BunkerLedger,
        ComponentId::CortexArtifact,
        ComponentId::ChoiceCard,
        ComponentId::ResourceMonitor,
        ComponentId::BunkerSimulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentId::BunkerTerminal => "BunkerTerminal",
            ComponentId::ArtifactCard => "ArtifactCard",
            ComponentId::SystemAlert => "SystemAlert",
            ComponentId::ImagePanel => "ImagePanel",
            ComponentId::BunkerLedger => "BunkerLedger",
            ComponentId::CortexArtifact => "CortexArtifact",
            ComponentId::ChoiceCard => "ChoiceCard",
            ComponentId::ResourceMonitor => "ResourceMonitor",
            ComponentId::BunkerSimulation => "BunkerSimulation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        Self::ALL.into_iter().find(|id| id.as_str() == trimmed)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(ComponentId::as_str).collect()
    }

    /// Checks `props` against this component's minimum contract.
    pub fn check_props(&self, props: &Map<String, Value>) -> Result<(), String> {
        match self {
            ComponentId::BunkerTerminal => decode_props::<TerminalProps>(props).map(|_| ()),
            ComponentId::ArtifactCard => decode_props::<ArtifactProps>(props).map(|_| ()),
            ComponentId::SystemAlert => decode_props::<AlertProps>(props).map(|_| ()),
            ComponentId::ImagePanel => decode_props::<ImagePanelProps>(props).map(|_| ()),
            ComponentId::BunkerLedger => decode_props::<LedgerProps>(props).map(|_| ()),
            ComponentId::CortexArtifact => decode_props::<CortexProps>(props).map(|_| ()),
            ComponentId::ChoiceCard => decode_props::<ChoiceProps>(props).map(|_| ()),
            ComponentId::ResourceMonitor => {
                decode_props::<ResourceMonitorProps>(props).map(|_| ())
            }
            ComponentId::BunkerSimulation => Ok(()),
        }
        .map_err(|err| format!("{} props rejected: {err}", self.as_str()))
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn decode_props<T: DeserializeOwned>(
    props: &Map<String, Value>,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(props.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Myth,
    Signal,
    Reflection,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Myth => "Myth",
            ArtifactKind::Signal => "Signal",
            ArtifactKind::Reflection => "Reflection",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "Myth" => Some(ArtifactKind::Myth),
            "Signal" => Some(ArtifactKind::Signal),
            "Reflection" => Some(ArtifactKind::Reflection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalProps {
    pub header: String,
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glitch_level: Option<f64>,
}

impl TerminalProps {
    pub fn checksum_error() -> Self {
        Self {
            header: CHECKSUM_ERROR_LINE.to_string(),
            lines: vec![
                CHECKSUM_ERROR_LINE.to_string(),
                RETRY_INTAKE_LINE.to_string(),
            ],
            glitch_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProps {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProps {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    pub show_restore_feed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePanelProps {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerProps {
    #[serde(rename = "amountGBP")]
    pub amount_gbp: f64,
    pub allocation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CortexProps {
    pub title: String,
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default)]
    pub persist_image: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceProps {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDatum {
    pub label: String,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMonitorProps {
    pub data: Vec<ResourceDatum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_spend: Option<f64>,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{ComponentId, TerminalProps};

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn every_id_round_trips_through_its_name() {
        for id in ComponentId::ALL {
            assert_eq!(ComponentId::from_name(id.as_str()), Some(id));
            assert_eq!(serde_json::to_value(id).ok(), Some(json!(id.as_str())));
        }
    }

    #[test]
    fn unknown_and_miscased_names_do_not_resolve() {
        assert_eq!(ComponentId::from_name("HoloDeck"), None);
        assert_eq!(ComponentId::from_name("bunkerterminal"), None);
        assert_eq!(ComponentId::from_name(""), None);
    }

    #[test]
    fn terminal_contract_requires_header_and_string_lines() {
        let id = ComponentId::BunkerTerminal;
        assert!(id
            .check_props(&obj(json!({"header": "H", "lines": ["a", "b"]})))
            .is_ok());
        assert!(id.check_props(&obj(json!({"lines": ["a"]}))).is_err());
        assert!(id
            .check_props(&obj(json!({"header": "H", "lines": [1, 2]})))
            .is_err());
    }

    #[test]
    fn artifact_contract_restricts_type() {
        let id = ComponentId::ArtifactCard;
        assert!(id
            .check_props(&obj(json!({"title": "t", "content": "c", "type": "Myth"})))
            .is_ok());
        let err = id
            .check_props(&obj(json!({"title": "t", "content": "c", "type": "Gossip"})))
            .err()
            .unwrap_or_default();
        assert!(err.starts_with("ArtifactCard props rejected"));
    }

    #[test]
    fn ledger_contract_uses_gbp_wire_name() {
        let id = ComponentId::BunkerLedger;
        assert!(id
            .check_props(&obj(json!({"amountGBP": 45.0, "allocation": "Provisions"})))
            .is_ok());
        assert!(id
            .check_props(&obj(json!({"amountGbp": 45.0, "allocation": "Provisions"})))
            .is_err());
    }

    #[test]
    fn simulation_accepts_empty_props() {
        assert!(ComponentId::BunkerSimulation.check_props(&Map::new()).is_ok());
    }

    #[test]
    fn checksum_error_terminal_is_itself_valid() -> anyhow::Result<()> {
        let props = serde_json::to_value(TerminalProps::checksum_error())?;
        assert!(ComponentId::BunkerTerminal.check_props(&obj(props)).is_ok());
        Ok(())
    }
}
