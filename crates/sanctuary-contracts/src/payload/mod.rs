mod extract;
mod normalise;
pub mod policy;
mod scan;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::components::ComponentId;

pub use extract::{extract_json_object, strip_json, Extracted, ExtractionStrategy, EXTRACTION_ORDER};
pub use normalise::{
    fallback_payload, find_payload, normalise_model_output, normalise_tool_payload,
    payload_from_object, payload_from_value, unwrap_props, validate, Normalised, Origin, Rejection,
};
pub use policy::FramingPolicy;
pub use scan::{
    format_score, normalise_scan_choice, ScanAnalysis, ScanFraming, ENCRYPTION_ERROR_LINES,
    UNKNOWN_TARGET,
};

/// A component name plus its props, as dispatched to the room wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2uiPayload {
    pub component: ComponentId,
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl A2uiPayload {
    /// Non-object props are replaced by an empty map.
    pub fn new(component: ComponentId, props: Value) -> Self {
        let props = match props {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        Self { component, props }
    }

    pub fn from_props<T: Serialize>(component: ComponentId, props: &T) -> Self {
        Self::new(
            component,
            serde_json::to_value(props).unwrap_or(Value::Null),
        )
    }

    pub fn props_value(&self) -> Value {
        Value::Object(self.props.clone())
    }

    /// Props serialized the way room records store them.
    pub fn props_json(&self) -> String {
        self.props_value().to_string()
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "component": self.component.as_str(),
            "props": self.props_value(),
        })
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::A2uiPayload;
    use crate::components::ComponentId;

    #[test]
    fn non_object_props_become_empty() {
        let payload = A2uiPayload::new(ComponentId::BunkerSimulation, json!("nope"));
        assert!(payload.props.is_empty());
        assert_eq!(payload.props_json(), "{}");
    }

    #[test]
    fn wire_shape_uses_component_name() {
        let payload = A2uiPayload::new(ComponentId::SystemAlert, json!({"message": "m"}));
        assert_eq!(
            payload.to_value(),
            json!({"component": "SystemAlert", "props": {"message": "m"}})
        );
    }
}
