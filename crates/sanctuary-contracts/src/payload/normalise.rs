use std::fmt;

use serde_json::{Map, Value};

use super::extract::{extract_json_object, ExtractionStrategy};
use super::A2uiPayload;
use crate::components::{ComponentId, TerminalProps};

/// Why a model reply did not produce a renderable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoJson,
    MissingComponent,
    UnknownComponent(String),
    Props(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoJson => f.write_str("no JSON object in model output"),
            Rejection::MissingComponent => f.write_str("payload has no component"),
            Rejection::UnknownComponent(name) => write!(f, "unknown component '{name}'"),
            Rejection::Props(reason) => f.write_str(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    Model(ExtractionStrategy),
    Direct,
    Fallback(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalised {
    pub payload: A2uiPayload,
    pub origin: Origin,
}

impl Normalised {
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, Origin::Fallback(_))
    }
}

/// The constant payload substituted whenever nothing valid is available.
pub fn fallback_payload() -> A2uiPayload {
    A2uiPayload::from_props(ComponentId::BunkerTerminal, &TerminalProps::checksum_error())
}

/// Decodes a props envelope: stringified JSON is parsed, and a `ui_data`
/// member (string or object) replaces the envelope. Anything undecodable
/// becomes an empty object.
pub fn unwrap_props(raw: Option<&Value>) -> Map<String, Value> {
    let mut props = match raw {
        Some(Value::Object(object)) => object.clone(),
        Some(Value::String(text)) => parse_object(text),
        _ => Map::new(),
    };
    if let Some(ui_data) = props.get("ui_data").cloned() {
        props = match ui_data {
            Value::String(text) => parse_object(&text),
            Value::Object(object) => object,
            _ => props,
        };
    }
    props
}

fn parse_object(text: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    }
}

pub fn payload_from_value(value: &Value) -> Result<A2uiPayload, Rejection> {
    match value {
        Value::Object(object) => payload_from_object(object),
        _ => Err(Rejection::MissingComponent),
    }
}

pub fn payload_from_object(object: &Map<String, Value>) -> Result<A2uiPayload, Rejection> {
    let name = object
        .get("component")
        .and_then(Value::as_str)
        .ok_or(Rejection::MissingComponent)?;
    validate(name, object.get("props"))
}

/// Validates a component name and raw props against the registry.
pub fn validate(component: &str, props: Option<&Value>) -> Result<A2uiPayload, Rejection> {
    let Some(component) = ComponentId::from_name(component) else {
        return Err(Rejection::UnknownComponent(component.to_string()));
    };
    let props = unwrap_props(props);
    component.check_props(&props).map_err(Rejection::Props)?;
    Ok(A2uiPayload { component, props })
}

/// Turns an untrusted model reply into something renderable. Never fails.
pub fn normalise_model_output(raw: &str) -> Normalised {
    let Some(extracted) = extract_json_object(raw) else {
        return fallback(Rejection::NoJson);
    };
    match payload_from_object(&extracted.object) {
        Ok(payload) => Normalised {
            payload,
            origin: Origin::Model(extracted.strategy),
        },
        Err(rejection) => fallback(rejection),
    }
}

/// Validates a tool call's arguments, substituting the fallback on rejection.
pub fn normalise_tool_payload(component: &str, props: &Value) -> Normalised {
    match validate(component, Some(props)) {
        Ok(payload) => Normalised {
            payload,
            origin: Origin::Direct,
        },
        Err(rejection) => fallback(rejection),
    }
}

/// Like [`normalise_model_output`], but distinguishes prose with no payload
/// at all (`None`) from a payload attempt that had to be replaced.
pub fn find_payload(raw: &str) -> Option<Normalised> {
    let extracted = extract_json_object(raw)?;
    if !extracted.object.contains_key("component") {
        return None;
    }
    Some(match payload_from_object(&extracted.object) {
        Ok(payload) => Normalised {
            payload,
            origin: Origin::Model(extracted.strategy),
        },
        Err(rejection) => fallback(rejection),
    })
}

fn fallback(rejection: Rejection) -> Normalised {
    tracing::debug!("payload rejected, using fallback: {rejection}");
    Normalised {
        payload: fallback_payload(),
        origin: Origin::Fallback(rejection),
    }
}
