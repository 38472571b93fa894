use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("fenced json pattern"));

/// One way of locating a JSON object inside free model text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Contents of the first fenced code block.
    FencedJson,
    /// Greedy span from the first `{` to the last `}`.
    BraceSpan,
}

/// Strategies are tried in this order; the first to yield an object wins.
pub const EXTRACTION_ORDER: [ExtractionStrategy; 2] =
    [ExtractionStrategy::FencedJson, ExtractionStrategy::BraceSpan];

impl ExtractionStrategy {
    pub fn candidate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        match self {
            ExtractionStrategy::FencedJson => FENCED_JSON
                .captures(raw)
                .and_then(|caps| caps.get(1))
                .map(|body| body.as_str().trim())
                .filter(|body| !body.is_empty()),
            ExtractionStrategy::BraceSpan => {
                let start = raw.find('{')?;
                let end = raw.rfind('}')?;
                (end > start).then(|| &raw[start..=end])
            }
        }
    }

    pub fn extract(&self, raw: &str) -> Option<Map<String, Value>> {
        let candidate = self.candidate(raw)?;
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub object: Map<String, Value>,
    pub strategy: ExtractionStrategy,
}

pub fn extract_json_object(raw: &str) -> Option<Extracted> {
    if raw.trim().is_empty() {
        return None;
    }
    EXTRACTION_ORDER.iter().find_map(|strategy| {
        strategy.extract(raw).map(|object| Extracted {
            object,
            strategy: *strategy,
        })
    })
}

/// Removes fenced blocks and the brace span, leaving the prose around them.
pub fn strip_json(raw: &str) -> String {
    let without_fences = FENCED_JSON.replace_all(raw, "");
    let text = without_fences.as_ref();
    let cleaned = match ExtractionStrategy::BraceSpan.candidate(text) {
        Some(span) => text.replacen(span, "", 1),
        None => text.to_string(),
    };
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_json_object, strip_json, ExtractionStrategy};

    #[test]
    fn fenced_block_wins_over_later_braces() {
        let raw = "Here you go:\n```json\n{\"component\": \"A\"}\n```\nand {\"component\": \"B\"}";
        let extracted = extract_json_object(raw).map(|found| (found.strategy, found.object));
        let (strategy, object) = extracted.unwrap_or((ExtractionStrategy::BraceSpan, Default::default()));
        assert_eq!(strategy, ExtractionStrategy::FencedJson);
        assert_eq!(object["component"], json!("A"));
    }

    #[test]
    fn fence_tag_is_case_insensitive() {
        let raw = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(
            ExtractionStrategy::FencedJson
                .extract(raw)
                .map(|object| object["a"].clone()),
            Some(json!(1))
        );
    }

    #[test]
    fn bare_object_is_found_inside_prose() {
        let raw = "The deck glows. {\"component\": \"SystemAlert\", \"props\": {\"message\": \"x\"}} Stay calm.";
        let found = extract_json_object(raw);
        assert_eq!(
            found.as_ref().map(|found| found.strategy),
            Some(ExtractionStrategy::BraceSpan)
        );
        assert_eq!(
            found.map(|found| found.object["component"].clone()),
            Some(json!("SystemAlert"))
        );
    }

    #[test]
    fn broken_fence_falls_through_to_brace_span() {
        let raw = "```json\nnot json at all\n``` but later {\"ok\": true}";
        let found = extract_json_object(raw);
        assert_eq!(
            found.map(|found| (found.strategy, found.object["ok"].clone())),
            Some((ExtractionStrategy::BraceSpan, json!(true)))
        );
    }

    #[test]
    fn malformed_or_empty_text_yields_nothing() {
        assert!(extract_json_object("").is_none());
        assert!(extract_json_object("   ").is_none());
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("{\"unterminated\": ").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn strip_json_keeps_prose() {
        assert_eq!(
            strip_json("Updating the wall.\n```json\n{\"a\": 1}\n```"),
            "Updating the wall."
        );
        assert_eq!(strip_json("Before {\"a\": 1} after"), "Before  after");
        assert_eq!(strip_json("{\"a\": 1}"), "");
    }
}
