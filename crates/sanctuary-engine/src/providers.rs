use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use sanctuary_contracts::models::{Capability, ModelSelector};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::SanctuaryConfig;

#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub model: String,
    pub prompt: String,
    pub mime_type: String,
    pub image_base64: String,
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the provider for a JSON-only reply.
    pub json_mode: bool,
}

/// A model backend. Both calls return the raw reply text; callers own parsing.
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn analyse_image(&self, request: &VisionRequest) -> Result<String>;
    fn generate_text(&self, request: &TextRequest) -> Result<String>;
}

#[derive(Default, Clone)]
pub struct ModelProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ModelProvider>>,
}

impl ModelProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dryrun always; gemini too, which fails per call when no key is set.
    pub fn with_defaults(config: &SanctuaryConfig) -> Self {
        let mut registry = Self::new();
        registry.register(DryrunProvider);
        registry.register(GeminiProvider::from_config(config));
        registry
    }

    pub fn register<P: ModelProvider + 'static>(&mut self, provider: P) {
        self.register_shared(Arc::new(provider));
    }

    pub fn register_shared(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// A provider bound to one model name.
#[derive(Clone)]
pub struct ModelRoute {
    pub provider: Arc<dyn ModelProvider>,
    pub model: String,
}

impl std::fmt::Debug for ModelRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRoute")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

impl ModelRoute {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Picks a model for `capability` and binds it to its registered provider.
    pub fn select(
        registry: &ModelProviderRegistry,
        selector: &ModelSelector,
        requested: Option<&str>,
        capability: Capability,
        preferred_provider: Option<&str>,
    ) -> Result<Self> {
        let selection = selector
            .select(requested, capability, preferred_provider)
            .map_err(anyhow::Error::msg)?;
        if let (Some(reason), Some(_)) = (&selection.fallback_reason, &selection.requested) {
            tracing::warn!("{reason} Using {}.", selection.model.name);
        }
        let Some(provider) = registry.get(&selection.model.provider) else {
            bail!(
                "no provider registered for '{}' (model {})",
                selection.model.provider,
                selection.model.name
            );
        };
        Ok(Self::new(provider, selection.model.name))
    }

    pub fn analyse_image(&self, prompt: &str, mime_type: &str, image_base64: &str) -> Result<String> {
        self.provider.analyse_image(&VisionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            mime_type: mime_type.to_string(),
            image_base64: image_base64.to_string(),
        })
    }

    pub fn generate_text(&self, system: Option<&str>, prompt: &str, json_mode: bool) -> Result<String> {
        self.provider.generate_text(&TextRequest {
            model: self.model.clone(),
            system: system.map(str::to_string),
            prompt: prompt.to_string(),
            json_mode,
        })
    }
}

/// Offline provider with deterministic replies.
pub struct DryrunProvider;

impl ModelProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn analyse_image(&self, request: &VisionRequest) -> Result<String> {
        let digest = Sha256::digest(request.image_base64.as_bytes());
        let score = u32::from(digest[0]) * 100 / 255;
        let rooms = ["control_room", "study", "workshop", "the_deck"];
        let room = rooms[usize::from(digest[1]) % rooms.len()];
        let verdict = if score < 50 {
            "DIVERGENCE DETECTED."
        } else {
            "ALIGNMENT NOMINAL."
        };
        Ok(json!({
            "scan_target": "DRYRUN SPECIMEN",
            "telemetry_lines": [
                format!("CHECKSUM: {}", hex::encode(&digest[..4]).to_uppercase()),
                "UPLINK: OFFLINE",
                "ORIGIN: LOCAL FIXTURE",
            ],
            "alignment_score": score,
            "verdict": verdict,
            "room_vibe": room,
            "document_detected": false,
        })
        .to_string())
    }

    fn generate_text(&self, request: &TextRequest) -> Result<String> {
        if request.json_mode {
            return Ok(json!({
                "component": "BunkerTerminal",
                "props": {},
            })
            .to_string());
        }
        let echo = request
            .prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("USER PROMPT: "))
            .unwrap_or(request.prompt.as_str());
        Ok(format!("Dryrun uplink received: {}", truncate_text(echo.trim(), 120)))
    }
}

/// Gemini `generateContent` over blocking HTTP.
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &SanctuaryConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.request_timeout,
        )
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: &Value) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let parsed = response_json_or_error("Gemini", response)?;
        extract_gemini_text(&parsed)
    }
}

impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn analyse_image(&self, request: &VisionRequest) -> Result<String> {
        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": request.prompt },
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": request.image_base64,
                        }
                    }
                ]
            }],
            "generationConfig": {
                "temperature": 0.2,
                "maxOutputTokens": 2048,
                "responseMimeType": "application/json",
            }
        });
        self.post(&request.model, &payload)
    }

    fn generate_text(&self, request: &TextRequest) -> Result<String> {
        let mut payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
        });
        if let Some(map) = payload.as_object_mut() {
            if let Some(system) = request.system.as_deref() {
                map.insert(
                    "systemInstruction".to_string(),
                    json!({ "parts": [{ "text": system }] }),
                );
            }
            if request.json_mode {
                map.insert(
                    "generationConfig".to_string(),
                    json!({ "responseMimeType": "application/json" }),
                );
            }
        }
        self.post(&request.model, &payload)
    }
}

/// Text of the first candidate's parts, joined.
pub fn extract_gemini_text(response: &Value) -> Result<String> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("");
    if text.trim().is_empty() {
        bail!("Gemini returned no text");
    }
    Ok(text)
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use sanctuary_contracts::models::ModelSelector;
    use sanctuary_contracts::payload::ScanAnalysis;

    use super::*;

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let provider = GeminiProvider::new("https://example.test/v1beta/", None, Duration::from_secs(1));
        assert_eq!(
            provider.endpoint_for_model("gemini-3-flash-preview"),
            "https://example.test/v1beta/models/gemini-3-flash-preview:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model("models/gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let provider = GeminiProvider::new("http://127.0.0.1:9", None, Duration::from_secs(1));
        let err = provider
            .generate_text(&TextRequest {
                model: "gemini-2.5-flash".to_string(),
                system: None,
                prompt: "hi".to_string(),
                json_mode: false,
            })
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn gemini_text_is_read_from_first_candidate() -> Result<()> {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]
        });
        assert_eq!(extract_gemini_text(&response)?, "{\"a\":1}");
        assert!(extract_gemini_text(&json!({"candidates": []})).is_err());
        Ok(())
    }

    #[test]
    fn dryrun_analysis_parses_as_a_scan() -> Result<()> {
        let raw = DryrunProvider.analyse_image(&VisionRequest {
            model: "dryrun-vision-1".to_string(),
            prompt: String::new(),
            mime_type: "image/jpeg".to_string(),
            image_base64: "AAAA".to_string(),
        })?;
        let analysis = ScanAnalysis::from_model_text(&raw);
        assert!(!analysis.is_unreadable());
        assert_eq!(analysis.scan_target, "DRYRUN SPECIMEN");
        assert!(analysis.room_vibe.is_some());
        Ok(())
    }

    #[test]
    fn routes_bind_selected_model_to_its_provider() -> Result<()> {
        let config = SanctuaryConfig::default();
        let registry = ModelProviderRegistry::with_defaults(&config);
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        let selector = ModelSelector::new(None);
        let route = ModelRoute::select(&registry, &selector, None, Capability::Vision, Some("dryrun"))?;
        assert_eq!(route.model, "dryrun-vision-1");
        assert_eq!(route.provider.name(), "dryrun");
        let text = ModelRoute::select(
            &registry,
            &selector,
            Some("gemini-2.5-flash"),
            Capability::Text,
            Some("dryrun"),
        )?;
        assert_eq!(text.provider.name(), "gemini");
        Ok(())
    }

    #[test]
    fn long_bodies_are_truncated() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
