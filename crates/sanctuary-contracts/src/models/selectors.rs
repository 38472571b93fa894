use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Picks `requested` when it supports `capability`, otherwise the first
    /// model for the capability, preferring `provider` when given.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
        provider: Option<&str>,
    ) -> Result<ModelSelection, String> {
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (Some("No model specified; using default.".to_string()), None)
        };

        let preferred = provider
            .map(|name| self.registry.by_provider(name, capability))
            .unwrap_or_default();
        let candidates = if preferred.is_empty() {
            self.registry.by_capability(capability)
        } else {
            preferred
        };
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{Capability, ModelRegistry, ModelSpec};

    fn spec(name: &str, provider: &str, capabilities: &[Capability]) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    fn selector(models: &[ModelSpec]) -> ModelSelector {
        let mut map = IndexMap::new();
        for model in models {
            map.insert(model.name.clone(), model.clone());
        }
        ModelSelector::new(Some(ModelRegistry::new(Some(map))))
    }

    #[test]
    fn falls_back_when_requested_model_unavailable() -> Result<(), String> {
        let selection = selector(&[spec("vision-a", "gemini", &[Capability::Vision])])
            .select(Some("missing"), Capability::Vision, None)?;
        assert_eq!(selection.model.name, "vision-a");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'vision'.")
        );
        Ok(())
    }

    #[test]
    fn text_only_model_is_not_used_for_vision() -> Result<(), String> {
        let selection = selector(&[
            spec("text-a", "gemini", &[Capability::Text]),
            spec("vision-b", "gemini", &[Capability::Vision]),
        ])
        .select(Some("text-a"), Capability::Vision, None)?;
        assert_eq!(selection.model.name, "vision-b");
        Ok(())
    }

    #[test]
    fn provider_preference_orders_defaults() -> Result<(), String> {
        let selection = selector(&[
            spec("gemini-text", "gemini", &[Capability::Text]),
            spec("dryrun-text", "dryrun", &[Capability::Text]),
        ])
        .select(None, Capability::Text, Some("dryrun"))?;
        assert_eq!(selection.model.name, "dryrun-text");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        Ok(())
    }

    #[test]
    fn errors_when_no_models_for_capability() {
        let err = selector(&[spec("text-only", "dryrun", &[Capability::Text])])
            .select(None, Capability::Vision, None)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'vision'.");
    }

    #[test]
    fn default_registry_serves_both_capabilities() -> Result<(), String> {
        let selector = ModelSelector::new(None);
        assert_eq!(
            selector.select(None, Capability::Vision, Some("gemini"))?.model.name,
            "gemini-3-flash-preview"
        );
        assert_eq!(
            selector.select(None, Capability::Text, Some("dryrun"))?.model.name,
            "dryrun-text-1"
        );
        Ok(())
    }
}
