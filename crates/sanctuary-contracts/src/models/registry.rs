use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Chat and style-choice replies.
    Text,
    /// Image analysis.
    Vision,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Vision => "vision",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn by_provider(&self, provider: &str, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.provider == provider && model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.to_vec(),
            },
        );
    };

    let multimodal = [Capability::Text, Capability::Vision];
    insert("gemini-3-flash-preview", "gemini", &multimodal);
    insert("gemini-2.5-flash", "gemini", &multimodal);
    insert("gemini-3-pro-preview", "gemini", &multimodal);
    insert("dryrun-text-1", "dryrun", &[Capability::Text]);
    insert("dryrun-vision-1", "dryrun", &[Capability::Vision]);

    map
}

#[cfg(test)]
mod tests {
    use super::{Capability, ModelRegistry};

    #[test]
    fn dryrun_models_split_by_capability() {
        let registry = ModelRegistry::new(None);
        let vision: Vec<String> = registry
            .by_provider("dryrun", Capability::Vision)
            .into_iter()
            .map(|model| model.name)
            .collect();
        assert_eq!(vision, vec!["dryrun-vision-1".to_string()]);
        assert!(registry.ensure("dryrun-text-1", Capability::Vision).is_none());
        assert_eq!(registry.by_capability(Capability::Vision).len(), 4);
    }
}
