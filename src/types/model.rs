use serde_json::{Map, Value};

/// A model advertised by a backend's listing endpoint. Listings are
/// re-fetched on every query, never cached.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub display_name: Option<String>,
    /// On-disk size in bytes, where the vendor reports it.
    pub size: Option<u64>,
    /// Exactly one model per listing is flagged as the backend default.
    pub is_default: bool,
    /// Extra vendor-specific listing fields (timestamps, families, ...).
    pub metadata: Map<String, Value>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            size: None,
            is_default: false,
            metadata: Map::new(),
        }
    }
}

/// Flag the backend's default model in a freshly fetched listing.
///
/// Prefers an exact name match against the configured default; falls back
/// to the first model sharing the default's base name (the part before a
/// `:` tag, so `gpt-oss:latest` still matches `gpt-oss:20b`).
pub(crate) fn mark_default_model(models: &mut [Model], default: &str) {
    if let Some(model) = models.iter_mut().find(|m| m.name == default) {
        model.is_default = true;
        return;
    }
    let base = default.split(':').next().unwrap_or(default);
    if let Some(model) = models.iter_mut().find(|m| m.name.starts_with(base)) {
        model.is_default = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_default_exact_match() {
        let mut models = vec![Model::new("llama3:8b"), Model::new("gpt-oss:latest")];
        mark_default_model(&mut models, "gpt-oss:latest");
        assert!(!models[0].is_default);
        assert!(models[1].is_default);
    }

    #[test]
    fn test_mark_default_prefix_fallback() {
        let mut models = vec![Model::new("llama3:8b"), Model::new("gpt-oss:20b")];
        mark_default_model(&mut models, "gpt-oss:latest");
        assert!(models[1].is_default);
    }

    #[test]
    fn test_mark_default_flags_at_most_one() {
        let mut models = vec![Model::new("gpt-oss:20b"), Model::new("gpt-oss:120b")];
        mark_default_model(&mut models, "gpt-oss:latest");
        let defaults = models.iter().filter(|m| m.is_default).count();
        assert_eq!(defaults, 1);
    }

    #[test]
    fn test_mark_default_no_match() {
        let mut models = vec![Model::new("llama3:8b")];
        mark_default_model(&mut models, "gpt-oss:latest");
        assert!(models.iter().all(|m| !m.is_default));
    }
}
