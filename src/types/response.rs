use crate::types::Usage;
use serde_json::{Map, Value};

/// Terminal result of a non-streaming generation.
#[derive(Debug, Clone)]
pub struct Response {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    /// Registry alias of the backend that served the request.
    pub provider: String,
    /// Token accounting, where the vendor reports it.
    pub usage: Option<Usage>,
    /// Extra vendor fields (finish reason, durations, ...).
    pub metadata: Map<String, Value>,
}

impl Response {
    pub fn new(
        content: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            usage: None,
            metadata: Map::new(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}
