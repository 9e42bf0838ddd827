use crate::types::Usage;
use serde_json::{Map, Value};

/// One increment of a streaming response. Ephemeral: delivered in vendor
/// emission order and never retained past delivery.
///
/// Exactly one chunk per streaming call has `done == true`; it carries the
/// final aggregated usage, and no content chunk follows it.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub text: String,
    pub done: bool,
    /// Final aggregated usage; set only on the terminal chunk.
    pub usage: Option<Usage>,
    pub metadata: Option<Map<String, Value>>,
}

impl StreamChunk {
    /// A content increment.
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
            usage: None,
            metadata: None,
        }
    }

    /// The terminal chunk, carrying final aggregated usage.
    pub fn terminal(usage: Usage) -> Self {
        Self {
            text: String::new(),
            done: true,
            usage: Some(usage),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
