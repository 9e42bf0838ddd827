//! Adapter implementations for the supported backends.

use std::time::Duration;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

// Re-export commonly used provider types
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Bound on availability probes; a healthy backend answers its listing
/// endpoint well within this.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
