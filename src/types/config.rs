use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default timeout for generation requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The closed set of supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local model server (NDJSON streaming).
    Ollama,
    /// OpenAI-compatible chat-completions API (SSE, `[DONE]` sentinel).
    OpenAi,
    /// Hosted generative-language API (SSE, per-candidate finish reasons).
    Gemini,
    /// Messages-style API (SSE, typed terminal events).
    Anthropic,
}

impl ProviderKind {
    /// Registry alias for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Parse a registry alias.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "ollama" => Some(ProviderKind::Ollama),
            "openai" => Some(ProviderKind::OpenAi),
            "gemini" => Some(ProviderKind::Gemini),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    /// All supported backends, in registry order.
    pub fn all() -> [ProviderKind; 4] {
        [
            ProviderKind::Ollama,
            ProviderKind::OpenAi,
            ProviderKind::Gemini,
            ProviderKind::Anthropic,
        ]
    }

    /// Whether this backend needs an API key to be configured at all.
    /// The local model server does not authenticate.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

/// Static configuration for one backend. Created once at startup,
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// API key for hosted backends; `None` for the local server.
    pub credentials: Option<String>,
    /// Override for the vendor base URL (used by tests and self-hosted
    /// deployments).
    pub base_url: Option<String>,
    /// Override for the adapter's built-in default model.
    pub default_model: Option<String>,
    /// Bound on connect/initial-response time for generation requests.
    pub timeout: Duration,
}

impl ProviderDescriptor {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            credentials: None,
            base_url: None,
            default_model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a descriptor for one backend from the conventional
    /// environment variables (`GEMINI_API_KEY`, `OPENAI_API_KEY`,
    /// `ANTHROPIC_API_KEY`, `OLLAMA_HOST`).
    pub fn from_env(kind: ProviderKind) -> Self {
        let mut descriptor = Self::new(kind);
        match kind {
            ProviderKind::Ollama => {
                if let Ok(host) = env::var("OLLAMA_HOST") {
                    descriptor.base_url = Some(host);
                }
            }
            ProviderKind::OpenAi => descriptor.credentials = env::var("OPENAI_API_KEY").ok(),
            ProviderKind::Gemini => descriptor.credentials = env::var("GEMINI_API_KEY").ok(),
            ProviderKind::Anthropic => descriptor.credentials = env::var("ANTHROPIC_API_KEY").ok(),
        }
        descriptor
    }

    /// Descriptors for every supported backend, credentials filled from
    /// the environment where present.
    pub fn all_from_env() -> Vec<ProviderDescriptor> {
        ProviderKind::all().iter().map(|k| Self::from_env(*k)).collect()
    }
}

/// Token usage accounting. Totals are internally consistent:
/// `total_tokens = prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
