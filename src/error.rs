use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a provider backend.
///
/// Every variant maps to exactly one [`ErrorKind`], so callers that only
/// care about the category can match on [`Error::kind`] instead of the
/// full enum.
#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("content blocked: {0}")]
    Safety(String),

    #[error("provider error: {provider} - {message}")]
    Api { provider: String, message: String },

    #[error("streaming error: {0}")]
    Stream(String),
}

/// Category of an [`Error`], shared across every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Network,
    Timeout,
    RateLimit,
    ModelNotFound,
    Safety,
    Api,
    Stream,
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout(message.into())
    }

    pub fn safety(message: impl Into<String>) -> Self {
        Error::Safety(message.into())
    }

    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Error::Stream(message.into())
    }

    pub fn model_not_found(provider: &str, model: &str) -> Self {
        Error::ModelNotFound(format!("{provider} has no model '{model}'"))
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::RateLimit(_) => ErrorKind::RateLimit,
            Error::ModelNotFound(_) => ErrorKind::ModelNotFound,
            Error::Safety(_) => ErrorKind::Safety,
            Error::Api { .. } => ErrorKind::Api,
            Error::Stream(_) => ErrorKind::Stream,
        }
    }

    /// Map a transport-level failure from reqwest onto the taxonomy.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(format!("{provider}: {err}"))
        } else if err.is_connect() || err.is_request() {
            Error::Network(format!("{provider}: {err}"))
        } else {
            Error::api(provider, err.to_string())
        }
    }

    /// Map a non-success HTTP status (plus the raw error body) onto the
    /// taxonomy. 401/403 are credential failures, 404 is a missing model,
    /// 429 is throttling; everything else is a generic API error.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let message =
            extract_api_message(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        match status.as_u16() {
            401 | 403 => Error::Auth(format!("{provider}: {message}")),
            404 => Error::ModelNotFound(format!("{provider}: {message}")),
            429 => Error::RateLimit(format!("{provider}: {message}")),
            _ => Error::api(provider, message),
        }
    }
}

/// Pull a human-readable message out of a vendor error body.
///
/// The hosted vendors wrap it as `{"error": {"message": ...}}`; the local
/// model server uses a bare `{"error": "..."}`.
fn extract_api_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        serde_json::Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from),
    }
}
