use crate::stream::ChunkStream;
use crate::types::{Model, PromptContext, Response};
use crate::Error;

/// The contract every backend adapter satisfies.
///
/// Adapters are stateless configuration holders (host, credentials,
/// timeout); every call allocates its own buffers, so concurrent calls to
/// one adapter need no synchronization.
#[async_trait::async_trait]
pub trait Provider: std::fmt::Debug + Send + Sync + 'static {
    /// Registry alias of this backend.
    fn name(&self) -> &str;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Probe a lightweight vendor endpoint with a bounded timeout.
    /// Reduces every failure (network, auth, timeout) to `false`.
    async fn is_available(&self) -> bool;

    /// Fetch the backend's current model listing. Sorted by recency where
    /// the vendor reports it; exactly one entry is flagged as the default.
    async fn list_models(&self) -> Result<Vec<Model>, Error>;

    /// Whether `model` appears in the backend's live model list. Always
    /// re-queries the vendor; listings are never cached.
    async fn validate_model(&self, model: &str) -> Result<bool, Error> {
        Ok(self.list_models().await?.iter().any(|m| m.name == model))
    }

    /// Generate a buffered completion.
    async fn generate(&self, ctx: &PromptContext) -> Result<Response, Error>;

    /// Generate a streamed completion: zero or more content chunks
    /// followed by exactly one terminal chunk carrying final usage.
    async fn generate_streaming(&self, ctx: &PromptContext) -> Result<ChunkStream, Error>;
}
