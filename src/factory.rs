use crate::provider::Provider;
use crate::providers::{AnthropicProvider, GeminiProvider, OllamaProvider, OpenAIProvider};
use crate::types::{ProviderDescriptor, ProviderKind};
use crate::Error;

/// Factory for creating provider adapters.
///
/// The set of backends is closed: each [`ProviderKind`] is bound to one
/// concrete constructor taking the descriptor, so adding a backend means
/// adding an enum variant and an arm here.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create an adapter from a descriptor. Hosted backends fail with an
    /// `auth`-kind error when the descriptor carries no credentials.
    pub fn create(descriptor: &ProviderDescriptor) -> Result<Box<dyn Provider>, Error> {
        match descriptor.kind {
            ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(descriptor)?)),
            ProviderKind::OpenAi => Ok(Box::new(OpenAIProvider::new(descriptor)?)),
            ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(descriptor)?)),
            ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(descriptor)?)),
        }
    }
}
