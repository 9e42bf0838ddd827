use crate::factory::ProviderFactory;
use crate::format;
use crate::provider::Provider;
use crate::stream::ChunkStream;
use crate::types::{OutputFormat, PromptContext, ProviderDescriptor, Response};
use crate::Error;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Alias that resolves to the default backend.
pub const AUTO_ALIAS: &str = "auto";

const DEFAULT_PROVIDER: &str = "ollama";
const MAX_PROMPT_CHARS: usize = 50_000;

/// Resolves provider aliases to adapters and fronts the unified
/// call/stream entry points with pre-flight validation.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build a registry from descriptors. Hosted backends whose
    /// descriptors carry no credentials are skipped rather than failing
    /// startup; a backend whose adapter cannot be constructed is skipped
    /// with a warning.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();

        for descriptor in descriptors {
            let alias = descriptor.kind.as_str();
            if descriptor.kind.requires_credentials() && descriptor.credentials.is_none() {
                tracing::debug!(provider = alias, "no credentials configured, skipping");
                continue;
            }
            match ProviderFactory::create(&descriptor) {
                Ok(provider) => {
                    providers.insert(alias.to_string(), Arc::from(provider));
                }
                Err(e) => {
                    tracing::warn!(provider = alias, error = %e, "failed to construct adapter");
                }
            }
        }

        Self { providers }
    }

    /// Build a registry from the conventional environment variables.
    pub fn from_env() -> Self {
        Self::new(ProviderDescriptor::all_from_env())
    }

    /// Aliases of all configured backends.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve an alias to its adapter. `"auto"` resolves to the default
    /// backend.
    pub fn get(&self, alias: &str) -> Result<Arc<dyn Provider>, Error> {
        let name = if alias == AUTO_ALIAS {
            DEFAULT_PROVIDER
        } else {
            alias
        };
        self.providers.get(name).cloned().ok_or_else(|| {
            Error::api(
                "registry",
                format!(
                    "unknown provider '{name}', configured: [{}]",
                    self.provider_names().join(", ")
                ),
            )
        })
    }

    /// Generate a buffered completion, post-processed per the requested
    /// output format.
    pub async fn process_prompt(&self, ctx: &PromptContext) -> Result<Response, Error> {
        let provider = self.get(&ctx.options.provider)?;
        self.preflight(&provider, ctx).await?;

        let mut response = provider.generate(ctx).await?;
        if ctx.options.output_format == OutputFormat::Text {
            response.content = format::strip_markdown(&response.content);
        }
        Ok(response)
    }

    /// Generate a streamed completion. Streaming output is delivered as
    /// the vendor emits it, without format post-processing.
    pub async fn process_streaming_prompt(
        &self,
        ctx: &PromptContext,
    ) -> Result<ChunkStream, Error> {
        let provider = self.get(&ctx.options.provider)?;
        self.preflight(&provider, ctx).await?;
        provider.generate_streaming(ctx).await
    }

    /// Probe `is_available()` across all configured adapters. Probes run
    /// concurrently with no ordering guarantee.
    pub async fn implemented_provider_names(&self) -> HashSet<String> {
        let probes = self.providers.values().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let available = provider.is_available().await;
                (provider.name().to_string(), available)
            }
        });

        join_all(probes)
            .await
            .into_iter()
            .filter(|(_, available)| *available)
            .map(|(name, _)| name)
            .collect()
    }

    /// Reject bad prompts and unknown models before spending anything at
    /// the vendor. An explicitly requested model must appear in the
    /// backend's live model list.
    async fn preflight(
        &self,
        provider: &Arc<dyn Provider>,
        ctx: &PromptContext,
    ) -> Result<(), Error> {
        let prompt = ctx.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::api("registry", "no input provided"));
        }
        if prompt.len() > MAX_PROMPT_CHARS {
            return Err(Error::api(
                "registry",
                format!("input too long (max {MAX_PROMPT_CHARS} characters)"),
            ));
        }

        if let Some(model) = &ctx.options.model {
            if !provider.validate_model(model).await? {
                return Err(Error::model_not_found(provider.name(), model));
            }
        }
        Ok(())
    }
}
