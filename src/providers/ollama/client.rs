use super::types::{GenerateFrame, GenerateOptions, GenerateRequest, TagsResponse};
use crate::line_stream::LineStream;
use crate::provider::Provider;
use crate::providers::PROBE_TIMEOUT;
use crate::stream::{ChunkStream, UsageAccumulator};
use crate::types::{
    mark_default_model, Model, PromptContext, ProviderDescriptor, Response, StreamChunk, Usage,
};
use crate::Error;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "gpt-oss:latest";

/// Adapter for a local model server speaking the generate/tags/version
/// REST API with NDJSON streaming.
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        Ok(Self {
            client,
            base_url: descriptor
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            default_model: descriptor
                .default_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: descriptor.timeout,
        })
    }

    fn resolve_model<'a>(&'a self, ctx: &'a PromptContext) -> &'a str {
        ctx.options.model.as_deref().unwrap_or(&self.default_model)
    }

    fn build_request<'a>(
        &self,
        ctx: &'a PromptContext,
        model: &'a str,
        stream: bool,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            model,
            prompt: &ctx.prompt,
            stream,
            options: Some(GenerateOptions {
                temperature: Some(ctx.options.temperature),
                top_p: ctx.options.top_p,
                top_k: ctx.options.top_k,
                num_predict: ctx.options.max_tokens,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/version", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = PROVIDER, error = %e, "availability probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<Model>, Error> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(PROVIDER, status, &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let mut entries = tags.models;
        // Newest first; `modified_at` is RFC 3339, so lexicographic order
        // is chronological order.
        entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));

        let mut models: Vec<Model> = entries
            .into_iter()
            .map(|entry| {
                let mut model = Model::new(entry.name);
                model.size = entry.size;
                if let Some(modified) = entry.modified_at {
                    model.metadata.insert("modified_at".into(), modified.into());
                }
                model
            })
            .collect();
        mark_default_model(&mut models, &self.default_model);
        Ok(models)
    }

    async fn generate(&self, ctx: &PromptContext) -> Result<Response, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx, &model, false);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(PROVIDER, status, &body));
        }

        let frame: GenerateFrame = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        if frame.response.is_empty() {
            return Err(Error::api(PROVIDER, "empty completion"));
        }

        let mut result = Response::new(frame.response, frame.model.unwrap_or(model), PROVIDER);
        if let (Some(prompt), Some(completion)) = (frame.prompt_eval_count, frame.eval_count) {
            result.usage = Some(Usage::new(prompt, completion));
        }
        if let Some(reason) = frame.done_reason {
            result.metadata.insert("done_reason".into(), reason.into());
        }
        if let Some(duration) = frame.total_duration {
            result
                .metadata
                .insert("total_duration".into(), duration.into());
        }
        Ok(result)
    }

    async fn generate_streaming(&self, ctx: &PromptContext) -> Result<ChunkStream, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx, &model, true);

        // No per-request timeout here: the configured timeout bounds
        // connect time only, and total stream duration is unbounded.
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(PROVIDER, status, &body));
        }

        Ok(chunk_stream(response.bytes_stream()))
    }
}

/// Build the normalized chunk sequence from a raw NDJSON body stream.
fn chunk_stream<S, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + Unpin + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    let usage = Arc::new(UsageAccumulator::default());
    let decoder_usage = Arc::clone(&usage);
    let chunks = LineStream::new(bytes).filter_map(move |line| {
        let usage = Arc::clone(&decoder_usage);
        async move {
            match line {
                Ok(line) => decode_line(&line, &usage),
                Err(e) => Some(Err(e)),
            }
        }
    });
    ChunkStream::new(chunks, usage)
}

/// Decode one NDJSON line. Unparseable lines are skipped, not errors: the
/// server frames one JSON object per line, so a line that fails to parse
/// is noise rather than a split frame.
fn decode_line(line: &str, usage: &UsageAccumulator) -> Option<Result<StreamChunk, Error>> {
    let frame: GenerateFrame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!(provider = PROVIDER, %line, "skipping unparseable stream line");
            return None;
        }
    };

    if frame.done {
        if let Some(count) = frame.prompt_eval_count {
            usage.record_prompt_tokens(count);
        }
        if let Some(count) = frame.eval_count {
            usage.record_completion_tokens(count);
        }
        // Terminal frames normally carry no text; fold it in if one does
        // so no content follows the terminal chunk.
        let mut chunk = StreamChunk::terminal(usage.snapshot());
        chunk.text = frame.response;
        return Some(Ok(chunk));
    }

    if frame.response.is_empty() {
        None
    } else {
        Some(Ok(StreamChunk::delta(frame.response)))
    }
}
