use super::types::{
    ChatMessage, ChatRequest, ChatResponse, ModelsResponse, StreamFrame, StreamOptions,
};
use crate::line_stream::{sse_data, LineStream, SSE_DONE};
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

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Adapter for the OpenAI-compatible chat-completions REST API.
#[derive(Debug)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl OpenAIProvider {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self, Error> {
        let api_key = descriptor
            .credentials
            .clone()
            .ok_or_else(|| Error::auth("openai: API key required"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        Ok(Self {
            client,
            api_key,
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
    ) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &ctx.prompt,
            }],
            temperature: Some(ctx.options.temperature),
            top_p: ctx.options.top_p,
            max_tokens: ctx.options.max_tokens,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
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
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(PROVIDER, status, &body));
        }

        let listing: ModelsResponse = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let mut entries = listing.data;
        // Newest first by creation timestamp.
        entries.sort_by(|a, b| b.created.cmp(&a.created));

        let mut models: Vec<Model> = entries
            .into_iter()
            .map(|entry| {
                let mut model = Model::new(entry.id);
                if let Some(created) = entry.created {
                    model.metadata.insert("created".into(), created.into());
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
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api(PROVIDER, "no choices in completion"))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(Error::safety("openai: completion blocked by content filter"));
        }

        let content = choice
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::api(PROVIDER, "empty completion"))?;

        let mut result = Response::new(content, completion.model.unwrap_or(model), PROVIDER);
        if let Some(usage) = completion.usage {
            result.usage = Some(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }
        if let Some(reason) = choice.finish_reason {
            result.metadata.insert("finish_reason".into(), reason.into());
        }
        Ok(result)
    }

    async fn generate_streaming(&self, ctx: &PromptContext) -> Result<ChunkStream, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx, &model, true);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

/// Build the normalized chunk sequence from a raw SSE body stream.
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

/// Decode one SSE line. The `[DONE]` sentinel is the terminal signal;
/// the usage-bearing chunk that precedes it has no choices. Lines without
/// a `data:` prefix are keep-alives or event names and are ignored.
fn decode_line(line: &str, usage: &UsageAccumulator) -> Option<Result<StreamChunk, Error>> {
    let data = sse_data(line)?;

    if data.trim() == SSE_DONE {
        return Some(Ok(StreamChunk::terminal(usage.snapshot())));
    }

    let frame: StreamFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!(provider = PROVIDER, %line, "skipping unparseable stream event");
            return None;
        }
    };

    if let Some(api_usage) = frame.usage {
        usage.record_prompt_tokens(api_usage.prompt_tokens);
        usage.record_completion_tokens(api_usage.completion_tokens);
    }

    let text = frame.choices.into_iter().next()?.delta.content?;
    if text.is_empty() {
        None
    } else {
        Some(Ok(StreamChunk::delta(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const PAYLOAD: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\ndata: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":5,\"total_tokens\":8}}\n\ndata: [DONE]\n\n";

    async fn run(payload: &str, chunk_size: usize) -> (String, Usage, usize) {
        let bytes: Vec<Result<bytes::Bytes, std::io::Error>> = payload
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();

        let mut chunks = chunk_stream(stream::iter(bytes));
        let mut content = String::new();
        let mut terminals = 0;
        let mut usage = Usage::default();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.unwrap();
            content.push_str(&chunk.text);
            if chunk.done {
                terminals += 1;
                usage = chunk.usage.unwrap();
            }
        }
        (content, usage, terminals)
    }

    #[tokio::test]
    async fn test_sse_content_and_usage() {
        let (content, usage, terminals) = run(PAYLOAD, PAYLOAD.len()).await;
        assert_eq!(content, "Hello");
        assert_eq!(usage, Usage::new(3, 5));
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_arbitrary_chunk_boundaries_match_whole_payload() {
        let (whole_content, whole_usage, _) = run(PAYLOAD, PAYLOAD.len()).await;
        for chunk_size in [1, 2, 3, 5, 7, 16, 64] {
            let (content, usage, terminals) = run(PAYLOAD, chunk_size).await;
            assert_eq!(content, whole_content, "chunk size {chunk_size}");
            assert_eq!(usage, whole_usage, "chunk size {chunk_size}");
            assert_eq!(terminals, 1, "chunk size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn test_no_chunks_processed_after_done_sentinel() {
        // Trailing bytes arriving in the same network read as [DONE]
        // must never surface.
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"stale\"},\"finish_reason\":null}]}\n\n";
        let (content, _, terminals) = run(payload, payload.len()).await;
        assert_eq!(content, "ok");
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_keep_alive_and_event_lines_ignored() {
        let payload = ": keep-alive\n\nevent: chunk\ndata: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
        let (content, _, terminals) = run(payload, payload.len()).await;
        assert_eq!(content, "hi");
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_done_sentinel_without_final_newline() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}]}\n\ndata: [DONE]";
        let (content, _, terminals) = run(payload, payload.len()).await;
        assert_eq!(content, "hi");
        assert_eq!(terminals, 1);
    }

    #[test]
    fn test_request_serialization() {
        let ctx = PromptContext::new("hello").with_temperature(0.2);
        let descriptor = ProviderDescriptor::new(crate::types::ProviderKind::OpenAi)
            .with_credentials("sk-test");
        let provider = OpenAIProvider::new(&descriptor).unwrap();

        let request = provider.build_request(&ctx, "gpt-4o-mini", true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);

        let request = provider.build_request(&ctx, "gpt-4o-mini", false);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("stream_options").is_none());
    }

    #[test]
    fn test_missing_credentials_is_auth_error() {
        let descriptor = ProviderDescriptor::new(crate::types::ProviderKind::OpenAi);
        let err = OpenAIProvider::new(&descriptor).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Auth);
    }
}
