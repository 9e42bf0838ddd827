use super::types::{
    MessagesRequest, MessagesResponse, ModelsResponse, RequestMessage, StreamEvent,
};
use crate::line_stream::{sse_data, LineStream};
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

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Adapter for the messages-style REST API. Authenticates with an API key
/// header plus a pinned API version header.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self, Error> {
        let api_key = descriptor
            .credentials
            .clone()
            .ok_or_else(|| Error::auth("anthropic: API key required"))?;

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
    ) -> MessagesRequest<'a> {
        MessagesRequest {
            model,
            max_tokens: ctx.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![RequestMessage {
                role: "user",
                content: &ctx.prompt,
            }],
            temperature: Some(ctx.options.temperature),
            top_p: ctx.options.top_p,
            top_k: ctx.options.top_k,
            stream,
        }
    }

    fn request_builder(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
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
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .query(&[("limit", "1")])
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
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
        // Newest first; `created_at` is RFC 3339.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut models: Vec<Model> = entries
            .into_iter()
            .map(|entry| {
                let mut model = Model::new(entry.id);
                model.display_name = entry.display_name;
                if let Some(created) = entry.created_at {
                    model.metadata.insert("created_at".into(), created.into());
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
            .request_builder(format!("{}/messages", self.base_url))
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

        let completion: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        let content: String = completion
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(Error::api(PROVIDER, "empty completion"));
        }

        let mut result = Response::new(content, completion.model.unwrap_or(model), PROVIDER);
        if let Some(usage) = completion.usage {
            result.usage = Some(Usage::new(usage.input_tokens, usage.output_tokens));
        }
        if let Some(reason) = completion.stop_reason {
            result.metadata.insert("stop_reason".into(), reason.into());
        }
        Ok(result)
    }

    async fn generate_streaming(&self, ctx: &PromptContext) -> Result<ChunkStream, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx, &model, true);

        let response = self
            .request_builder(format!("{}/messages", self.base_url))
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

/// Decode one SSE line. Usage arrives split across event types
/// (`message_start` input count, `message_delta` cumulative output count);
/// `message_stop` is the terminal signal. `event:` lines, pings, and
/// unknown event types are ignored.
fn decode_line(line: &str, usage: &UsageAccumulator) -> Option<Result<StreamChunk, Error>> {
    let data = sse_data(line)?;

    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(_) => {
            tracing::debug!(provider = PROVIDER, %line, "skipping unparseable stream event");
            return None;
        }
    };

    match event {
        StreamEvent::MessageStart { message } => {
            if let Some(api_usage) = message.usage {
                usage.record_prompt_tokens(api_usage.input_tokens);
                usage.record_completion_tokens(api_usage.output_tokens);
            }
            None
        }
        StreamEvent::ContentBlockDelta { delta } => {
            let text = delta.text?;
            if text.is_empty() {
                None
            } else {
                Some(Ok(StreamChunk::delta(text)))
            }
        }
        StreamEvent::MessageDelta { usage: api_usage } => {
            if let Some(api_usage) = api_usage {
                usage.record_completion_tokens(api_usage.output_tokens);
            }
            None
        }
        StreamEvent::MessageStop => Some(Ok(StreamChunk::terminal(usage.snapshot()))),
        StreamEvent::Error { error } => Some(Err(Error::api(PROVIDER, error.message))),
        StreamEvent::Ignored => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const PAYLOAD: &str = "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\nevent: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\nevent: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":5}}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";

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
    async fn test_event_sequence_decodes() {
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
    async fn test_ping_events_ignored() {
        let payload = "event: ping\ndata: {\"type\":\"ping\"}\n\nevent: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";
        let (content, _, terminals) = run(payload, payload.len()).await;
        assert_eq!(content, "");
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_error_event_surfaces_as_api_error() {
        let payload = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let bytes: Vec<Result<bytes::Bytes, std::io::Error>> =
            vec![Ok(bytes::Bytes::from(payload.to_string()))];
        let mut chunks = chunk_stream(stream::iter(bytes));
        let err = chunks.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Api);
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn test_request_serialization() {
        let ctx = PromptContext::new("hi");
        let descriptor = ProviderDescriptor::new(crate::types::ProviderKind::Anthropic)
            .with_credentials("key");
        let provider = AnthropicProvider::new(&descriptor).unwrap();

        let json = serde_json::to_value(provider.build_request(&ctx, "claude-3-5-sonnet-20241022", true)).unwrap();
        assert_eq!(json["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], true);
    }
}
