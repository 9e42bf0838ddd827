use super::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ModelsResponse,
    Part,
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

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Adapter for the hosted generative-language REST API. Authenticates
/// with an API key passed as a query parameter.
#[derive(Debug)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(descriptor: &ProviderDescriptor) -> Result<Self, Error> {
        let api_key = descriptor
            .credentials
            .clone()
            .ok_or_else(|| Error::auth("gemini: API key required"))?;

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

    fn build_request<'a>(&self, ctx: &'a PromptContext) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: &ctx.prompt }],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(ctx.options.temperature),
                top_p: ctx.options.top_p,
                top_k: ctx.options.top_k,
                max_output_tokens: ctx.options.max_tokens,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
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
            .query(&[("key", self.api_key.as_str()), ("pageSize", "1")])
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
            .query(&[("key", self.api_key.as_str())])
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

        // The listing carries no timestamps; vendor order is kept.
        let mut models: Vec<Model> = listing
            .models
            .into_iter()
            .map(|entry| {
                let name = entry
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&entry.name)
                    .to_string();
                let mut model = Model::new(name);
                model.display_name = entry.display_name;
                model
            })
            .collect();
        mark_default_model(&mut models, &self.default_model);
        Ok(models)
    }

    async fn generate(&self, ctx: &PromptContext) -> Result<Response, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx);

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .query(&[("key", self.api_key.as_str())])
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

        let completion: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(PROVIDER, e))?;

        if let Some(reason) = completion
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(Error::safety(format!("gemini: prompt blocked: {reason}")));
        }

        let candidate = completion
            .candidates
            .first()
            .ok_or_else(|| Error::api(PROVIDER, "no candidates in completion"))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(Error::safety("gemini: completion blocked by safety filter"));
        }

        let content = candidate.text();
        if content.is_empty() {
            return Err(Error::api(PROVIDER, "empty completion"));
        }

        let mut result = Response::new(
            content,
            completion.model_version.unwrap_or(model),
            PROVIDER,
        );
        if let Some(metadata) = completion.usage_metadata {
            result.usage = Some(Usage::new(
                metadata.prompt_token_count.unwrap_or(0),
                metadata.candidates_token_count.unwrap_or(0),
            ));
        }
        if let Some(reason) = &candidate.finish_reason {
            result
                .metadata
                .insert("finish_reason".into(), reason.as_str().into());
        }
        Ok(result)
    }

    async fn generate_streaming(&self, ctx: &PromptContext) -> Result<ChunkStream, Error> {
        let model = self.resolve_model(ctx).to_string();
        let body = self.build_request(ctx);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent",
                self.base_url, model
            ))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
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

/// Decode one SSE line. Every frame is a full response object with
/// cumulative usage metadata; a candidate with a `finishReason` is the
/// terminal signal, with any text it carries folded into the terminal
/// chunk.
fn decode_line(line: &str, usage: &UsageAccumulator) -> Option<Result<StreamChunk, Error>> {
    let data = sse_data(line)?;

    let frame: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(_) => {
            tracing::debug!(provider = PROVIDER, %line, "skipping unparseable stream event");
            return None;
        }
    };

    if let Some(metadata) = &frame.usage_metadata {
        if let Some(count) = metadata.prompt_token_count {
            usage.record_prompt_tokens(count);
        }
        if let Some(count) = metadata.candidates_token_count {
            usage.record_completion_tokens(count);
        }
    }

    if let Some(reason) = frame
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Some(Err(Error::safety(format!(
            "gemini: prompt blocked: {reason}"
        ))));
    }

    let candidate = frame.candidates.first()?;
    let text = candidate.text();

    match candidate.finish_reason.as_deref() {
        Some("SAFETY") => Some(Err(Error::safety(
            "gemini: completion blocked by safety filter",
        ))),
        Some(reason) => {
            let mut chunk = StreamChunk::terminal(usage.snapshot());
            chunk.text = text;
            let mut metadata = serde_json::Map::new();
            metadata.insert("finish_reason".into(), reason.into());
            Some(Ok(chunk.with_metadata(metadata)))
        }
        None if text.is_empty() => None,
        None => Some(Ok(StreamChunk::delta(text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const PAYLOAD: &str = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2}}\n\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":5}}\n\n";

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
    async fn test_finish_reason_terminates_with_usage() {
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
    async fn test_eof_without_finish_reason_synthesizes_terminal() {
        // Cumulative usage arrived but the stream died before any
        // finishReason; the synthesized terminal must carry it.
        let payload = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"cut\"}]}}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":5}}\n\n";
        let (content, usage, terminals) = run(payload, payload.len()).await;
        assert_eq!(content, "cut");
        assert_eq!(usage, Usage::new(3, 5));
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn test_safety_finish_reason_is_safety_error() {
        let payload = "data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n";
        let bytes: Vec<Result<bytes::Bytes, std::io::Error>> =
            vec![Ok(bytes::Bytes::from(payload.to_string()))];
        let mut chunks = chunk_stream(stream::iter(bytes));
        let err = chunks.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Safety);
    }

    #[test]
    fn test_request_serialization_is_camel_case() {
        let ctx = PromptContext::new("hi").with_temperature(0.9).with_top_k(40).with_max_tokens(64);
        let descriptor = ProviderDescriptor::new(crate::types::ProviderKind::Gemini)
            .with_credentials("key");
        let provider = GeminiProvider::new(&descriptor).unwrap();

        let json = serde_json::to_value(provider.build_request(&ctx)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 64);
    }
}
