use serde::{Deserialize, Serialize};

/// Request body for `/messages`.
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    /// Required by the API; callers that set no limit get a sane cap.
    pub max_tokens: u32,
    pub messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct RequestMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Non-streaming response body.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// One SSE `data:` payload, discriminated by its `type` field. Usage is
/// split across event types: `message_start` carries the input-token
/// count, `message_delta` the cumulative output-token count, and
/// `message_stop` is the terminal signal.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart { message: StartMessage },
    ContentBlockDelta { delta: BlockDelta },
    MessageDelta { usage: Option<ApiUsage> },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
pub struct StartMessage {
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct BlockDelta {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

/// Response body of `/models`.
#[derive(Debug, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: Option<String>,
    pub created_at: Option<String>,
}
