use serde::{Deserialize, Serialize};

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

/// Sampling options nested under `options` in the generate request.
#[derive(Debug, Default, Serialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// One frame from `/api/generate`; both the NDJSON stream frames and the
/// single non-streaming body use this shape. Token counts appear only on
/// the frame with `done: true`.
#[derive(Debug, Deserialize)]
pub struct GenerateFrame {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    pub model: Option<String>,
    pub done_reason: Option<String>,
    pub prompt_eval_count: Option<u32>,
    pub eval_count: Option<u32>,
    pub total_duration: Option<u64>,
}

/// Response body of `/api/tags`.
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub modified_at: Option<String>,
    pub size: Option<u64>,
}
