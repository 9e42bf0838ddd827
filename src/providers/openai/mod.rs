//! OpenAI-compatible chat-completions adapter: Bearer auth, SSE streaming
//! terminated by the `[DONE]` sentinel.

mod client;
mod types;

pub use client::OpenAIProvider;
