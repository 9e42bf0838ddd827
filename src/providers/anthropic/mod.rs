//! Messages-style adapter: API-key plus version header, SSE streaming
//! with distinct `message_start`/`content_block_delta`/`message_stop`
//! event types.

mod client;
mod types;

pub use client::AnthropicProvider;
