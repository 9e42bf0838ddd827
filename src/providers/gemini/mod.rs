//! Hosted generative-language adapter: API-key query parameter, SSE
//! streaming with per-candidate finish reasons.

mod client;
mod types;

pub use client::GeminiProvider;
