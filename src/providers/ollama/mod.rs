//! Local model server adapter: REST generate/tags/version endpoints,
//! NDJSON streaming, no authentication.

mod client;
mod types;

pub use client::OllamaProvider;
