//! A unified streaming client over multiple LLM provider backends.
//!
//! One request shape (a prompt plus options, optionally streamed) runs
//! against four structurally different backends (a local model server and
//! three hosted REST APIs) without the caller ever seeing vendor wire
//! formats. Each adapter normalizes its vendor's streaming protocol into
//! an ordered chunk sequence with exactly one terminal chunk carrying
//! aggregated token usage, and maps vendor failures onto a shared error
//! taxonomy.

pub mod error;
pub mod factory;
pub mod format;
pub mod line_stream;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod stream;
pub mod types;

// Re-export core types for easy usage
pub use error::{Error, ErrorKind};
pub use factory::ProviderFactory;
pub use line_stream::{sse_data, LineStream, LineStreamExt, SSE_DONE};
pub use provider::Provider;
pub use providers::*;
pub use registry::{ProviderRegistry, AUTO_ALIAS};
pub use stream::{ChunkStream, UsageAccumulator};
pub use types::*;
