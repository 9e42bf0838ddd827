//! Streaming response sequence and usage accounting.
//!
//! A streaming call yields a [`ChunkStream`]: a lazy, finite,
//! non-restartable sequence of [`StreamChunk`]s that preserves vendor
//! emission order and delivers exactly one terminal chunk. The terminal
//! guarantee holds regardless of what the wire does: duplicated vendor
//! terminal signals are dropped, and a transport that ends without any
//! terminal signal gets one synthesized from the usage accumulated so far.

use crate::types::{StreamChunk, Usage};
use crate::Error;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Monotonic token-usage accumulator for one streaming call.
///
/// Vendors report usage piecemeal (cumulative counts on every frame, or
/// split across distinct event types) or atomically in a single terminal
/// object. `fetch_max` makes repeated cumulative reports idempotent, so
/// the struct only ever moves forward.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    prompt_tokens: AtomicU32,
    completion_tokens: AtomicU32,
}

impl UsageAccumulator {
    pub fn record_prompt_tokens(&self, count: u32) {
        self.prompt_tokens.fetch_max(count, Ordering::Relaxed);
    }

    pub fn record_completion_tokens(&self, count: u32) {
        self.completion_tokens.fetch_max(count, Ordering::Relaxed);
    }

    /// Current totals; `total_tokens` is always `prompt + completion`.
    pub fn snapshot(&self) -> Usage {
        Usage::new(
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug)]
enum StreamPhase {
    Streaming,
    Terminated,
}

/// A finite stream of [`StreamChunk`]s from one generation call.
///
/// State machine per call: `Streaming -> Terminated`, transitioned by the
/// first of {vendor terminal signal, transport end, transport error}. Any
/// signal arriving after termination is a no-op; polling past the terminal
/// chunk yields `None`.
///
/// Once a stream starts emitting, nothing bounds its total duration; only
/// connect/initial-response time is subject to the configured timeout.
pub struct ChunkStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>,
    usage: Arc<UsageAccumulator>,
    phase: StreamPhase,
}

impl ChunkStream {
    /// Wrap an adapter-built chunk sequence. `usage` must be the same
    /// accumulator the adapter's decoder records into, so a synthesized
    /// terminal carries whatever was accumulated before the transport
    /// ended.
    pub fn new<S>(inner: S, usage: Arc<UsageAccumulator>) -> Self
    where
        S: Stream<Item = Result<StreamChunk, Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
            usage,
            phase: StreamPhase::Streaming,
        }
    }

    /// Drain the stream, concatenating content. Convenience for callers
    /// that asked for streaming but only want the final text.
    pub async fn text(mut self) -> Result<String, Error> {
        let mut content = String::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            content.push_str(&chunk.text);
            if chunk.done {
                break;
            }
        }
        Ok(content)
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("usage", &self.usage)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Stream for ChunkStream {
    type Item = Result<StreamChunk, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.phase, StreamPhase::Terminated) {
            return Poll::Ready(None);
        }

        match ready!(this.inner.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => {
                if chunk.done {
                    this.phase = StreamPhase::Terminated;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                // A transport error terminates the stream without a
                // success terminal.
                this.phase = StreamPhase::Terminated;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                // Transport ended without a vendor terminal signal:
                // synthesize the terminal chunk from accumulated usage to
                // preserve the exactly-once contract.
                tracing::debug!("stream ended without terminal signal, synthesizing terminal");
                this.phase = StreamPhase::Terminated;
                Poll::Ready(Some(Ok(StreamChunk::terminal(this.usage.snapshot()))))
            }
        }
    }
}
