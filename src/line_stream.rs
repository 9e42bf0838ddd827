//! Incremental line splitter for streaming response bodies.
//!
//! Every adapter consumes its vendor's stream as newline-delimited frames:
//! NDJSON objects from the local model server, `data:`-prefixed lines from
//! the SSE vendors. This adapter buffers raw bytes across arbitrary chunk
//! boundaries and yields complete lines; what each line means is decided
//! by the per-adapter decoder downstream.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Cap on buffered bytes awaiting a delimiter. A line this long is not a
/// protocol frame from any of the supported vendors.
const MAX_BUFFER_SIZE: usize = 1_000_000;

/// A stream adapter that splits a byte stream into complete lines.
/// Maintains internal state to handle lines split across chunks; the
/// trailing segment without a delimiter is carried over to the next chunk
/// and flushed when the stream ends.
pub struct LineStream<S> {
    /// The underlying byte stream
    inner: S,
    /// Frame delimiter, `\n` for every supported vendor
    delimiter: u8,
    /// Buffer for incomplete raw bytes from previous chunks
    buffer: Vec<u8>,
    /// Parsed lines ready to be yielded
    lines: VecDeque<String>,
}

impl<S> LineStream<S> {
    /// Create a newline-delimited line stream.
    pub fn new(stream: S) -> Self {
        Self::with_delimiter(stream, b'\n')
    }

    /// Create a line stream with an explicit delimiter byte.
    pub fn with_delimiter(stream: S, delimiter: u8) -> Self {
        Self {
            inner: stream,
            delimiter,
            buffer: Vec::new(),
            lines: VecDeque::new(),
        }
    }

    /// Split complete lines out of the buffer, retaining the trailing
    /// partial segment for the next inbound chunk.
    fn split_buffer(&mut self) -> Result<(), Error> {
        let mut start = 0;

        while let Some(pos) = memchr(self.delimiter, &self.buffer[start..]) {
            let end = start + pos;
            let line = std::str::from_utf8(&self.buffer[start..end])
                .map_err(|e| Error::stream(format!("invalid UTF-8 in stream frame: {e}")))?;
            self.lines
                .push_back(line.trim_end_matches('\r').to_string());
            start = end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        Ok(())
    }
}

impl<S, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // First, yield any already-split lines (FIFO order)
            if let Some(line) = self.lines.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(Error::stream(format!(
                        "transport error: {}",
                        e.into()
                    )))));
                }
                None => {
                    // Stream ended - flush the trailing segment as a final
                    // line even though it never saw a delimiter.
                    if !self.buffer.is_empty() {
                        match std::str::from_utf8(&self.buffer) {
                            Ok(text) => {
                                let line = text.trim_end_matches('\r').to_string();
                                self.buffer.clear();
                                if !line.is_empty() {
                                    return Poll::Ready(Some(Ok(line)));
                                }
                            }
                            Err(_) => {
                                tracing::debug!(
                                    "dropping non-UTF-8 trailing bytes at end of stream"
                                );
                                self.buffer.clear();
                            }
                        }
                    }
                    return Poll::Ready(None);
                }
            };

            self.buffer.extend_from_slice(&chunk);

            if self.buffer.len() > MAX_BUFFER_SIZE {
                self.buffer.clear();
                return Poll::Ready(Some(Err(Error::stream(
                    "line buffer exceeded maximum size",
                ))));
            }

            if let Err(e) = self.split_buffer() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

/// Extension trait to add line splitting to byte streams.
pub trait LineStreamExt: Stream {
    /// Split this byte stream into newline-delimited lines.
    fn lines(self) -> LineStream<Self>
    where
        Self: Sized,
    {
        LineStream::new(self)
    }
}

impl<S: Stream> LineStreamExt for S {}

/// The SSE stream-terminator sentinel used by the OpenAI-compatible API.
pub const SSE_DONE: &str = "[DONE]";

/// Extract the payload of an SSE `data:` line.
///
/// Returns `None` for everything else: event-type lines, comments,
/// keep-alive pings, and blank lines are ignored by all three SSE vendors'
/// decoders, never treated as errors.
pub fn sse_data(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn byte_chunks(parts: &[&[u8]]) -> Vec<Result<bytes::Bytes, std::io::Error>> {
        parts
            .iter()
            .map(|p| Ok(bytes::Bytes::copy_from_slice(p)))
            .collect()
    }

    async fn collect_lines(chunks: Vec<Result<bytes::Bytes, std::io::Error>>) -> Vec<String> {
        let mut stream = stream::iter(chunks).lines();
        let mut lines = Vec::new();
        while let Some(line) = stream.next().await {
            lines.push(line.unwrap());
        }
        lines
    }

    #[tokio::test]
    async fn test_complete_lines() {
        let lines = collect_lines(byte_chunks(&[b"one\ntwo\n"])).await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let lines = collect_lines(byte_chunks(&[b"hel", b"lo\nwor", b"ld\n"])).await;
        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_single_byte_chunks_match_whole_payload() {
        let payload = b"{\"response\":\"Hi\"}\n{\"done\":true}\n";

        let whole = collect_lines(byte_chunks(&[payload])).await;
        let split: Vec<&[u8]> = payload.chunks(1).collect();
        let one_by_one = collect_lines(byte_chunks(&split)).await;

        assert_eq!(whole, one_by_one);
    }

    #[tokio::test]
    async fn test_trailing_segment_flushed_at_eof() {
        let lines = collect_lines(byte_chunks(&[b"data: first\n\ndata: [DONE]"])).await;
        assert_eq!(lines, vec!["data: first", "", "data: [DONE]"]);
    }

    #[tokio::test]
    async fn test_crlf_stripped() {
        let lines = collect_lines(byte_chunks(&[b"one\r\ntwo\r\n"])).await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_utf8_split_across_chunks() {
        // Euro sign is three bytes; split it down the middle.
        let euro = "€".as_bytes();
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from(
                [b"price: ".as_slice(), &euro[..2]].concat(),
            )),
            Ok(bytes::Bytes::from([&euro[2..], b"100\n".as_slice()].concat())),
        ];
        let lines = collect_lines(chunks).await;
        assert_eq!(lines, vec!["price: €100"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_error() {
        let chunks = byte_chunks(&[b"ok\n\xFF\xFE broken\n"]);
        let mut stream = stream::iter(chunks).lines();
        assert_eq!(stream.next().await.unwrap().unwrap(), "ok");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_buffer_cap_enforced() {
        let big = vec![b'x'; MAX_BUFFER_SIZE + 1];
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> =
            vec![Ok(bytes::Bytes::from(big))];
        let mut stream = stream::iter(chunks).lines();
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_as_stream_kind() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"partial\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut stream = stream::iter(chunks).lines();
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Stream);
    }

    #[test]
    fn test_sse_data_prefix() {
        assert_eq!(sse_data("data: hello"), Some("hello"));
        assert_eq!(sse_data("data:hello"), Some("hello"));
        assert_eq!(sse_data("data: "), Some(""));
        assert_eq!(sse_data("event: message_stop"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data(""), None);
    }
}
