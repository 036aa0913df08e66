//! Normalized token stream
//!
//! Provider adapters turn their wire format into `WireEvent`s through a
//! `WireDecoder`; `normalize` drives the network reads and produces the one
//! chunk shape every caller sees:
//!
//! ```text
//! Token* (Done | Error)
//! ```
//!
//! Reads are bounded by an idle timeout and race against cancellation, so a
//! dead connection or a stop request ends the stream within one read cycle.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use crate::errors::{ChatError, Result};
use crate::streaming::cancel::CancelToken;

/// One decoded unit of a provider wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Incremental text
    Token(String),

    /// End of generation; `Some` when the backend supplies the full text
    Done(Option<String>),

    /// Error object reported by the backend inside the stream
    Error(String),

    /// Fragment that could not be parsed (keep-alives, garbage); skipped
    Malformed(String),
}

/// Wire-format specific decoding of raw response bytes
pub trait WireDecoder: Send {
    /// Decode the events completed by this read
    fn decode(&mut self, bytes: &[u8]) -> Result<Vec<WireEvent>>;

    /// Flush buffered input once the connection closes
    fn finish(&mut self) -> Vec<WireEvent>;

    /// Provider label for logs
    fn provider_name(&self) -> &'static str;
}

/// Normalized stream item
#[derive(Debug)]
pub enum StreamChunk {
    /// Incremental text, in generation order
    Token(String),

    /// Successful completion carrying the full response text
    Done { content: String },

    /// Terminal failure
    Error(ChatError),
}

/// Finite, non-restartable sequence of chunks; dropping it closes the connection
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// Raw response body as delivered by the HTTP client
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Drive `source` through `decoder` and emit normalized chunks
pub fn normalize<D>(source: ByteStream, decoder: D, cancel: CancelToken, idle_timeout: Duration) -> ChunkStream
where
    D: WireDecoder + 'static,
{
    let state = WireState {
        source,
        decoder,
        pending: VecDeque::new(),
        accumulated: String::new(),
        cancel,
        idle_timeout,
        malformed: 0,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        let chunk = state.next_chunk().await?;
        Some((chunk, state))
    }))
}

struct WireState<D> {
    source: ByteStream,
    decoder: D,
    pending: VecDeque<StreamChunk>,
    accumulated: String,
    cancel: CancelToken,
    idle_timeout: Duration,
    malformed: usize,
    finished: bool,
}

impl<D: WireDecoder> WireState<D> {
    async fn next_chunk(&mut self) -> Option<StreamChunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            if self.finished {
                return None;
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(provider = self.decoder.provider_name(), "Stream cancelled; closing connection");
                    self.close();
                    return None;
                }
                read = tokio::time::timeout(self.idle_timeout, self.source.next()) => read,
            };

            match read {
                Err(_) => {
                    let duration_ms = self.idle_timeout.as_millis() as u64;
                    tracing::warn!(provider = self.decoder.provider_name(), duration_ms, "Stream idle timeout");
                    self.fail(ChatError::StreamTimeout { duration_ms });
                }
                Ok(None) => {
                    let events = self.decoder.finish();
                    self.apply(events);
                    if !self.finished {
                        self.end_without_marker();
                    }
                }
                Ok(Some(Err(e))) => self.fail(e),
                Ok(Some(Ok(bytes))) => match self.decoder.decode(&bytes) {
                    Ok(events) => self.apply(events),
                    Err(e) => self.fail(e),
                },
            }
        }
    }

    fn apply(&mut self, events: Vec<WireEvent>) {
        for event in events {
            match event {
                WireEvent::Token(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.accumulated.push_str(&text);
                    self.pending.push_back(StreamChunk::Token(text));
                }
                WireEvent::Done(content) => {
                    let content = content.unwrap_or_else(|| std::mem::take(&mut self.accumulated));
                    self.pending.push_back(StreamChunk::Done { content });
                    self.close();
                    return;
                }
                WireEvent::Error(message) => {
                    self.fail(ChatError::ProviderStreamError(message));
                    return;
                }
                WireEvent::Malformed(reason) => {
                    self.malformed += 1;
                    tracing::warn!(
                        provider = self.decoder.provider_name(),
                        %reason,
                        "Skipping malformed stream fragment"
                    );
                }
            }
        }
    }

    fn end_without_marker(&mut self) {
        if !self.accumulated.is_empty() {
            tracing::warn!(
                provider = self.decoder.provider_name(),
                "Connection closed without completion marker; keeping accumulated text"
            );
            let content = std::mem::take(&mut self.accumulated);
            self.pending.push_back(StreamChunk::Done { content });
            self.close();
            return;
        }

        let reason = if self.malformed > 0 {
            format!("no usable content; {} fragment(s) could not be parsed", self.malformed)
        } else {
            "connection closed before the stream completed".to_string()
        };
        self.fail(ChatError::MalformedProviderResponse(reason));
    }

    fn fail(&mut self, error: ChatError) {
        self.pending.push_back(StreamChunk::Error(error));
        self.close();
    }

    fn close(&mut self) {
        self.finished = true;
        self.source = Box::pin(stream::empty());
    }
}
