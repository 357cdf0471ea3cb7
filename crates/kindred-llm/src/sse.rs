//! Line parser for OpenAI-style Server-Sent Events.
//!
//! A streaming response is a sequence of lines such as:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"I'm so sorry"}}]}
//!
//! data: {"choices":[{"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! Only `data:` lines carry payload; comments (`:`), `event:`, `id:` and
//! `retry:` lines are ignored.

use crate::error::{ProviderError, Result};
use crate::types::{StreamChunk, StreamDelta};

const DONE_SENTINEL: &str = "[DONE]";

/// Parse one SSE line into zero or more chunks.
///
/// Empty text deltas are dropped, so every [`StreamChunk::TextDelta`] this
/// returns is non-empty.
///
/// # Errors
///
/// [`ProviderError::InvalidResponse`] if a `data:` payload is not valid
/// chunk JSON.
pub fn parse_sse_line(line: &str) -> Result<Vec<StreamChunk>> {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(vec![]);
    };
    let payload = payload.trim();

    if payload.is_empty() {
        return Ok(vec![]);
    }
    if payload == DONE_SENTINEL {
        return Ok(vec![StreamChunk::Done {
            finish_reason: None,
            usage: None,
        }]);
    }

    let delta: StreamDelta = serde_json::from_str(payload)
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse SSE delta: {e}")))?;

    let mut chunks = Vec::new();
    if let Some(choice) = delta.choices.first() {
        if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
            chunks.push(StreamChunk::TextDelta { text: text.clone() });
        }
        if choice.finish_reason.is_some() {
            chunks.push(StreamChunk::Done {
                finish_reason: choice.finish_reason.clone(),
                usage: delta.usage,
            });
        }
    }
    Ok(chunks)
}

/// Accumulates raw bytes and yields complete lines.
///
/// Network chunks split lines (and occasionally UTF-8 sequences)
/// arbitrarily; this keeps the incomplete tail until more bytes arrive.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and drain every complete line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream closed.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        (!rest.trim().is_empty()).then_some(rest)
    }
}
