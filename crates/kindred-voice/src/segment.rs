//! Sentence segmentation for streamed replies.
//!
//! Streamed text arrives in arbitrary fragments. [`SentenceBuffer`] holds it
//! until at least one sentence is complete and then releases the longest
//! prefix made only of complete sentences, so speech can start before the
//! reply has finished generating.

/// Characters that end a sentence.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Unspoken text awaiting a sentence boundary.
///
/// Lossless: concatenating everything returned by [`push`](Self::push)
/// followed by [`drain`](Self::drain) reproduces the input exactly.
#[derive(Debug, Default, Clone)]
pub struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; return the complete-sentence prefix, if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buf.push_str(fragment);
        let end = self.buf.rfind(SENTENCE_TERMINATORS)? + 1;
        let rest = self.buf.split_off(end);
        Some(std::mem::replace(&mut self.buf, rest))
    }

    /// Take whatever is left, leaving the buffer empty.
    pub fn drain(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }

    /// Whether the pending text has anything worth speaking.
    pub fn has_speech(&self) -> bool {
        !self.buf.trim().is_empty()
    }
}
