//! The in-flight state of one turn.

use tokio_util::sync::CancellationToken;

use kindred_voice::SentenceBuffer;

/// Cancellable execution context for one user turn.
///
/// Owned by the task running the turn. Only the token is shared: whoever
/// supersedes or interrupts the turn cancels it.
#[derive(Debug)]
pub struct TurnSession {
    id: u64,
    token: CancellationToken,
    response: String,
    unspoken: SentenceBuffer,
}

impl TurnSession {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            response: String::new(),
            unspoken: SentenceBuffer::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Full response text received so far.
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Record a fragment.
    ///
    /// Returns the complete-sentence prefix ready for speech, if the
    /// fragment completed one.
    pub fn push_fragment(&mut self, fragment: &str) -> Option<String> {
        self.response.push_str(fragment);
        self.unspoken.push(fragment)
    }

    /// Take whatever was never flushed, if it has any speakable content.
    pub fn take_tail(&mut self) -> Option<String> {
        let speakable = self.unspoken.has_speech();
        let tail = self.unspoken.drain();
        speakable.then_some(tail)
    }
}
