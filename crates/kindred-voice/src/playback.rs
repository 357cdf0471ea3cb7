//! Speech playback: a FIFO utterance queue over a text-to-speech engine.
//!
//! [`SpeechPlayback`] owns a worker task that speaks queued utterances one at
//! a time. [`cancel`](SpeechPlayback::cancel) drops everything queued and
//! silences the current utterance immediately; every utterance's completion
//! receiver still resolves, whether it ended naturally, failed, or was
//! cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kindred_types::{KindredError, Result};

/// A voice offered by a synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub name: String,
    /// BCP-47 language tag, e.g. `en-US`.
    pub language: String,
    /// Network/premium voice rather than a local/basic one.
    pub network: bool,
}

/// A text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voices currently available.
    async fn voices(&self) -> Result<Vec<Voice>>;

    /// Speak `text`, returning once the utterance has finished.
    ///
    /// `None` means the engine default voice.
    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<()>;

    /// Silence whatever is being spoken right now. Safe to call when idle.
    fn stop(&self);
}

/// Per-utterance options.
#[derive(Debug, Clone, Default)]
pub struct SpeakOptions {
    pub language_hint: Option<String>,
    pub voice_id: Option<String>,
}

/// Pick a voice.
///
/// In order: the explicit `voice_id` if still offered; the best match for
/// `language_hint`, with network voices first when `prefer_network` is set;
/// any voice whose primary language subtag matches; otherwise `None` for the
/// engine default.
pub fn resolve_voice<'a>(
    voices: &'a [Voice],
    voice_id: Option<&str>,
    language_hint: Option<&str>,
    prefer_network: bool,
) -> Option<&'a Voice> {
    if let Some(id) = voice_id
        && let Some(voice) = voices.iter().find(|v| v.id == id)
    {
        return Some(voice);
    }

    let hint = language_hint?.trim();
    if hint.is_empty() {
        return None;
    }
    let exact: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.language.eq_ignore_ascii_case(hint))
        .collect();
    if prefer_network && let Some(v) = exact.iter().find(|v| v.network) {
        return Some(v);
    }
    if let Some(v) = exact.first() {
        return Some(v);
    }

    let primary = primary_subtag(hint);
    voices
        .iter()
        .find(|v| primary_subtag(&v.language).eq_ignore_ascii_case(primary))
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

struct Utterance {
    text: String,
    options: SpeakOptions,
    generation: u64,
    cancel: CancellationToken,
    done: oneshot::Sender<()>,
}

#[derive(Debug)]
struct QueueState {
    generation: u64,
    pending: usize,
    cancel: CancellationToken,
}

/// FIFO speech queue.
pub struct SpeechPlayback {
    tx: mpsc::UnboundedSender<Utterance>,
    state: Arc<Mutex<QueueState>>,
    engine: Arc<dyn SpeechSynthesizer>,
}

impl SpeechPlayback {
    /// Start the playback worker. Must be called inside a tokio runtime.
    pub fn new(engine: Arc<dyn SpeechSynthesizer>, prefer_network: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(QueueState {
            generation: 0,
            pending: 0,
            cancel: CancellationToken::new(),
        }));
        tokio::spawn(run_worker(
            rx,
            Arc::clone(&engine),
            Arc::clone(&state),
            prefer_network,
        ));
        Self { tx, state, engine }
    }

    /// Enqueue an utterance.
    ///
    /// The returned receiver resolves when the utterance ends, fails, or is
    /// cancelled.
    pub fn speak(&self, text: impl Into<String>, options: SpeakOptions) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        let (generation, cancel) = {
            let mut state = self.state.lock();
            state.pending += 1;
            (state.generation, state.cancel.clone())
        };
        let utterance = Utterance {
            text: text.into(),
            options,
            generation,
            cancel,
            done,
        };
        if let Err(mpsc::error::SendError(utterance)) = self.tx.send(utterance) {
            warn!("playback worker gone, dropping utterance");
            self.finish(utterance.generation);
            let _ = utterance.done.send(());
        }
        rx
    }

    /// Empty the queue and silence the current utterance.
    pub fn cancel(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.cancel.cancel();
            state.cancel = CancellationToken::new();
            state.generation += 1;
            std::mem::take(&mut state.pending)
        };
        if dropped > 0 {
            debug!(dropped, "playback cancelled");
        }
        self.engine.stop();
    }

    /// True while anything is queued or being spoken.
    pub fn is_speaking(&self) -> bool {
        self.state.lock().pending > 0
    }

    fn finish(&self, generation: u64) {
        finish(&self.state, generation);
    }
}

impl std::fmt::Debug for SpeechPlayback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechPlayback")
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn finish(state: &Mutex<QueueState>, generation: u64) {
    let mut state = state.lock();
    if state.generation == generation {
        state.pending = state.pending.saturating_sub(1);
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Utterance>,
    engine: Arc<dyn SpeechSynthesizer>,
    state: Arc<Mutex<QueueState>>,
    prefer_network: bool,
) {
    let mut voices: Option<Vec<Voice>> = None;

    while let Some(utt) = rx.recv().await {
        if !utt.cancel.is_cancelled() {
            if voices.is_none() {
                voices = Some(engine.voices().await.unwrap_or_else(|e| {
                    warn!(error = %e, "could not list voices, using engine default");
                    Vec::new()
                }));
            }
            let voice = resolve_voice(
                voices.as_deref().unwrap_or_default(),
                utt.options.voice_id.as_deref(),
                utt.options.language_hint.as_deref(),
                prefer_network,
            );
            debug!(
                voice = voice.map_or("default", |v| v.id.as_str()),
                chars = utt.text.len(),
                "speaking"
            );

            let mut engine_lost = false;
            tokio::select! {
                biased;
                _ = utt.cancel.cancelled() => {}
                result = engine.speak(&utt.text, voice) => {
                    if let Err(e) = result {
                        warn!(error = %e, "utterance failed");
                        engine_lost = matches!(e, KindredError::CapabilityUnavailable { .. });
                    }
                }
            }
            if engine_lost {
                // Re-list voices next time; the engine may come back.
                voices = None;
            }
        }
        finish(&state, utt.generation);
        let _ = utt.done.send(());
    }
    debug!("playback worker stopped");
}

/// Synthesizer for platforms without text-to-speech.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSynthesizer;

#[async_trait]
impl SpeechSynthesizer for UnavailableSynthesizer {
    async fn voices(&self) -> Result<Vec<Voice>> {
        Err(unavailable())
    }

    async fn speak(&self, _text: &str, _voice: Option<&Voice>) -> Result<()> {
        Err(unavailable())
    }

    fn stop(&self) {}
}

fn unavailable() -> KindredError {
    KindredError::CapabilityUnavailable {
        capability: "speech playback".into(),
    }
}
