//! Speech capture: turns a continuous recognizer into discrete user turns.
//!
//! A [`SpeechRecognizer`] reports interim and final transcript pieces.
//! [`SpeechCapture`] forwards interim text as-is, accumulates final pieces,
//! and once the speaker has been silent for the configured pause it emits
//! everything accumulated as one [`CaptureEvent::Turn`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kindred_types::{KindredError, Result};

/// Default silence that ends a turn.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(1500);

/// Back-to-back engine restarts allowed without hearing anything.
const MAX_SILENT_RESTARTS: u32 = 3;

/// Raw output of a speech-to-text engine.
#[derive(Debug)]
pub enum RecognizerEvent {
    /// Partial hypothesis; replaces the previous one.
    Interim(String),
    /// A finalized segment.
    Final(String),
    /// The engine failed (device busy, permission denied, ...).
    Error(KindredError),
    /// The engine stopped on its own, e.g. after a silence timeout.
    Ended,
}

/// A continuous speech-to-text engine.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin recognition. Each call returns a fresh event stream.
    async fn start(&self) -> Result<mpsc::Receiver<RecognizerEvent>>;

    /// Stop recognition. Safe to call when not started.
    async fn stop(&self);
}

/// What capture reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Current partial transcript (may be empty once a segment finalizes).
    Interim(String),
    /// A finalized, non-blank user turn.
    Turn(String),
    /// Capture failed and is no longer listening.
    Error(String),
}

struct Active {
    stop: CancellationToken,
    /// Set before `stop` fires to drop pending text instead of flushing it.
    discard: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Pause-segmented speech capture.
pub struct SpeechCapture {
    recognizer: Arc<dyn SpeechRecognizer>,
    pause: Duration,
    events: mpsc::Sender<CaptureEvent>,
    active: Mutex<Option<Active>>,
    listening: Arc<AtomicBool>,
}

impl SpeechCapture {
    /// Create a capture front-end and the receiver for its events.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        pause: Duration,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (events, rx) = mpsc::channel(64);
        let capture = Self {
            recognizer,
            pause,
            events,
            active: Mutex::new(None),
            listening: Arc::new(AtomicBool::new(false)),
        };
        (capture, rx)
    }

    /// Whether capture is currently listening.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Begin listening. No-op if already listening.
    ///
    /// Fails with [`KindredError::CapabilityUnavailable`] (or whatever the
    /// engine reports) if recognition cannot start.
    pub async fn start(&self) -> Result<()> {
        if self.is_listening() {
            return Ok(());
        }
        let rx = self.recognizer.start().await?;

        let stop = CancellationToken::new();
        let discard = Arc::new(AtomicBool::new(false));
        self.listening.store(true, Ordering::SeqCst);
        let task = tokio::spawn(run_capture(
            rx,
            Arc::clone(&self.recognizer),
            self.pause,
            self.events.clone(),
            stop.clone(),
            Arc::clone(&discard),
            Arc::clone(&self.listening),
        ));
        let active = Active {
            stop,
            discard,
            task,
        };
        if let Some(previous) = self.active.lock().replace(active) {
            previous.stop.cancel();
        }
        info!(pause_ms = self.pause.as_millis() as u64, "speech capture started");
        Ok(())
    }

    /// Stop listening, flushing any pending text as a final turn.
    ///
    /// Returns once the flush has been delivered.
    pub async fn stop(&self) {
        self.finish(false).await;
    }

    /// Stop listening and drop whatever was said since the last turn.
    ///
    /// For when the user has moved on, e.g. typed a message instead.
    pub async fn abandon(&self) {
        self.finish(true).await;
    }

    async fn finish(&self, discard: bool) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.discard.store(discard, Ordering::SeqCst);
        active.stop.cancel();
        if let Err(e) = active.task.await {
            warn!(error = %e, "capture task ended abnormally");
        }
        self.listening.store(false, Ordering::SeqCst);
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.stop.cancel();
        }
    }
}

/// Finalized segments awaiting a pause.
#[derive(Debug, Default)]
struct PendingTurn {
    text: String,
}

impl PendingTurn {
    fn push(&mut self, segment: &str) {
        let segment = segment.trim();
        if segment.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(segment);
    }

    /// Take the accumulated turn if it has any content.
    fn take(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.text);
        (!text.trim().is_empty()).then_some(text)
    }
}

async fn run_capture(
    mut rx: mpsc::Receiver<RecognizerEvent>,
    recognizer: Arc<dyn SpeechRecognizer>,
    pause: Duration,
    events: mpsc::Sender<CaptureEvent>,
    stop: CancellationToken,
    discard: Arc<AtomicBool>,
    listening: Arc<AtomicBool>,
) {
    let mut pending = PendingTurn::default();
    let mut deadline: Option<Instant> = None;
    let mut silent_restarts = 0u32;

    loop {
        let pause_elapsed = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                recognizer.stop().await;
                // Segments already recognized still belong to this turn.
                while let Ok(event) = rx.try_recv() {
                    if let RecognizerEvent::Final(text) = event {
                        pending.push(&text);
                    }
                }
                match pending.take() {
                    Some(_) if discard.load(Ordering::SeqCst) => {
                        debug!("capture abandoned, pending speech dropped");
                    }
                    Some(turn) => {
                        let _ = events.send(CaptureEvent::Turn(turn)).await;
                    }
                    None => {}
                }
                break;
            }
            _ = pause_elapsed => {
                deadline = None;
                if let Some(turn) = pending.take() {
                    debug!(chars = turn.len(), "pause detected, turn finalized");
                    if events.send(CaptureEvent::Turn(turn)).await.is_err() {
                        break;
                    }
                }
            }
            event = rx.recv() => match event {
                Some(RecognizerEvent::Interim(text)) => {
                    silent_restarts = 0;
                    deadline = Some(Instant::now() + pause);
                    let _ = events.send(CaptureEvent::Interim(text)).await;
                }
                Some(RecognizerEvent::Final(text)) => {
                    silent_restarts = 0;
                    deadline = Some(Instant::now() + pause);
                    pending.push(&text);
                    let _ = events.send(CaptureEvent::Interim(String::new())).await;
                }
                Some(RecognizerEvent::Error(e)) => {
                    warn!(error = %e, "speech recognizer failed");
                    if let Some(turn) = pending.take() {
                        let _ = events.send(CaptureEvent::Turn(turn)).await;
                    }
                    let _ = events.send(CaptureEvent::Error(e.to_string())).await;
                    break;
                }
                Some(RecognizerEvent::Ended) | None => {
                    silent_restarts += 1;
                    if silent_restarts > MAX_SILENT_RESTARTS {
                        warn!(restarts = MAX_SILENT_RESTARTS, "speech recognizer keeps ending without input");
                        if let Some(turn) = pending.take() {
                            let _ = events.send(CaptureEvent::Turn(turn)).await;
                        }
                        let _ = events
                            .send(CaptureEvent::Error("speech recognizer stopped responding".into()))
                            .await;
                        break;
                    }
                    // Engines end sessions on their own; keep listening.
                    debug!(attempt = silent_restarts, "recognizer session ended, restarting");
                    match recognizer.start().await {
                        Ok(next) => rx = next,
                        Err(e) => {
                            if let Some(turn) = pending.take() {
                                let _ = events.send(CaptureEvent::Turn(turn)).await;
                            }
                            let _ = events.send(CaptureEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
            },
        }
    }

    listening.store(false, Ordering::SeqCst);
    debug!("speech capture stopped");
}

/// Recognizer for platforms without speech-to-text.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRecognizer;

#[async_trait]
impl SpeechRecognizer for UnavailableRecognizer {
    async fn start(&self) -> Result<mpsc::Receiver<RecognizerEvent>> {
        Err(KindredError::CapabilityUnavailable {
            capability: "speech capture".into(),
        })
    }

    async fn stop(&self) {}
}
