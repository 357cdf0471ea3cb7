//! In-process fakes for coordinator tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, oneshot};

use kindred_core::{ProfileStore, TurnCoordinator};
use kindred_llm::{Classification, Facts, IntelligenceError, LanguageIntelligence, ResponseStream};
use kindred_platform::Platform;
use kindred_platform::env::Environment;
use kindred_platform::fs::FileSystem;
use kindred_types::{Emotion, UserProfile};
use kindred_voice::{
    CaptureEvent, SpeechCapture, SpeechPlayback, SpeechRecognizer, SpeechSynthesizer, Voice,
};

// ── Platform ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemFs {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemFs {
    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    pub fn put(&self, path: &Path, content: &str) {
        self.files.lock().insert(path.to_path_buf(), content.to_string());
    }
}

#[async_trait]
impl FileSystem for MemFs {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        self.get(path)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
    }

    async fn write_string(&self, path: &Path, content: &str) -> std::io::Result<()> {
        self.put(path, content);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/home/test"))
    }
}

#[derive(Default)]
pub struct MemEnv {
    vars: HashMap<String, String>,
}

impl Environment for MemEnv {
    fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[derive(Default)]
pub struct MemPlatform {
    pub fs: MemFs,
    pub env: MemEnv,
}

impl Platform for MemPlatform {
    fn fs(&self) -> &dyn FileSystem {
        &self.fs
    }

    fn env(&self) -> &dyn Environment {
        &self.env
    }
}

pub const PROFILE_PATH: &str = "/home/test/.kindred/profile.json";

/// Short pause so capture tests finalize turns quickly.
pub const CAPTURE_PAUSE: Duration = Duration::from_millis(200);

// ── Language intelligence ───────────────────────────────────────────────

type Fragment = Result<String, IntelligenceError>;

/// A scripted result, optionally held until the test opens its gate.
pub enum Step<T> {
    Now(Result<T, IntelligenceError>),
    Gated(oneshot::Receiver<()>, Result<T, IntelligenceError>),
}

impl<T> Step<T> {
    async fn resolve(self) -> Result<T, IntelligenceError> {
        match self {
            Step::Now(result) => result,
            Step::Gated(gate, result) => {
                let _ = gate.await;
                result
            }
        }
    }
}

enum Reply {
    Stream(mpsc::Receiver<Fragment>),
    Fail(IntelligenceError),
}

/// Scripted [`LanguageIntelligence`]. Unscripted calls classify as
/// NEUTRAL/en-US, reply with nothing and extract nothing.
#[derive(Default)]
pub struct FakeBrain {
    classifications: Mutex<VecDeque<Step<Classification>>>,
    replies: Mutex<VecDeque<Reply>>,
    extractions: Mutex<VecDeque<Step<Option<Facts>>>>,
    calls: Mutex<Vec<String>>,
    profiles_seen: Mutex<Vec<UserProfile>>,
}

impl FakeBrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify_ok(&self, emotion: Emotion, language: &str) {
        self.classifications
            .lock()
            .push_back(Step::Now(Ok(classification(emotion, language))));
    }

    pub fn classify_err(&self, err: IntelligenceError) {
        self.classifications.lock().push_back(Step::Now(Err(err)));
    }

    /// Classification that completes only when the returned sender fires
    /// (or is dropped).
    pub fn classify_gated(&self, emotion: Emotion, language: &str) -> oneshot::Sender<()> {
        let (open, gate) = oneshot::channel();
        self.classifications
            .lock()
            .push_back(Step::Gated(gate, Ok(classification(emotion, language))));
        open
    }

    /// A reply that streams `fragments` and ends.
    pub fn reply(&self, fragments: &[&str]) {
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for f in fragments {
            tx.try_send(Ok(f.to_string())).unwrap();
        }
        self.replies.lock().push_back(Reply::Stream(rx));
    }

    /// A reply fed by the test; it ends when the sender is dropped.
    pub fn reply_live(&self) -> mpsc::Sender<Fragment> {
        let (tx, rx) = mpsc::channel(16);
        self.replies.lock().push_back(Reply::Stream(rx));
        tx
    }

    pub fn reply_err(&self, err: IntelligenceError) {
        self.replies.lock().push_back(Reply::Fail(err));
    }

    pub fn extract(&self, result: Result<Option<Facts>, IntelligenceError>) {
        self.extractions.lock().push_back(Step::Now(result));
    }

    pub fn extract_gated(&self, result: Result<Option<Facts>, IntelligenceError>) -> oneshot::Sender<()> {
        let (open, gate) = oneshot::channel();
        self.extractions.lock().push_back(Step::Gated(gate, result));
        open
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    pub fn profiles_seen(&self) -> Vec<UserProfile> {
        self.profiles_seen.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn classification(emotion: Emotion, language: &str) -> Classification {
    Classification {
        emotion,
        language_code: language.to_string(),
    }
}

#[async_trait]
impl LanguageIntelligence for FakeBrain {
    async fn classify(&self, text: &str) -> Result<Classification, IntelligenceError> {
        self.record(format!("classify:{text}"));
        let step = self.classifications.lock().pop_front();
        match step {
            Some(step) => step.resolve().await,
            None => Ok(classification(Emotion::Neutral, "en-US")),
        }
    }

    async fn stream_response(
        &self,
        text: &str,
        _emotion: Emotion,
        _language_code: &str,
        profile: &UserProfile,
    ) -> Result<ResponseStream, IntelligenceError> {
        self.record(format!("stream:{text}"));
        self.profiles_seen.lock().push(profile.clone());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Stream(rx)) => Ok(ResponseStream::new(rx)),
            Some(Reply::Fail(err)) => Err(err),
            None => {
                let (_, rx) = mpsc::channel(1);
                Ok(ResponseStream::new(rx))
            }
        }
    }

    async fn extract_facts(&self, text: &str) -> Result<Option<Facts>, IntelligenceError> {
        self.record(format!("extract:{text}"));
        let step = self.extractions.lock().pop_front();
        match step {
            Some(step) => step.resolve().await,
            None => Ok(None),
        }
    }
}

pub fn facts(pairs: &[(&str, &str)]) -> Facts {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── Speech ──────────────────────────────────────────────────────────────

/// Synthesizer that records what it was asked to say.
///
/// With `hold` set, each utterance lasts until `release()` or `stop()`.
#[derive(Default)]
pub struct RecordingVoice {
    spoken: Mutex<Vec<String>>,
    hold: AtomicBool,
    release: Notify,
    stopped: Notify,
}

impl RecordingVoice {
    pub fn holding() -> Self {
        let voice = Self::default();
        voice.hold.store(true, Ordering::SeqCst);
        voice
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingVoice {
    async fn voices(&self) -> kindred_types::Result<Vec<Voice>> {
        Ok(vec![Voice {
            id: "test-en".into(),
            name: "Test".into(),
            language: "en-US".into(),
            network: false,
        }])
    }

    async fn speak(&self, text: &str, _voice: Option<&Voice>) -> kindred_types::Result<()> {
        self.spoken.lock().push(text.to_string());
        if self.hold.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.release.notified() => {}
                _ = self.stopped.notified() => {}
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.notify_waiters();
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

pub type Coordinator = TurnCoordinator<FakeBrain, MemPlatform>;

pub struct Harness {
    pub coord: Arc<Coordinator>,
    pub brain: Arc<FakeBrain>,
    pub voice: Arc<RecordingVoice>,
    pub platform: Arc<MemPlatform>,
    pub store: Arc<ProfileStore<MemPlatform>>,
}

impl Harness {
    /// Build a voice-mode coordinator. Must run inside a tokio runtime.
    pub async fn new(voice: RecordingVoice) -> Self {
        Self::with_platform(voice, MemPlatform::default()).await
    }

    pub async fn with_platform(voice: RecordingVoice, platform: MemPlatform) -> Self {
        Self::build(voice, platform, None).await
    }

    /// Build a coordinator with speech capture; spawn `run_capture` on the
    /// returned receiver to drive it.
    pub async fn with_capture(
        voice: RecordingVoice,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (capture, events) = SpeechCapture::new(recognizer, CAPTURE_PAUSE);
        let harness = Self::build(voice, MemPlatform::default(), Some(capture)).await;
        (harness, events)
    }

    async fn build(
        voice: RecordingVoice,
        platform: MemPlatform,
        capture: Option<SpeechCapture>,
    ) -> Self {
        let platform = Arc::new(platform);
        let brain = Arc::new(FakeBrain::new());
        let voice = Arc::new(voice);
        let store = Arc::new(ProfileStore::new(
            Arc::clone(&platform),
            PathBuf::from(PROFILE_PATH),
        ));
        let profile = store.load().await;
        let playback = SpeechPlayback::new(voice.clone(), true);
        let mut coord =
            TurnCoordinator::new(Arc::clone(&brain), Arc::clone(&store), playback, profile);
        if let Some(capture) = capture {
            coord = coord.with_capture(capture);
        }
        Self {
            coord: Arc::new(coord),
            brain,
            voice,
            platform,
            store,
        }
    }

    pub fn saved_profile(&self) -> Option<String> {
        self.platform.fs.get(Path::new(PROFILE_PATH))
    }

    /// Submit on a separate task.
    pub fn spawn_submit(&self, text: &str) -> tokio::task::JoinHandle<kindred_core::TurnOutcome> {
        let coord = Arc::clone(&self.coord);
        let text = text.to_string();
        tokio::spawn(async move { coord.submit_text(&text).await })
    }
}

/// Poll `cond` until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}
