//! The turn coordinator.
//!
//! Drives one user turn at a time through classification, the streamed
//! reply and fact extraction, routing the reply into the transcript as it
//! arrives and into speech playback a sentence group at a time.
//!
//! # Cancellation
//!
//! Every turn runs under a [`TurnSession`] whose token is cancelled when the
//! user interrupts or a newer turn supersedes it. The party that cancels
//! also applies the unwinding (dropping an empty trailing agent turn,
//! resetting the emotion, moving the state on) while holding the state
//! lock. The turn itself checks its token under the same lock before every
//! mutation, so once a session is cancelled none of its later effects land.
//! In-flight model calls are raced against the token and abandoned rather
//! than awaited.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kindred_llm::{ErrorCategory, IntelligenceError, LanguageIntelligence};
use kindred_platform::Platform;
use kindred_types::{AppState, Emotion, EmotionLogEntry, InputMode, Transcript, UserProfile};
use kindred_voice::{CaptureEvent, SpeakOptions, SpeechCapture, SpeechPlayback};

use crate::profile_store::ProfileStore;
use crate::session::TurnSession;
use crate::state::ConversationState;

/// How a submitted turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply finished and facts were extracted.
    Completed,
    /// Interrupted or superseded. Not an error.
    Cancelled,
    /// A language intelligence call failed; `message` was written into the
    /// agent turn.
    Failed {
        category: ErrorCategory,
        message: String,
    },
    /// The text was blank.
    Ignored,
}

/// Dismissible message for presentation, outside the turn flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Speech capture is not available here; voice input is disabled.
    CaptureUnavailable(String),
    /// Speech capture stopped because of an engine error.
    CaptureFailed(String),
}

struct ActiveTurn {
    id: u64,
    token: CancellationToken,
}

struct Core {
    state: ConversationState,
    active: Option<ActiveTurn>,
}

/// Orchestrates turns between capture, language intelligence and playback.
pub struct TurnCoordinator<I, P: Platform> {
    intelligence: Arc<I>,
    store: Arc<ProfileStore<P>>,
    playback: SpeechPlayback,
    capture: Option<SpeechCapture>,
    core: Mutex<Core>,
    state_tx: watch::Sender<AppState>,
    notices: broadcast::Sender<Notice>,
    next_session: AtomicU64,
}

impl<I, P> TurnCoordinator<I, P>
where
    I: LanguageIntelligence + 'static,
    P: Platform + 'static,
{
    /// Create a coordinator in text-and-playback mode.
    ///
    /// `profile` is the profile loaded from `store` at startup.
    pub fn new(
        intelligence: Arc<I>,
        store: Arc<ProfileStore<P>>,
        playback: SpeechPlayback,
        profile: UserProfile,
    ) -> Self {
        let (state_tx, _) = watch::channel(AppState::Idle);
        let (notices, _) = broadcast::channel(16);
        Self {
            intelligence,
            store,
            playback,
            capture: None,
            core: Mutex::new(Core {
                state: ConversationState::new(profile),
                active: None,
            }),
            state_tx,
            notices,
            next_session: AtomicU64::new(0),
        }
    }

    /// Enable voice input. Feed the capture's event receiver to
    /// [`run_capture`](Self::run_capture).
    pub fn with_capture(mut self, capture: SpeechCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    // ── Read accessors ──────────────────────────────────────────────

    pub fn app_state(&self) -> AppState {
        self.core.lock().state.app_state()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state_tx.subscribe()
    }

    /// Capture notices raised from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn transcript(&self) -> Transcript {
        self.core.lock().state.transcript().clone()
    }

    pub fn emotion_log(&self) -> Vec<EmotionLogEntry> {
        self.core.lock().state.emotion_log()
    }

    pub fn profile(&self) -> UserProfile {
        self.core.lock().state.profile().clone()
    }

    pub fn working_emotion(&self) -> Emotion {
        self.core.lock().state.working_emotion()
    }

    /// Language the last reply was written in, once anything was classified.
    pub fn language(&self) -> Option<String> {
        self.core.lock().state.language().map(str::to_string)
    }

    pub fn input_mode(&self) -> InputMode {
        self.core.lock().state.input_mode()
    }

    pub fn voice_id(&self) -> Option<String> {
        self.core.lock().state.voice_id().map(str::to_string)
    }

    /// Latest partial transcript while listening.
    pub fn interim(&self) -> String {
        self.core.lock().state.interim().to_string()
    }

    pub fn is_speaking(&self) -> bool {
        self.playback.is_speaking()
    }

    pub fn store(&self) -> &Arc<ProfileStore<P>> {
        &self.store
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Run one turn for `text` and return when it ends.
    ///
    /// Any turn already in flight is cancelled first. Blank text is ignored.
    pub async fn submit_text(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }

        let (mut session, was_listening) = self.begin_turn(text);
        if was_listening && let Some(capture) = &self.capture {
            // Typing replaces whatever was being said.
            capture.abandon().await;
        }
        let outcome = self.drive(&mut session, text).await;
        match &outcome {
            TurnOutcome::Completed => {
                info!(session = session.id(), chars = session.response().len(), "turn completed");
            }
            TurnOutcome::Cancelled => debug!(session = session.id(), "turn cancelled"),
            TurnOutcome::Failed { category, .. } => {
                debug!(session = session.id(), category = ?category, "turn failed");
            }
            TurnOutcome::Ignored => {}
        }
        outcome
    }

    /// Cancel the turn in flight and silence playback.
    ///
    /// Returns immediately without waiting for the cancelled model call.
    /// Returns `false` if no turn was in flight.
    pub fn interrupt(&self) -> bool {
        let mut core = self.core.lock();
        self.playback.cancel();
        let Some(active) = core.active.take() else {
            return false;
        };
        active.token.cancel();
        core.state.transcript_mut().remove_trailing_empty_agent();
        self.settle(&mut core, AppState::Idle);
        info!(session = active.id, "turn interrupted");
        true
    }

    /// The single record/interrupt control.
    ///
    /// Starts listening from IDLE (or ERROR), stops listening from
    /// LISTENING, and interrupts from THINKING or SPEAKING.
    pub async fn toggle_recording(&self) {
        match self.app_state() {
            AppState::Thinking | AppState::Speaking => {
                self.interrupt();
            }
            AppState::Listening => self.stop_listening().await,
            AppState::Idle | AppState::Error => self.start_listening().await,
        }
    }

    /// Choose the playback voice; `None` returns to automatic selection.
    pub fn set_voice(&self, id: Option<String>) {
        self.core.lock().state.set_voice_id(id);
    }

    /// Switch between voice and text conversation.
    ///
    /// Leaving voice mode silences playback and stops listening.
    pub async fn set_input_mode(&self, mode: InputMode) {
        let was_listening = {
            let mut core = self.core.lock();
            core.state.set_input_mode(mode);
            mode == InputMode::Text && core.state.app_state() == AppState::Listening
        };
        if mode == InputMode::Text {
            self.playback.cancel();
        }
        if was_listening {
            self.stop_listening().await;
        }
    }

    /// Forget every known fact, in memory and on disk.
    pub fn clear_profile(&self) {
        let mut core = self.core.lock();
        core.state.profile_mut().clear();
        self.store.clear_in_background();
        info!("profile cleared");
    }

    /// Interrupt any turn and empty the transcript.
    pub fn clear_transcript(&self) {
        self.interrupt();
        self.core.lock().state.transcript_mut().clear();
    }

    /// Consume speech capture events until the channel closes.
    ///
    /// Each finalized turn stops listening and is then submitted on its own
    /// task. Capture errors become notices and leave turn processing alone.
    pub async fn run_capture(self: Arc<Self>, mut events: mpsc::Receiver<CaptureEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                CaptureEvent::Interim(text) => {
                    let mut core = self.core.lock();
                    // Late partials from an abandoned capture are stale.
                    if core.state.app_state() == AppState::Listening {
                        core.state.set_interim(text);
                    }
                }
                CaptureEvent::Turn(text) => {
                    let was_listening = self.leave_listening();
                    let me = Arc::clone(&self);
                    tokio::spawn(async move {
                        if was_listening && let Some(capture) = &me.capture {
                            capture.stop().await;
                        }
                        me.submit_text(&text).await;
                    });
                }
                CaptureEvent::Error(message) => {
                    warn!(error = %message, "speech capture failed");
                    self.leave_listening();
                    let _ = self.notices.send(Notice::CaptureFailed(message));
                }
            }
        }
        debug!("capture event stream closed");
    }

    // ── Turn lifecycle ──────────────────────────────────────────────

    /// Start a turn for `text`, superseding any turn in flight.
    ///
    /// Also reports whether the user was being listened to.
    fn begin_turn(&self, text: &str) -> (TurnSession, bool) {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session = TurnSession::new(id);

        let mut core = self.core.lock();
        if let Some(previous) = core.active.take() {
            previous.token.cancel();
            core.state.transcript_mut().remove_trailing_empty_agent();
            self.playback.cancel();
            core.state.set_working_emotion(Emotion::Neutral);
            debug!(session = previous.id, superseded_by = id, "turn superseded");
        }
        let was_listening = core.state.app_state() == AppState::Listening;
        core.active = Some(ActiveTurn {
            id,
            token: session.token().clone(),
        });
        core.state.transcript_mut().push_user(text);
        core.state.set_interim("");
        self.set_state(&mut core, AppState::Thinking);
        debug!(session = id, was_listening, "turn started");
        (session, was_listening)
    }

    async fn drive(&self, session: &mut TurnSession, text: &str) -> TurnOutcome {
        let token = session.token().clone();

        let classification = match until_cancelled(&token, self.intelligence.classify(text)).await
        {
            None => return TurnOutcome::Cancelled,
            Some(Err(e)) => return self.fail(session, e),
            Some(Ok(c)) => c,
        };
        let emotion = classification.emotion;
        let language = classification.language_code;

        let profile = {
            let Some(mut core) = self.live(session) else {
                return TurnOutcome::Cancelled;
            };
            core.state.transcript_mut().push_agent(Some(emotion));
            core.state.set_working_emotion(emotion);
            core.state.set_language(&language);
            core.state.profile().clone()
        };
        debug!(session = session.id(), emotion = %emotion, language = %language, "classified");

        let reply = self
            .intelligence
            .stream_response(text, emotion, &language, &profile);
        let mut stream = match until_cancelled(&token, reply).await {
            None => return TurnOutcome::Cancelled,
            Some(Err(e)) => return self.fail(session, e),
            Some(Ok(stream)) => stream,
        };
        {
            let Some(mut core) = self.live(session) else {
                return TurnOutcome::Cancelled;
            };
            self.set_state(&mut core, AppState::Speaking);
        }

        let mut last_utterance: Option<oneshot::Receiver<()>> = None;
        loop {
            let fragment = match until_cancelled(&token, stream.next()).await {
                None => return TurnOutcome::Cancelled,
                Some(None) => break,
                Some(Some(Err(e))) => return self.fail(session, e),
                Some(Some(Ok(fragment))) => fragment,
            };
            {
                let Some(mut core) = self.live(session) else {
                    return TurnOutcome::Cancelled;
                };
                let ready = session.push_fragment(&fragment);
                core.state.transcript_mut().set_agent_text(session.response());
                if let Some(sentences) = ready
                    && let Some(done) = self.enqueue_speech(&core, sentences, &language)
                {
                    last_utterance = Some(done);
                }
            }
        }
        drop(stream);

        let final_wait = {
            let Some(core) = self.live(session) else {
                return TurnOutcome::Cancelled;
            };
            match session.take_tail() {
                Some(tail) => self.enqueue_speech(&core, tail, &language),
                None => last_utterance,
            }
        };
        if let Some(done) = final_wait
            && until_cancelled(&token, done).await.is_none()
        {
            return TurnOutcome::Cancelled;
        }

        let facts = match until_cancelled(&token, self.intelligence.extract_facts(text)).await {
            None => return TurnOutcome::Cancelled,
            Some(Ok(facts)) => facts,
            Some(Err(e)) => {
                warn!(session = session.id(), error = %e, "fact extraction failed, keeping profile as is");
                None
            }
        };

        let Some(mut core) = self.live(session) else {
            return TurnOutcome::Cancelled;
        };
        if let Some(facts) = facts {
            let count = facts.len();
            if core.state.profile_mut().merge(facts) {
                info!(session = session.id(), facts = count, "profile updated");
                self.store.save_in_background(core.state.profile().clone());
            }
        }
        core.active = None;
        self.settle(&mut core, AppState::Idle);
        TurnOutcome::Completed
    }

    fn fail(&self, session: &TurnSession, err: IntelligenceError) -> TurnOutcome {
        let category = err.category();
        let message = category.user_message().to_string();
        {
            let Some(mut core) = self.live(session) else {
                return TurnOutcome::Cancelled;
            };
            warn!(session = session.id(), error = %err, category = ?category, "turn failed");
            let transcript = core.state.transcript_mut();
            if !transcript.ends_with_agent() {
                transcript.push_agent(None);
            }
            transcript.set_agent_text(&message);
            core.active = None;
            self.settle(&mut core, AppState::Error);
        }
        if category == ErrorCategory::InvalidCredential {
            self.store.clear_credential();
        }
        TurnOutcome::Failed { category, message }
    }

    /// Lock the state unless `session` has been cancelled.
    fn live(&self, session: &TurnSession) -> Option<MutexGuard<'_, Core>> {
        let core = self.core.lock();
        (!session.is_cancelled()).then_some(core)
    }

    fn enqueue_speech(
        &self,
        core: &Core,
        text: String,
        language: &str,
    ) -> Option<oneshot::Receiver<()>> {
        if core.state.input_mode() != InputMode::Voice {
            return None;
        }
        let options = SpeakOptions {
            language_hint: Some(language.to_string()),
            voice_id: core.state.voice_id().map(str::to_string),
        };
        debug!(chars = text.len(), "sentence flush");
        Some(self.playback.speak(text, options))
    }

    // ── Listening ───────────────────────────────────────────────────

    async fn start_listening(&self) {
        let Some(capture) = &self.capture else {
            let _ = self
                .notices
                .send(Notice::CaptureUnavailable("speech capture".into()));
            return;
        };
        {
            let mut core = self.core.lock();
            if core.state.app_state() == AppState::Error {
                self.set_state(&mut core, AppState::Idle);
            }
        }

        if let Err(e) = capture.start().await {
            warn!(error = %e, "could not start speech capture");
            let notice = if e.is_degrading() {
                Notice::CaptureUnavailable(e.to_string())
            } else {
                Notice::CaptureFailed(e.to_string())
            };
            let _ = self.notices.send(notice);
            return;
        }

        let listening = {
            let mut core = self.core.lock();
            // A typed turn may have started while the engine spun up.
            let idle = core.state.app_state() == AppState::Idle;
            if idle {
                self.set_state(&mut core, AppState::Listening);
            }
            idle
        };
        if !listening {
            capture.abandon().await;
        }
    }

    async fn stop_listening(&self) {
        self.leave_listening();
        if let Some(capture) = &self.capture {
            capture.stop().await;
        }
    }

    /// LISTENING → IDLE; returns whether we were listening.
    fn leave_listening(&self) -> bool {
        let mut core = self.core.lock();
        core.state.set_interim("");
        if core.state.app_state() != AppState::Listening {
            return false;
        }
        self.set_state(&mut core, AppState::Idle);
        true
    }

    // ── State helpers ───────────────────────────────────────────────

    fn set_state(&self, core: &mut Core, state: AppState) {
        core.state.set_app_state(state);
        self.state_tx.send_replace(state);
    }

    fn settle(&self, core: &mut Core, state: AppState) {
        core.state.settle(state);
        self.state_tx.send_replace(state);
    }
}

/// Run `fut` unless `token` fires first.
async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}
