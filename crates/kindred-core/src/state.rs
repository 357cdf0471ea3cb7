//! Conversation state: transcript, profile and the coarse status.
//!
//! [`ConversationState`] is owned by the turn coordinator, which is the only
//! writer. Presentation reads copies through the coordinator's accessors.

use kindred_types::{
    AppState, Emotion, EmotionLogEntry, InputMode, Transcript, UserProfile, derive_emotion_log,
};

/// Everything the companion knows about the ongoing conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    transcript: Transcript,
    profile: UserProfile,
    working_emotion: Emotion,
    language: Option<String>,
    app_state: AppState,
    input_mode: InputMode,
    voice_id: Option<String>,
    interim: String,
}

impl ConversationState {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut UserProfile {
        &mut self.profile
    }

    /// Emotion of the turn in flight, `Neutral` between turns.
    pub fn working_emotion(&self) -> Emotion {
        self.working_emotion
    }

    pub fn set_working_emotion(&mut self, emotion: Emotion) {
        self.working_emotion = emotion;
    }

    /// Language of the most recent classified user message.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, code: impl Into<String>) {
        self.language = Some(code.into());
    }

    pub fn app_state(&self) -> AppState {
        self.app_state
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = state;
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.input_mode = mode;
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    pub fn set_voice_id(&mut self, id: Option<String>) {
        self.voice_id = id.filter(|id| !id.trim().is_empty());
    }

    /// Latest partial transcript from speech capture.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn set_interim(&mut self, text: impl Into<String>) {
        self.interim = text.into();
    }

    /// Emotion log derived from the current transcript.
    pub fn emotion_log(&self) -> Vec<EmotionLogEntry> {
        derive_emotion_log(self.transcript.turns())
    }

    /// Return to the between-turns resting state.
    pub(crate) fn settle(&mut self, state: AppState) {
        self.working_emotion = Emotion::Neutral;
        self.app_state = state;
    }
}
