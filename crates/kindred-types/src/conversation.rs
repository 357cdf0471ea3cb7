//! Conversation data model: turns, the transcript, and the emotion log.
//!
//! The [`Transcript`] is append-only with two exceptions, both confined to
//! the trailing agent turn: its text is rewritten in place while a response
//! streams, and it is removed entirely when generation was cancelled before
//! any text arrived.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of emotions the classifier may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Emotion {
    #[default]
    Neutral,
    Joyful,
    Calm,
    Angry,
    Sad,
    Surprised,
}

impl Emotion {
    /// All variants, in declaration order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Neutral,
        Emotion::Joyful,
        Emotion::Calm,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Surprised,
    ];

    /// Upper-case wire name (`"SAD"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "NEUTRAL",
            Self::Joyful => "JOYFUL",
            Self::Calm => "CALM",
            Self::Angry => "ANGRY",
            Self::Sad => "SAD",
            Self::Surprised => "SURPRISED",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known [`Emotion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmotion(pub String);

impl fmt::Display for UnknownEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotion '{}'", self.0)
    }
}

impl std::error::Error for UnknownEmotion {}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// One utterance in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// Set on agent turns from classification; never changed afterward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// A finalized user utterance.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            emotion: None,
            created_at: Utc::now(),
        }
    }

    /// An agent turn; starts empty while the response streams in.
    pub fn agent(emotion: Option<Emotion>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: String::new(),
            emotion,
            created_at: Utc::now(),
        }
    }

    pub fn is_agent(&self) -> bool {
        self.speaker == Speaker::Agent
    }
}

/// Ordered sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn push_agent(&mut self, emotion: Option<Emotion>) {
        self.turns.push(Turn::agent(emotion));
    }

    /// Replace the text of the trailing agent turn.
    ///
    /// Returns `false` (and changes nothing) when the last turn is not an
    /// agent turn; earlier turns are immutable.
    pub fn set_agent_text(&mut self, text: impl Into<String>) -> bool {
        match self.turns.last_mut() {
            Some(turn) if turn.is_agent() => {
                turn.text = text.into();
                true
            }
            _ => false,
        }
    }

    /// Whether the transcript ends with an agent turn.
    pub fn ends_with_agent(&self) -> bool {
        self.turns.last().is_some_and(Turn::is_agent)
    }

    /// Drop the trailing agent turn if no text ever arrived for it.
    pub fn remove_trailing_empty_agent(&mut self) -> bool {
        if self
            .turns
            .last()
            .is_some_and(|t| t.is_agent() && t.text.is_empty())
        {
            self.turns.pop();
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Pairing of a user message with the emotion the agent replied in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionLogEntry {
    #[serde(alias = "userMessage")]
    pub user_message: String,
    pub emotion: Emotion,
}

/// Derive the emotion log from a transcript.
///
/// Every agent turn carrying an emotion is paired with the text of the
/// nearest user turn before it. Agent turns with no preceding user turn are
/// skipped. Pure: the same transcript always yields the same log.
pub fn derive_emotion_log(turns: &[Turn]) -> Vec<EmotionLogEntry> {
    let mut log = Vec::new();
    for (idx, turn) in turns.iter().enumerate() {
        let Some(emotion) = turn.emotion.filter(|_| turn.is_agent()) else {
            continue;
        };
        if let Some(user) = turns[..idx].iter().rev().find(|t| !t.is_agent()) {
            log.push(EmotionLogEntry {
                user_message: user.text.clone(),
                emotion,
            });
        }
    }
    log
}

/// Coarse status of the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

impl AppState {
    /// A turn is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Thinking | Self::Speaking)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Listening => "LISTENING",
            Self::Thinking => "THINKING",
            Self::Speaking => "SPEAKING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// How the user is talking to the companion.
///
/// Sentence flushes only reach speech playback in [`InputMode::Voice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Voice,
    Text,
}
