//! Speech input and output for kindred.
//!
//! - [`capture`]: pause-segmented speech-to-text front end.
//! - [`playback`]: FIFO text-to-speech queue with immediate cancel.
//! - [`segment`]: sentence buffering for streamed replies.
//! - [`console`]: terminal-backed engines for hosts without audio.
//!
//! Engines sit behind the [`SpeechRecognizer`] and [`SpeechSynthesizer`]
//! traits. When a host has neither, [`UnavailableRecognizer`] and
//! [`UnavailableSynthesizer`] report
//! [`CapabilityUnavailable`](kindred_types::KindredError::CapabilityUnavailable)
//! so the conversation degrades to text.

pub mod capture;
pub mod console;
pub mod playback;
pub mod segment;

pub use capture::{
    CaptureEvent, DEFAULT_PAUSE, RecognizerEvent, SpeechCapture, SpeechRecognizer,
    UnavailableRecognizer,
};
pub use console::{ConsoleSynthesizer, LineFeed, LineRecognizer};
pub use playback::{
    SpeakOptions, SpeechPlayback, SpeechSynthesizer, UnavailableSynthesizer, Voice, resolve_voice,
};
pub use segment::{SENTENCE_TERMINATORS, SentenceBuffer};
