//! # kindred-types
//!
//! Core type definitions for the kindred voice companion.
//!
//! Every other kindred crate depends on this one. It contains:
//!
//! - **[`conversation`]** -- turns, the transcript, emotions and the derived emotion log
//! - **[`profile`]** -- the user-fact map and its merge rules
//! - **[`config`]** -- configuration schema
//! - **[`error`]** -- [`KindredError`], the user-facing error taxonomy
//! - **[`secret`]** -- [`SecretString`](secret::SecretString) for credentials

pub mod config;
pub mod conversation;
pub mod error;
pub mod profile;
pub mod secret;

pub use conversation::{
    AppState, Emotion, EmotionLogEntry, InputMode, Speaker, Transcript, Turn, derive_emotion_log,
};
pub use error::{KindredError, Result};
pub use profile::UserProfile;
