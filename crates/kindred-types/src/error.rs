//! Error types shared across kindred crates.
//!
//! [`KindredError`] mirrors the failure taxonomy the turn coordinator reasons
//! about: credential problems, throttling, malformed model output, missing
//! speech capabilities, plus the usual I/O and JSON plumbing.

use thiserror::Error;

/// Top-level error type for kindred.
///
/// There is no cancellation variant: a cancelled turn unwinds silently and
/// is never reported as an error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KindredError {
    // ── Language intelligence ────────────────────────────────────────

    /// The API credential is missing or was rejected.
    #[error("credential error: {0}")]
    Credential(String),

    /// The model provider is throttling or overloaded.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time in milliseconds.
        retry_after_ms: u64,
    },

    /// Emotion/language classification returned something unusable.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Fact extraction returned something unusable.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The request could not be completed (network, server error).
    #[error("transport error: {0}")]
    Transport(String),

    // ── Platform ─────────────────────────────────────────────────────

    /// Speech capture or playback is not available on this platform.
    #[error("capability unavailable: {capability}")]
    CapabilityUnavailable {
        /// Which capability is missing ("speech capture", "speech playback").
        capability: String,
    },

    /// A speech engine failed while running (device busy, permission denied).
    #[error("speech engine error: {0}")]
    Speech(String),

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KindredError {
    /// Whether the error only degrades one feature instead of the session.
    pub fn is_degrading(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KindredError>;
