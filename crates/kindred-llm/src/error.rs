//! Error types for the language intelligence client.
//!
//! [`ProviderError`] describes what went wrong on the wire;
//! [`IntelligenceError`] adds the two malformed-output cases; and
//! [`ErrorCategory`] is the three-way split callers use for display text.

use thiserror::Error;

use kindred_types::KindredError;

/// Transport-level failures talking to a chat-completions endpoint.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request failed for a reason not covered below.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The credential was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No credential could be resolved.
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// HTTP 429 with a transient rate limit.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// HTTP 429 caused by exhausted credits or quota.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// HTTP 503/529: the provider is overloaded.
    #[error("provider overloaded: {0}")]
    Overloaded(String),

    /// The requested model does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for transport operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failures of the three language intelligence operations.
#[derive(Error, Debug)]
pub enum IntelligenceError {
    /// Classification output was missing a field or unparseable.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Extraction output was not a flat string-to-string object.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl IntelligenceError {
    /// Which user-facing bucket this failure falls into.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(
                ProviderError::RateLimited { .. }
                | ProviderError::QuotaExhausted(_)
                | ProviderError::Overloaded(_),
            ) => ErrorCategory::RateLimited,
            Self::Provider(ProviderError::AuthFailed(_) | ProviderError::NotConfigured(_)) => {
                ErrorCategory::InvalidCredential
            }
            _ => ErrorCategory::Connectivity,
        }
    }

    /// The sentence shown to the user in place of a reply.
    pub fn user_message(&self) -> &'static str {
        self.category().user_message()
    }
}

/// User-facing classification of intelligence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    InvalidCredential,
    Connectivity,
}

impl ErrorCategory {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::RateLimited => {
                "I'm getting a lot of requests right now. Please wait a moment and try again."
            }
            Self::InvalidCredential => {
                "I couldn't sign in to the language service. Please check your API key."
            }
            Self::Connectivity => "I'm having trouble connecting right now. Please try again.",
        }
    }
}

impl From<IntelligenceError> for KindredError {
    fn from(err: IntelligenceError) -> Self {
        match err {
            IntelligenceError::Analysis(msg) => KindredError::Analysis(msg),
            IntelligenceError::Extraction(msg) => KindredError::Extraction(msg),
            IntelligenceError::Provider(ProviderError::RateLimited { retry_after_ms }) => {
                KindredError::RateLimited { retry_after_ms }
            }
            IntelligenceError::Provider(
                e @ (ProviderError::AuthFailed(_) | ProviderError::NotConfigured(_)),
            ) => KindredError::Credential(e.to_string()),
            IntelligenceError::Provider(
                e @ (ProviderError::QuotaExhausted(_) | ProviderError::Overloaded(_)),
            ) => {
                tracing::debug!(error = %e, "mapping overload to rate limit");
                KindredError::RateLimited { retry_after_ms: 0 }
            }
            IntelligenceError::Provider(other) => KindredError::Transport(other.to_string()),
        }
    }
}
