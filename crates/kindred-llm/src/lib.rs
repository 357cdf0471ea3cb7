//! Language intelligence client for kindred.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint and exposes the
//! three operations the turn coordinator needs through the
//! [`LanguageIntelligence`] trait.
//!
//! # Architecture
//!
//! - [`Provider`] runs raw chat completion requests, single-shot or streamed.
//! - [`OpenAiCompatProvider`] implements it over HTTP with SSE streaming.
//! - [`ModelIntelligence`] turns a provider into [`LanguageIntelligence`]:
//!   structured classification, a fragment stream for the reply, and
//!   structured fact extraction.
//! - [`IntelligenceError::category`] maps any failure onto the three
//!   user-facing buckets in [`ErrorCategory`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kindred_llm::{ModelIntelligence, ModelSettings, OpenAiCompatProvider, ProviderConfig};
//!
//! let provider = OpenAiCompatProvider::new(ProviderConfig::from_llm_config(&cfg.llm));
//! let brain = ModelIntelligence::new(Arc::new(provider), ModelSettings::from_llm_config(&cfg.llm));
//! let c = brain.classify("I just lost my dog, I'm devastated").await?;
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod intelligence;
pub mod openai_compat;
pub mod prompts;
pub mod provider;
pub mod sse;
pub mod types;

pub use config::ProviderConfig;
pub use credential::CredentialSlot;
pub use error::{ErrorCategory, IntelligenceError, ProviderError, Result};
pub use intelligence::{
    Classification, Facts, LanguageIntelligence, ModelIntelligence, ModelSettings, ResponseStream,
};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::Provider;
pub use sse::parse_sse_line;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat, StreamChunk};
