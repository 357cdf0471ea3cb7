//! Configuration schema.
//!
//! Loaded from `~/.kindred/config.json` (or wherever discovery points).
//! Every field has a default so an empty `{}` is a valid config. Keys are
//! accepted in both snake_case and camelCase.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Language model endpoint and model choices.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech capture and playback.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Where the profile is persisted.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_base_url", alias = "baseUrl")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env", alias = "apiKeyEnv")]
    pub api_key_env: String,

    /// Inline API key. Prefer the environment variable.
    #[serde(default, alias = "apiKey", skip_serializing_if = "SecretString::is_empty")]
    pub api_key: SecretString,

    /// Model used for emotion + language classification.
    #[serde(default = "default_model", alias = "classifyModel")]
    pub classify_model: String,

    /// Model used for the streamed reply.
    #[serde(default = "default_model", alias = "responseModel")]
    pub response_model: String,

    /// Model used for fact extraction.
    #[serde(default = "default_model", alias = "extractModel")]
    pub extract_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,

    /// Extra HTTP headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Transport-level request timeout. Unset means no timeout.
    #[serde(default, alias = "timeoutSecs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_api_key_env() -> String {
    "KINDRED_API_KEY".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_key: SecretString::default(),
            classify_model: default_model(),
            response_model: default_model(),
            extract_model: default_model(),
            temperature: None,
            max_tokens: None,
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }
}

/// Speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Silence after speech that finalizes a turn, in milliseconds.
    #[serde(default = "default_pause_ms", alias = "pauseMs")]
    pub pause_ms: u64,

    /// Preferred synthesizer voice. Ignored if the engine no longer offers it.
    #[serde(default, alias = "voiceId", skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,

    /// Language used for voice selection before anything was classified.
    #[serde(default = "default_language", alias = "defaultLanguage")]
    pub default_language: String,

    /// Prefer network/premium voices over local ones when matching a language.
    #[serde(default = "default_true", alias = "preferNetworkVoices")]
    pub prefer_network_voices: bool,

    /// Simulated speaking time per character for the console synthesizer.
    #[serde(default = "default_console_char_ms", alias = "consoleCharMs")]
    pub console_char_ms: u64,
}

fn default_pause_ms() -> u64 {
    1500
}

fn default_language() -> String {
    "en-US".into()
}

fn default_true() -> bool {
    true
}

fn default_console_char_ms() -> u64 {
    15
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            pause_ms: default_pause_ms(),
            voice_id: None,
            default_language: default_language(),
            prefer_network_voices: true,
            console_char_ms: default_console_char_ms(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; a leading `~/` expands to the home directory.
    #[serde(default = "default_storage_dir")]
    pub dir: String,

    /// File name of the profile blob inside `dir`.
    #[serde(default = "default_profile_file", alias = "profileFile")]
    pub profile_file: String,
}

fn default_storage_dir() -> String {
    "~/.kindred".into()
}

fn default_profile_file() -> String {
    "profile.json".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            profile_file: default_profile_file(),
        }
    }
}
