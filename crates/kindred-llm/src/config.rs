//! Connection settings for an OpenAI-compatible endpoint.

use std::collections::HashMap;

use kindred_types::config::LlmConfig;
use kindred_types::secret::SecretString;

/// How to reach one chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Name used in logs.
    pub name: String,

    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,

    /// Environment variable consulted when no other key is available.
    pub api_key_env: String,

    /// Key from the config file, if any.
    pub api_key: Option<SecretString>,

    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,

    /// Transport timeout; `None` leaves it to the OS.
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Derive from the `llm` section of the config file.
    pub fn from_llm_config(cfg: &LlmConfig) -> Self {
        Self {
            name: provider_name(&cfg.base_url),
            base_url: cfg.base_url.clone(),
            api_key_env: cfg.api_key_env.clone(),
            api_key: (!cfg.api_key.is_empty()).then(|| cfg.api_key.clone()),
            headers: cfg.headers.clone(),
            timeout_secs: cfg.timeout_secs,
        }
    }
}

/// Host part of the base URL, for log fields.
fn provider_name(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map_or(base_url, |(_, rest)| rest);
    without_scheme
        .split(['/', ':'])
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("llm")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_default_llm_config() {
        let cfg = ProviderConfig::from_llm_config(&LlmConfig::default());
        assert_eq!(cfg.name, "api.openai.com");
        assert_eq!(cfg.api_key_env, "KINDRED_API_KEY");
        assert!(cfg.api_key.is_none());
        assert!(cfg.timeout_secs.is_none());
    }

    #[test]
    fn inline_key_carried_over() {
        let llm = LlmConfig {
            api_key: SecretString::new("sk-inline"),
            base_url: "http://127.0.0.1:11434/v1".into(),
            ..LlmConfig::default()
        };
        let cfg = ProviderConfig::from_llm_config(&llm);
        assert_eq!(cfg.name, "127.0.0.1");
        assert_eq!(cfg.api_key.unwrap().expose(), "sk-inline");
    }
}
