//! CLI command implementations for `kindred`.
//!
//! - [`chat`] -- text conversation REPL.
//! - [`talk`] -- voice conversation over the terminal speech adapters.
//! - [`profile`] -- show or clear the remembered facts.
//! - [`config_cmd`] -- print the resolved configuration.

pub mod chat;
pub mod config_cmd;
pub mod profile;
pub mod talk;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use comfy_table::{Table, presets::UTF8_FULL};

use kindred_core::{ProfileStore, TurnCoordinator};
use kindred_llm::{ModelIntelligence, ModelSettings, OpenAiCompatProvider, ProviderConfig};
use kindred_platform::{NativePlatform, Platform};
use kindred_types::config::Config;
use kindred_types::secret::SecretString;
use kindred_types::{EmotionLogEntry, UserProfile};
use kindred_voice::{SpeechCapture, SpeechPlayback, SpeechSynthesizer};

/// The coordinator as wired by the CLI.
pub type Coordinator =
    TurnCoordinator<ModelIntelligence<OpenAiCompatProvider>, NativePlatform>;

pub type Store = ProfileStore<NativePlatform>;

/// Load configuration from `explicit` or via auto-discovery.
///
/// Discovery is `KINDRED_CONFIG`, then `~/.kindred/config.json`; with
/// neither present every setting takes its default.
pub async fn load_config<P: Platform>(
    platform: &P,
    explicit: Option<&str>,
) -> anyhow::Result<Config> {
    let raw = kindred_platform::config_loader::load_config_raw(
        platform.fs(),
        platform.env(),
        explicit.map(Path::new),
    )
    .await?;
    let config: Config = serde_json::from_value(raw)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Open the profile store described by `cfg`.
pub fn open_store(platform: Arc<NativePlatform>, cfg: &Config) -> Arc<Store> {
    Arc::new(ProfileStore::from_config(platform, &cfg.storage))
}

/// Wire a coordinator: model client, loaded profile, playback and
/// (optionally) capture.
///
/// Prompts for an API key first when none can be resolved.
pub async fn build_coordinator(
    platform: Arc<NativePlatform>,
    cfg: &Config,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    capture: Option<SpeechCapture>,
) -> anyhow::Result<Arc<Coordinator>> {
    let store = open_store(Arc::clone(&platform), cfg);
    ensure_api_key(&*platform, cfg, &store)?;

    let provider = OpenAiCompatProvider::new(ProviderConfig::from_llm_config(&cfg.llm))
        .with_session_credential(store.credential_slot().clone());
    let intelligence = ModelIntelligence::new(
        Arc::new(provider),
        ModelSettings::from_llm_config(&cfg.llm),
    );

    let profile = store.load().await;
    tracing::debug!(facts = profile.len(), path = %store.path().display(), "profile loaded");

    let playback = SpeechPlayback::new(synthesizer, cfg.voice.prefer_network_voices);
    let mut coordinator = TurnCoordinator::new(Arc::new(intelligence), store, playback, profile);
    if let Some(capture) = capture {
        coordinator = coordinator.with_capture(capture);
    }
    coordinator.set_voice(cfg.voice.voice_id.clone());
    Ok(Arc::new(coordinator))
}

/// Whether some API key is already available to the provider.
pub fn api_key_available<P: Platform>(platform: &P, cfg: &Config, store: &Store) -> bool {
    !cfg.llm.api_key.is_empty()
        || store.credential_slot().is_set()
        || platform
            .env()
            .get_var(&cfg.llm.api_key_env)
            .is_some_and(|k| !k.trim().is_empty())
}

/// Ask for a key on the terminal when none is configured.
///
/// The answer lives in the session credential slot only and is never
/// written to disk. A blank answer is accepted; turns will then fail with
/// the credential message.
pub fn ensure_api_key<P: Platform>(platform: &P, cfg: &Config, store: &Store) -> anyhow::Result<()> {
    if api_key_available(platform, cfg, store) {
        return Ok(());
    }
    eprintln!(
        "No API key found (set {} or llm.api_key in the config).",
        cfg.llm.api_key_env
    );
    eprint!("API key for this session (leave blank to skip): ");
    std::io::stderr().flush()?;
    // Falls back to plain stdin when not attached to a TTY.
    let raw = rpassword::read_password().unwrap_or_default();
    if let Some(key) = SecretString::from_input(&raw) {
        store.set_credential(key);
    }
    Ok(())
}

/// Render the profile as a two-column table.
pub fn profile_table(profile: &UserProfile) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["FACT", "VALUE"]);
    for (key, value) in profile.facts() {
        table.add_row([key.as_str(), value.as_str()]);
    }
    table
}

/// Render the emotion log: each user message and the emotion answered with.
pub fn emotion_log_table(log: &[EmotionLogEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["YOU SAID", "EMOTION"]);
    for entry in log {
        table.add_row([entry.user_message.clone(), entry.emotion.to_string()]);
    }
    table
}

/// Print the profile, or a note when it is empty.
pub fn print_profile(profile: &UserProfile) {
    if profile.is_empty() {
        println!("Nothing remembered yet.");
    } else {
        println!("{}", profile_table(profile));
    }
}

/// Print the emotion log, or a note when it is empty.
pub fn print_emotion_log(log: &[EmotionLogEntry]) {
    if log.is_empty() {
        println!("No emotions logged yet.");
    } else {
        println!("{}", emotion_log_table(log));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_types::Emotion;
    use std::collections::HashMap;

    use kindred_platform::env::Environment;
    use kindred_platform::fs::FileSystem;

    struct FixedEnv(HashMap<String, String>);

    impl Environment for FixedEnv {
        fn get_var(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    struct EnvOnly {
        native: NativePlatform,
        env: FixedEnv,
    }

    impl Platform for EnvOnly {
        fn fs(&self) -> &dyn FileSystem {
            self.native.fs()
        }

        fn env(&self) -> &dyn Environment {
            &self.env
        }
    }

    fn platform_with(vars: &[(&str, &str)]) -> EnvOnly {
        EnvOnly {
            native: NativePlatform::new(),
            env: FixedEnv(
                vars.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    fn temp_store(dir: &tempfile::TempDir) -> Store {
        ProfileStore::new(
            Arc::new(NativePlatform::new()),
            dir.path().join("profile.json"),
        )
    }

    #[test]
    fn key_from_env_counts_as_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let cfg = Config::default();

        assert!(!api_key_available(&platform_with(&[]), &cfg, &store));
        assert!(!api_key_available(
            &platform_with(&[("KINDRED_API_KEY", "  ")]),
            &cfg,
            &store
        ));
        assert!(api_key_available(
            &platform_with(&[("KINDRED_API_KEY", "sk-env")]),
            &cfg,
            &store
        ));
    }

    #[test]
    fn session_or_inline_key_counts_as_available() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        let mut cfg = Config::default();

        store.set_credential(SecretString::new("sk-session"));
        assert!(api_key_available(&platform_with(&[]), &cfg, &store));

        store.clear_credential();
        cfg.llm.api_key = SecretString::new("sk-inline");
        assert!(api_key_available(&platform_with(&[]), &cfg, &store));
    }

    #[tokio::test]
    async fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kindred.json");
        std::fs::write(&path, r#"{"voice": {"pauseMs": 800}, "llm": {"responseModel": "m"}}"#)
            .unwrap();

        let cfg = load_config(&NativePlatform::new(), path.to_str())
            .await
            .unwrap();
        assert_eq!(cfg.voice.pause_ms, 800);
        assert_eq!(cfg.llm.response_model, "m");
    }

    #[tokio::test]
    async fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(load_config(&NativePlatform::new(), path.to_str()).await.is_err());
    }

    #[test]
    fn tables_list_every_row() {
        let mut profile = UserProfile::new();
        profile.merge([("name".to_string(), "Ann".to_string())]);
        let rendered = profile_table(&profile).to_string();
        assert!(rendered.contains("name"));
        assert!(rendered.contains("Ann"));

        let log = vec![EmotionLogEntry {
            user_message: "I lost my dog".into(),
            emotion: Emotion::Sad,
        }];
        let rendered = emotion_log_table(&log).to_string();
        assert!(rendered.contains("I lost my dog"));
        assert!(rendered.contains("SAD"));
    }
}
