//! Configuration file discovery and loading.
//!
//! Discovery order:
//! 1. An explicit path (the CLI's `--config` flag).
//! 2. The `KINDRED_CONFIG` environment variable.
//! 3. `~/.kindred/config.json`.
//! 4. Nothing found: an empty JSON object, i.e. all defaults.
//!
//! Object keys are normalized from camelCase to snake_case before the caller
//! deserializes them, except inside `headers` maps where the keys are data.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::env::Environment;
use crate::fs::FileSystem;

/// Environment variable that overrides config discovery.
pub const CONFIG_ENV_VAR: &str = "KINDRED_CONFIG";

/// Keys whose object values are passed through without normalization.
const VERBATIM_KEYS: &[&str] = &["headers"];

/// Errors from reading or parsing a config file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Pick the config path to use, without touching the filesystem.
///
/// Returns `None` only when there is neither an env override nor a home
/// directory.
pub fn discover_config_path(env: &dyn Environment, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = env.get_var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    home.map(|h| h.join(".kindred").join("config.json"))
}

/// Load raw, key-normalized configuration JSON.
///
/// An explicit path must exist. A discovered path that does not exist falls
/// back to `{}`.
pub async fn load_config_raw(
    fs: &dyn FileSystem,
    env: &dyn Environment,
    explicit: Option<&Path>,
) -> Result<Value, ConfigLoadError> {
    let path = match explicit {
        Some(path) => {
            if !fs.exists(path).await {
                return Err(ConfigLoadError::NotFound(path.to_path_buf()));
            }
            path.to_path_buf()
        }
        None => {
            let home = fs.home_dir();
            match discover_config_path(env, home.as_deref()) {
                Some(path) if fs.exists(&path).await => path,
                Some(path) => {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Value::Object(Map::new()));
                }
                None => {
                    tracing::info!("no home directory, using default config");
                    return Ok(Value::Object(Map::new()));
                }
            }
        }
    };

    tracing::debug!(path = %path.display(), "loading config file");
    let contents = fs
        .read_to_string(&path)
        .await
        .map_err(|source| ConfigLoadError::Read {
            path: path.clone(),
            source,
        })?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|source| ConfigLoadError::Parse { path, source })?;

    Ok(normalize_keys(value))
}

/// Recursively convert camelCase object keys to snake_case.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    let snake = camel_to_snake(&key);
                    if VERBATIM_KEYS.contains(&snake.as_str()) {
                        (snake, val)
                    } else {
                        (snake, normalize_keys(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Convert one camelCase identifier to snake_case.
///
/// Acronym runs stay together: `baseURL` becomes `base_url`,
/// `HTTPTimeout` becomes `http_timeout`.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut chars = name.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(ch) = chars.next() {
        if ch.is_uppercase()
            && let Some(p) = prev
        {
            let next_lower = chars.peek().is_some_and(|n| n.is_lowercase());
            let boundary = p.is_lowercase()
                || p.is_ascii_digit()
                || (p.is_uppercase() && next_lower);
            if boundary {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
        prev = Some(ch);
    }
    out
}
