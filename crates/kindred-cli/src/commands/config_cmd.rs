//! `kindred config` -- display the resolved configuration.
//!
//! Secrets serialize as empty strings, so the output is safe to share.

use kindred_types::config::Config;

/// Print the resolved configuration as formatted JSON.
pub fn config_show(config: &Config) {
    match render(config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize config: {e}"),
    }
}

fn render(config: &Config) -> serde_json::Result<String> {
    serde_json::to_string_pretty(config)
}
