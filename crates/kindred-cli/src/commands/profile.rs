//! `kindred profile` -- inspect or reset the remembered facts.
//!
//! ```text
//! kindred profile show
//! kindred profile clear
//! ```

use std::sync::Arc;

use kindred_platform::NativePlatform;
use kindred_types::config::Config;

use super::{open_store, print_profile};

/// Print the saved profile as a table.
pub async fn profile_show(platform: Arc<NativePlatform>, cfg: &Config) {
    let store = open_store(platform, cfg);
    let profile = store.load().await;
    println!("Profile: {}", store.path().display());
    print_profile(&profile);
}

/// Delete the saved profile.
pub async fn profile_clear(platform: Arc<NativePlatform>, cfg: &Config) -> anyhow::Result<()> {
    let store = open_store(platform, cfg);
    store
        .clear()
        .await
        .map_err(|e| anyhow::anyhow!("failed to clear profile: {e}"))?;
    println!("Profile cleared.");
    Ok(())
}
