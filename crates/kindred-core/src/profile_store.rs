//! Durable profile persistence and the session credential.
//!
//! The profile is a flat JSON object written to `<storage.dir>/profile.json`
//! through the platform filesystem. Writes are revisioned so that
//! background saves finishing out of order never let an older snapshot
//! overwrite a newer one.
//!
//! The credential slot is memory-only and lives as long as the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kindred_llm::CredentialSlot;
use kindred_platform::Platform;
use kindred_platform::fs::expand_home;
use kindred_types::config::StorageConfig;
use kindred_types::secret::SecretString;
use kindred_types::{Result, UserProfile};

/// Profile persistence plus the session credential.
pub struct ProfileStore<P: Platform> {
    platform: Arc<P>,
    path: PathBuf,
    credential: CredentialSlot,
    /// Revision of the last write that reached the filesystem.
    written: Mutex<u64>,
    next_revision: AtomicU64,
}

impl<P: Platform + 'static> ProfileStore<P> {
    /// Store the profile at an explicit path.
    pub fn new(platform: Arc<P>, path: PathBuf) -> Self {
        Self {
            platform,
            path,
            credential: CredentialSlot::new(),
            written: Mutex::new(0),
            next_revision: AtomicU64::new(0),
        }
    }

    /// Store the profile where `storage` says, expanding `~/`.
    pub fn from_config(platform: Arc<P>, storage: &StorageConfig) -> Self {
        let home = platform.fs().home_dir();
        let dir = expand_home(&storage.dir, home.as_deref());
        let path = dir.join(&storage.profile_file);
        Self::new(platform, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved profile.
    ///
    /// A missing file is an empty profile. So is an unreadable or corrupt
    /// one, after a warning.
    pub async fn load(&self) -> UserProfile {
        let fs = self.platform.fs();
        if !fs.exists(&self.path).await {
            debug!(path = %self.path.display(), "no saved profile");
            return UserProfile::new();
        }
        let raw = match fs.read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read profile");
                return UserProfile::new();
            }
        };
        match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => {
                info!(facts = profile.len(), "profile loaded");
                profile
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "profile is not a string map, ignoring");
                UserProfile::new()
            }
        }
    }

    /// Write the whole profile blob.
    pub async fn save(&self, profile: &UserProfile) -> Result<()> {
        let revision = self.allocate_revision();
        let content = serde_json::to_string_pretty(profile)?;
        self.write_revision(revision, Some(content)).await
    }

    /// Delete the saved profile.
    pub async fn clear(&self) -> Result<()> {
        let revision = self.allocate_revision();
        self.write_revision(revision, None).await
    }

    /// Save without waiting. Failures are logged.
    pub fn save_in_background(self: &Arc<Self>, profile: UserProfile) {
        let revision = self.allocate_revision();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let content = match serde_json::to_string_pretty(&profile) {
                Ok(content) => content,
                Err(e) => {
                    warn!(error = %e, "could not serialize profile");
                    return;
                }
            };
            if let Err(e) = store.write_revision(revision, Some(content)).await {
                warn!(path = %store.path.display(), error = %e, "profile save failed");
            }
        });
    }

    /// Delete the saved profile without waiting.
    pub fn clear_in_background(self: &Arc<Self>) {
        let revision = self.allocate_revision();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = store.write_revision(revision, None).await {
                warn!(path = %store.path.display(), error = %e, "profile delete failed");
            }
        });
    }

    fn allocate_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn write_revision(&self, revision: u64, content: Option<String>) -> Result<()> {
        let mut written = self.written.lock().await;
        if revision <= *written {
            debug!(revision, latest = *written, "skipping stale profile write");
            return Ok(());
        }
        let fs = self.platform.fs();
        match content {
            Some(content) => fs.write_string(&self.path, &content).await?,
            None => fs.remove_file(&self.path).await?,
        }
        *written = revision;
        debug!(revision, path = %self.path.display(), "profile persisted");
        Ok(())
    }

    // ── Session credential ──────────────────────────────────────────

    /// Shared handle to the credential slot, for the provider.
    pub fn credential_slot(&self) -> &CredentialSlot {
        &self.credential
    }

    pub fn credential(&self) -> Option<SecretString> {
        self.credential.get()
    }

    pub fn set_credential(&self, key: SecretString) {
        self.credential.set(key);
    }

    /// Forget the session credential; returns whether one was held.
    pub fn clear_credential(&self) -> bool {
        let cleared = self.credential.clear();
        if cleared {
            info!("session credential cleared");
        }
        cleared
    }
}

impl<P: Platform> std::fmt::Debug for ProfileStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("path", &self.path)
            .field("credential", &self.credential.is_set())
            .finish()
    }
}
