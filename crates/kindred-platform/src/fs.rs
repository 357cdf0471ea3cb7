//! Filesystem abstraction and native implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Filesystem operations used by config loading and the profile store.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's entire contents as UTF-8.
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Write a file, creating parent directories if needed.
    ///
    /// The content is written to a sibling temp file and renamed into place,
    /// so a crash mid-write leaves the previous version intact.
    async fn write_string(&self, path: &Path, content: &str) -> std::io::Result<()>;

    /// Whether a path exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Remove a file. Removing a file that does not exist is not an error.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// [`FileSystem`] over `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFileSystem;

#[async_trait]
impl FileSystem for NativeFileSystem {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_string(&self, path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

/// Expand a leading `~/` (or a bare `~`) against `home`.
///
/// Paths without the prefix, or with no home directory available, are
/// returned unchanged.
pub fn expand_home(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (raw, Some(home)) if raw.starts_with("~/") => home.join(&raw[2..]),
        (raw, _) => PathBuf::from(raw),
    }
}
