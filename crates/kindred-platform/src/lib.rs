//! Platform abstraction layer for kindred.
//!
//! The turn coordinator and profile store only touch the outside world
//! through the [`Platform`] bundle, so tests can swap in in-memory
//! implementations and the core stays free of direct `tokio::fs` /
//! `std::env` calls.

pub mod config_loader;
pub mod env;
pub mod fs;

/// Bundle of platform capabilities.
pub trait Platform: Send + Sync {
    /// Filesystem operations.
    fn fs(&self) -> &dyn fs::FileSystem;

    /// Environment variable access.
    fn env(&self) -> &dyn env::Environment;
}

/// Native platform backed by `tokio::fs` and `std::env`.
#[derive(Debug, Default)]
pub struct NativePlatform {
    fs: fs::NativeFileSystem,
    env: env::NativeEnvironment,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for NativePlatform {
    fn fs(&self) -> &dyn fs::FileSystem {
        &self.fs
    }

    fn env(&self) -> &dyn env::Environment {
        &self.env
    }
}
