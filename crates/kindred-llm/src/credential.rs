//! Session-scoped credential shared between the profile store and the
//! provider.

use std::sync::Arc;

use parking_lot::RwLock;

use kindred_types::secret::SecretString;

/// In-memory slot for an API key entered during this session.
///
/// Cloning shares the slot. It is never persisted.
#[derive(Debug, Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<SecretString>>>,
}

impl CredentialSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SecretString> {
        self.inner.read().clone()
    }

    pub fn set(&self, key: SecretString) {
        *self.inner.write() = Some(key);
    }

    /// Forget the key; returns whether one was held.
    pub fn clear(&self) -> bool {
        self.inner.write().take().is_some()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}
