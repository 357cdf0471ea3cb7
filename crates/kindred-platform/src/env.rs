//! Environment variable access.

/// Read-only view of environment-style configuration.
///
/// kindred never mutates the process environment; credentials entered at a
/// prompt live in the profile store's session slot instead.
pub trait Environment: Send + Sync {
    /// Get a variable, or `None` if unset or empty.
    fn get_var(&self, name: &str) -> Option<String>;
}

/// [`Environment`] over `std::env`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEnvironment;

impl Environment for NativeEnvironment {
    fn get_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}
