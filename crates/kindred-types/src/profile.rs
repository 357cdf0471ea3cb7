//! Durable user facts.
//!
//! A [`UserProfile`] maps normalized fact keys (`favorite_color`) to string
//! values. Merges are last-write-wins per key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Facts the companion has learned about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile {
    facts: BTreeMap<String, String>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Merge newly extracted facts into the profile.
    ///
    /// New keys are added and existing keys overwritten. Keys are normalized
    /// with [`normalize_fact_key`]; entries whose key normalizes to nothing
    /// are dropped. Returns `true` if anything changed.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = (String, String)>) -> bool {
        let mut changed = false;
        for (key, value) in incoming {
            let key = normalize_fact_key(&key);
            if key.is_empty() {
                continue;
            }
            if self.facts.get(&key) != Some(&value) {
                self.facts.insert(key, value);
                changed = true;
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }
}

impl FromIterator<(String, String)> for UserProfile {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut profile = Self::new();
        profile.merge(iter);
        profile
    }
}

/// Normalize a fact key to lowercase, underscore-delimited form.
///
/// Runs of anything that is not an ASCII letter or digit collapse to a
/// single underscore; leading and trailing underscores are trimmed.
///
/// ```
/// # use kindred_types::profile::normalize_fact_key;
/// assert_eq!(normalize_fact_key("Favorite Color"), "favorite_color");
/// assert_eq!(normalize_fact_key("petName"), "petname");
/// assert_eq!(normalize_fact_key("  home--town "), "home_town");
/// ```
pub fn normalize_fact_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
