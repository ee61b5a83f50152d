//! Filter model: per-view key/value constraints with the `"all"` sentinel.
//!
//! A key that is absent and a key set to `"all"` are indistinguishable to
//! every consumer: blank and sentinel values are never stored. Values are
//! otherwise not validated here; select inputs in the presentation layer
//! constrain them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved value meaning "no constraint" for any filter key.
pub const ALL: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FilterWire")]
pub struct FilterState {
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct FilterWire {
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl From<FilterWire> for FilterState {
    fn from(wire: FilterWire) -> Self {
        wire.values
            .iter()
            .fold(Self::new(), |state, (k, v)| state.set(k, v))
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from `(key, value)` pairs. Later pairs win.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .fold(Self::new(), |state, (k, v)| state.set(k, v))
    }

    /// Returns a new state with `key` set to `value`. A blank or sentinel
    /// value clears the key.
    pub fn set(&self, key: &str, value: &str) -> Self {
        if !is_constraint(value) {
            return self.reset(key);
        }
        let mut next = self.clone();
        next.values.insert(key.to_string(), value.to_string());
        next
    }

    /// Returns a new state with `key` back at the sentinel.
    pub fn reset(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.values.remove(key);
        next
    }

    /// Returns a new state keeping only the given keys.
    pub fn retain_keys(&self, keys: &[&str]) -> Self {
        let mut next = self.clone();
        next.values.retain(|k, _| keys.contains(&k.as_str()));
        next
    }

    /// Stored value, or `"all"` when unset.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or(ALL)
    }

    /// True when the key constrains a request: present, not the sentinel,
    /// and not blank.
    pub fn is_active(&self, key: &str) -> bool {
        is_constraint(self.get(key))
    }

    /// Values of `keys` in the given order, sentinel-filled.
    pub fn project(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| self.get(k).to_string()).collect()
    }

    /// Keys currently holding a constraint.
    pub fn active_keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

/// A value constrains a request unless it is the sentinel or blank.
pub fn is_constraint(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != ALL
}
