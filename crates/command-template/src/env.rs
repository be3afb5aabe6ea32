//! Environment overlays and the host environment snapshot

use std::collections::HashMap;
use std::sync::OnceLock;

/// An environment overlay to bake into a command.
///
/// Each entry is merged key-by-key into the command's environment. An empty
/// value removes the variable instead of setting it to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env(HashMap<String, String>);

impl Env {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable in the overlay (chaining)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Mark a variable for removal (chaining)
    pub fn unset(self, key: impl Into<String>) -> Self {
        self.set(key, "")
    }

    /// Iterate over the overlay entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries in the overlay
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the overlay has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge this overlay into an environment mapping
    pub(crate) fn merge_into(&self, env: &mut HashMap<String, String>) {
        for (key, value) in &self.0 {
            if value.is_empty() {
                env.remove(key);
            } else {
                env.insert(key.clone(), value.clone());
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// Marker modifier that empties a command's environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearEnv;

/// The host process environment, captured on first use.
///
/// Variables whose name or value is not valid UTF-8 are skipped.
pub fn host_snapshot() -> &'static HashMap<String, String> {
    static SNAPSHOT: OnceLock<HashMap<String, String>> = OnceLock::new();
    SNAPSHOT.get_or_init(|| {
        std::env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    tracing::trace!(?key, "skipping non UTF-8 environment variable");
                    None
                }
            })
            .collect()
    })
}
