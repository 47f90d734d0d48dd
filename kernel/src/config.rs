//! Engine-level configuration.
//!
//! Engines hand the kernel a [`ConfigurationProvider`] through [`Engine::configuration`]. The
//! kernel only reads from it; today the sole consumer is coordinator builder lookup (see
//! [`CommitCoordinatorRegistry::resolve_configured`]).
//!
//! [`Engine::configuration`]: crate::Engine::configuration
//! [`CommitCoordinatorRegistry::resolve_configured`]:
//!     crate::coordinated_commits::CommitCoordinatorRegistry::resolve_configured

use std::collections::HashMap;
use std::fmt::Debug;

/// Read-only access to engine or session configuration.
pub trait ConfigurationProvider: Send + Sync + Debug {
    /// The value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Whether `key` has a value.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// A provider with no keys. This is what engines expose unless they override
/// [`Engine::configuration`](crate::Engine::configuration).
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyConfigurationProvider;

impl ConfigurationProvider for EmptyConfigurationProvider {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
}

/// A provider backed by an in-memory map.
#[derive(Debug, Default, Clone)]
pub struct MapConfigurationProvider {
    values: HashMap<String, String>,
}

impl MapConfigurationProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set `key` to `value`, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfigurationProvider {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl ConfigurationProvider for MapConfigurationProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
