//! Explicit credential lookup.
//!
//! Callers resolve a secret once and hand the value to whatever needs it;
//! nothing here writes to the process environment.

use std::collections::HashMap;

use crate::ConfigError;

pub trait SecretSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Like [`SecretSource::get`], but a missing or empty value is an error.
    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingSecret(key.to_string()))
    }
}

/// Reads secrets from process environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory secret store, e.g. the secrets provisioned on a project.
#[derive(Default, Clone)]
pub struct MapSecrets {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for MapSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SecretSource for MapSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Tries each source in order; the first non-empty value wins.
#[derive(Default)]
pub struct ChainedSecrets {
    sources: Vec<Box<dyn SecretSource>>,
}

impl ChainedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, source: impl SecretSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl SecretSource for ChainedSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.sources
            .iter()
            .find_map(|s| s.get(key).filter(|v| !v.is_empty()))
    }
}
