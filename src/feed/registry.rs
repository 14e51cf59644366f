use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use super::provider::Provider;
use super::types::SourceKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown provider kind: {0}")]
    UnknownKind(String),
}

/// Maps each source kind to the provider that serves it.
///
/// Built once at startup and shared behind an `Arc`; lookups take a read
/// lock that is released before the caller awaits anything.
#[derive(Default)]
pub struct Registry {
    providers: RwLock<HashMap<SourceKind, Arc<dyn Provider>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under its kind, replacing any earlier entry.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let kind = provider.kind();
        let previous = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, provider);
        if previous.is_some() {
            tracing::debug!(kind = %kind, "Replaced registered provider");
        }
    }

    /// Looks up the provider for a stored kind name.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Provider>, RegistryError> {
        let parsed: SourceKind = kind.parse().map_err(RegistryError::UnknownKind)?;
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&parsed)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    /// Registered kinds, sorted by name.
    pub fn kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
