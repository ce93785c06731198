// src/catalog.rs
use std::sync::RwLock;

use crate::error::HarvestError;
use crate::model::Source;

/// Ordered source list. Operators may flip `enabled`; runs work on a snapshot.
#[derive(Debug, Default)]
pub struct SourceCatalog {
    sources: RwLock<Vec<Source>>,
}

impl SourceCatalog {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Enabled sources in configuration order, copied so a run sees an immutable view.
    pub fn enabled(&self) -> Vec<Source> {
        self.read().into_iter().filter(|s| s.enabled).collect()
    }

    pub fn all(&self) -> Vec<Source> {
        self.read()
    }

    pub fn get(&self, name: &str) -> Option<Source> {
        self.read().into_iter().find(|s| s.name == name)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), HarvestError> {
        let mut guard = self
            .sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let src = guard
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| HarvestError::UnknownSource(name.to_string()))?;
        if src.enabled != enabled {
            tracing::info!(source = name, enabled, "source toggled");
        }
        src.enabled = enabled;
        Ok(())
    }

    fn read(&self) -> Vec<Source> {
        self.sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
