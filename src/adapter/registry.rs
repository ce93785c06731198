// src/adapter/registry.rs
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::providers::{fixed::FixedAdapter, json_feed::JsonFeedAdapter, rss::RssAdapter};
use super::Adapter;
use crate::model::Source;

/// Built-in adapter kinds selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Rss,
    Json,
    Fixed,
}

impl FromStr for AdapterKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(AdapterKind::Rss),
            "json" => Ok(AdapterKind::Json),
            "fixed" => Ok(AdapterKind::Fixed),
            other => Err(anyhow!("unknown adapter kind '{other}'")),
        }
    }
}

impl AdapterKind {
    fn build(self, source: &Source) -> Result<Arc<dyn Adapter>> {
        Ok(match self {
            AdapterKind::Rss => Arc::new(RssAdapter::new()),
            AdapterKind::Json => Arc::new(JsonFeedAdapter::new()),
            AdapterKind::Fixed => Arc::new(FixedAdapter::from_source(source)?),
        })
    }
}

/// Explicit source name → adapter map, built once at startup and owned by the orchestrator.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    by_source: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build entries for every source naming a built-in `adapter` kind.
    /// Sources without one are expected to be registered in code via `register`.
    pub fn from_sources(sources: &[Source]) -> Result<Self> {
        let mut reg = Self::new();
        for s in sources {
            let Some(kind) = s.adapter.as_deref() else {
                continue;
            };
            let adapter = kind
                .parse::<AdapterKind>()
                .and_then(|k| k.build(s))
                .with_context(|| format!("building adapter for source '{}'", s.name))?;
            reg.register(&s.name, adapter);
        }
        Ok(reg)
    }

    /// Register (or replace) the adapter for `source_name`.
    pub fn register(&mut self, source_name: &str, adapter: Arc<dyn Adapter>) {
        if self
            .by_source
            .insert(source_name.to_string(), adapter)
            .is_some()
        {
            tracing::warn!(source = source_name, "adapter registration replaced");
        }
    }

    pub fn with(mut self, source_name: &str, adapter: impl Adapter + 'static) -> Self {
        self.register(source_name, Arc::new(adapter));
        self
    }

    pub fn get(&self, source_name: &str) -> Option<Arc<dyn Adapter>> {
        self.by_source.get(source_name).cloned()
    }

    pub fn contains(&self, source_name: &str) -> bool {
        self.by_source.contains_key(source_name)
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.by_source.keys().collect();
        names.sort();
        f.debug_struct("AdapterRegistry")
            .field("sources", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("RSS".parse::<AdapterKind>().unwrap(), AdapterKind::Rss);
        assert_eq!(" json ".parse::<AdapterKind>().unwrap(), AdapterKind::Json);
        assert!("scrapeEvents".parse::<AdapterKind>().is_err());
    }

    #[test]
    fn builds_from_sources_and_skips_code_registered() {
        let mut fixed = Source::new("Fixture Hall", "").with_adapter("fixed");
        fixed
            .extra
            .insert("events".into(), json!([{"title": "Open Mic Night", "date": "today"}]));
        let sources = vec![
            Source::new("Library", "https://lib.test/feed.xml").with_adapter("rss"),
            Source::new("Bespoke Venue", "https://venue.test"),
            fixed,
        ];
        let reg = AdapterRegistry::from_sources(&sources).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.contains("Library"));
        assert!(reg.contains("Fixture Hall"));
        assert!(reg.get("Bespoke Venue").is_none());
    }

    #[test]
    fn unknown_kind_is_a_startup_error() {
        let sources = vec![Source::new("Odd", "https://odd.test").with_adapter("browser")];
        let err = AdapterRegistry::from_sources(&sources).unwrap_err();
        assert!(format!("{err:#}").contains("Odd"));
    }
}
