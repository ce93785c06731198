// src/model.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// One external data origin, as configured at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub category: Option<String>,
    /// Registry key of the adapter kind (`rss`, `json`, `fixed`, or a custom registration).
    #[serde(default)]
    pub adapter: Option<String>,
    /// Opaque per-source settings, interpreted only by the adapter.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            category: None,
            adapter: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// Date as an adapter found it: free text, or an instant it already parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Value(DateTime<Utc>),
    Text(String),
}

impl RawDate {
    pub fn is_blank(&self) -> bool {
        match self {
            RawDate::Text(s) => s.trim().is_empty(),
            RawDate::Value(_) => false,
        }
    }
}

impl From<&str> for RawDate {
    fn from(s: &str) -> Self {
        RawDate::Text(s.to_string())
    }
}

impl From<String> for RawDate {
    fn from(s: String) -> Self {
        RawDate::Text(s)
    }
}

impl From<DateTime<Utc>> for RawDate {
    fn from(dt: DateTime<Utc>) -> Self {
        RawDate::Value(dt)
    }
}

/// Unstructured record produced by an adapter; consumed by one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<RawDate>,
    #[serde(default)]
    pub end: Option<RawDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RawCandidate {
    pub fn new(title: impl Into<String>, date: impl Into<RawDate>) -> Self {
        Self {
            title: Some(title.into()),
            date: Some(date.into()),
            ..Default::default()
        }
    }
}

/// Canonical, validated event accepted into persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub title: String,
    pub start_time: DateTime<Utc>,
    /// Calendar day of `start_time` in the reference timezone.
    pub start_day: NaiveDate,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub price_text: String,
    pub description: Option<String>,
    pub source_name: String,
    pub source_url: Option<String>,
    pub category: String,
    pub image_url: Option<String>,
}

/// `(source, lowercased title, start day)`; identity for dedup and upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub source_name: String,
    pub title: String,
    pub day: NaiveDate,
}

impl NormalizedEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            source_name: self.source_name.clone(),
            title: self.title.to_lowercase(),
            day: self.start_day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed,
    AlreadyRunning,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRunReport {
    pub name: String,
    pub success: bool,
    /// Accepted events written for this source.
    pub events_found: usize,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
    pub candidates: usize,
    pub rejected: usize,
    pub dedup_hits: usize,
    pub persist_failures: usize,
}

impl SourceRunReport {
    pub(crate) fn failed(name: &str, kind: ErrorKind, message: String, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            events_found: 0,
            error: Some(message),
            error_kind: Some(kind),
            duration_ms,
            candidates: 0,
            rejected: 0,
            dedup_hits: 0,
            persist_failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub per_source: Vec<SourceRunReport>,
    pub total_duration_ms: u64,
}

impl RunReport {
    pub fn already_running(now: DateTime<Utc>) -> Self {
        Self {
            outcome: RunOutcome::AlreadyRunning,
            started_at: now,
            per_source: Vec::new(),
            total_duration_ms: 0,
        }
    }

    pub fn is_already_running(&self) -> bool {
        self.outcome == RunOutcome::AlreadyRunning
    }

    pub fn succeeded(&self) -> usize {
        self.per_source.iter().filter(|s| s.success).count()
    }

    pub fn failed(&self) -> usize {
        self.per_source.len() - self.succeeded()
    }

    pub fn events_found(&self) -> usize {
        self.per_source.iter().map(|s| s.events_found).sum()
    }

    pub fn entry(&self, name: &str) -> Option<&SourceRunReport> {
        self.per_source.iter().find(|s| s.name == name)
    }
}
