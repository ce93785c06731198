// src/store.rs
//! Persistence gateway. The storage engine itself lives outside this crate;
//! the orchestrator only needs idempotent upsert, per-source clear, and query.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{EventKey, NormalizedEvent};

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub source_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn for_source(name: &str) -> Self {
        Self {
            source_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, ev: &NormalizedEvent) -> bool {
        self.source_name
            .as_deref()
            .map_or(true, |s| ev.source_name == s)
            && self.from.map_or(true, |f| ev.start_time >= f)
            && self.to.map_or(true, |t| ev.start_time <= t)
            && self
                .category
                .as_deref()
                .map_or(true, |c| ev.category.eq_ignore_ascii_case(c))
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert or replace by natural key `(source, title, start day)`.
    async fn upsert_event(&self, ev: &NormalizedEvent) -> Result<(), StoreError>;

    /// Remove every event of `source_name`; returns how many were removed.
    async fn clear_events_for_source(&self, source_name: &str) -> Result<usize, StoreError>;

    /// Matching events ordered by start time.
    async fn query(&self, q: &EventQuery) -> Result<Vec<NormalizedEvent>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: Mutex<BTreeMap<EventKey, NormalizedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<EventKey, NormalizedEvent>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn upsert_event(&self, ev: &NormalizedEvent) -> Result<(), StoreError> {
        self.lock().insert(ev.key(), ev.clone());
        Ok(())
    }

    async fn clear_events_for_source(&self, source_name: &str) -> Result<usize, StoreError> {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|k, _| k.source_name != source_name);
        Ok(before - map.len())
    }

    async fn query(&self, q: &EventQuery) -> Result<Vec<NormalizedEvent>, StoreError> {
        let mut out: Vec<NormalizedEvent> = self
            .lock()
            .values()
            .filter(|ev| q.matches(ev))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.title.cmp(&b.title))
        });
        if let Some(n) = q.limit {
            out.truncate(n);
        }
        Ok(out)
    }
}
