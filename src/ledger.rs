// src/ledger.rs
//! Source status ledger: per-source "is this healthy" record.
//!
//! Every write appends to a capped log and upserts the current entry for that
//! source. Unknown names are created on first write. Writes are keyed by source
//! name, so concurrent results from different sources never touch the same entry.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAP: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatusEntry {
    pub source_name: String,
    pub last_run_at: DateTime<Utc>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Consecutive failures; reset by the next success.
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_status: LastStatus,
    pub last_event_count: usize,
    pub last_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub source_name: String,
    pub at: DateTime<Utc>,
    pub success: bool,
    pub event_count: usize,
    pub error: Option<String>,
}

/// Outcome of one source run as the ledger sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Success { events: usize },
    Error { message: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<SourceStatusEntry>,
    log: Vec<StatusLogEntry>,
}

#[derive(Debug)]
pub struct StatusLedger {
    current: RwLock<HashMap<String, SourceStatusEntry>>,
    log: Mutex<VecDeque<StatusLogEntry>>,
    cap: usize,
}

impl Default for StatusLedger {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAP)
    }
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            current: RwLock::new(HashMap::new()),
            log: Mutex::new(VecDeque::with_capacity(cap.min(10_000))),
            cap,
        }
    }

    pub fn record_success(&self, name: &str, count: usize) {
        self.record(name, RunResult::Success { events: count }, Utc::now(), 0);
    }

    pub fn record_error(&self, name: &str, message: &str) {
        self.record(
            name,
            RunResult::Error {
                message: message.to_string(),
            },
            Utc::now(),
            0,
        );
    }

    /// Append to the log and upsert the current entry for `name`.
    pub fn record(&self, name: &str, result: RunResult, at: DateTime<Utc>, duration_ms: u64) {
        let (success, event_count, error) = match &result {
            RunResult::Success { events } => (true, *events, None),
            RunResult::Error { message } => (false, 0, Some(message.clone())),
        };

        {
            let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
            log.push_back(StatusLogEntry {
                source_name: name.to_string(),
                at,
                success,
                event_count,
                error: error.clone(),
            });
            while log.len() > self.cap {
                log.pop_front();
            }
        }

        let mut map = self.current.write().unwrap_or_else(|p| p.into_inner());
        let entry = map
            .entry(name.to_string())
            .or_insert_with(|| SourceStatusEntry {
                source_name: name.to_string(),
                last_run_at: at,
                last_success_at: None,
                error_count: 0,
                last_error: None,
                last_status: LastStatus::Success,
                last_event_count: 0,
                last_duration_ms: 0,
            });
        entry.last_run_at = at;
        entry.last_duration_ms = duration_ms;
        entry.last_event_count = event_count;
        if success {
            entry.last_status = LastStatus::Success;
            entry.last_success_at = Some(at);
            entry.error_count = 0;
        } else {
            entry.last_status = LastStatus::Error;
            entry.error_count = entry.error_count.saturating_add(1);
            entry.last_error = error;
        }
    }

    pub fn get(&self, name: &str) -> Option<SourceStatusEntry> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    /// All entries, sorted by source name.
    pub fn list(&self) -> Vec<SourceStatusEntry> {
        let mut v: Vec<SourceStatusEntry> = self
            .current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        v.sort_by(|a, b| a.source_name.cmp(&b.source_name));
        v
    }

    /// Explicit reset; the only way an entry is removed.
    pub fn reset(&self, name: &str) -> bool {
        self.current
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name)
            .is_some()
    }

    /// Last `n` log rows for `name`, oldest first.
    pub fn log_for(&self, name: &str, n: usize) -> Vec<StatusLogEntry> {
        let log = self.log.lock().unwrap_or_else(|p| p.into_inner());
        let mut rows: Vec<StatusLogEntry> = log
            .iter()
            .rev()
            .filter(|e| e.source_name == name)
            .take(n)
            .cloned()
            .collect();
        rows.reverse();
        rows
    }

    pub fn log_len(&self) -> usize {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            entries: self.list(),
            log: self
                .log
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .iter()
                .cloned()
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot).context("serialize status ledger")?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot written by `save_to`. A missing file yields an empty ledger.
    pub async fn load_from(path: &Path, cap: usize) -> Result<Self> {
        let ledger = Self::with_log_capacity(cap);
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("parse status ledger {}", path.display()))?;
        {
            let mut map = ledger.current.write().unwrap_or_else(|p| p.into_inner());
            for e in snapshot.entries {
                map.insert(e.source_name.clone(), e);
            }
        }
        {
            let mut log = ledger.log.lock().unwrap_or_else(|p| p.into_inner());
            let skip = snapshot.log.len().saturating_sub(ledger.cap);
            log.extend(snapshot.log.into_iter().skip(skip));
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 18, h, 0, 0).unwrap()
    }

    #[test]
    fn unknown_names_are_created_implicitly() {
        let l = StatusLedger::new();
        assert!(l.get("Library").is_none());
        l.record_error("Library", "network: connection refused");
        let e = l.get("Library").unwrap();
        assert_eq!(e.error_count, 1);
        assert_eq!(e.last_status, LastStatus::Error);
        assert_eq!(e.last_success_at, None);
        assert_eq!(e.last_error.as_deref(), Some("network: connection refused"));
    }

    #[test]
    fn success_resets_consecutive_errors() {
        let l = StatusLedger::new();
        l.record("A", RunResult::Error { message: "timeout".into() }, at(1), 10);
        l.record("A", RunResult::Error { message: "timeout".into() }, at(2), 10);
        assert_eq!(l.get("A").unwrap().error_count, 2);

        l.record("A", RunResult::Success { events: 7 }, at(3), 40);
        let e = l.get("A").unwrap();
        assert_eq!(e.error_count, 0);
        assert_eq!(e.last_success_at, Some(at(3)));
        assert_eq!(e.last_run_at, at(3));
        assert_eq!(e.last_event_count, 7);
        assert_eq!(e.last_duration_ms, 40);
        assert_eq!(l.log_for("A", 10).len(), 3);
    }

    #[test]
    fn log_is_capped_and_list_sorted() {
        let l = StatusLedger::with_log_capacity(2);
        l.record_success("B", 1);
        l.record_success("A", 2);
        l.record_success("C", 3);
        assert_eq!(l.log_len(), 2);
        let names: Vec<_> = l.list().into_iter().map(|e| e.source_name).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert!(l.log_for("B", 5).is_empty());
    }

    #[test]
    fn reset_removes_entry() {
        let l = StatusLedger::new();
        l.record_success("A", 1);
        assert!(l.reset("A"));
        assert!(!l.reset("A"));
        assert!(l.get("A").is_none());
    }

    #[tokio::test]
    async fn snapshot_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("source_status.json");

        let empty = StatusLedger::load_from(&path, 10).await.unwrap();
        assert!(empty.list().is_empty());

        let l = StatusLedger::new();
        l.record("A", RunResult::Success { events: 3 }, at(5), 12);
        l.record("B", RunResult::Error { message: "parse: bad".into() }, at(6), 3);
        l.save_to(&path).await.unwrap();

        let back = StatusLedger::load_from(&path, 10).await.unwrap();
        assert_eq!(back.list(), l.list());
        assert_eq!(back.log_len(), 2);
    }
}
