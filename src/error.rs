// src/error.rs
//! Error taxonomy for the harvest subsystem.
//!
//! Adapter failures are classified into a small set of kinds; the orchestrator
//! only looks at the kind (for metrics and the status ledger) and the message.
//! Pipeline rejections are not errors and live in `pipeline::Rejection`.

use std::fmt;
use std::time::Duration;

/// Coarse classification used for the ledger `last_error` text and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Parse,
    Cancelled,
    Config,
    Panic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Parse => "parse",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Panic => "panic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("network: {0}")]
    Network(String),

    #[error("timeout: no result within {0:?}")]
    Timeout(Duration),

    #[error("parse: {0}")]
    Parse(String),

    #[error("cancelled: run shut down before the adapter finished")]
    Cancelled,

    #[error("no adapter registered for source '{0}'")]
    NotRegistered(String),

    #[error("panic: adapter panicked: {0}")]
    Panicked(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Network(_) => ErrorKind::Network,
            AdapterError::Timeout(_) => ErrorKind::Timeout,
            AdapterError::Parse(_) => ErrorKind::Parse,
            AdapterError::Cancelled => ErrorKind::Cancelled,
            AdapterError::NotRegistered(_) => ErrorKind::Config,
            AdapterError::Panicked(_) => ErrorKind::Panic,
        }
    }

    pub fn network(e: impl fmt::Display) -> Self {
        AdapterError::Network(e.to_string())
    }

    pub fn parse(e: impl fmt::Display) -> Self {
        AdapterError::Parse(e.to_string())
    }

    /// Classify a payload caught from an unwinding adapter future.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        AdapterError::Panicked(msg)
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured limit; the orchestrator
            // deadline is the one that matters for reporting.
            AdapterError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            AdapterError::Parse(e.to_string())
        } else {
            AdapterError::Network(e.to_string())
        }
    }
}

/// Failure writing to the persistence gateway. Handled per event, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("rejected write for '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

/// Errors surfaced by the trigger surface (`run_one`, catalog edits).
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("unknown source '{0}'")]
    UnknownSource(String),
}
