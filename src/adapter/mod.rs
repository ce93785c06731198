// src/adapter/mod.rs
//! Adapter contract: given a source, produce raw candidates (or fail).
//!
//! Adapters never open and close their own transient resources ad hoc. The
//! orchestrator hands each invocation a `FetchSession`; anything an adapter
//! acquires is either owned by the session (HTTP client) or registered with
//! `FetchSession::defer`. The session is dropped on every exit path, including
//! timeouts and run cancellation (both drop the adapter future), and runs the
//! deferred cleanups then.

pub mod providers;
pub mod registry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use tokio::time::Instant;

use crate::error::AdapterError;
use crate::metrics as m;
use crate::model::{RawCandidate, Source};

pub use registry::{AdapterKind, AdapterRegistry};

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Extract candidates for `source`. Must be safe to abandon at any await
    /// point: no state shared across invocations may be left half-updated.
    async fn run(
        &self,
        source: &Source,
        session: &mut FetchSession,
    ) -> Result<Vec<RawCandidate>, AdapterError>;
}

// Sync so `&FetchSession` can be held across awaits inside Send futures.
type Cleanup = Box<dyn FnOnce() + Send + Sync>;

/// Scoped per-invocation resources. Released on drop, in reverse order of registration.
pub struct FetchSession {
    source_name: String,
    deadline: Instant,
    client: reqwest::Client,
    cleanups: Vec<Cleanup>,
    _lease: SessionLease,
}

impl FetchSession {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the orchestrator abandons this invocation.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Register a release action for a resource the adapter acquired itself
    /// (browser page, temp dir, socket).
    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.cleanups.push(Box::new(f));
    }
}

impl Drop for FetchSession {
    fn drop(&mut self) {
        let n = self.cleanups.len();
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup();
        }
        tracing::trace!(source = %self.source_name, released = n, "fetch session closed");
    }
}

/// Counts sessions currently open so shutdown (and tests) can verify nothing leaked.
#[derive(Clone, Default)]
pub struct SessionTracker {
    open: Arc<AtomicUsize>,
    client: reqwest::Client,
}

impl SessionTracker {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            open: Arc::new(AtomicUsize::new(0)),
            client,
        }
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn acquire(&self, source_name: &str, timeout: Duration) -> FetchSession {
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(m::SESSIONS_OPEN).set(now_open as f64);
        FetchSession {
            source_name: source_name.to_string(),
            deadline: Instant::now() + timeout,
            client: self.client.clone(),
            cleanups: Vec::new(),
            _lease: SessionLease {
                open: Arc::clone(&self.open),
            },
        }
    }
}

struct SessionLease {
    open: Arc<AtomicUsize>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let left = self.open.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!(m::SESSIONS_OPEN).set(left as f64);
    }
}

/// Shared outbound client for all adapters.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("event-harvester/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn cleanups_run_in_reverse_and_lease_is_returned() {
        let tracker = SessionTracker::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let mut s = tracker.acquire("Library", Duration::from_secs(5));
            assert_eq!(tracker.open(), 1);
            for i in 0..3 {
                let o = Arc::clone(&order);
                s.defer(move || o.lock().unwrap().push(i));
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(tracker.open(), 0);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn session_is_shareable_across_awaits() {
        assert_send_sync::<FetchSession>();
        assert_send_sync::<SessionTracker>();
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down_to_zero() {
        let tracker = SessionTracker::default();
        let s = tracker.acquire("Library", Duration::from_secs(2));
        assert_eq!(s.remaining(), Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(s.remaining(), Duration::ZERO);
    }
}
