// src/orchestrator.rs
//! Run orchestrator.
//!
//! `run_all` is single-flight: a second call while a run is in progress returns
//! an `AlreadyRunning` report immediately. Enabled sources are split into groups
//! of `concurrency`; groups run one after another with a politeness delay in
//! between, members of a group run concurrently. Every adapter call gets its own
//! `FetchSession` and deadline, so a slow or failing source only affects its own
//! report entry.
//!
//! `run_one` takes the same per-source path but ignores the single-flight flag.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::adapter::{AdapterRegistry, SessionTracker};
use crate::catalog::SourceCatalog;
use crate::error::{AdapterError, ErrorKind, HarvestError};
use crate::ledger::{RunResult, SourceStatusEntry, StatusLedger};
use crate::metrics as m;
use crate::model::{NormalizedEvent, RawCandidate, RunOutcome, RunReport, Source, SourceRunReport};
use crate::pipeline::{process_batch, PipelineConfig};
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub concurrency: usize,
    pub adapter_timeout: Duration,
    pub politeness_delay: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            adapter_timeout: Duration::from_secs(60),
            politeness_delay: Duration::from_secs(2),
        }
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Orchestrator {
    catalog: Arc<SourceCatalog>,
    registry: AdapterRegistry,
    store: Arc<dyn EventStore>,
    ledger: Arc<StatusLedger>,
    settings: RunSettings,
    pipeline: PipelineConfig,
    clock: Clock,
    tracker: SessionTracker,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Clears the single-flight flag however the run ends (return, panic, drop).
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        registry: AdapterRegistry,
        store: Arc<dyn EventStore>,
        ledger: Arc<StatusLedger>,
        settings: RunSettings,
        pipeline: PipelineConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            catalog,
            registry,
            store,
            ledger,
            settings: RunSettings {
                concurrency: settings.concurrency.max(1),
                ..settings
            },
            pipeline,
            clock: Arc::new(Utc::now),
            tracker: SessionTracker::new(crate::adapter::default_http_client()),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Reference clock for date windowing.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_tracker(mut self, tracker: SessionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    pub fn catalog(&self) -> &Arc<SourceCatalog> {
        &self.catalog
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> Vec<SourceStatusEntry> {
        self.ledger.list()
    }

    /// Cancel the current run and every later one. In-flight adapters are
    /// dropped (releasing their sessions) and pending sources report `cancelled`.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!(target: "harvest", "shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `shutdown` has been called.
    pub async fn shutdown_requested(&self) {
        wait_for_shutdown(self.shutdown.subscribe()).await
    }

    pub async fn run_all(&self) -> RunReport {
        let now = (self.clock)();
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            counter!(m::RUNS_REJECTED_TOTAL).increment(1);
            tracing::info!(target: "harvest", "run already in progress");
            return RunReport::already_running(now);
        };
        m::ensure_described();
        counter!(m::RUNS_TOTAL).increment(1);

        let t0 = Instant::now();
        let sources = self.catalog.enabled();
        let position: HashMap<&str, usize> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut per_source = Vec::with_capacity(sources.len());
        for (i, group) in sources.chunks(self.settings.concurrency).enumerate() {
            if i > 0 && !self.is_shutdown() {
                self.politeness_pause().await;
            }
            if self.is_shutdown() {
                per_source.extend(group.iter().map(|s| cancelled_report(&s.name)));
                continue;
            }
            tracing::debug!(
                target: "harvest",
                group = i,
                sources = ?group.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                "starting group"
            );
            let mut inflight: FuturesUnordered<_> =
                group.iter().map(|s| self.run_source(s, now)).collect();
            while let Some(report) = inflight.next().await {
                per_source.push(report);
            }
        }
        per_source.sort_by_key(|r| position.get(r.name.as_str()).copied().unwrap_or(usize::MAX));

        let report = finish(now, per_source, t0);
        gauge!(m::LAST_RUN_TS).set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "harvest",
            outcome = ?report.outcome,
            sources = report.per_source.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            events = report.events_found(),
            ms = report.total_duration_ms,
            "run finished"
        );
        report
    }

    /// Run a single source by name, enabled or not, regardless of a full run in progress.
    pub async fn run_one(&self, name: &str) -> Result<RunReport, HarvestError> {
        let source = self
            .catalog
            .get(name)
            .ok_or_else(|| HarvestError::UnknownSource(name.to_string()))?;
        let now = (self.clock)();
        let t0 = Instant::now();
        let entry = self.run_source(&source, now).await;
        let report = finish(now, vec![entry], t0);
        tracing::info!(
            target: "harvest",
            source = name,
            success = report.succeeded() == 1,
            events = report.events_found(),
            ms = report.total_duration_ms,
            "single-source run finished"
        );
        Ok(report)
    }

    async fn politeness_pause(&self) {
        let delay = self.settings.politeness_delay;
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_shutdown(self.shutdown.subscribe()) => {}
        }
    }

    /// Adapter → pipeline → persistence → ledger for one source.
    async fn run_source(&self, source: &Source, now: DateTime<Utc>) -> SourceRunReport {
        let t0 = Instant::now();
        let result = self.invoke(source).await;

        let candidates = match result {
            Ok(c) => c,
            Err(e) => {
                let ms = elapsed_ms(t0);
                let kind = e.kind();
                counter!(m::ADAPTER_ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
                if kind == ErrorKind::Cancelled {
                    tracing::info!(source = %source.name, "adapter cancelled");
                } else {
                    tracing::warn!(source = %source.name, kind = %kind, error = %e, "adapter failed");
                    self.ledger.record(
                        &source.name,
                        RunResult::Error {
                            message: e.to_string(),
                        },
                        (self.clock)(),
                        ms,
                    );
                }
                return SourceRunReport::failed(&source.name, kind, e.to_string(), ms);
            }
        };

        let batch = process_batch(source, candidates, now, &self.pipeline);
        let persist_failures = self.persist(source, &batch.accepted).await;
        let ms = elapsed_ms(t0);

        self.ledger.record(
            &source.name,
            RunResult::Success {
                events: batch.accepted.len(),
            },
            (self.clock)(),
            ms,
        );
        tracing::debug!(
            source = %source.name,
            candidates = batch.candidates,
            kept = batch.accepted.len(),
            rejected = batch.rejected_total(),
            dedup = batch.dedup_hits,
            persist_failures,
            "source done"
        );

        SourceRunReport {
            name: source.name.clone(),
            success: true,
            events_found: batch.accepted.len(),
            error: None,
            error_kind: None,
            duration_ms: ms,
            candidates: batch.candidates,
            rejected: batch.rejected_total(),
            dedup_hits: batch.dedup_hits,
            persist_failures,
        }
    }

    /// Scoped adapter call: session acquired here and dropped on every exit path.
    async fn invoke(&self, source: &Source) -> Result<Vec<RawCandidate>, AdapterError> {
        let adapter = self
            .registry
            .get(&source.name)
            .ok_or_else(|| AdapterError::NotRegistered(source.name.clone()))?;
        let timeout = self.settings.adapter_timeout;
        let shutdown = self.shutdown.subscribe();
        let t0 = Instant::now();

        let mut session = self.tracker.acquire(&source.name, timeout);
        // A panicking adapter fails its own source, never the run.
        let call = AssertUnwindSafe(adapter.run(source, &mut session)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => Err(AdapterError::Cancelled),
            r = tokio::time::timeout(timeout, call) => match r {
                Ok(Err(payload)) => Err(AdapterError::from_panic(payload)),
                Ok(Ok(Err(AdapterError::Timeout(d)))) if d.is_zero() => Err(AdapterError::Timeout(timeout)),
                Ok(Ok(r)) => r,
                Err(_) => Err(AdapterError::Timeout(timeout)),
            },
        };
        drop(session);

        histogram!(m::ADAPTER_MS).record(t0.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Replace this source's stored events with `events`. Returns failed upserts.
    async fn persist(&self, source: &Source, events: &[NormalizedEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }
        match self.store.clear_events_for_source(&source.name).await {
            Ok(removed) => tracing::debug!(source = %source.name, removed, "cleared previous events"),
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "clear failed; upserting anyway");
                counter!(m::PERSIST_ERRORS_TOTAL, "op" => "clear").increment(1);
            }
        }

        let mut failures = 0;
        for ev in events {
            if let Err(e) = self.store.upsert_event(ev).await {
                failures += 1;
                counter!(m::PERSIST_ERRORS_TOTAL, "op" => "upsert").increment(1);
                tracing::warn!(source = %source.name, title = %ev.title, error = %e, "event write failed");
            }
        }
        failures
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

fn cancelled_report(name: &str) -> SourceRunReport {
    SourceRunReport::failed(
        name,
        ErrorKind::Cancelled,
        AdapterError::Cancelled.to_string(),
        0,
    )
}

fn finish(now: DateTime<Utc>, per_source: Vec<SourceRunReport>, t0: Instant) -> RunReport {
    let cancelled = per_source
        .iter()
        .any(|r| r.error_kind == Some(ErrorKind::Cancelled));
    RunReport {
        outcome: if cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        },
        started_at: now,
        per_source,
        total_duration_ms: elapsed_ms(t0),
    }
}

fn elapsed_ms(t0: Instant) -> u64 {
    u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::providers::fixed::FixedAdapter;
    use crate::store::InMemoryEventStore;
    use chrono::TimeZone;

    fn orch(sources: Vec<Source>, registry: AdapterRegistry) -> Orchestrator {
        Orchestrator::new(
            Arc::new(SourceCatalog::new(sources)),
            registry,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(StatusLedger::new()),
            RunSettings::default(),
            PipelineConfig::default(),
        )
        .with_clock(|| Utc.with_ymd_and_hms(2025, 8, 18, 19, 0, 0).unwrap())
        .with_tracker(SessionTracker::default())
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let g = RunGuard::acquire(&flag);
        assert!(g.is_some());
        assert!(RunGuard::acquire(&flag).is_none());
        drop(g);
        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn unregistered_source_is_a_config_error() {
        let o = orch(vec![Source::new("Bespoke", "https://b.test")], AdapterRegistry::new());
        let r = o.run_all().await;
        let e = r.entry("Bespoke").unwrap();
        assert!(!e.success);
        assert_eq!(e.error_kind, Some(ErrorKind::Config));
        assert_eq!(o.ledger().get("Bespoke").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn run_one_ignores_enabled_flag_and_rejects_unknown() {
        let reg = AdapterRegistry::new().with(
            "Off",
            FixedAdapter::new(vec![RawCandidate::new("Live Show", "2025-08-21")]),
        );
        let o = orch(vec![Source::new("Off", "").disabled()], reg);

        assert!(o.run_all().await.per_source.is_empty());
        let r = o.run_one("Off").await.unwrap();
        assert_eq!(r.events_found(), 1);
        assert!(matches!(
            o.run_one("Nope").await,
            Err(HarvestError::UnknownSource(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_before_run_cancels_everything() {
        let reg = AdapterRegistry::new().with("A", FixedAdapter::default());
        let o = orch(vec![Source::new("A", "")], reg);
        o.shutdown();
        let r = o.run_all().await;
        assert_eq!(r.outcome, RunOutcome::Cancelled);
        assert_eq!(r.entry("A").unwrap().error_kind, Some(ErrorKind::Cancelled));
        assert!(o.ledger().get("A").is_none());
        assert!(!o.is_running());
    }
}
