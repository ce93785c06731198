// src/metrics.rs
use std::net::SocketAddr;

use ::metrics::{describe_counter, describe_gauge, describe_histogram};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

pub const CANDIDATES_TOTAL: &str = "harvest_candidates_total";
pub const ACCEPTED_TOTAL: &str = "harvest_accepted_total";
pub const REJECTED_TOTAL: &str = "harvest_rejected_total";
pub const DEDUP_TOTAL: &str = "harvest_dedup_total";
pub const ADAPTER_ERRORS_TOTAL: &str = "harvest_adapter_errors_total";
pub const PERSIST_ERRORS_TOTAL: &str = "harvest_persist_errors_total";
pub const ADAPTER_MS: &str = "harvest_adapter_ms";
pub const SESSIONS_OPEN: &str = "harvest_sessions_open";
pub const LAST_RUN_TS: &str = "harvest_last_run_ts";
pub const RUNS_TOTAL: &str = "harvest_runs_total";
pub const RUNS_REJECTED_TOTAL: &str = "harvest_runs_rejected_total";

/// One-time metrics registration (so series show up on the exporter).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(CANDIDATES_TOTAL, "Raw candidates produced by adapters.");
        describe_counter!(ACCEPTED_TOTAL, "Candidates accepted by the pipeline.");
        describe_counter!(
            REJECTED_TOTAL,
            "Candidates rejected by the pipeline, labelled by reason."
        );
        describe_counter!(DEDUP_TOTAL, "Duplicates collapsed within a source run.");
        describe_counter!(
            ADAPTER_ERRORS_TOTAL,
            "Adapter failures, labelled by kind (network/timeout/parse/...)."
        );
        describe_counter!(PERSIST_ERRORS_TOTAL, "Failed event writes.");
        describe_histogram!(ADAPTER_MS, "Adapter wall time in milliseconds.");
        describe_gauge!(SESSIONS_OPEN, "Fetch sessions currently held by adapters.");
        describe_gauge!(LAST_RUN_TS, "Unix ts when a full run last finished.");
        describe_counter!(RUNS_TOTAL, "Full runs started.");
        describe_counter!(
            RUNS_REJECTED_TOTAL,
            "Full runs refused because another was in progress."
        );
    });
}

/// Install the Prometheus recorder and let the exporter serve `/metrics` on `addr`.
/// Must be called from within a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: listen on {addr}"))?;
    ensure_described();
    Ok(())
}
