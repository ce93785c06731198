//! Event harvester binary.
//! Loads sources from config, then runs every enabled adapter on a fixed interval
//! until Ctrl-C / SIGTERM. Storage is in-process; the status ledger is saved to disk
//! after each run.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use event_harvester::ledger::DEFAULT_LOG_CAP;
use event_harvester::{
    AdapterRegistry, HarvestConfig, InMemoryEventStore, Orchestrator, SourceCatalog,
    StatusLedger,
};

fn env_flag(key: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| v == "1")
}

/// RUST_LOG wins; HARVEST_LOG_JSON=1 switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("event_harvester=info,harvest=info,warn"));

    if env_flag("HARVEST_LOG_JSON") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = HarvestConfig::load_default().context("loading harvest config")?;

    if let Ok(addr) = std::env::var("HARVEST_METRICS_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("HARVEST_METRICS_ADDR '{addr}'"))?;
        event_harvester::metrics::install_exporter(addr)?;
        tracing::info!(%addr, "prometheus exporter listening");
    }

    let registry = AdapterRegistry::from_sources(&cfg.sources)?;
    for s in cfg.sources.iter().filter(|s| !registry.contains(&s.name)) {
        tracing::warn!(source = %s.name, "no adapter configured; source will report a config error");
    }

    let ledger = StatusLedger::load_from(&cfg.status_path, DEFAULT_LOG_CAP)
        .await
        .context("loading status ledger")?;

    let orch = Arc::new(Orchestrator::new(
        Arc::new(SourceCatalog::new(cfg.sources.clone())),
        registry,
        Arc::new(InMemoryEventStore::new()),
        Arc::new(ledger),
        cfg.run_settings(),
        cfg.pipeline_config()?,
    ));

    let signal_orch = Arc::clone(&orch);
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_orch.shutdown();
    });

    let run_once = env_flag("HARVEST_RUN_ONCE");
    tracing::info!(
        sources = cfg.sources.len(),
        interval_secs = cfg.run_interval().as_secs(),
        run_once,
        "harvester started"
    );

    let mut ticker = tokio::time::interval(cfg.run_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = orch.shutdown_requested() => break,
        }

        orch.run_all().await;
        if let Err(e) = orch.ledger().save_to(&cfg.status_path).await {
            tracing::warn!(error = ?e, "saving status ledger failed");
        }
        if run_once || orch.is_shutdown() {
            break;
        }
    }

    let leaked = orch.tracker().open();
    if leaked > 0 {
        tracing::warn!(leaked, "fetch sessions still open at exit");
    }
    tracing::info!("harvester stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received terminate signal"),
    }
}
