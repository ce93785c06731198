// tests/config_run.rs
use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use event_harvester::{
    AdapterRegistry, ErrorKind, EventQuery, EventStore, HarvestConfig, InMemoryEventStore,
    Orchestrator, SessionTracker, SourceCatalog, StatusLedger,
};

const CONFIG: &str = r#"
concurrency = 2
politeness_delay_ms = 0
forward_window_days = 7
default_price_text = "See site"

[[sources]]
name = "Park Board"
adapter = "fixed"
category = "Outdoors"

[[sources.extra.events]]
title = "Movies in the Park"
date = "Friday 8pm"
location = "Cal Anderson"

[[sources.extra.events]]
title = "Movies in the Park"
date = "Aug 22, 2025 9pm"

[[sources.extra.events]]
title = "Privacy Policy"
date = "today"

[[sources.extra.events]]
title = "Fall Plant Sale"
date = "2025-09-06"

[[sources]]
name = "Bespoke Venue"
url = "https://venue.test/calendar"

[[sources]]
name = "Closed Library"
adapter = "fixed"
enabled = false
"#;

#[tokio::test]
async fn config_file_drives_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    fs::write(&path, CONFIG).unwrap();

    let cfg = HarvestConfig::load_from(&path).unwrap();
    let registry = AdapterRegistry::from_sources(&cfg.sources).unwrap();
    assert!(!registry.contains("Bespoke Venue"));

    let store = Arc::new(InMemoryEventStore::new());
    let ledger = Arc::new(StatusLedger::new());
    let orch = Orchestrator::new(
        Arc::new(SourceCatalog::new(cfg.sources.clone())),
        registry,
        store.clone(),
        Arc::clone(&ledger),
        cfg.run_settings(),
        cfg.pipeline_config().unwrap(),
    )
    .with_clock(|| Utc.with_ymd_and_hms(2025, 8, 18, 19, 0, 0).unwrap())
    .with_tracker(SessionTracker::default());

    let report = orch.run_all().await;
    assert_eq!(report.per_source.len(), 2);

    let park = report.entry("Park Board").unwrap();
    assert!(park.success);
    assert_eq!(park.candidates, 4);
    assert_eq!(park.events_found, 1);
    assert_eq!(park.dedup_hits, 1);
    assert_eq!(park.rejected, 2);

    let bespoke = report.entry("Bespoke Venue").unwrap();
    assert_eq!(bespoke.error_kind, Some(ErrorKind::Config));

    let stored = store.query(&EventQuery::for_source("Park Board")).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].category, "Outdoors");
    assert_eq!(stored[0].price_text, "See site");
    assert_eq!(stored[0].location.as_deref(), Some("Cal Anderson"));

    let snapshot = dir.path().join("state").join("source_status.json");
    ledger.save_to(&snapshot).await.unwrap();
    let back = StatusLedger::load_from(&snapshot, 100).await.unwrap();
    assert_eq!(back.list().len(), 2);
    assert_eq!(back.get("Bespoke Venue").unwrap().error_count, 1);
}

#[test]
fn shipped_config_loads() {
    let cfg = HarvestConfig::load_from(std::path::Path::new("config/harvest.toml")).unwrap();
    assert_eq!(cfg.sources.len(), 3);
    let registry = AdapterRegistry::from_sources(&cfg.sources).unwrap();
    assert_eq!(registry.len(), 3);
    assert!(cfg.pipeline_config().is_ok());
}
