// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use adapter::{Adapter, AdapterRegistry, FetchSession, SessionTracker};
pub use catalog::SourceCatalog;
pub use config::HarvestConfig;
pub use error::{AdapterError, ErrorKind, HarvestError, StoreError};
pub use ledger::{SourceStatusEntry, StatusLedger};
pub use model::{NormalizedEvent, RawCandidate, RawDate, RunOutcome, RunReport, Source, SourceRunReport};
pub use orchestrator::{Orchestrator, RunSettings};
pub use pipeline::{normalize_candidate, process_batch, PipelineConfig, Rejection};
pub use store::{EventQuery, EventStore, InMemoryEventStore};
