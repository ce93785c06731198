// src/adapter/providers/fixed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::adapter::{Adapter, FetchSession};
use crate::error::AdapterError;
use crate::model::{RawCandidate, Source};

/// Candidates listed inline in configuration (`extra.events`). No network.
#[derive(Debug, Clone, Default)]
pub struct FixedAdapter {
    events: Vec<RawCandidate>,
}

impl FixedAdapter {
    pub fn new(events: Vec<RawCandidate>) -> Self {
        Self { events }
    }

    pub fn from_source(source: &Source) -> Result<Self> {
        let events = match source.extra.get("events") {
            Some(v) => serde_json::from_value(v.clone())
                .with_context(|| format!("extra.events of '{}'", source.name))?,
            None => Vec::new(),
        };
        Ok(Self { events })
    }
}

#[async_trait]
impl Adapter for FixedAdapter {
    async fn run(
        &self,
        _source: &Source,
        _session: &mut FetchSession,
    ) -> Result<Vec<RawCandidate>, AdapterError> {
        Ok(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_events_from_extra() {
        let mut src = Source::new("Park Board", "");
        src.extra.insert(
            "events".into(),
            json!([{"title": "Movies in the Park", "date": "Friday 8pm", "location": "Cal Anderson"}]),
        );
        let a = FixedAdapter::from_source(&src).unwrap();
        assert_eq!(a.events.len(), 1);
        assert_eq!(a.events[0].location.as_deref(), Some("Cal Anderson"));
    }

    #[test]
    fn malformed_events_fail_at_startup() {
        let mut src = Source::new("Park Board", "");
        src.extra.insert("events".into(), json!({"title": "not a list"}));
        assert!(FixedAdapter::from_source(&src).is_err());
    }
}
