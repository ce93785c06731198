// src/adapter/providers/json_feed.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::fetch_text;
use crate::adapter::{Adapter, FetchSession};
use crate::error::AdapterError;
use crate::model::{RawCandidate, RawDate, Source};

/// Default field names; override per source under `extra.fields`.
const FIELDS: [(&str, &str); 8] = [
    ("title", "title"),
    ("date", "date"),
    ("end", "end"),
    ("location", "location"),
    ("price", "price"),
    ("description", "description"),
    ("url", "url"),
    ("image", "image"),
];

/// JSON API / feed returning an array of event objects.
///
/// - `extra.items_pointer`: JSON pointer to the array (default: document root).
/// - `extra.fields.<name>`: key or JSON pointer (leading `/`) for each field.
///
/// Numeric dates are read as unix seconds (or milliseconds when large).
pub struct JsonFeedAdapter {
    fixture: Option<String>,
}

impl JsonFeedAdapter {
    pub fn new() -> Self {
        Self { fixture: None }
    }

    pub fn from_fixture(json: &str) -> Self {
        Self {
            fixture: Some(json.to_string()),
        }
    }

    pub fn parse_items(body: &str, source: &Source) -> Result<Vec<RawCandidate>, AdapterError> {
        let doc: Value = serde_json::from_str(body).map_err(AdapterError::parse)?;
        let pointer = source.extra_str("items_pointer").unwrap_or("");
        let items = doc
            .pointer(pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AdapterError::Parse(format!("no array at items_pointer '{pointer}'"))
            })?;

        let map = FieldMap::from_source(source);
        Ok(items.iter().map(|it| map.candidate(it)).collect())
    }
}

impl Default for JsonFeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for JsonFeedAdapter {
    async fn run(
        &self,
        source: &Source,
        session: &mut FetchSession,
    ) -> Result<Vec<RawCandidate>, AdapterError> {
        let body = match &self.fixture {
            Some(s) => s.clone(),
            None => fetch_text(session, &source.url).await?,
        };
        Self::parse_items(&body, source)
    }
}

struct FieldMap {
    paths: Vec<(&'static str, String)>,
}

impl FieldMap {
    fn from_source(source: &Source) -> Self {
        let overrides = source.extra.get("fields").and_then(Value::as_object);
        let paths = FIELDS
            .iter()
            .map(|(name, default)| {
                let path = overrides
                    .and_then(|o| o.get(*name))
                    .and_then(Value::as_str)
                    .unwrap_or(*default)
                    .to_string();
                (*name, path)
            })
            .collect();
        Self { paths }
    }

    fn lookup<'a>(&self, item: &'a Value, field: &str) -> Option<&'a Value> {
        let (_, path) = self.paths.iter().find(|(n, _)| *n == field)?;
        let found = if path.starts_with('/') {
            item.pointer(path)
        } else {
            item.get(path.as_str())
        };
        found.filter(|v| !v.is_null())
    }

    fn text(&self, item: &Value, field: &str) -> Option<String> {
        match self.lookup(item, field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn date(&self, item: &Value, field: &str) -> Option<RawDate> {
        match self.lookup(item, field)? {
            Value::String(s) => Some(RawDate::Text(s.clone())),
            Value::Number(n) => epoch_to_utc(n.as_i64()?).map(RawDate::Value),
            _ => None,
        }
    }

    fn candidate(&self, item: &Value) -> RawCandidate {
        RawCandidate {
            title: self.text(item, "title"),
            date: self.date(item, "date"),
            end: self.date(item, "end"),
            location: self.text(item, "location"),
            price: self.text(item, "price"),
            description: self.text(item, "description"),
            url: self.text(item, "url"),
            image_url: self.text(item, "image"),
        }
    }
}

fn epoch_to_utc(n: i64) -> Option<DateTime<Utc>> {
    if n.unsigned_abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn default_field_names_at_root() {
        let body = r#"[{"title":"Open Mic","date":"2025-08-21","price":10,"url":"https://v.test/1"}]"#;
        let items = JsonFeedAdapter::parse_items(body, &Source::new("Venue", "")).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Open Mic"));
        assert_eq!(items[0].price.as_deref(), Some("10"));
        assert_eq!(items[0].date, Some(RawDate::Text("2025-08-21".into())));
    }

    #[test]
    fn pointer_and_field_overrides() {
        let mut src = Source::new("League", "");
        src.extra.insert("items_pointer".into(), json!("/data/games"));
        src.extra.insert(
            "fields".into(),
            json!({"title": "/teams/matchup", "date": "kickoff", "location": "/venue/name"}),
        );
        let body = r#"{"data":{"games":[
            {"teams":{"matchup":"Sounders vs Timbers"},"kickoff":1755820800,"venue":{"name":"Lumen Field"}},
            {"teams":{"matchup":"Reign vs Thorns"},"kickoff":null}
        ]}}"#;
        let items = JsonFeedAdapter::parse_items(body, &src).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Sounders vs Timbers"));
        assert_eq!(items[0].location.as_deref(), Some("Lumen Field"));
        assert_eq!(
            items[0].date,
            Some(RawDate::Value(Utc.with_ymd_and_hms(2025, 8, 22, 0, 0, 0).unwrap()))
        );
        assert_eq!(items[1].date, None);
    }

    #[test]
    fn missing_array_is_parse_error() {
        let err = JsonFeedAdapter::parse_items(r#"{"events":{}}"#, &Source::new("x", ""))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
        let err = JsonFeedAdapter::parse_items("not json", &Source::new("x", "")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
    }

    #[test]
    fn millisecond_epochs() {
        assert_eq!(
            epoch_to_utc(1_755_820_800_000),
            Some(Utc.with_ymd_and_hms(2025, 8, 22, 0, 0, 0).unwrap())
        );
        assert_eq!(epoch_to_utc(i64::MIN), None);
        assert_eq!(epoch_to_utc(i64::MAX), None);
    }
}
