// src/adapter/providers/rss.rs
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use super::fetch_text;
use crate::adapter::{Adapter, FetchSession};
use crate::error::AdapterError;
use crate::model::{RawCandidate, RawDate, Source};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// RSS 2.0 feed at `source.url`. Each `<item>` becomes one candidate; `pubDate`
/// is taken as the event date. `extra.location` / `extra.price` fill fields
/// feeds rarely carry.
pub struct RssAdapter {
    fixture: Option<String>,
}

impl RssAdapter {
    pub fn new() -> Self {
        Self { fixture: None }
    }

    /// Serve a fixed document instead of fetching (tests, demos).
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            fixture: Some(xml.to_string()),
        }
    }

    pub fn parse_items(xml: &str, source: &Source) -> Result<Vec<RawCandidate>, AdapterError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).map_err(AdapterError::parse)?;

        let location = source.extra_str("location").map(str::to_string);
        let price = source.extra_str("price").map(str::to_string);

        Ok(rss
            .channel
            .item
            .into_iter()
            .map(|it| RawCandidate {
                title: it.title,
                date: it.pub_date.map(RawDate::Text),
                end: None,
                location: location.clone(),
                price: price.clone(),
                description: it.description,
                url: it.link,
                image_url: it.enclosure.and_then(|e| e.url),
            })
            .collect())
    }
}

impl Default for RssAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for RssAdapter {
    async fn run(
        &self,
        source: &Source,
        session: &mut FetchSession,
    ) -> Result<Vec<RawCandidate>, AdapterError> {
        let body = match &self.fixture {
            Some(xml) => xml.clone(),
            None => fetch_text(session, &source.url).await?,
        };
        Self::parse_items(&body, source)
    }
}

/// HTML named entities are not valid XML; map the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SessionTracker;
    use std::time::Duration;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Central Library Events</title>
    <item>
      <title>Storytime for Toddlers</title>
      <link>https://lib.test/e/1</link>
      <pubDate>Thu, 21 Aug 2025 10:30:00 -0700</pubDate>
      <description><![CDATA[<p>Songs &amp; stories</p>]]></description>
      <enclosure url="https://lib.test/img/1.jpg" type="image/jpeg" length="0"/>
    </item>
    <item>
      <title>Author Talk&nbsp;&ndash; Local History</title>
      <pubDate>Fri, 22 Aug 2025 18:00:00 -0700</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_source_defaults() {
        let mut src = Source::new("Central Library", "https://lib.test/feed.xml");
        src.extra
            .insert("location".into(), serde_json::json!("Central Library"));
        let items = RssAdapter::parse_items(FEED, &src).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Storytime for Toddlers"));
        assert_eq!(items[0].url.as_deref(), Some("https://lib.test/e/1"));
        assert_eq!(items[0].image_url.as_deref(), Some("https://lib.test/img/1.jpg"));
        assert_eq!(items[0].location.as_deref(), Some("Central Library"));
        assert_eq!(
            items[0].date,
            Some(RawDate::Text("Thu, 21 Aug 2025 10:30:00 -0700".into()))
        );
        assert_eq!(items[1].title.as_deref(), Some("Author Talk - Local History"));
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let xml = "<rss><channel><title>x</title></channel></rss>";
        let items = RssAdapter::parse_items(xml, &Source::new("x", "")).unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn malformed_feed_is_a_parse_error() {
        let adapter = RssAdapter::from_fixture("<rss><chan");
        let tracker = SessionTracker::default();
        let mut session = tracker.acquire("x", Duration::from_secs(1));
        let err = adapter
            .run(&Source::new("x", ""), &mut session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
    }
}
