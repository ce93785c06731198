// src/adapter/providers/mod.rs
//! Generic adapters usable from configuration. Site-specific extractors
//! implement `Adapter` in the embedding application and are registered in code.
pub mod fixed;
pub mod json_feed;
pub mod rss;

use crate::adapter::FetchSession;
use crate::error::AdapterError;

/// GET `url` within the session deadline and return the body text.
pub(crate) async fn fetch_text(session: &FetchSession, url: &str) -> Result<String, AdapterError> {
    if url.trim().is_empty() {
        return Err(AdapterError::Network(format!(
            "source '{}' has no url configured",
            session.source_name()
        )));
    }
    let resp = session
        .client()
        .get(url)
        .timeout(session.remaining())
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AdapterError::Network(format!("GET {url} returned {status}")));
    }
    Ok(resp.text().await?)
}
