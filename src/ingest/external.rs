// src/ingest/external.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExternalConfig;
use crate::error::SourceError;
use crate::ingest::types::{ExternalFeed, ExternalRecord};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Degrading front of the remote feed: one bounded call, never an error.
#[derive(Clone)]
pub struct ExternalSource {
    feed: Arc<dyn ExternalFeed>,
    timeout: Duration,
}

impl ExternalSource {
    pub fn new(feed: Arc<dyn ExternalFeed>) -> Self {
        Self {
            feed,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        self.feed.name()
    }

    pub async fn fetch_batch(&self, limit: usize) -> Vec<ExternalRecord> {
        let err = match tokio::time::timeout(self.timeout, self.feed.fetch(limit)).await {
            Ok(Ok(mut records)) => {
                records.truncate(limit);
                return records;
            }
            Ok(Err(e)) => e,
            Err(_) => SourceError::Timeout {
                source_name: self.feed.name().to_string(),
                secs: self.timeout.as_secs(),
            },
        };
        tracing::warn!(error = %err, source = "external", "external feed degraded; contributing nothing");
        counter!("ingest_source_errors_total", "source" => "external").increment(1);
        Vec::new()
    }
}

/// Section-label match: case-insensitive, exact or substring in either direction.
pub fn section_matches(section: Option<&str>, category: &str) -> bool {
    let wanted = category.trim().to_lowercase();
    let Some(label) = section.map(|s| s.trim().to_lowercase()) else {
        return false;
    };
    if label.is_empty() || wanted.is_empty() {
        return false;
    }
    label == wanted || label.contains(&wanted) || wanted.contains(&label)
}

pub fn filter_by_section(records: &[ExternalRecord], category: &str) -> Vec<ExternalRecord> {
    records
        .iter()
        .filter(|r| section_matches(r.section.as_deref(), category))
        .cloned()
        .collect()
}

/// HTTP implementation of the third-party content API.
pub struct HttpExternalFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    name: String,
}

impl HttpExternalFeed {
    pub fn new(cfg: &ExternalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsdesk-hub/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building external feed http client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            name: cfg.name.clone(),
        })
    }

    fn source_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Unavailable {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ExternalFeed for HttpExternalFeed {
    async fn fetch(&self, limit: usize) -> Result<Vec<ExternalRecord>, SourceError> {
        if self.base_url.is_empty() {
            return Err(self.source_error("no base_url configured"));
        }
        let mut req = self
            .client
            .get(&self.base_url)
            .query(&[("limit", limit.to_string())]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("api-key", key)]);
        }

        let resp = req.send().await.map_err(|e| self.source_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                source_name: self.name.clone(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|e| self.source_error(e))?;
        let mut records = parse_batch(&body).map_err(|reason| SourceError::Malformed {
            source_name: self.name.clone(),
            reason,
        })?;
        records.truncate(limit);
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decode a feed body. The item array may be bare or wrapped under one of the
/// usual envelope keys; individual items that fail to decode are skipped.
pub fn parse_batch(body: &[u8]) -> Result<Vec<ExternalRecord>, String> {
    let root: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let items = locate_items(root).ok_or_else(|| "no item array in response".to_string())?;

    let mut out = Vec::with_capacity(items.len());
    for (idx, it) in items.into_iter().enumerate() {
        match serde_json::from_value::<ExternalRecord>(it) {
            Ok(rec) => out.push(rec),
            Err(e) => tracing::debug!(idx, error = %e, "skipping undecodable external item"),
        }
    }
    Ok(out)
}

fn locate_items(root: Value) -> Option<Vec<Value>> {
    match root {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            for key in ["items", "results", "articles", "data"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Some(items);
                }
            }
            map.remove("response").and_then(locate_items)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowFeed;

    #[async_trait]
    impl ExternalFeed for SlowFeed {
        async fn fetch(&self, _limit: usize) -> Result<Vec<ExternalRecord>, SourceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![ExternalRecord::default()])
        }
        fn name(&self) -> &str {
            "slow"
        }
    }

    struct FixedFeed(usize);

    #[async_trait]
    impl ExternalFeed for FixedFeed {
        async fn fetch(&self, _limit: usize) -> Result<Vec<ExternalRecord>, SourceError> {
            Ok(vec![ExternalRecord::default(); self.0])
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn timeout_degrades_to_empty() {
        let src = ExternalSource::new(Arc::new(SlowFeed)).with_timeout(Duration::from_millis(20));
        assert!(src.fetch_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn batch_is_bounded_by_limit() {
        let src = ExternalSource::new(Arc::new(FixedFeed(30)));
        assert_eq!(src.fetch_batch(5).await.len(), 5);
    }

    #[test]
    fn parse_batch_handles_envelopes() {
        let bare = br#"[{"id":"1","title":"a"}]"#;
        assert_eq!(parse_batch(bare).unwrap().len(), 1);

        let guardian = br#"{"response":{"status":"ok","results":[{"id":"x","webTitle":"t"},{"id":"y","webTitle":"u"}]}}"#;
        let recs = parse_batch(guardian).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].title.as_deref(), Some("u"));

        let news = br#"{"status":"ok","articles":[{"title":"n","url":"https://x"}]}"#;
        assert_eq!(parse_batch(news).unwrap().len(), 1);

        assert!(parse_batch(br#"{"status":"error"}"#).is_err());
        assert!(parse_batch(b"<html>").is_err());
    }

    #[test]
    fn undecodable_items_are_skipped() {
        let body = br#"{"items":[{"id":"1","title":"ok"},{"title":{"nested":true}},"junk"]}"#;
        let recs = parse_batch(body).unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn section_matching_is_exact_or_substring() {
        assert!(section_matches(Some("Sport"), "sport"));
        assert!(section_matches(Some("Football news"), "football"));
        assert!(section_matches(Some("Sport"), "sports"));
        assert!(!section_matches(Some("Politics"), "sport"));
        assert!(!section_matches(None, "sport"));
        assert!(!section_matches(Some(""), "sport"));
    }
}
