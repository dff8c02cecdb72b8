// src/item.rs
//! Canonical, source-agnostic news item shared by the aggregation pipeline
//! and the publish-triggered notification path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_READ_TIME_MINUTES: u32 = 3;

/// Where an item came from. Part of the dedup key together with `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalNewsItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: String,
    /// Set semantics; `BTreeSet` keeps the JSON output deterministic.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_read_time")]
    pub read_time_minutes: u32,
    pub publish_instant: DateTime<Utc>,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub detail_reference: String,
}

fn default_read_time() -> u32 {
    DEFAULT_READ_TIME_MINUTES
}

impl CanonicalNewsItem {
    /// Dedup identity within one aggregation result.
    pub fn key(&self) -> (SourceKind, &str) {
        (self.source_kind, self.id.as_str())
    }

    pub fn is_internal(&self) -> bool {
        self.source_kind == SourceKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_camel_case_and_skips_missing_image() {
        let item = CanonicalNewsItem {
            id: "a1".into(),
            title: "Hello".into(),
            excerpt: "World".into(),
            image_url: None,
            category: "tech".into(),
            tags: ["x".to_string()].into_iter().collect(),
            author: "Staff".into(),
            read_time_minutes: 3,
            publish_instant: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            source_kind: SourceKind::Internal,
            detail_reference: "a1".into(),
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["sourceKind"], "Internal");
        assert_eq!(v["readTimeMinutes"], 3);
        assert_eq!(v["detailReference"], "a1");
        assert!(v.get("imageUrl").is_none());
    }

    #[test]
    fn read_time_defaults_when_absent() {
        let v = serde_json::json!({
            "id": "e1",
            "title": "T",
            "publishInstant": "2025-01-01T00:00:00Z",
            "sourceKind": "External"
        });
        let item: CanonicalNewsItem = serde_json::from_value(v).unwrap();
        assert_eq!(item.read_time_minutes, DEFAULT_READ_TIME_MINUTES);
        assert!(item.tags.is_empty());
    }
}
