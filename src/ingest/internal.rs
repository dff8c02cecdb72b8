// src/ingest/internal.rs
use metrics::counter;
use std::sync::Arc;

use crate::ingest::types::{ContentStore, InternalRecord};

/// Degrading front of the internal content store: a store failure becomes an
/// empty contribution instead of an error.
#[derive(Clone)]
pub struct InternalSource {
    store: Arc<dyn ContentStore>,
}

impl InternalSource {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn fetch_published(&self, category: Option<&str>) -> Vec<InternalRecord> {
        match self.store.published(category).await {
            // Stores are trusted to filter, but unpublished records must never leak.
            Ok(records) => records.into_iter().filter(|r| r.is_visible()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, source = "internal", "content store unavailable; contributing nothing");
                counter!("ingest_source_errors_total", "source" => "internal").increment(1);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::ingest::memory::MemoryContentStore;

    struct DownStore;

    #[async_trait::async_trait]
    impl ContentStore for DownStore {
        async fn published(&self, _category: Option<&str>) -> Result<Vec<InternalRecord>, SourceError> {
            Err(SourceError::Unavailable {
                source_name: "docs".into(),
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty() {
        let src = InternalSource::new(Arc::new(DownStore));
        assert!(src.fetch_published(None).await.is_empty());
    }

    #[tokio::test]
    async fn only_published_records_come_back() {
        let store = MemoryContentStore::new();
        store.insert(InternalRecord {
            title: "draft".into(),
            ..Default::default()
        });
        store.insert(InternalRecord {
            title: "live".into(),
            is_published: true,
            category: Some("Sport".into()),
            ..Default::default()
        });
        let src = InternalSource::new(Arc::new(store));

        let all = src.fetch_published(None).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "live");
        assert_eq!(src.fetch_published(Some("sport")).await.len(), 1);
        assert!(src.fetch_published(Some("politics")).await.is_empty());
    }
}
