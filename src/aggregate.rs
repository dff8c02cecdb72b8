// src/aggregate.rs
//! Combined and section feeds over the internal store and the external feed.
//!
//! Both sources are fetched concurrently; either one failing only removes its
//! own contribution. Records that cannot be normalized are dropped one by one.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;

use crate::ingest::external::{filter_by_section, ExternalSource};
use crate::ingest::internal::InternalSource;
use crate::ingest::normalize::{normalize, NormalizeCtx};
use crate::ingest::types::RawRecord;
use crate::item::CanonicalNewsItem;
use crate::merge::{merge, MergeMode};
use crate::paginate::paginate;

#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub internal: usize,
    pub external: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedFeed {
    pub items: Vec<CanonicalNewsItem>,
    pub pagination: PaginationInfo,
    pub source_counts: SourceCounts,
}

#[derive(Debug, Clone)]
pub struct AggregationSettings {
    pub external_batch_limit: usize,
    pub default_page_size: usize,
    pub internal_author: String,
    pub external_author: String,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            external_batch_limit: 50,
            default_page_size: crate::paginate::DEFAULT_PAGE_SIZE,
            internal_author: "Staff".to_string(),
            external_author: "Wire".to_string(),
        }
    }
}

pub struct AggregationService {
    internal: InternalSource,
    external: ExternalSource,
    settings: AggregationSettings,
}

impl AggregationService {
    pub fn new(internal: InternalSource, external: ExternalSource, settings: AggregationSettings) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            internal,
            external,
            settings,
        }
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    /// Global mode without a category, category mode with one.
    pub async fn combined_feed(&self, query: &FeedQuery) -> CombinedFeed {
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let (internal_raw, external_raw) = tokio::join!(
            self.internal.fetch_published(category),
            self.external.fetch_batch(self.settings.external_batch_limit),
        );

        // Category pages only carry external items whose section matches.
        let external_raw = match category {
            Some(c) => filter_by_section(&external_raw, c),
            None => external_raw,
        };

        let ctx = self.normalize_ctx();
        let internal = normalize_batch(internal_raw.into_iter().map(RawRecord::Internal), &ctx);
        let external = normalize_batch(external_raw.into_iter().map(RawRecord::External), &ctx);

        let mode = if category.is_some() {
            MergeMode::Category
        } else {
            MergeMode::Global
        };
        let merged = merge([internal, external], mode);

        let internal_count = merged.iter().filter(|i| i.is_internal()).count();
        let source_counts = SourceCounts {
            internal: internal_count,
            external: merged.len() - internal_count,
            total: merged.len(),
        };

        // Absent and non-positive limits both take the configured default.
        let limit = query
            .limit
            .filter(|n| *n > 0)
            .unwrap_or_else(|| i64::try_from(self.settings.default_page_size).unwrap_or(i64::MAX));
        let page = paginate(merged, query.page.unwrap_or(1), limit);

        tracing::debug!(
            target: "aggregate",
            ?mode,
            internal = source_counts.internal,
            external = source_counts.external,
            page = page.page,
            "combined feed built"
        );

        CombinedFeed {
            items: page.items,
            pagination: PaginationInfo {
                page: page.page,
                total_pages: page.total_pages,
                total_items: page.total_items,
                limit: page.page_size,
            },
            source_counts,
        }
    }

    /// External-only feed for one section. If no item matches the section the
    /// whole batch is returned, so a non-empty upstream never yields an empty page.
    pub async fn section_feed(&self, category: &str, limit: usize) -> Vec<CanonicalNewsItem> {
        let batch = self.external.fetch_batch(limit).await;
        let matched = filter_by_section(&batch, category);
        let chosen = if matched.is_empty() {
            if !batch.is_empty() {
                tracing::debug!(target: "aggregate", category, "no section match; serving unfiltered batch");
            }
            batch
        } else {
            matched
        };

        let ctx = self.normalize_ctx();
        let items = normalize_batch(chosen.into_iter().map(RawRecord::External), &ctx);
        merge([items], MergeMode::Global)
    }

    fn normalize_ctx(&self) -> NormalizeCtx {
        NormalizeCtx {
            now: Utc::now(),
            internal_author: self.settings.internal_author.clone(),
            external_author: self.settings.external_author.clone(),
        }
    }
}

/// Normalize every record, dropping (and counting) the ones without a title.
pub fn normalize_batch<I>(records: I, ctx: &NormalizeCtx) -> Vec<CanonicalNewsItem>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut out = Vec::new();
    for raw in records {
        match normalize(raw, ctx) {
            Ok(item) => out.push(item),
            Err(e) => {
                tracing::warn!(error = %e, "dropping record");
                counter!("ingest_dropped_total").increment(1);
            }
        }
    }
    counter!("ingest_items_total").increment(out.len() as u64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::ingest::memory::MemoryContentStore;
    use crate::ingest::types::{ExternalFeed, ExternalRecord, InternalRecord};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticFeed(Vec<ExternalRecord>);

    #[async_trait::async_trait]
    impl ExternalFeed for StaticFeed {
        async fn fetch(&self, limit: usize) -> Result<Vec<ExternalRecord>, SourceError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
        fn name(&self) -> &str {
            "static"
        }
    }

    struct HangingFeed;

    #[async_trait::async_trait]
    impl ExternalFeed for HangingFeed {
        async fn fetch(&self, _limit: usize) -> Result<Vec<ExternalRecord>, SourceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
        fn name(&self) -> &str {
            "hanging"
        }
    }

    fn internal(id: &str, date: &str, category: &str) -> InternalRecord {
        InternalRecord {
            id: id.into(),
            title: format!("internal {id}"),
            category: Some(category.into()),
            is_published: true,
            published_at: Some(date.into()),
            ..Default::default()
        }
    }

    fn external(id: &str, date: &str, section: &str) -> ExternalRecord {
        ExternalRecord {
            id: Some(id.into()),
            title: Some(format!("external {id}")),
            section: Some(section.into()),
            published: Some(date.into()),
            ..Default::default()
        }
    }

    fn service(store: MemoryContentStore, feed: Arc<dyn ExternalFeed>) -> AggregationService {
        AggregationService::new(
            InternalSource::new(Arc::new(store)),
            ExternalSource::new(feed).with_timeout(Duration::from_millis(50)),
            AggregationSettings::default(),
        )
    }

    #[tokio::test]
    async fn external_timeout_still_serves_internal_items() {
        let store = MemoryContentStore::with_records(vec![
            internal("a", "2025-01-01T00:00:00Z", "news"),
            internal("b", "2025-01-02T00:00:00Z", "news"),
        ]);
        let svc = service(store, Arc::new(HangingFeed));

        let feed = svc.combined_feed(&FeedQuery::default()).await;
        let ids: Vec<_> = feed.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(feed.source_counts.external, 0);
        assert_eq!(feed.source_counts.internal, 2);
        assert_eq!(feed.pagination.total_items, 2);
        assert_eq!(feed.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn category_feed_prioritizes_internal_and_filters_external() {
        let store = MemoryContentStore::with_records(vec![
            internal("old", "2024-01-01T00:00:00Z", "Sport"),
            internal("other", "2025-01-01T00:00:00Z", "Politics"),
        ]);
        let feed = Arc::new(StaticFeed(vec![
            external("e-sport", "2025-02-01T00:00:00Z", "Sport"),
            external("e-pol", "2025-02-02T00:00:00Z", "Politics"),
        ]));
        let svc = service(store, feed);

        let out = svc
            .combined_feed(&FeedQuery {
                category: Some("sport".into()),
                ..Default::default()
            })
            .await;
        let ids: Vec<_> = out.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "e-sport"]);
        assert_eq!(out.source_counts.total, 2);
    }

    #[tokio::test]
    async fn pagination_applies_after_merge() {
        let records = (0..15)
            .map(|i| internal(&format!("n{i:02}"), &format!("2025-01-{:02}T00:00:00Z", i + 1), "news"))
            .collect();
        let svc = service(MemoryContentStore::with_records(records), Arc::new(StaticFeed(vec![])));

        let out = svc
            .combined_feed(&FeedQuery {
                page: Some(2),
                limit: Some(10),
                category: None,
            })
            .await;
        assert_eq!(out.items.len(), 5);
        assert_eq!(out.pagination.total_pages, 2);
        assert_eq!(out.pagination.limit, 10);
        assert_eq!(out.items[0].id, "n04");
    }

    #[tokio::test]
    async fn non_positive_limit_uses_configured_default() {
        let records = (0..30)
            .map(|i| internal(&format!("n{i:02}"), &format!("2025-01-{:02}T00:00:00Z", i + 1), "news"))
            .collect();
        let svc = AggregationService::new(
            InternalSource::new(Arc::new(MemoryContentStore::with_records(records))),
            ExternalSource::new(Arc::new(StaticFeed(vec![]))),
            AggregationSettings {
                default_page_size: 25,
                ..Default::default()
            },
        );

        for limit in [None, Some(0), Some(-4)] {
            let out = svc
                .combined_feed(&FeedQuery {
                    limit,
                    ..Default::default()
                })
                .await;
            assert_eq!(out.pagination.limit, 25, "limit={limit:?}");
            assert_eq!(out.items.len(), 25);
        }
    }

    #[tokio::test]
    async fn untitled_records_are_dropped_not_fatal() {
        let store = MemoryContentStore::with_records(vec![internal("ok", "2025-01-01T00:00:00Z", "news")]);
        let feed = Arc::new(StaticFeed(vec![
            ExternalRecord {
                id: Some("no-title".into()),
                ..Default::default()
            },
            external("fine", "2025-01-02T00:00:00Z", "news"),
        ]));
        let svc = service(store, feed);
        let out = svc.combined_feed(&FeedQuery::default()).await;
        assert_eq!(out.source_counts.total, 2);
    }

    #[tokio::test]
    async fn section_feed_falls_back_to_unfiltered_batch() {
        let feed = Arc::new(StaticFeed(vec![
            external("1", "2025-01-01T00:00:00Z", "Business"),
            external("2", "2025-01-02T00:00:00Z", "Culture"),
        ]));
        let svc = service(MemoryContentStore::new(), feed);

        let matched = svc.section_feed("culture", 10).await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "2");

        let fallback = svc.section_feed("astronomy", 10).await;
        assert_eq!(fallback.len(), 2);

        let limited = svc.section_feed("astronomy", 1).await;
        assert_eq!(limited.len(), 1);
    }
}
