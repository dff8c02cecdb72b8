//! # Merger
//!
//! Deduplicates canonical items by `(source_kind, id)` and orders them.
//!
//! - Global mode: one recency sort across sources.
//! - Category mode: every internal item before every external item, each block
//!   sorted by recency.
//!
//! Sorting is stable, so equal instants keep their fetch order. Items are never
//! deduplicated across source kinds.

use std::collections::HashSet;

use crate::item::{CanonicalNewsItem, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Home timeline.
    Global,
    /// Per-category pages; editorially curated items lead.
    Category,
}

/// Merge any number of per-source lists into one ordered, deduplicated list.
pub fn merge<I>(sources: I, mode: MergeMode) -> Vec<CanonicalNewsItem>
where
    I: IntoIterator<Item = Vec<CanonicalNewsItem>>,
{
    let mut items = dedup(sources.into_iter().flatten());
    match mode {
        MergeMode::Global => sort_recent_first(&mut items),
        MergeMode::Category => {
            let (mut internal, mut external): (Vec<_>, Vec<_>) =
                items.into_iter().partition(|it| it.is_internal());
            sort_recent_first(&mut internal);
            sort_recent_first(&mut external);
            internal.append(&mut external);
            items = internal;
        }
    }
    items
}

/// First occurrence of each `(source_kind, id)` wins.
fn dedup(items: impl Iterator<Item = CanonicalNewsItem>) -> Vec<CanonicalNewsItem> {
    let mut seen: HashSet<(SourceKind, String)> = HashSet::new();
    items
        .filter(|it| seen.insert((it.source_kind, it.id.clone())))
        .collect()
}

fn sort_recent_first(items: &mut [CanonicalNewsItem]) {
    items.sort_by(|a, b| b.publish_instant.cmp(&a.publish_instant));
}
