// src/ingest/normalize.rs
//! Raw record -> `CanonicalNewsItem`, one function per record variant.
//!
//! Every optional field resolves through an ordered fallback chain and takes
//! the first candidate that is non-empty after trimming.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::NormalizationError;
use crate::ingest::dates::resolve_publish_instant;
use crate::ingest::types::{ExternalRecord, ImageVariants, InternalRecord, RawRecord};
use crate::ingest::{derive_excerpt, normalize_text};
use crate::item::{CanonicalNewsItem, SourceKind, DEFAULT_READ_TIME_MINUTES};

pub const DEFAULT_CATEGORY: &str = "general";

/// Per-request normalization inputs.
#[derive(Debug, Clone)]
pub struct NormalizeCtx {
    /// Processing instant; substitutes for missing or implausible dates.
    pub now: DateTime<Utc>,
    pub internal_author: String,
    pub external_author: String,
}

impl NormalizeCtx {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            internal_author: "Staff".to_string(),
            external_author: "Wire".to_string(),
        }
    }
}

pub fn normalize(raw: RawRecord, ctx: &NormalizeCtx) -> Result<CanonicalNewsItem, NormalizationError> {
    match raw {
        RawRecord::Internal(rec) => normalize_internal(rec, ctx),
        RawRecord::External(rec) => normalize_external(rec, ctx),
    }
}

pub fn normalize_internal(
    rec: InternalRecord,
    ctx: &NormalizeCtx,
) -> Result<CanonicalNewsItem, NormalizationError> {
    let title = normalize_text(&rec.title);
    if title.is_empty() {
        return Err(NormalizationError::MissingTitle {
            kind: SourceKind::Internal,
            id: rec.id,
        });
    }

    let id = if rec.id.trim().is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        rec.id.trim().to_string()
    };

    let excerpt = first_text([rec.excerpt.as_deref()])
        .or_else(|| first_non_empty([rec.content.as_deref()]).map(derive_excerpt))
        .unwrap_or_default();

    let date = first_non_empty([rec.published_at.as_deref(), rec.created_at.as_deref()]);

    Ok(CanonicalNewsItem {
        detail_reference: id.clone(),
        id,
        title,
        excerpt,
        image_url: pick_image(rec.images.as_ref(), rec.image_url.as_deref()),
        category: first_non_empty([rec.category.as_deref()])
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        tags: tag_set(rec.tags),
        author: first_non_empty([rec.author.as_deref()])
            .unwrap_or(&ctx.internal_author)
            .to_string(),
        read_time_minutes: rec
            .read_time
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_READ_TIME_MINUTES),
        publish_instant: resolve_publish_instant(date, ctx.now),
        source_kind: SourceKind::Internal,
    })
}

pub fn normalize_external(
    rec: ExternalRecord,
    ctx: &NormalizeCtx,
) -> Result<CanonicalNewsItem, NormalizationError> {
    let title = first_text([rec.title.as_deref()]);
    let native_id = first_non_empty([rec.id.as_deref(), rec.url.as_deref(), rec.detail_url.as_deref()])
        .map(str::to_string);

    let Some(title) = title else {
        return Err(NormalizationError::MissingTitle {
            kind: SourceKind::External,
            id: native_id.unwrap_or_default(),
        });
    };

    // No native identifier at all: a content fingerprint keeps dedup meaningful.
    let id = native_id.unwrap_or_else(|| crate::anon_hash(&title));

    let excerpt = first_text([rec.description.as_deref()])
        .or_else(|| first_non_empty([rec.content.as_deref()]).map(derive_excerpt))
        .unwrap_or_default();

    let detail_reference = first_non_empty([rec.detail_url.as_deref(), rec.url.as_deref()])
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());

    Ok(CanonicalNewsItem {
        id,
        title,
        excerpt,
        image_url: pick_image(rec.images.as_ref(), rec.image.as_deref()),
        category: first_non_empty([rec.section.as_deref()])
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        tags: tag_set(rec.tags),
        author: first_text([rec.author.as_deref()]).unwrap_or_else(|| ctx.external_author.clone()),
        read_time_minutes: DEFAULT_READ_TIME_MINUTES,
        publish_instant: resolve_publish_instant(rec.published.as_deref(), ctx.now),
        source_kind: SourceKind::External,
        detail_reference,
    })
}

/// large -> medium -> thumbnail -> generic field.
fn pick_image(variants: Option<&ImageVariants>, generic: Option<&str>) -> Option<String> {
    let (large, medium, thumb) = variants
        .map(|v| (v.large.as_deref(), v.medium.as_deref(), v.thumbnail.as_deref()))
        .unwrap_or_default();
    first_non_empty([large, medium, thumb, generic]).map(str::to_string)
}

fn first_non_empty<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Like `first_non_empty`, but judged after HTML/whitespace normalization.
fn first_text<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(normalize_text)
        .find(|s| !s.is_empty())
}

fn tag_set(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
