// src/ingest/types.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SourceError;

/// Size variants of a record's image, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariants {
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default, alias = "thumb")]
    pub thumbnail: Option<String>,
}

/// A document from the internal content store.
///
/// Dates are kept as the raw strings the store holds; the normalizer owns parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Option<ImageVariants>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub read_time: Option<u32>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

impl InternalRecord {
    pub fn is_visible(&self) -> bool {
        self.is_published && self.deleted_at.is_none()
    }
}

/// One item of the third-party feed.
///
/// Deserialization is lenient: vendors disagree on field names and on whether
/// ids and timestamps are strings or numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    #[serde(default, alias = "_id", alias = "uuid", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, alias = "headline", alias = "webTitle")]
    pub title: Option<String>,
    #[serde(default, alias = "summary", alias = "trailText")]
    pub description: Option<String>,
    #[serde(default, alias = "body", alias = "bodyText")]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Option<ImageVariants>,
    #[serde(default, alias = "imageUrl", alias = "urlToImage")]
    pub image: Option<String>,
    #[serde(default, alias = "sectionName", alias = "category")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
    #[serde(default, alias = "byline")]
    pub author: Option<String>,
    #[serde(
        default,
        alias = "publishedAt",
        alias = "webPublicationDate",
        alias = "pubDate",
        deserialize_with = "lenient_string"
    )]
    pub published: Option<String>,
    #[serde(default, alias = "detailUrl", alias = "apiUrl")]
    pub detail_url: Option<String>,
    #[serde(default, alias = "webUrl", alias = "link")]
    pub url: Option<String>,
}

/// Tagged union over the two record shapes; one normalizer per variant.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Internal(InternalRecord),
    External(ExternalRecord),
}

/// Storage interface of the internal content collection.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Published, non-deleted records; `category` matches case-insensitively.
    async fn published(&self, category: Option<&str>) -> Result<Vec<InternalRecord>, SourceError>;
}

/// Remote content API returning at most `limit` items per call.
#[async_trait::async_trait]
pub trait ExternalFeed: Send + Sync {
    async fn fetch(&self, limit: usize) -> Result<Vec<ExternalRecord>, SourceError>;
    fn name(&self) -> &str;
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts `["a","b"]`, `[{"webTitle":"a"}]` / `[{"name":"a"}]`, or `"a, b"`.
fn lenient_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    let tags = match v {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|it| match it {
                Value::String(s) => Some(s),
                Value::Object(map) => ["webTitle", "name", "title"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    Ok(tags.into_iter().filter(|t| !t.trim().is_empty()).collect())
}
