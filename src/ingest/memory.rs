// src/ingest/memory.rs
//! In-process `ContentStore`, seeded from a JSON array of internal records.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;

use crate::error::SourceError;
use crate::ingest::types::{ContentStore, InternalRecord};

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    records: RwLock<Vec<InternalRecord>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<InternalRecord>) -> Self {
        let store = Self::new();
        for r in records {
            store.insert(r);
        }
        store
    }

    /// Load a JSON array of records, e.g. `data/articles.json`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading content seed from {}", path.display()))?;
        let records: Vec<InternalRecord> =
            serde_json::from_str(&data).context("parsing content seed json")?;
        Ok(Self::with_records(records))
    }

    /// Insert (or replace by id) a record; records without an id get a UUID.
    pub fn insert(&self, mut record: InternalRecord) -> String {
        if record.id.trim().is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        let mut g = self.records.write();
        match g.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = record,
            None => g.push(record),
        }
        id
    }

    /// Flip a record to published and stamp `publishedAt`. Returns the record
    /// so the caller can hand it to the notification path.
    pub fn publish(&self, id: &str) -> Option<InternalRecord> {
        let mut g = self.records.write();
        let rec = g.iter_mut().find(|r| r.id == id && r.deleted_at.is_none())?;
        rec.is_published = true;
        if rec.published_at.is_none() {
            rec.published_at = Some(Utc::now().to_rfc3339());
        }
        Some(rec.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn published(&self, category: Option<&str>) -> Result<Vec<InternalRecord>, SourceError> {
        let wanted = category.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty());
        let g = self.records.read();
        Ok(g.iter()
            .filter(|r| r.is_visible())
            .filter(|r| match &wanted {
                Some(c) => r
                    .category
                    .as_deref()
                    .is_some_and(|rc| rc.trim().to_lowercase() == *c),
                None => true,
            })
            .cloned()
            .collect())
    }
}
