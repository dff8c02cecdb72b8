// src/error.rs
//! Error taxonomy for the aggregation and notification paths.
//!
//! Source and per-item failures are absorbed where they happen (see
//! `ingest::internal`, `ingest::external`, `aggregate`). Only request-shape
//! problems and a misconfigured push channel ever reach a handler.

use crate::item::SourceKind;

/// A content source could not produce a batch.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("source '{source_name}' timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("source '{source_name}' answered HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("source '{source_name}' returned a malformed body: {reason}")]
    Malformed { source_name: String, reason: String },
}

/// A raw record cannot yield a minimally valid canonical item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("{kind:?} record '{id}' has no usable title")]
    MissingTitle { kind: SourceKind, id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("subscriber token must not be empty")]
    EmptyToken,
}

/// The batched push call as a whole failed (per-token rejections are not errors).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("push channel is not configured: {0}")]
    NotConfigured(String),

    #[error("push transport failed: {0}")]
    Transport(String),

    #[error("push gateway answered HTTP {0}")]
    Status(u16),
}
