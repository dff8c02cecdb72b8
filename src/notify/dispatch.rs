// src/notify/dispatch.rs
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::anon_hash;
use crate::error::DispatchError;
use crate::ingest::truncate_with_ellipsis;
use crate::item::CanonicalNewsItem;
use crate::notify::registry::NotificationRegistry;

/// Longest notification body derived from an article, in chars.
pub const ARTICLE_BODY_MAX_CHARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Notification {
    /// Payload announcing a freshly published item.
    pub fn for_article(item: &CanonicalNewsItem) -> Self {
        let body = if item.excerpt.trim().is_empty() {
            format!("New in {}", item.category)
        } else {
            truncate_with_ellipsis(item.excerpt.trim(), ARTICLE_BODY_MAX_CHARS)
        };
        let mut data = BTreeMap::new();
        data.insert("articleId".to_string(), item.id.clone());
        data.insert("detailReference".to_string(), item.detail_reference.clone());
        data.insert("category".to_string(), item.category.clone());
        data.insert("sourceKind".to_string(), format!("{:?}", item.source_kind));
        Self {
            title: item.title.clone(),
            body,
            image_url: item.image_url.clone(),
            data,
        }
    }
}

/// Per-token result of a batched push call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Permanent: the receiving side no longer knows this token.
    Rejected(String),
    /// Transient: worth retrying on a later dispatch.
    Failed(String),
}

/// One batched call against many tokens. Outcomes are positional: the i-th
/// outcome belongs to the i-th token.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send_multicast(
        &self,
        message: &Notification,
        tokens: &[String],
    ) -> Result<Vec<DeliveryOutcome>, DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_targets: usize,
    #[serde(skip)]
    pub removed_count: usize,
}

impl DispatchReport {
    /// Registry was empty; nothing was sent.
    pub fn no_targets() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_targets: 0,
            removed_count: 0,
        }
    }

    pub fn had_targets(&self) -> bool {
        self.total_targets > 0
    }
}

pub struct Dispatcher {
    registry: Arc<NotificationRegistry>,
    transport: Arc<dyn PushTransport>,
    max_transient_failures: u32,
}

impl Dispatcher {
    pub fn new(registry: Arc<NotificationRegistry>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            registry,
            transport,
            max_transient_failures: 5,
        }
    }

    pub fn with_max_transient_failures(mut self, n: u32) -> Self {
        self.max_transient_failures = n.max(1);
        self
    }

    /// Broadcast `message` to every active endpoint and fold the outcomes back
    /// into the registry. Rejected tokens are deleted on the spot.
    pub async fn send(&self, message: &Notification) -> Result<DispatchReport, DispatchError> {
        let dispatched_at = Utc::now();
        let tokens = self.registry.active_tokens();
        if tokens.is_empty() {
            tracing::info!(target: "notify", "no registered endpoints; skipping dispatch");
            return Ok(DispatchReport::no_targets());
        }

        let outcomes = self.transport.send_multicast(message, &tokens).await?;

        let mut report = DispatchReport {
            total_targets: tokens.len(),
            ..DispatchReport::no_targets()
        };
        for (idx, token) in tokens.iter().enumerate() {
            match outcomes.get(idx) {
                Some(DeliveryOutcome::Delivered) => {
                    self.registry.mark_delivered(token, Utc::now());
                    report.success_count += 1;
                }
                Some(DeliveryOutcome::Rejected(reason)) => {
                    report.failure_count += 1;
                    if self.registry.remove_rejected(token, dispatched_at) {
                        report.removed_count += 1;
                        tracing::info!(target: "notify", token = %anon_hash(token), reason, "endpoint rejected delivery; removed");
                    }
                }
                Some(DeliveryOutcome::Failed(reason)) => {
                    report.failure_count += 1;
                    self.note_transient(token, reason);
                }
                None => {
                    report.failure_count += 1;
                    self.note_transient(token, "no outcome reported");
                }
            }
        }

        counter!("notify_delivered_total").increment(report.success_count as u64);
        counter!("notify_failed_total").increment(report.failure_count as u64);
        counter!("notify_pruned_total", "reason" => "rejected").increment(report.removed_count as u64);
        tracing::info!(
            target: "notify",
            success = report.success_count,
            failure = report.failure_count,
            removed = report.removed_count,
            total = report.total_targets,
            "dispatch finished"
        );
        Ok(report)
    }

    fn note_transient(&self, token: &str, reason: &str) {
        if self
            .registry
            .record_transient_failure(token, self.max_transient_failures)
        {
            tracing::info!(target: "notify", token = %anon_hash(token), reason, "endpoint deactivated after repeated failures");
        } else {
            tracing::debug!(target: "notify", token = %anon_hash(token), reason, "transient delivery failure");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Transport that answers from a per-token script and records every call.
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub outcomes: HashMap<String, DeliveryOutcome>,
        pub fail_whole_call: bool,
        pub calls: Mutex<Vec<(Notification, Vec<String>)>>,
    }

    impl ScriptedTransport {
        pub fn with(outcomes: &[(&str, DeliveryOutcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(t, o)| (t.to_string(), o.clone()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn send_multicast(
            &self,
            message: &Notification,
            tokens: &[String],
        ) -> Result<Vec<DeliveryOutcome>, DispatchError> {
            self.calls.lock().push((message.clone(), tokens.to_vec()));
            if self.fail_whole_call {
                return Err(DispatchError::Transport("connection reset".into()));
            }
            Ok(tokens
                .iter()
                .map(|t| {
                    self.outcomes
                        .get(t)
                        .cloned()
                        .unwrap_or(DeliveryOutcome::Delivered)
                })
                .collect())
        }
    }
}
