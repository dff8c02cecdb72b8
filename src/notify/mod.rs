// src/notify/mod.rs
//! Push notifications: subscriber registry, batched dispatch, periodic prune.

pub mod dispatch;
pub mod fcm;
pub mod registry;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{DispatchError, RegistryError};
use crate::item::CanonicalNewsItem;
pub use dispatch::{DeliveryOutcome, DispatchReport, Dispatcher, Notification, PushTransport};
pub use registry::{EndpointMetadata, NotificationRegistry, PruneOutcome, RegistryStats};

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

pub(crate) fn ensure_metrics_described() {
    METRICS_DESCRIBED.get_or_init(|| {
        describe_counter!("notify_delivered_total", "Push deliveries accepted by the gateway");
        describe_counter!("notify_failed_total", "Push deliveries that failed or were rejected");
        describe_counter!("notify_pruned_total", "Subscriber endpoints removed (reason=rejected|idle)");
    });
}

/// What a send endpoint reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSummary {
    pub success: bool,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_targets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SendSummary {
    fn from_report(r: DispatchReport) -> Self {
        Self {
            success: true,
            success_count: r.success_count,
            failure_count: r.failure_count,
            total_targets: r.total_targets,
            message: (!r.had_targets()).then(|| "no registered subscribers".to_string()),
        }
    }

    /// The whole call failed; every target it would have reached counts as failed.
    fn from_error(e: &DispatchError, targets: usize) -> Self {
        let targets = match e {
            DispatchError::NotConfigured(_) => 0,
            _ => targets,
        };
        Self {
            success: false,
            success_count: 0,
            failure_count: targets,
            total_targets: targets,
            message: Some(e.to_string()),
        }
    }
}

pub struct NotificationService {
    registry: Arc<NotificationRegistry>,
    dispatcher: Dispatcher,
    max_idle: ChronoDuration,
}

impl NotificationService {
    pub fn new(registry: Arc<NotificationRegistry>, dispatcher: Dispatcher) -> Self {
        ensure_metrics_described();
        Self {
            registry,
            dispatcher,
            max_idle: ChronoDuration::days(registry::DEFAULT_MAX_IDLE_DAYS),
        }
    }

    pub fn with_max_idle(mut self, max_idle: ChronoDuration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn registry(&self) -> &Arc<NotificationRegistry> {
        &self.registry
    }

    pub fn register(&self, token: &str, metadata: EndpointMetadata) -> Result<usize, RegistryError> {
        let count = self.registry.register(token, metadata, Utc::now())?;
        tracing::info!(target: "notify", token = %crate::anon_hash(token.trim()), count, "subscriber registered");
        Ok(count)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn cleanup(&self) -> PruneOutcome {
        let out = self.registry.prune(self.max_idle, Utc::now());
        counter!("notify_pruned_total", "reason" => "idle").increment(out.cleaned_count as u64);
        tracing::info!(
            target: "notify",
            cleaned = out.cleaned_count,
            remaining = out.remaining_tokens,
            "registry pruned"
        );
        out
    }

    pub async fn send(&self, message: &Notification) -> SendSummary {
        match self.dispatcher.send(message).await {
            Ok(report) => SendSummary::from_report(report),
            Err(e) => {
                let targets = self.registry.active_tokens().len();
                tracing::warn!(target: "notify", error = %e, targets, "dispatch failed");
                if !matches!(e, DispatchError::NotConfigured(_)) {
                    counter!("notify_failed_total").increment(targets as u64);
                }
                SendSummary::from_error(&e, targets)
            }
        }
    }

    pub async fn send_article(&self, item: &CanonicalNewsItem) -> SendSummary {
        self.send(&Notification::for_article(item)).await
    }

    /// Fire-and-forget announcement of a just-published item. The caller's
    /// publication never waits on, or fails because of, the push.
    pub fn notify_published(self: &Arc<Self>, item: CanonicalNewsItem) -> JoinHandle<()> {
        let svc = Arc::clone(self);
        tokio::spawn(async move {
            let summary = svc.send_article(&item).await;
            if summary.success {
                tracing::info!(
                    target: "notify",
                    article = %item.id,
                    delivered = summary.success_count,
                    failed = summary.failure_count,
                    "publication announced"
                );
            } else {
                tracing::warn!(
                    target: "notify",
                    article = %item.id,
                    message = summary.message.as_deref().unwrap_or_default(),
                    "publication announcement failed"
                );
            }
        })
    }
}

/// Prune idle endpoints every `every`. The first tick fires after one full
/// interval, not at startup.
pub fn spawn_prune_task(service: Arc<NotificationService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            service.cleanup();
        }
    })
}
