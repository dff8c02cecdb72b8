// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod item;
pub mod merge;
pub mod metrics;
pub mod notify;
pub mod paginate;

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub use crate::aggregate::{AggregationService, AggregationSettings, CombinedFeed, FeedQuery};
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::item::{CanonicalNewsItem, SourceKind};
pub use crate::notify::{NotificationRegistry, NotificationService};

use crate::ingest::external::{ExternalSource, HttpExternalFeed};
use crate::ingest::internal::InternalSource;
use crate::ingest::memory::MemoryContentStore;
use crate::ingest::normalize::{normalize_internal, NormalizeCtx};
use crate::ingest::types::{ContentStore, ExternalFeed};
use crate::notify::fcm::HttpPushTransport;
use crate::notify::{Dispatcher, PushTransport};

/// Short stable fingerprint for logging identifiers (tokens, titles) without
/// exposing them.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Everything the HTTP layer and background tasks share.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<MemoryContentStore>,
    pub aggregation: Arc<AggregationService>,
    pub notifications: Arc<NotificationService>,
}

impl Services {
    /// Wire services from explicit collaborators. Tests pass stub feeds and
    /// transports here; `build_services` passes the HTTP ones.
    pub fn assemble(
        cfg: &AppConfig,
        store: Arc<MemoryContentStore>,
        feed: Arc<dyn ExternalFeed>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let content: Arc<dyn ContentStore> = store.clone();
        let aggregation = AggregationService::new(
            InternalSource::new(content),
            ExternalSource::new(feed)
                .with_timeout(std::time::Duration::from_secs(cfg.external.timeout_secs)),
            AggregationSettings {
                external_batch_limit: cfg.external.batch_limit,
                default_page_size: cfg.feed.default_page_size,
                internal_author: cfg.content.default_author.clone(),
                external_author: cfg.external.name.clone(),
            },
        );

        let registry = Arc::new(NotificationRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone(), transport)
            .with_max_transient_failures(cfg.push.max_transient_failures);
        let notifications = NotificationService::new(registry, dispatcher)
            .with_max_idle(chrono::Duration::days(cfg.registry.max_idle_days));

        Self {
            store,
            aggregation: Arc::new(aggregation),
            notifications: Arc::new(notifications),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            aggregation: self.aggregation.clone(),
            notifications: self.notifications.clone(),
        }
    }

    /// Publish a stored record and announce it in the background. Returns
    /// `None` if the record does not exist or cannot be turned into an item.
    pub fn publish(&self, id: &str) -> Option<JoinHandle<()>> {
        let record = self.store.publish(id)?;
        let ctx = NormalizeCtx {
            internal_author: self.aggregation.settings().internal_author.clone(),
            ..NormalizeCtx::new(Utc::now())
        };
        match normalize_internal(record, &ctx) {
            Ok(item) => Some(self.notifications.notify_published(item)),
            Err(e) => {
                tracing::warn!(error = %e, "published record cannot be announced");
                None
            }
        }
    }
}

/// Production wiring: HTTP external feed and HTTP push transport from `cfg`,
/// content store seeded from `content.seed_path` when set.
pub fn build_services(cfg: &AppConfig) -> Result<Services> {
    let store = match cfg.content.seed_path.as_deref() {
        Some(p) if !p.trim().is_empty() => MemoryContentStore::from_json_file(p)?,
        _ => MemoryContentStore::new(),
    };
    let feed = HttpExternalFeed::new(&cfg.external)?;
    let transport = HttpPushTransport::from_config(&cfg.push);
    if !transport.is_configured() {
        tracing::warn!("push channel not configured; sends will report success=false");
    }
    Ok(Services::assemble(
        cfg,
        Arc::new(store),
        Arc::new(feed),
        Arc::new(transport),
    ))
}
