// src/notify/registry.rs
//! In-memory registry of push subscriber endpoints, keyed by token.
//!
//! Shared as `Arc<NotificationRegistry>` between the registration handler and
//! the dispatch/prune paths; every mutation happens under one mutex.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RegistryError;

pub const DEFAULT_MAX_IDLE_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Anything else the client sent (platform, app version, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberEndpoint {
    pub token: String,
    pub registered_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub is_active: bool,
    pub metadata: EndpointMetadata,
    #[serde(skip)]
    transient_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub cleaned_count: usize,
    pub remaining_tokens: usize,
}

/// One row of `stats()`; never carries the token itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub registered_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_tokens: usize,
    pub active_tokens: usize,
    pub tokens: Vec<EndpointSummary>,
}

#[derive(Debug, Default)]
pub struct NotificationRegistry {
    inner: Mutex<HashMap<String, SubscriberEndpoint>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `token`. Re-registering refreshes timestamps and
    /// metadata and reactivates the endpoint. Returns the token count.
    pub fn register(
        &self,
        token: &str,
        metadata: EndpointMetadata,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistryError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RegistryError::EmptyToken);
        }
        let mut g = self.inner.lock();
        let last_used_at = g
            .get(token)
            .map_or(now, |prev| prev.last_used_at.max(now));
        g.insert(
            token.to_string(),
            SubscriberEndpoint {
                token: token.to_string(),
                registered_at: now,
                last_used_at,
                is_active: true,
                metadata,
                transient_failures: 0,
            },
        );
        Ok(g.len())
    }

    /// All endpoints, oldest registration first.
    pub fn list(&self) -> Vec<SubscriberEndpoint> {
        let mut v: Vec<_> = self.inner.lock().values().cloned().collect();
        v.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.token.cmp(&b.token)));
        v
    }

    pub fn get(&self, token: &str) -> Option<SubscriberEndpoint> {
        self.inner.lock().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tokens eligible as dispatch targets.
    pub fn active_tokens(&self) -> Vec<String> {
        let mut v: Vec<String> = self
            .inner
            .lock()
            .values()
            .filter(|e| e.is_active)
            .map(|e| e.token.clone())
            .collect();
        v.sort();
        v
    }

    /// Successful delivery: `last_used_at` only ever moves forward.
    pub fn mark_delivered(&self, token: &str, at: DateTime<Utc>) -> bool {
        let mut g = self.inner.lock();
        let Some(e) = g.get_mut(token) else {
            return false;
        };
        e.last_used_at = e.last_used_at.max(at);
        e.transient_failures = 0;
        e.is_active = true;
        true
    }

    /// Remove an endpoint the receiving side rejected, unless it was
    /// re-registered after `dispatched_at` (that registration is fresh).
    pub fn remove_rejected(&self, token: &str, dispatched_at: DateTime<Utc>) -> bool {
        let mut g = self.inner.lock();
        match g.get(token) {
            Some(e) if e.registered_at <= dispatched_at => g.remove(token).is_some(),
            _ => false,
        }
    }

    /// Count a transient failure; returns true once the endpoint is deactivated.
    pub fn record_transient_failure(&self, token: &str, max_failures: u32) -> bool {
        let mut g = self.inner.lock();
        let Some(e) = g.get_mut(token) else {
            return false;
        };
        e.transient_failures = e.transient_failures.saturating_add(1);
        if e.transient_failures >= max_failures {
            e.is_active = false;
        }
        !e.is_active
    }

    pub fn deactivate(&self, token: &str) -> bool {
        match self.inner.lock().get_mut(token) {
            Some(e) => {
                e.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Drop endpoints idle for longer than `max_idle`, plus inactive ones.
    pub fn prune(&self, max_idle: Duration, now: DateTime<Utc>) -> PruneOutcome {
        let cutoff = now - max_idle;
        let mut g = self.inner.lock();
        let before = g.len();
        g.retain(|_, e| e.is_active && e.last_used_at >= cutoff);
        PruneOutcome {
            cleaned_count: before - g.len(),
            remaining_tokens: g.len(),
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let endpoints = self.list();
        RegistryStats {
            total_tokens: endpoints.len(),
            active_tokens: endpoints.iter().filter(|e| e.is_active).count(),
            tokens: endpoints
                .into_iter()
                .map(|e| EndpointSummary {
                    registered_at: e.registered_at,
                    last_used_at: e.last_used_at,
                    user_agent: e.metadata.user_agent,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    fn ua(s: &str) -> EndpointMetadata {
        EndpointMetadata {
            user_agent: Some(s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn re_registration_is_idempotent_and_keeps_latest_metadata() {
        let reg = NotificationRegistry::new();
        assert_eq!(reg.register("tok", ua("Firefox"), t0()).unwrap(), 1);
        assert_eq!(reg.register("tok", ua("Chrome"), t0() + Duration::hours(1)).unwrap(), 1);
        assert_eq!(reg.len(), 1);
        let e = reg.get("tok").unwrap();
        assert_eq!(e.metadata.user_agent.as_deref(), Some("Chrome"));
        assert_eq!(e.registered_at, t0() + Duration::hours(1));
    }

    #[test]
    fn blank_token_is_rejected() {
        let reg = NotificationRegistry::new();
        assert_eq!(
            reg.register("   ", EndpointMetadata::default(), t0()),
            Err(RegistryError::EmptyToken)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn prune_removes_only_idle_endpoints() {
        let reg = NotificationRegistry::new();
        let now = t0();
        reg.register("old", ua("a"), now - Duration::days(8)).unwrap();
        reg.register("fresh", ua("b"), now - Duration::days(1)).unwrap();

        let out = reg.prune(Duration::days(DEFAULT_MAX_IDLE_DAYS), now);
        assert_eq!(
            out,
            PruneOutcome {
                cleaned_count: 1,
                remaining_tokens: 1
            }
        );
        assert!(reg.get("old").is_none());
        assert!(reg.get("fresh").is_some());
    }

    #[test]
    fn prune_also_drops_inactive_endpoints() {
        let reg = NotificationRegistry::new();
        reg.register("a", ua("x"), t0()).unwrap();
        reg.register("b", ua("y"), t0()).unwrap();
        assert!(reg.deactivate("b"));
        let out = reg.prune(Duration::days(7), t0());
        assert_eq!(out.cleaned_count, 1);
        assert_eq!(reg.active_tokens(), vec!["a".to_string()]);
    }

    #[test]
    fn last_used_never_moves_backwards() {
        let reg = NotificationRegistry::new();
        reg.register("t", ua("x"), t0()).unwrap();
        assert!(reg.mark_delivered("t", t0() + Duration::hours(2)));
        assert!(reg.mark_delivered("t", t0() + Duration::hours(1)));
        assert_eq!(reg.get("t").unwrap().last_used_at, t0() + Duration::hours(2));

        // Re-registering with an older clock keeps the later lastUsedAt.
        reg.register("t", ua("x"), t0()).unwrap();
        assert_eq!(reg.get("t").unwrap().last_used_at, t0() + Duration::hours(2));
    }

    #[test]
    fn rejected_removal_spares_fresh_reregistration() {
        let reg = NotificationRegistry::new();
        reg.register("t", ua("x"), t0()).unwrap();
        let dispatched_at = t0() + Duration::minutes(1);
        reg.register("t", ua("x"), t0() + Duration::minutes(2)).unwrap();
        assert!(!reg.remove_rejected("t", dispatched_at));
        assert!(reg.remove_rejected("t", t0() + Duration::minutes(3)));
        assert!(reg.is_empty());
    }

    #[test]
    fn repeated_transient_failures_deactivate() {
        let reg = NotificationRegistry::new();
        reg.register("t", ua("x"), t0()).unwrap();
        assert!(!reg.record_transient_failure("t", 2));
        assert!(reg.record_transient_failure("t", 2));
        assert!(reg.active_tokens().is_empty());
        // a later success revives it
        reg.mark_delivered("t", t0());
        assert_eq!(reg.active_tokens().len(), 1);
    }

    #[test]
    fn stats_never_expose_tokens() {
        let reg = NotificationRegistry::new();
        reg.register("secret-token", ua("Safari"), t0()).unwrap();
        let stats = reg.stats();
        assert_eq!(stats.total_tokens, 1);
        assert_eq!(stats.active_tokens, 1);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(json.contains("Safari"));
    }
}
