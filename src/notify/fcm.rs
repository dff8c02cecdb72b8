// src/notify/fcm.rs
//! HTTP push transport speaking the legacy multicast format:
//! `{registration_ids, notification, data}` in, `{results: [...]}` out.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::dispatch::{DeliveryOutcome, Notification, PushTransport};
use crate::config::PushConfig;
use crate::error::DispatchError;

/// Largest token batch the gateway accepts in one request.
pub const MAX_TOKENS_PER_REQUEST: usize = 500;

/// Upper bound on attempts per chunk, whatever the config asks for.
pub const MAX_PUSH_RETRIES: u8 = 10;

/// Error codes meaning the token will never work again.
const PERMANENT_ERRORS: [&str; 3] = ["NotRegistered", "InvalidRegistration", "MismatchSenderId"];

#[derive(Clone)]
pub struct HttpPushTransport {
    endpoint: String,
    server_key: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_base: Duration,
}

impl HttpPushTransport {
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            server_key: server_key.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(cfg: &PushConfig) -> Self {
        Self::new(cfg.endpoint.trim(), cfg.server_key.clone().unwrap_or_default())
            .with_timeout(cfg.timeout_secs)
            .with_retries(cfg.max_retries)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_PUSH_RETRIES);
        self
    }

    /// Delay before the second attempt; doubles on each further one.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.server_key.trim().is_empty()
    }

    async fn send_chunk(
        &self,
        payload: &MulticastRequest<'_>,
        expected: usize,
    ) -> Result<Vec<DeliveryOutcome>, DispatchError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::AUTHORIZATION, format!("key={}", self.server_key))
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        let body: MulticastResponse = rsp
                            .json()
                            .await
                            .map_err(|e| DispatchError::Transport(format!("decoding push response: {e}")))?;
                        return Ok(body.into_outcomes(expected));
                    }
                    if !is_retryable(status) {
                        return Err(DispatchError::Status(status.as_u16()));
                    }
                    DispatchError::Status(status.as_u16())
                }
                Err(e) => DispatchError::Transport(e.to_string()),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "push request failed; retrying");
            tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
        }
    }
}

/// `base << (attempt - 1)`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u8) -> Duration {
    let factor = 1u32
        .checked_shl(u32::from(attempt.saturating_sub(1)))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send_multicast(
        &self,
        message: &Notification,
        tokens: &[String],
    ) -> Result<Vec<DeliveryOutcome>, DispatchError> {
        if !self.is_configured() {
            return Err(DispatchError::NotConfigured(
                "push endpoint or server key missing".into(),
            ));
        }

        let mut outcomes = Vec::with_capacity(tokens.len());
        let mut last_err = None;
        let mut failed_chunks = 0usize;
        let chunks: Vec<&[String]> = tokens.chunks(MAX_TOKENS_PER_REQUEST).collect();

        for chunk in &chunks {
            let payload = MulticastRequest::new(message, chunk);
            match self.send_chunk(&payload, chunk.len()).await {
                Ok(v) => outcomes.extend(v),
                Err(e) => {
                    tracing::warn!(target: "notify", error = %e, tokens = chunk.len(), "push chunk failed");
                    outcomes.extend(chunk.iter().map(|_| DeliveryOutcome::Failed(e.to_string())));
                    failed_chunks += 1;
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if failed_chunks == chunks.len() => Err(e),
            _ => Ok(outcomes),
        }
    }
}

#[derive(Serialize)]
struct PushBody<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Serialize)]
struct MulticastRequest<'a> {
    registration_ids: &'a [String],
    notification: PushBody<'a>,
    data: &'a BTreeMap<String, String>,
}

impl<'a> MulticastRequest<'a> {
    fn new(message: &'a Notification, tokens: &'a [String]) -> Self {
        Self {
            registration_ids: tokens,
            notification: PushBody {
                title: &message.title,
                body: &message.body,
                image: message.image_url.as_deref(),
            },
            data: &message.data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MulticastResponse {
    #[serde(default)]
    results: Vec<MulticastResult>,
}

#[derive(Debug, Deserialize)]
struct MulticastResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl MulticastResponse {
    /// Positional outcomes, padded with failures if the gateway answered short.
    fn into_outcomes(self, expected: usize) -> Vec<DeliveryOutcome> {
        let mut out: Vec<DeliveryOutcome> = self
            .results
            .into_iter()
            .take(expected)
            .map(|r| match (r.message_id, r.error) {
                (_, Some(code)) if PERMANENT_ERRORS.contains(&code.as_str()) => {
                    DeliveryOutcome::Rejected(code)
                }
                (_, Some(code)) => DeliveryOutcome::Failed(code),
                (Some(_), None) => DeliveryOutcome::Delivered,
                (None, None) => DeliveryOutcome::Failed("empty result".into()),
            })
            .collect();
        out.resize(expected, DeliveryOutcome::Failed("missing result".into()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_maps_error_codes() {
        let rsp: MulticastResponse = serde_json::from_str(
            r#"{"results":[{"message_id":"m1"},{"error":"NotRegistered"},{"error":"Unavailable"}]}"#,
        )
        .unwrap();
        let out = rsp.into_outcomes(4);
        assert_eq!(
            out,
            vec![
                DeliveryOutcome::Delivered,
                DeliveryOutcome::Rejected("NotRegistered".into()),
                DeliveryOutcome::Failed("Unavailable".into()),
                DeliveryOutcome::Failed("missing result".into()),
            ]
        );
    }

    #[test]
    fn request_uses_legacy_field_names() {
        let msg = Notification {
            title: "T".into(),
            body: "B".into(),
            image_url: None,
            data: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        let tokens = vec!["a".to_string()];
        let v = serde_json::to_value(MulticastRequest::new(&msg, &tokens)).unwrap();
        assert_eq!(v["registration_ids"][0], "a");
        assert_eq!(v["notification"]["title"], "T");
        assert!(v["notification"].get("image").is_none());
        assert_eq!(v["data"]["k"], "v");
    }

    #[test]
    fn retries_are_bounded() {
        let t = HttpPushTransport::new("http://x/send", "k").with_retries(u8::MAX);
        assert_eq!(t.max_retries, MAX_PUSH_RETRIES);
        let t = HttpPushTransport::new("http://x/send", "k").with_retries(0);
        assert_eq!(t.max_retries, 1);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(base, u8::MAX), base.saturating_mul(u32::MAX));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let t = HttpPushTransport::new("http://127.0.0.1:1/send", "  ");
        let msg = Notification {
            title: "T".into(),
            body: "B".into(),
            image_url: None,
            data: BTreeMap::new(),
        };
        let err = t.send_multicast(&msg, &["a".into()]).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured(_)));
    }
}
