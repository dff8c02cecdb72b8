use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::aggregate::{AggregationService, CombinedFeed, FeedQuery};
use crate::item::CanonicalNewsItem;
use crate::notify::registry::{EndpointMetadata, PruneOutcome, RegistryStats};
use crate::notify::{Notification, NotificationService, SendSummary};

/// Largest upstream batch a section page may request.
const MAX_SECTION_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub aggregation: Arc<AggregationService>,
    pub notifications: Arc<NotificationService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/combined-feed", get(combined_feed))
        .route("/section-feed/{category}/{limit}", get(section_feed))
        .route("/notifications/register", post(register))
        .route("/notifications/send", post(send))
        .route("/notifications/send-article", post(send_article))
        .route("/notifications/stats", get(stats))
        .route("/notifications/cleanup", post(cleanup))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Malformed request; rendered as 400 `{error}`.
#[derive(Debug)]
struct BadRequest(String);

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": self.0 }))).into_response()
    }
}

fn parse_int(q: &HashMap<String, String>, key: &str) -> Result<Option<i64>, BadRequest> {
    match q.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| BadRequest(format!("'{key}' must be an integer"))),
    }
}

async fn combined_feed(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<CombinedFeed>, BadRequest> {
    let query = FeedQuery {
        page: parse_int(&q, "page")?,
        limit: parse_int(&q, "limit")?,
        category: q.get("category").cloned(),
    };
    Ok(Json(state.aggregation.combined_feed(&query).await))
}

#[derive(Serialize)]
struct SectionFeedResp {
    items: Vec<CanonicalNewsItem>,
}

async fn section_feed(
    State(state): State<AppState>,
    Path((category, limit)): Path<(String, String)>,
) -> Result<Json<SectionFeedResp>, BadRequest> {
    let category = category.trim();
    if category.is_empty() {
        return Err(BadRequest("category must not be empty".into()));
    }
    let limit = match limit.trim().parse::<usize>() {
        Ok(n) if n > 0 => n.min(MAX_SECTION_LIMIT),
        _ => return Err(BadRequest("limit must be a positive integer".into())),
    };
    let items = state.aggregation.section_feed(category, limit).await;
    Ok(Json(SectionFeedResp { items }))
}

#[derive(Deserialize)]
struct RegisterReq {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    metadata: Option<EndpointMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResp {
    success: bool,
    token_count: usize,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterReq>,
) -> Result<Json<RegisterResp>, BadRequest> {
    let token = body.token.unwrap_or_default();
    let token_count = state
        .notifications
        .register(&token, body.metadata.unwrap_or_default())
        .map_err(|e| BadRequest(e.to_string()))?;
    Ok(Json(RegisterResp {
        success: true,
        token_count,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendReq {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    data: Option<BTreeMap<String, serde_json::Value>>,
}

async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendReq>,
) -> Result<Json<SendSummary>, BadRequest> {
    let title = req.title.unwrap_or_default();
    if title.trim().is_empty() {
        return Err(BadRequest("title must not be empty".into()));
    }
    // Push data payloads are string-to-string; stringify anything else.
    let data = req
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();
    let message = Notification {
        title: title.trim().to_string(),
        body: req.body.unwrap_or_default(),
        image_url: req.image_url.filter(|u| !u.trim().is_empty()),
        data,
    };
    Ok(Json(state.notifications.send(&message).await))
}

#[derive(Deserialize)]
struct SendArticleReq {
    #[serde(default)]
    article: Option<CanonicalNewsItem>,
}

async fn send_article(
    State(state): State<AppState>,
    Json(req): Json<SendArticleReq>,
) -> Result<Json<SendSummary>, BadRequest> {
    let item = req
        .article
        .ok_or_else(|| BadRequest("article is required".into()))?;
    if item.title.trim().is_empty() {
        return Err(BadRequest("article title must not be empty".into()));
    }
    Ok(Json(state.notifications.send_article(&item).await))
}

async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.notifications.stats())
}

async fn cleanup(State(state): State<AppState>) -> Json<PruneOutcome> {
    Json(state.notifications.cleanup())
}
