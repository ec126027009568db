//! Axum JSON API for the creator dashboard.
//!
//! Every handler follows the same shape: read the full collection, mutate
//! in memory, flush it back in one batch write. A storage failure surfaces
//! as a 500 for the whole operation with zero partial effect.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use ccp_core::{ContentRecord, Status};
use ccp_import::{merge_into, parse_table, ImportSchema, TEMPLATE_CSV};
use ccp_storage::{AccountsStore, ContentStore};
use ccp_sync::{AiClient, MetricsSyncer, SyncConfig};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "ccp-web";

pub struct AppState {
    pub store: ContentStore,
    pub accounts: AccountsStore,
    pub schema: ImportSchema,
    pub demo_mode: bool,
    pub ai: Option<AiClient>,
    pub syncer: MetricsSyncer,
    pub tiktok_configured: bool,
    pub instagram_configured: bool,
}

impl AppState {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        demo_mode: bool,
        sync_config: &SyncConfig,
    ) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        Ok(Self {
            store: ContentStore::new(data_dir.clone()),
            accounts: AccountsStore::new(data_dir),
            schema: ImportSchema::default(),
            demo_mode,
            ai: AiClient::from_config(sync_config)?,
            syncer: MetricsSyncer::from_config(sync_config)?,
            tiktok_configured: sync_config.tiktok_access_token.is_some(),
            instagram_configured: sync_config.instagram_access_token.is_some(),
        })
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/api/content", get(list_content).post(create_content))
        .route(
            "/api/content/{id}",
            put(update_content).delete(delete_content),
        )
        .route("/api/content/import", post(import_content))
        .route("/api/content/import/preview", post(import_preview))
        .route("/api/content/template", get(import_template))
        .route("/api/generate", post(generate_caption))
        .route("/api/sync", post(sync_metrics))
        .route("/api/accounts", get(account_stats))
        .route("/api/analytics", get(analytics))
        .route("/api/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), demo_guard))
        .with_state(state)
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| ".".to_string());
    let demo_mode = std::env::var("DEMO_MODE")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);

    let state = AppState::new(data_dir, demo_mode, &SyncConfig::from_env())?;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, demo_mode, "dashboard API listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Demo mode makes the whole API read-only: writes are refused before any
/// handler runs.
async fn demo_guard(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let writes = [Method::POST, Method::PUT, Method::DELETE];
    if state.demo_mode && writes.contains(req.method()) && req.uri().path().starts_with("/api") {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Demo mode: this is a read-only preview. Changes are disabled.",
                "demo": true,
            })),
        )
            .into_response();
    }
    next.run(req).await
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "apiConfigured": state.ai.is_some(),
    }))
    .into_response()
}

async fn list_content(State(state): State<Arc<AppState>>) -> Response {
    match state.store.load().await {
        Ok(records) => Json(records).into_response(),
        Err(err) => server_error(err),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct NewContent {
    title: String,
    summary: String,
    header: String,
    caption: String,
    hashtags: String,
    status: Status,
    due_date: String,
    tiktok_url: String,
    instagram_url: String,
    views: u64,
    likes: u64,
    comments: u64,
    shares: u64,
    category: String,
}

async fn create_content(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewContent>,
) -> Response {
    let mut record = ContentRecord::new(ccp_core::new_record_id(), body.title);
    record.summary = body.summary;
    record.header = body.header;
    record.caption = body.caption;
    record.hashtags = body.hashtags;
    record.status = body.status;
    record.due_date = body.due_date;
    record.created_date = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    record.tiktok_url = body.tiktok_url;
    record.instagram_url = body.instagram_url;
    record.views = body.views;
    record.likes = body.likes;
    record.comments = body.comments;
    record.shares = body.shares;
    record.category = body.category;

    let mut records = match state.store.load().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    records.push(record.clone());
    match state.store.replace_all(&records).await {
        Ok(()) => Json(record).into_response(),
        Err(err) => server_error(err),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ContentPatch {
    title: Option<String>,
    summary: Option<String>,
    header: Option<String>,
    caption: Option<String>,
    hashtags: Option<String>,
    status: Option<Status>,
    due_date: Option<String>,
    tiktok_url: Option<String>,
    instagram_url: Option<String>,
    views: Option<u64>,
    likes: Option<u64>,
    comments: Option<u64>,
    shares: Option<u64>,
    category: Option<String>,
}

async fn update_content(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(patch): Json<ContentPatch>,
) -> Response {
    let mut records = match state.store.load().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    let Some(record) = records.iter_mut().find(|r| r.id == id) else {
        return not_found("Content not found");
    };

    if let Some(title) = patch.title {
        record.title = title;
    }
    if let Some(summary) = patch.summary {
        record.summary = summary;
    }
    if let Some(header) = patch.header {
        record.header = header;
    }
    if let Some(caption) = patch.caption {
        record.caption = caption;
    }
    if let Some(hashtags) = patch.hashtags {
        record.hashtags = hashtags;
    }
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(due_date) = patch.due_date {
        record.due_date = due_date;
    }
    if let Some(tiktok_url) = patch.tiktok_url {
        record.tiktok_url = tiktok_url;
    }
    if let Some(instagram_url) = patch.instagram_url {
        record.instagram_url = instagram_url;
    }
    if let Some(views) = patch.views {
        record.views = views;
    }
    if let Some(likes) = patch.likes {
        record.likes = likes;
    }
    if let Some(comments) = patch.comments {
        record.comments = comments;
    }
    if let Some(shares) = patch.shares {
        record.shares = shares;
    }
    if let Some(category) = patch.category {
        record.category = category;
    }
    let updated = record.clone();

    match state.store.replace_all(&records).await {
        Ok(()) => Json(updated).into_response(),
        Err(err) => server_error(err),
    }
}

async fn delete_content(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let mut records = match state.store.load().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    let before = records.len();
    records.retain(|r| r.id != id);
    if records.len() == before {
        return not_found("Content not found");
    }
    match state.store.replace_all(&records).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => server_error(err),
    }
}

/// Parse + reconcile + merge + single flush. Counts are only reported
/// after the flush succeeds; a failed flush means nothing was imported.
async fn import_content(State(state): State<Arc<AppState>>, body: String) -> Response {
    let records = state.schema.reconcile(&parse_table(&body));
    if records.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Nothing to import" })),
        )
            .into_response();
    }

    let mut existing = match state.store.load().await {
        Ok(existing) => existing,
        Err(err) => return server_error(err),
    };
    let summary = merge_into(&mut existing, &records, Utc::now());
    match state.store.replace_all(&existing).await {
        Ok(()) => Json(summary).into_response(),
        Err(err) => server_error(err),
    }
}

async fn import_preview(State(state): State<Arc<AppState>>, body: String) -> Response {
    Json(ccp_import::preview(&body, &state.schema)).into_response()
}

async fn import_template() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"content-template.csv\"",
            ),
        ],
        TEMPLATE_CSV,
    )
        .into_response()
}

#[derive(Debug, Deserialize, Default)]
struct GenerateRequest {
    #[serde(default)]
    summary: String,
}

async fn generate_caption(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> Response {
    let summary = body.summary.trim();
    if summary.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Summary is required" })),
        )
            .into_response();
    }
    let Some(ai) = &state.ai else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "ANTHROPIC_API_KEY not configured" })),
        )
            .into_response();
    };
    match ai.generate_caption(summary).await {
        Ok(generated) => Json(generated).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err)),
    }
}

async fn sync_metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut records = match state.store.load().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };
    let mut accounts = match state.accounts.load().await {
        Ok(accounts) => accounts,
        Err(err) => return server_error(err),
    };

    let outcome = state
        .syncer
        .sync_once(&mut records, &mut accounts, Utc::now())
        .await;

    if let Err(err) = state.store.replace_all(&records).await {
        return server_error(err);
    }
    if let Err(err) = state.accounts.save(&accounts).await {
        return server_error(err);
    }
    Json(outcome).into_response()
}

async fn account_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.accounts.load().await {
        Ok(accounts) => Json(json!({
            "tiktok": accounts.tiktok,
            "instagram": accounts.instagram,
            "lastSynced": accounts.last_synced,
            "configured": {
                "tiktok": state.tiktok_configured,
                "instagram": state.instagram_configured,
            },
        }))
        .into_response(),
        Err(err) => server_error(err),
    }
}

async fn analytics(State(state): State<Arc<AppState>>) -> Response {
    let records = match state.store.load().await {
        Ok(records) => records,
        Err(err) => return server_error(err),
    };

    let posted: Vec<&ContentRecord> = records
        .iter()
        .filter(|r| r.status == Status::Posted)
        .collect();

    let stats: Vec<serde_json::Value> = posted
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "views": r.views,
                "likes": r.likes,
                "comments": r.comments,
                "shares": r.shares,
                "engagementRate": engagement_rate(r),
                "hashtags": r.hashtags,
                "dueDate": r.due_date,
            })
        })
        .collect();

    let (views, likes, comments, shares) = posted.iter().fold((0u64, 0u64, 0u64, 0u64), |acc, r| {
        (
            acc.0 + r.views,
            acc.1 + r.likes,
            acc.2 + r.comments,
            acc.3 + r.shares,
        )
    });
    let totals = json!({ "views": views, "likes": likes, "comments": comments, "shares": shares });

    let avg_engagement = if posted.is_empty() {
        "0.00".to_string()
    } else {
        let sum: f64 = posted
            .iter()
            .map(|r| engagement_rate(r).parse::<f64>().unwrap_or(0.0))
            .sum();
        format!("{:.2}", sum / posted.len() as f64)
    };

    // Insights are best-effort: only attempted when configured and there is
    // real data, and a failed call degrades to null.
    let mut insights = None;
    let with_data: Vec<&serde_json::Value> = stats
        .iter()
        .filter(|s| s["views"].as_u64().unwrap_or(0) > 0)
        .collect();
    if let (Some(ai), false) = (&state.ai, with_data.is_empty()) {
        match ai.analytics_insights(&json!(with_data)).await {
            Ok(text) => insights = Some(text),
            Err(err) => warn!(%err, "analytics insights unavailable"),
        }
    }

    Json(json!({
        "stats": stats,
        "totals": totals,
        "avgEngagement": avg_engagement,
        "insights": insights,
    }))
    .into_response()
}

fn engagement_rate(record: &ContentRecord) -> String {
    if record.views == 0 {
        return "0.00".to_string();
    }
    let engaged = (record.likes + record.comments + record.shares) as f64;
    format!("{:.2}", engaged / record.views as f64 * 100.0)
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(%err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}
