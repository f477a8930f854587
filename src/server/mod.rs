//! Dashboard JSON API.
//!
//! Rendering is left to whatever front end consumes this; the server
//! only exposes the ranked PR list, poller status, manual refresh, and
//! bury/unbury.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::poll::PollScheduler;
use crate::score::{Score, score_pr};
use crate::store::Store;
use crate::types::TrackedPr;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<PollScheduler>,
    pub username: String,
}

/// Build the Axum router for the dashboard API.
pub fn api_routes(
    store: Arc<dyn Store>,
    scheduler: Arc<PollScheduler>,
    username: impl Into<String>,
) -> Router {
    let state = AppState { store, scheduler, username: username.into() };

    // v0 means "may change at any time, read the code"
    Router::new()
        .route("/health", get(health))
        .route("/api/v0/prs", get(list_prs))
        .route("/api/v0/prs/refresh", post(refresh))
        .route("/api/v0/prs/bury", post(bury))
        .route("/api/v0/prs/unbury", post(unbury))
        .route("/api/v0/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "prowl"
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    min_points: Option<i64>,
}

/// One entry in the ranked PR list.
#[derive(Debug, Serialize)]
pub struct RankedPr {
    #[serde(flatten)]
    pub pr: TrackedPr,
    pub points: Score,
}

async fn list_prs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RankedPr>>, (StatusCode, String)> {
    let prs = state
        .store
        .prs()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let min_points = params
        .min_points
        .filter(|m| (-999..=999).contains(m))
        .unwrap_or(-999);

    Ok(Json(rank_prs(prs, &state.username, Utc::now(), min_points)))
}

async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    info!("manual refresh requested");
    state.scheduler.request_refresh();
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct PrRef {
    url: String,
}

async fn bury(
    State(state): State<AppState>,
    Json(req): Json<PrRef>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .bury(&req.url)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("couldn't bury PR {}: {e}", req.url)))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unbury(
    State(state): State<AppState>,
    Json(req): Json<PrRef>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .unbury(&req.url)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("couldn't unbury PR {}: {e}", req.url)))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    username: String,
    current_interval_secs: u64,
    base_interval_secs: u64,
    /// True once the poller gave up on the credential; supplying a new
    /// one and restarting is the way out.
    poller_stopped: bool,
    last_fetched: Option<DateTime<Utc>>,
}

async fn status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let last_fetched = state
        .store
        .last_fetched()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(StatusResponse {
        username: state.username.clone(),
        current_interval_secs: state.scheduler.current_interval().as_secs(),
        base_interval_secs: state.scheduler.base_interval().as_secs(),
        poller_stopped: state.scheduler.is_stopped(),
        last_fetched,
    }))
}

/// Score every PR and rank: points descending, newer activity breaking
/// ties. The raw response blob is a debugging aid and stays out of the
/// API.
fn rank_prs(
    prs: Vec<TrackedPr>,
    username: &str,
    now: DateTime<Utc>,
    min_points: i64,
) -> Vec<RankedPr> {
    let mut ranked: Vec<RankedPr> = prs
        .into_iter()
        .map(|mut pr| {
            pr.raw_json = None;
            let points = score_pr(&pr, username, now);
            RankedPr { pr, points }
        })
        .filter(|r| r.points.total >= min_points)
        .collect();

    ranked.sort_by(|a, b| {
        b.points
            .total
            .cmp(&a.points.total)
            .then_with(|| b.pr.last_updated.cmp(&a.pr.last_updated))
    });

    ranked
}
