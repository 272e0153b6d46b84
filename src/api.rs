// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::candidate::ScoredCandidate;
use crate::error::TrendError;
use crate::pipeline::{Pipeline, PipelineStats};

const DEFAULT_SELECT_N: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trends", get(trends))
        .route("/trends/select", get(select))
        .route("/stats", get(stats))
        .route("/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct SelectQuery {
    n: Option<usize>,
}

#[derive(serde::Serialize)]
struct ErrorOut {
    error: String,
}

async fn trends(State(state): State<AppState>) -> Json<Vec<ScoredCandidate>> {
    Json(state.pipeline.current())
}

async fn select(
    State(state): State<AppState>,
    Query(q): Query<SelectQuery>,
) -> Json<Vec<ScoredCandidate>> {
    let n = q.n.unwrap_or(DEFAULT_SELECT_N).max(1);
    Json(state.pipeline.select(n))
}

async fn stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.pipeline.stats())
}

async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScoredCandidate>>, (StatusCode, Json<ErrorOut>)> {
    let cancel = CancellationToken::new();
    match state.pipeline.refresh(&cancel).await {
        Ok(ranked) => Ok(Json(ranked)),
        Err(e) => {
            let status = match e {
                TrendError::NoCandidates | TrendError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                TrendError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(target: "trends", error = %e, "manual refresh failed");
            Err((status, Json(ErrorOut { error: e.to_string() })))
        }
    }
}
