//! Insight lookup

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/insights?limit=N - newest first
pub async fn list_insights(State(state): State<ApiState>, Query(query): Query<InsightQuery>) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .min(state.insights.capacity());
    ApiResponse::ok(state.insights.recent(limit))
}

/// GET /api/v1/insights/:id
pub async fn get_insight(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.insights.get(&id) {
        Some(insight) => ApiResponse::ok(insight),
        None => ApiErrorResponse::not_found(format!("no insight {id}")),
    }
}
