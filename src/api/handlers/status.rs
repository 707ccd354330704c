//! Relay status and liveness

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use super::ApiState;
use crate::acquisition::IngestSnapshot;
use crate::api::envelope::ApiResponse;
use crate::stream::ConsumerState;

#[derive(Debug, Serialize)]
pub struct BufferStatus {
    pub len: usize,
    pub capacity: usize,
    pub total_pushed: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub ingest: IngestSnapshot,
    pub buffer: BufferStatus,
    pub subscribers: usize,
    pub agents_registered: usize,
    pub insights_cached: usize,
    pub consumers: BTreeMap<String, ConsumerState>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Response {
    let consumers = state
        .consumers
        .iter()
        .map(|(name, rx)| (name.clone(), *rx.borrow()))
        .collect();

    ApiResponse::ok(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        ingest: state.ingest.snapshot(),
        buffer: BufferStatus {
            len: state.ring.len(),
            capacity: state.ring.capacity(),
            total_pushed: state.ring.total_pushed(),
        },
        subscribers: state.hub.subscriber_count(),
        agents_registered: state.dispatcher.registry().len(),
        insights_cached: state.insights.len(),
        consumers,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
