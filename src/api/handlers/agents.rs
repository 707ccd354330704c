//! Agent registration endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ApiState;
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::dispatch::DispatchError;
use crate::types::RegistrationRequest;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
}

/// POST /api/v1/agents/register
pub async fn register_agent(
    State(state): State<ApiState>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    match state.dispatcher.register(request).await {
        Ok(_) => ApiResponse::ok(RegisterResponse { success: true }),
        Err(DispatchError::InvalidRegistration(msg)) => ApiErrorResponse::bad_request(msg),
        Err(e) => {
            warn!(error = %e, "Registration could not be stored");
            ApiErrorResponse::service_unavailable(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
}

/// POST /api/v1/agents/heartbeat - fire and forget
pub async fn heartbeat(
    State(state): State<ApiState>,
    Json(request): Json<HeartbeatRequest>,
) -> Response {
    state.dispatcher.heartbeat(&request.agent_id);
    StatusCode::ACCEPTED.into_response()
}

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.dispatcher.registry().list(Utc::now()))
}
