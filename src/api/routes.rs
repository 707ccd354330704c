//! API route definitions
//!
//! - /api/v1/agents/register, /api/v1/agents/heartbeat, /api/v1/agents
//! - /api/v1/insights, /api/v1/insights/:id
//! - /api/v1/status
//! - /ws, /health at root level

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/agents/register", post(handlers::register_agent))
        .route("/agents/heartbeat", post(handlers::heartbeat))
        .route("/insights", get(handlers::list_insights))
        .route("/insights/:id", get(handlers::get_insight))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

pub fn root_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ws", get(handlers::ws_subscribe))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{IngestStats, SharedRing};
    use crate::broadcast::{FanoutHub, InsightCache};
    use crate::config::{DispatchConfig, LogConfig};
    use crate::dispatch::{AgentRegistry, Dispatcher};
    use crate::stream::{SledLog, StreamLog};
    use crate::types::{Insight, Severity};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    fn create_test_state() -> ApiState {
        let log: Arc<dyn StreamLog> = Arc::new(SledLog::temporary(&LogConfig::default()).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(AgentRegistry::new(Duration::from_secs(30))),
            log,
            DispatchConfig::default(),
        ));
        ApiState {
            dispatcher,
            hub: Arc::new(FanoutHub::new(1024 * 1024)),
            insights: Arc::new(InsightCache::new(10)),
            ring: SharedRing::new(100),
            ingest: Arc::new(IngestStats::default()),
            consumers: Arc::new(BTreeMap::new()),
            started_at: Instant::now(),
        }
    }

    fn app(state: ApiState) -> Router {
        Router::new()
            .nest("/api/v1", api_routes(state.clone()))
            .merge(root_routes(state))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let state = create_test_state();
        let resp = app(state.clone())
            .oneshot(post_json(
                "/api/v1/agents/register",
                serde_json::json!({
                    "agent_id": "eda-ext",
                    "task_types": ["eda"],
                    "tracks": ["Road America", "VIR"],
                    "capacity": 2,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["success"], true);

        let resp = app(state)
            .oneshot(Request::get("/api/v1/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let v = body_json(resp).await;
        let agents = v["data"].as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["agent_id"], "eda-ext");
        assert_eq!(agents[0]["routable"], true);
        let tracks: Vec<&str> = agents[0]["tracks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap())
            .collect();
        assert_eq!(tracks, vec!["road_america", "vir"]);
    }

    #[tokio::test]
    async fn test_invalid_registration_is_rejected() {
        let resp = app(create_test_state())
            .oneshot(post_json(
                "/api/v1/agents/register",
                serde_json::json!({
                    "agent_id": "x",
                    "task_types": [],
                    "tracks": ["*"],
                    "capacity": 1,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_heartbeat_is_accepted_even_if_unknown() {
        let resp = app(create_test_state())
            .oneshot(post_json(
                "/api/v1/agents/heartbeat",
                serde_json::json!({"agent_id": "ghost"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_insight_lookup() {
        let state = create_test_state();
        state.insights.insert(Insight {
            id: "insight-t1".to_string(),
            task_id: "t1".to_string(),
            agent_id: "explainer-1".to_string(),
            track: "sebring".to_string(),
            chassis: "GR86-010".to_string(),
            title: "Tire load peaks in sector 3".to_string(),
            severity: Severity::High,
            score: 70.0,
            explanation: String::new(),
            evidence: Vec::new(),
            recommendation: String::new(),
            created_at: Utc::now(),
        });

        let resp = app(state.clone())
            .oneshot(Request::get("/api/v1/insights/insight-t1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["severity"], "high");

        let resp = app(state.clone())
            .oneshot(Request::get("/api/v1/insights/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app(state)
            .oneshot(Request::get("/api/v1/insights?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let state = create_test_state();
        let resp = app(state.clone())
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["data"]["buffer"]["capacity"], 100);
        assert_eq!(v["data"]["subscribers"], 0);

        let resp = app(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }
}
