//! HTTP surface using Axum
//!
//! - `/api/v1` JSON endpoints for agents, insights and status
//! - `/ws` broadcast subscriber connection
//! - `/health` liveness

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Environment variable with a comma-separated list of allowed origins.
pub const CORS_ENV_VAR: &str = "RACEWIRE_CORS_ORIGINS";

/// Same-origin by default; `RACEWIRE_CORS_ORIGINS` opens it up for
/// dashboards served from elsewhere (`*` allows any origin).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) if origins.trim() == "*" => {
            tracing::info!("CORS: allowing any origin");
            base.allow_origin(Any)
        }
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::root_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
