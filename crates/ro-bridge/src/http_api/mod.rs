// ---------------------------------------------------------------------------
// HTTP API module directory
// ---------------------------------------------------------------------------
//
// Handlers are grouped by concern; this file owns the Axum router and its
// middleware stack.

mod misc;
mod query;
mod repo_data;
pub mod state;
pub mod types;

pub use state::ApiState;
pub use types::*;

pub use self::router::api_router;

// ---------------------------------------------------------------------------
// Router + middleware
// ---------------------------------------------------------------------------

mod router {
    use super::*;
    use axum::{
        middleware as axum_middleware,
        routing::{get, post},
        Router,
    };
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    use ro_telemetry::tracing_setup::request_id_middleware;

    /// Build the full API router.
    pub fn api_router(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/api/status", get(misc::get_status))
            .route("/api/query", post(query::post_query))
            .route("/api/rate-limit", get(query::get_rate_limit))
            .route("/api/collect-repo-data", post(repo_data::collect_repo_data))
            .route("/api/repo-data", get(repo_data::get_repo_data))
            .layer(TraceLayer::new_for_http())
            .layer(axum_middleware::from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}
