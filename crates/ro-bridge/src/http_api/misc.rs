use std::sync::Arc;

use axum::{extract::State, Json};

use super::state::ApiState;
use super::types::StatusResponse;

/// GET /api/status -- returns basic server health.
pub(crate) async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: state.store_backend.clone(),
        secondary_provider: state.orchestrator.has_secondary_provider(),
    })
}
