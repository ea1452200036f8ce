use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::state::ApiState;
use super::types::{QueryFailure, QueryResponse, RateLimitResponse};
use crate::client_ip::client_ip;
use crate::orchestrator::QueryOutcome;

/// POST /api/query -- answer a question about a repository.
///
/// The body is read raw and only decoded after the quota gate, so a malformed
/// body from a throttled client still gets a 429.
pub(crate) async fn post_query(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = client_ip(&headers);
    let outcome = state.orchestrator.handle_raw(&identity, &body).await;
    outcome_response(outcome)
}

pub(crate) fn outcome_response(outcome: QueryOutcome) -> Response {
    match outcome {
        QueryOutcome::Answered {
            response,
            rate_limit,
        } => Json(QueryResponse {
            success: true,
            response,
            rate_limit,
        })
        .into_response(),
        QueryOutcome::RateLimited {
            message,
            rate_limit,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(QueryFailure {
                success: false,
                error: message,
                rate_limited: Some(true),
                rate_limit: Some(rate_limit),
            }),
        )
            .into_response(),
        QueryOutcome::TimedOut { message } => {
            (StatusCode::GATEWAY_TIMEOUT, Json(failure(message))).into_response()
        }
        QueryOutcome::Failed { message } => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(failure(message))).into_response()
        }
    }
}

fn failure(error: String) -> QueryFailure {
    QueryFailure {
        success: false,
        error,
        rate_limited: None,
        rate_limit: None,
    }
}

/// GET /api/rate-limit -- current quota view for the caller. Never charges.
pub(crate) async fn get_rate_limit(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Json<RateLimitResponse> {
    let identity = client_ip(&headers);
    let info = state.limiter().check(&identity).await;
    Json(RateLimitResponse {
        success: true,
        info,
    })
}
