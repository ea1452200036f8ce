use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use tracing::{info, warn};

use super::state::ApiState;
use super::types::{repo_params, CollectRequest, RepoDataQuery, RepoDataResponse};
use crate::api_error::ApiError;

const MISSING_PARAMS: &str = "Missing username or repo parameter";

/// POST /api/collect-repo-data -- build and store the repository context.
pub(crate) async fn collect_repo_data(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<RepoDataResponse>, ApiError> {
    let request: CollectRequest = if body.is_empty() {
        CollectRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let (owner, repo) = repo_params(request.username.as_deref(), request.repo.as_deref())
        .ok_or_else(|| ApiError::BadRequest(MISSING_PARAMS.into()))?;

    info!(owner, repo, force = request.force, "collecting repository data");
    let data = state
        .collector()
        .populate(state.context_cache(), &owner, &repo, request.force)
        .await?;

    Ok(Json(RepoDataResponse {
        success: true,
        data,
    }))
}

/// GET /api/repo-data?username=&repo= -- stored context, if any.
pub(crate) async fn get_repo_data(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RepoDataQuery>,
) -> Result<Json<RepoDataResponse>, ApiError> {
    let (owner, repo) = repo_params(query.username.as_deref(), query.repo.as_deref())
        .ok_or_else(|| ApiError::BadRequest(MISSING_PARAMS.into()))?;

    let stored = state
        .context_cache()
        .get(&owner, &repo)
        .await
        .unwrap_or_else(|err| {
            warn!(owner, repo, error = %err, "context cache read failed");
            None
        });

    match stored {
        Some(data) => Ok(Json(RepoDataResponse {
            success: true,
            data,
        })),
        None => Err(ApiError::NotFound("Cache expired or data not found".into())),
    }
}
