use serde::{Deserialize, Serialize};

use ro_core::types::{RateLimitInfo, RepoContext};

/// Body of `POST /api/collect-repo-data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Query string of `GET /api/repo-data`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoDataQuery {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub response: String,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFailure {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    pub success: bool,
    #[serde(flatten)]
    pub info: RateLimitInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoDataResponse {
    pub success: bool,
    pub data: RepoContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub store: String,
    pub secondary_provider: bool,
}

/// Trimmed, non-empty `owner` and `repo`, or `None`.
pub(crate) fn repo_params(owner: Option<&str>, repo: Option<&str>) -> Option<(String, String)> {
    let owner = owner.map(str::trim).filter(|s| !s.is_empty())?;
    let repo = repo.map(str::trim).filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repo.to_string()))
}
