//! HTTP API error types.
//!
//! Provides a unified `ApiError` enum for consistent error responses across
//! the HTTP API layer. Every error renders as `{"success": false, "error": ...}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use ro_integrations::github::client::GitHubError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur in the HTTP API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("{0}")]
    NotFound(String),

    /// The request was malformed or invalid.
    #[error("{0}")]
    BadRequest(String),

    /// Upstream refused the credentials or throttled us.
    #[error("{0}")]
    Forbidden(String),

    /// An internal server error occurred.
    #[error("{0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        let message = err.to_string();
        match err {
            GitHubError::NotFound { .. } => ApiError::NotFound(message),
            GitHubError::Auth { .. } | GitHubError::RateLimited { .. } | GitHubError::MissingToken => {
                ApiError::Forbidden(message)
            }
            GitHubError::NotAFile { .. } | GitHubError::Unknown { .. } => {
                ApiError::InternalError(message)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IntoResponse implementation
// ---------------------------------------------------------------------------

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let response = ApiError::NotFound("repo not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "repo not found");
    }

    #[tokio::test]
    async fn test_bad_request_response() {
        let response = ApiError::BadRequest("invalid input".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid input");
    }

    #[test]
    fn test_github_error_mapping() {
        let cases = [
            (GitHubError::NotFound { path: "x".into() }, StatusCode::NOT_FOUND),
            (GitHubError::Auth { message: "bad".into() }, StatusCode::FORBIDDEN),
            (GitHubError::RateLimited { message: "slow".into() }, StatusCode::FORBIDDEN),
            (GitHubError::MissingToken, StatusCode::FORBIDDEN),
            (GitHubError::unknown("x", "boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
