//! Exercises `GitHubClient::contents` against a local stand-in for the
//! GitHub REST API, covering body sniffing and status classification.

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use ro_integrations::github::client::{GitHubClient, GitHubError};
use ro_integrations::github::source::RepoSource;
use ro_integrations::types::{ContentEntry, ContentResponse, GitHubConfig};

async fn start_fake_github() -> String {
    let app = Router::new()
        .route(
            "/repos/octo/repo/contents",
            get(|| async {
                Json(json!([
                    {"name": "src", "path": "src", "type": "dir"},
                    {"name": "README.md", "path": "README.md", "type": "file"}
                ]))
            }),
        )
        .route(
            "/repos/octo/repo/contents/README.md",
            get(|headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer ghp_test_token");
                if !authorized {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})))
                        .into_response();
                }
                Json(json!({
                    "name": "README.md",
                    "path": "README.md",
                    "type": "file",
                    "encoding": "base64",
                    "content": "IyBIZWxs\nbwo=\n"
                }))
                .into_response()
            }),
        )
        .route(
            "/repos/octo/repo/contents/login.md",
            get(|| async { "<!DOCTYPE html><html><body>Sign in</body></html>" }),
        )
        .route(
            "/repos/octo/repo/contents/limited.md",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    [("x-ratelimit-remaining", "0")],
                    Json(json!({"message": "API rate limit exceeded"})),
                )
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str, token: &str) -> GitHubClient {
    GitHubClient::new(GitHubConfig::new(Some(token.into())).with_base_url(base)).unwrap()
}

#[tokio::test]
async fn lists_root_directory() {
    let base = start_fake_github().await;
    let listing = client(&base, "ghp_test_token")
        .contents("octo", "repo", "")
        .await
        .unwrap();
    assert_eq!(
        listing,
        ContentResponse::Directory(vec![
            ContentEntry::directory("src", "src"),
            ContentEntry::file("README.md", "README.md"),
        ])
    );
}

#[tokio::test]
async fn reads_file_blob() {
    let base = start_fake_github().await;
    match client(&base, "ghp_test_token")
        .contents("octo", "repo", "README.md")
        .await
        .unwrap()
    {
        ContentResponse::File(blob) => {
            assert_eq!(blob.kind, "file");
            assert_eq!(blob.encoding.as_deref(), Some("base64"));
        }
        other => panic!("expected a file, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_token_is_auth_error() {
    let base = start_fake_github().await;
    let err = client(&base, "ghp_wrong")
        .contents("octo", "repo", "README.md")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Auth { .. }));
}

#[tokio::test]
async fn html_page_is_auth_error() {
    let base = start_fake_github().await;
    let err = client(&base, "ghp_test_token")
        .contents("octo", "repo", "login.md")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Auth { .. }));
    assert!(err.to_string().contains("HTML"));
}

#[tokio::test]
async fn exhausted_quota_is_rate_limit() {
    let base = start_fake_github().await;
    let err = client(&base, "ghp_test_token")
        .contents("octo", "repo", "limited.md")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::RateLimited { .. }));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let base = start_fake_github().await;
    let err = client(&base, "ghp_test_token")
        .contents("octo", "repo", "missing.md")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GitHubError::NotFound {
            path: "missing.md".into()
        }
    );
}
