use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{middleware, Extension, Router};
use tower::ServiceExt;

use ro_telemetry::tracing_setup::{request_id_middleware, RequestId};

fn app() -> Router {
    Router::new()
        .route(
            "/echo",
            get(|Extension(id): Extension<RequestId>| async move { id.0 }),
        )
        .layer(middleware::from_fn(request_id_middleware))
}

#[tokio::test]
async fn incoming_request_id_is_propagated() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header("x-request-id", "abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "abc123");
}

#[tokio::test]
async fn missing_request_id_is_generated() {
    let resp = app()
        .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let id = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(id.len(), 32);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, id.as_bytes());
}
