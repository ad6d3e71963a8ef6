//! End-to-end tests against the gateway's router, independent of whether a
//! real Chromium binary is on `$PATH`: every scenario here only exercises
//! paths that fail before the pool ever needs to launch a process (unknown
//! sessions, malformed queries, an empty `/browsers` listing).
//!
//! Crash-recovery, warm-pool convergence, and lease-expiry scenarios are
//! covered at the pool level in [`crate::pool`]'s own test module, where a
//! fake [`crate::pool::ResourceFactory`] stands in for a browser process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use crate::browser_pool::BrowserPool;
use crate::config::Config;
use crate::gateway::{self, AppState};

fn test_app() -> axum::Router {
    let config = Config {
        max_instances: 1,
        num_warm: 0,
        ..Config::default()
    };
    let pool = BrowserPool::new(config);
    gateway::router(AppState::new(pool, "localhost:8080".to_string()))
}

#[tokio::test]
async fn unknown_session_proxy_returns_404() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/session/does-not-exist/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deallocating_unknown_session_returns_404() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/browser/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extending_unknown_session_returns_404() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/browser/does-not-exist/timeout?timeout=30")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn allocate_rejects_non_integer_timeout() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/browser?timeout=soon")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn browsers_listing_starts_empty() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/browsers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"[]");
}

#[tokio::test]
async fn healthz_reports_healthy_on_an_empty_pool() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "healthy");
}

#[tokio::test]
async fn metrics_endpoint_404s_when_no_recorder_is_installed() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unrouted_path_returns_404() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/does/not/exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
