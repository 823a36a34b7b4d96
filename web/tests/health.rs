//! HTTP-level tests for the health router.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use user_service_web::{AppState, router};

fn server() -> TestServer {
    TestServer::new(router(AppState::new("user-service"))).expect("test server")
}

#[tokio::test]
async fn health_reports_status_service_and_uptime() {
    let response = server().get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "user-service");
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn health_is_json() {
    let response = server().get("/health").await;

    let content_type = response.header("content-type");
    assert_eq!(content_type.to_str().unwrap(), "application/json");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let response = server().get("/users").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_only_answers_get() {
    let response = server().post("/health").await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}
