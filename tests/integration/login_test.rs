// tests/integration/login_test.rs

//! Integration tests for `/login` and `/debug`.

use super::test_helpers::TestContext;
use reqwest::StatusCode;
use roomcast::server::http::LoginResponse;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_login_issues_token() {
    let ctx = TestContext::new().await;

    let response = ctx.login("alice", "wonderland").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = response.json().await.unwrap();

    assert!(!body.otp.is_empty());
    assert_eq!(ctx.state.tokens.len(), 1);
}

#[tokio::test]
async fn test_each_login_gets_a_fresh_token() {
    let ctx = TestContext::new().await;
    let first = ctx.otp_for("alice").await;
    let second = ctx.otp_for("alice").await;
    assert_ne!(first, second);
    assert_eq!(ctx.state.tokens.len(), 2);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let ctx = TestContext::new().await;

    let started = Instant::now();
    let response = ctx.login("alice", "rabbit-hole").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(ctx.state.tokens.is_empty());
}

#[tokio::test]
async fn test_login_with_unknown_user() {
    let ctx = TestContext::new().await;
    let response = ctx.login("mallory", "wonderland").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_malformed_body() {
    let ctx = TestContext::new().await;

    for body in ["not json", r#"{"username":"alice"}"#, ""] {
        let response = ctx
            .http
            .post(ctx.url("/login"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
    }
    assert!(ctx.state.tokens.is_empty());
}

#[tokio::test]
async fn test_login_requires_post() {
    let ctx = TestContext::new().await;
    let response = ctx.http.get(ctx.url("/login")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

async fn debug_body(ctx: &TestContext) -> String {
    let response = ctx.http.get(ctx.url("/debug")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.text().await.unwrap()
}

#[tokio::test]
async fn test_debug_reports_registry_size() {
    let ctx = TestContext::new().await;
    assert_eq!(debug_body(&ctx).await, "0");

    let _a = ctx.connect("alice").await;
    let _b = ctx.connect("bob").await;
    assert_eq!(debug_body(&ctx).await, "2");
}
