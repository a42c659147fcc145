// tests/integration/relay_test.rs

//! End-to-end tests for `/ws`: token gating, rooms, fanout and teardown.

use super::test_helpers::{
    TestContext, next_event, send_event, upgrade_status, wait_for_close,
};
use futures::SinkExt;
use roomcast::config::Config;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

// ===== Messaging =====

#[tokio::test]
async fn test_two_clients_chat_in_a_room() {
    let ctx = TestContext::new().await;
    let mut a = ctx.connect("alice").await;
    let mut b = ctx.connect("bob").await;
    assert_eq!(ctx.state.registry.len(), 2);

    ctx.join_room(&mut a, "general", 1).await;
    ctx.join_room(&mut b, "general", 2).await;

    send_event(
        &mut a,
        json!({"type": "send_message", "payload": {"message": "hi", "from": "A"}}),
    )
    .await;

    for ws in [&mut a, &mut b] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["payload"]["message"], "hi");
        assert_eq!(event["payload"]["from"], "A");
        assert!(event["payload"]["sent"].is_string());
    }
}

#[tokio::test]
async fn test_messages_stay_in_their_room() {
    let ctx = TestContext::new().await;
    let mut a = ctx.connect("alice").await;
    let mut b = ctx.connect("bob").await;
    let mut c = ctx.connect("carol").await;
    ctx.join_room(&mut a, "general", 1).await;
    ctx.join_room(&mut b, "general", 2).await;
    ctx.join_room(&mut c, "random", 1).await;

    send_event(
        &mut a,
        json!({"type": "send_message", "payload": {"message": "for general", "from": "A"}}),
    )
    .await;
    assert_eq!(next_event(&mut b).await["payload"]["message"], "for general");

    send_event(
        &mut c,
        json!({"type": "send_message", "payload": {"message": "for random", "from": "C"}}),
    )
    .await;
    // C's first event is its own message: nothing from "general" was queued.
    assert_eq!(next_event(&mut c).await["payload"]["message"], "for random");
    assert_eq!(next_event(&mut a).await["payload"]["message"], "for general");
}

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let ctx = TestContext::new().await;
    let mut a = ctx.connect("alice").await;

    a.send(Message::Text("garbage".to_string().into())).await.unwrap();
    send_event(&mut a, json!({"type": "dance", "payload": {}})).await;
    send_event(&mut a, json!({"type": "send_message", "payload": "hi"})).await;
    send_event(
        &mut a,
        json!({"type": "send_message", "payload": {"message": "ok", "from": "A"}}),
    )
    .await;

    assert_eq!(next_event(&mut a).await["payload"]["message"], "ok");
    assert_eq!(ctx.state.registry.len(), 1);
    assert_eq!(ctx.state.stats.get_rejected_events(), 3);
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let mut config = Config::default();
    config.session.max_message_size = 64;
    let ctx = TestContext::with_config(config).await;
    let mut a = ctx.connect("alice").await;

    let _ = a.send(Message::Text("x".repeat(200).into())).await;

    wait_for_close(&mut a).await;
    ctx.wait_until(|state| state.registry.is_empty()).await;
}

// ===== Token Gating =====

#[tokio::test]
async fn test_consumed_token_is_rejected() {
    let ctx = TestContext::new().await;
    let otp = ctx.otp_for("alice").await;

    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 101);
    ctx.wait_until(|state| state.stats.get_total_sessions() == 1 && state.registry.is_empty())
        .await;

    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 401);
    assert!(ctx.state.registry.is_empty());
    assert_eq!(ctx.state.stats.get_total_sessions(), 1);
}

#[tokio::test]
async fn test_missing_and_unknown_tokens_are_rejected() {
    let ctx = TestContext::new().await;

    let response = ctx.http.get(ctx.url("/ws")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    assert_eq!(upgrade_status(ctx.ws_url("")).await, 401);
    assert_eq!(upgrade_status(ctx.ws_url("not-a-token")).await, 401);
    assert_eq!(ctx.state.registry.len(), 0);
    assert_eq!(ctx.state.stats.get_total_sessions(), 0);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let mut config = Config::default();
    config.otp.retention = Duration::from_millis(200);
    let ctx = TestContext::with_config(config).await;

    let otp = ctx.otp_for("alice").await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 401);
}

#[tokio::test]
async fn test_origin_allow_list() {
    let mut config = Config::default();
    config.allowed_origins = vec!["http://chat.example".to_string()];
    let ctx = TestContext::with_config(config).await;
    let otp = ctx.otp_for("alice").await;

    // No origin, then a foreign one. Neither spends the token.
    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 403);
    let mut request = ctx.ws_url(&otp).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://evil.example"));
    assert_eq!(upgrade_status(request).await, 403);

    let mut request = ctx.ws_url(&otp).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://chat.example"));
    assert_eq!(upgrade_status(request).await, 101);
}

#[tokio::test]
async fn test_session_limit_returns_503() {
    let mut config = Config::default();
    config.max_clients = 1;
    let ctx = TestContext::with_config(config).await;

    let _a = ctx.connect("alice").await;
    let otp = ctx.otp_for("bob").await;
    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 503);
    assert_eq!(ctx.state.registry.len(), 1);
}

#[tokio::test]
async fn test_rejection_for_capacity_keeps_the_token() {
    let mut config = Config::default();
    config.max_clients = 1;
    let ctx = TestContext::with_config(config).await;

    let mut a = ctx.connect("alice").await;
    let otp = ctx.otp_for("bob").await;
    assert_eq!(upgrade_status(ctx.ws_url(&otp)).await, 503);

    a.close(None).await.unwrap();
    ctx.wait_until(|state| state.registry.is_empty()).await;

    let (mut b, _) = tokio_tungstenite::connect_async(ctx.ws_url(&otp))
        .await
        .expect("token should survive a 503");
    ctx.wait_until(|state| state.registry.len() == 1).await;
    let _ = b.close(None).await;
}

// ===== Teardown =====

#[tokio::test]
async fn test_client_disconnect_removes_session() {
    let ctx = TestContext::new().await;
    let mut a = ctx.connect("alice").await;
    let _b = ctx.connect("bob").await;
    assert_eq!(ctx.state.registry.len(), 2);

    a.close(None).await.unwrap();
    ctx.wait_until(|state| state.registry.len() == 1).await;
}

#[tokio::test]
async fn test_shutdown_closes_live_sessions() {
    let ctx = TestContext::new().await;
    let state = ctx.state.clone();
    let mut a = ctx.connect("alice").await;
    let mut b = ctx.connect("bob").await;

    ctx.shutdown().await;

    assert!(state.registry.is_empty());
    wait_for_close(&mut a).await;
    wait_for_close(&mut b).await;
}
