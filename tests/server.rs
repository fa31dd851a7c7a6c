//! 消息端点测试（需要 --features server）
#![cfg(feature = "server")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use teams_copilot::config::AppConfig;
use teams_copilot::llm::MockLlmClient;
use teams_copilot::server::create_router;
use teams_copilot::BotApp;
use tower::ServiceExt;

fn router() -> axum::Router {
    let mut cfg = AppConfig::default();
    cfg.bot.typing_indicator = false;
    let app = BotApp::builder(cfg)
        .llm(Arc::new(MockLlmClient::new()))
        .build()
        .unwrap();
    create_router(Arc::new(app))
}

#[tokio::test]
async fn test_health() {
    let resp = router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_message_returns_expected_replies() {
    let activity = serde_json::json!({
        "type": "message",
        "id": "a1",
        "text": "<at>Copilot</at> hello",
        "channelId": "msteams",
        "from": {"id": "user1", "name": "Megan"},
        "recipient": {"id": "bot1"},
        "conversation": {"id": "c1"}
    });
    let resp = router()
        .oneshot(
            Request::post("/api/messages")
                .header("content-type", "application/json")
                .body(Body::from(activity.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body["activities"],
        serde_json::json!([{"type": "message", "text": "Echo from Mock: hello"}])
    );
}

#[tokio::test]
async fn test_malformed_activity_is_rejected() {
    let resp = router()
        .oneshot(
            Request::post("/api/messages")
                .header("content-type", "application/json")
                .body(Body::from("{\"type\": \"message\"}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}
