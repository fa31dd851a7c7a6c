//! Bot Framework 消息端点
//!
//! POST /api/messages 接收一个活动，按 expectReplies 方式在响应体中返回本轮全部出站活动。

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::Serialize;

use crate::activity::{Activity, OutboundActivity};
use crate::bot::BotApp;

#[derive(Debug, Serialize)]
pub struct ExpectedReplies {
    pub activities: Vec<OutboundActivity>,
}

/// 创建机器人路由
pub fn create_router(app: Arc<BotApp>) -> Router {
    Router::new()
        .route("/api/messages", post(receive_activity))
        .route("/health", get(|| async { "OK" }))
        .with_state(app)
}

/// POST /api/messages
async fn receive_activity(
    State(app): State<Arc<BotApp>>,
    Json(activity): Json<Activity>,
) -> (StatusCode, Json<ExpectedReplies>) {
    tracing::debug!(
        target: "bot.pipeline",
        key = %activity.conversation_key(),
        kind = ?activity.kind,
        "Activity received"
    );
    let activities = app.process_activity(activity).await;
    (StatusCode::OK, Json(ExpectedReplies { activities }))
}
