//! Teams Copilot 本地驱动
//!
//! 从 stdin 逐行读取 Bot Framework 活动 JSON，每行作为一个独立轮次并发处理，
//! 把出站活动以 JSON 行写到 stdout。用于在没有 Teams 频道的情况下调试管线与租约行为。
//!
//! 启动: cargo run --bin copilot-bot [config.toml] < activities.jsonl

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use teams_copilot::activity::Activity;
use teams_copilot::{load_config, observability, BotApp};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let app = Arc::new(BotApp::from_config(config).context("Failed to build bot")?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turns = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let activity: Activity = match serde_json::from_str(line) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("Skipping malformed activity: {}", e);
                continue;
            }
        };
        let app = Arc::clone(&app);
        turns.push(tokio::spawn(async move {
            let key = activity.conversation_key();
            let outbound = app.process_activity(activity).await;
            for activity in outbound {
                let line = serde_json::json!({ "conversation": key, "activity": activity });
                println!("{}", line);
            }
        }));
    }

    for turn in turns {
        turn.await.context("Turn task failed")?;
    }
    tracing::info!(
        conversations = app.references().len().await,
        "All activities processed"
    );
    Ok(())
}
