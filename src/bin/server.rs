//! Teams Copilot 消息端点服务
//!
//! 环境变量:
//! - COPILOT_ADDR: 监听地址（默认 0.0.0.0:3978）
//! - OPENAI_API_KEY: LLM API Key（缺省时使用 Mock LLM）
//! - COPILOT__*: 覆盖 config/default.toml 中的任意键
//!
//! 启动: cargo run --bin copilot-bot-server --features server

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use teams_copilot::server::create_router;
    use teams_copilot::{load_config, observability, BotApp};

    observability::init();

    let config = load_config(None).context("Failed to load config")?;
    let app = Arc::new(BotApp::from_config(config).context("Failed to build bot")?);
    let router = create_router(app);

    let addr = std::env::var("COPILOT_ADDR").unwrap_or_else(|_| "0.0.0.0:3978".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Teams Copilot listening on http://{}", addr);
    tracing::info!("Messaging endpoint: http://{}/api/messages", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("请使用 --features server 编译: cargo run --bin copilot-bot-server --features server");
    std::process::exit(1);
}
