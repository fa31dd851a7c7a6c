//! 可观测性：tracing 订阅器初始化
//!
//! 日志 target 约定：`bot.leaseManager`（租约）、`bot.apiProvider`（重试客户端）、`bot.pipeline`（轮次管线）、
//! `bot.planner`（规划器）、`bot.coordinator`（动作分发与审计）。
//! 可用 `RUST_LOG=bot.leaseManager=debug` 单独调整某一部分。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();
}
