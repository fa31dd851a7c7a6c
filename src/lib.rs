//! Teams Copilot - Teams 对话机器人核心
//!
//! 模块划分：
//! - **activity**: 入站活动模型、会话键、关键字命令、轮次上下文与出站发送
//! - **lease**: 会话级分布式租约（内存 / SQLite / Azure Blob 后端）
//! - **http**: 带认证头注入与指数退避重试的 HTTP 客户端
//! - **state**: 聊天历史、会话状态、状态存储与会话引用登记
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **planner**: 提示模板、计划解析与 LLM 规划器
//! - **actions**: 动作注册表、内置动作与动作分发协调器
//! - **bot**: 轮次管线（租约获取 / 释放）、助手处理器与应用装配
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **observability**: tracing 初始化
//! - **server**: Bot Framework 消息端点（feature `server`）

pub mod actions;
pub mod activity;
pub mod bot;
pub mod config;
pub mod core;
pub mod http;
pub mod lease;
pub mod llm;
pub mod observability;
pub mod planner;
#[cfg(feature = "server")]
pub mod server;
pub mod state;

pub use bot::{BotApp, BotAppBuilder};
pub use config::{load_config, AppConfig};
pub use core::BotError;
