//! 机器人错误类型
//!
//! 租约与 HTTP 错误定义在各自模块（lease / http），这里汇总为轮次级的 BotError。

use thiserror::Error;

use crate::http::HttpError;
use crate::lease::LeaseError;

/// 文档处理错误（上传文档的体积 / 页数限制）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("File is too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Document has too many pages: {pages} (max {max})")]
    TooManyPages { pages: u32, max: u32 },
}

/// 动作执行错误：不在协调器内吞掉，直接传播给轮次错误处理
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    Unknown(String),

    #[error("Invalid parameters for action {action}: {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Action failed: {0}")]
    Failed(String),
}

/// 轮次级错误
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// 轮次处理器 panic（已被捕获，租约仍会释放）
    #[error("Turn handler panicked: {0}")]
    Panicked(String),
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_error_converts_into_action_error() {
        let err: ActionError = DocumentError::TooManyPages { pages: 120, max: 100 }.into();
        assert!(matches!(err, ActionError::Document(_)));
        assert_eq!(
            err.to_string(),
            "Document error: Document has too many pages: 120 (max 100)"
        );
    }

    #[test]
    fn test_action_error_into_bot_error() {
        let err: BotError = ActionError::Unknown("fly".into()).into();
        assert_eq!(err.to_string(), "Action error: Unknown action: fly");
    }
}
