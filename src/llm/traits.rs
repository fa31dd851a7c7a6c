//! LLM 客户端抽象
//!
//! 规划器只需要非流式完成：输入消息列表，返回首条回复文本。

use async_trait::async_trait;
use thiserror::Error;

use crate::state::Message;

/// LLM 调用错误；规划器据此给出 rate_limited / too_long / error 等状态
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Rate limited")]
    RateLimited,

    #[error("Context length exceeded")]
    ContextTooLong,

    #[error("Request timed out")]
    Timeout,

    #[error("API error: {0}")]
    ApiError(String),
}

impl LlmError {
    /// 按后端错误文本归类（async-openai 只暴露字符串形式的 API 错误）
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            LlmError::RateLimited
        } else if lower.contains("context_length_exceeded")
            || lower.contains("maximum context length")
        {
            LlmError::ContextTooLong
        } else if lower.contains("timed out") || lower.contains("timeout") {
            LlmError::Timeout
        } else {
            LlmError::ApiError(message)
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            LlmError::classify("Rate limit reached for gpt-4o"),
            LlmError::RateLimited
        );
        assert_eq!(
            LlmError::classify("This model's maximum context length is 8192 tokens"),
            LlmError::ContextTooLong
        );
        assert_eq!(LlmError::classify("operation timed out"), LlmError::Timeout);
        assert_eq!(
            LlmError::classify("invalid api key"),
            LlmError::ApiError("invalid api key".into())
        );
    }
}
