//! Mock LLM 客户端（用于测试与本地驱动，无需 API）
//!
//! 优先返回预置的脚本回复；脚本用完后：规划提示返回一个 getSemanticInfo 计划，
//! 其余提示回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{LlmClient, LlmError};
use crate::state::{Message, Role};

/// 规划提示中出现该标记时返回计划 JSON
pub const PLAN_PROMPT_MARKER: &str = "\"commands\"";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for r in responses {
            mock.push_response(r);
        }
        mock
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// 已收到的请求数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_call(&self) -> Option<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    fn default_reply(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let is_plan_prompt = messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains(PLAN_PROMPT_MARKER));

        if is_plan_prompt {
            serde_json::json!({
                "type": "plan",
                "commands": [
                    {"type": "DO", "action": "getSemanticInfo", "parameters": {"entity": last_user}}
                ]
            })
            .to_string()
        } else {
            format!("Echo from Mock: {}", last_user)
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok(Self::default_reply(messages)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockLlmClient::with_responses(["first"]);
        mock.push_error(LlmError::RateLimited);
        let msgs = vec![Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await, Err(LlmError::RateLimited));
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_default_plan_reply() {
        let mock = MockLlmClient::new();
        let msgs = vec![
            Message::system(format!("Reply with {} ...", PLAN_PROMPT_MARKER)),
            Message::user("who is Contoso"),
        ];
        let reply: serde_json::Value =
            serde_json::from_str(&mock.complete(&msgs).await.unwrap()).unwrap();
        assert_eq!(reply["commands"][0]["action"], "getSemanticInfo");
        assert_eq!(reply["commands"][0]["parameters"]["entity"], "who is Contoso");
    }
}
