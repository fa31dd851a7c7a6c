//! 会话聊天历史
//!
//! 保留最近 N 轮对话（user/assistant 对），超出时自动剪枝；
//! 轮次结束时去掉末尾没有得到回答的 user 消息。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 聊天历史：最多保留 max_turns*2 条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ChatHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn set_max_turns(&mut self, max_turns: usize) {
        self.max_turns = max_turns;
        self.prune();
    }

    /// 超出 max_turns*2 时丢弃最旧的消息
    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    /// 去掉末尾没有回答的 user 消息；返回是否有消息被移除
    pub fn trim_dangling_user_turn(&mut self) -> bool {
        let mut trimmed = false;
        while matches!(self.messages.last(), Some(m) if m.role == Role::User) {
            self.messages.pop();
            trimmed = true;
        }
        trimmed
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `/history` 命令的展示文本
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                    Role::System => "System",
                };
                format!("**{}**: {}", who, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_recent_turns() {
        let mut history = ChatHistory::new(2);
        for i in 0..6 {
            history.push(Message::user(format!("q{}", i)));
            history.push(Message::assistant(format!("a{}", i)));
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.messages()[0].content, "q4");
    }

    #[test]
    fn test_trim_dangling_user_turn() {
        let mut history = ChatHistory::new(10);
        history.push(Message::user("hi"));
        history.push(Message::assistant("hello"));
        history.push(Message::user("unanswered"));
        assert!(history.trim_dangling_user_turn());
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages().last().unwrap().role, Role::Assistant);
        assert!(!history.trim_dangling_user_turn());
    }

    #[test]
    fn test_render() {
        let mut history = ChatHistory::new(10);
        history.push(Message::user("hi"));
        history.push(Message::assistant("hello"));
        assert_eq!(history.render(), "**User**: hi\n\n**Assistant**: hello");
    }
}
