//! 轮次状态
//!
//! ConversationState 按 ConversationKey 持久化；TempState 只属于当前轮次，轮次结束即丢弃。

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::history::ChatHistory;
use crate::lease::Lease;
use crate::planner::Plan;

/// 会话中上传过的文档
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub file_name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// 持久化的会话状态
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub history: ChatHistory,
    #[serde(default)]
    pub debug: bool,
    /// 当前使用的提示模板；None 表示默认模板
    #[serde(default)]
    pub prompt_folder: Option<String>,
    #[serde(default)]
    pub documents: Vec<UploadedDocument>,
    #[serde(default)]
    pub welcomed: bool,
}

impl ConversationState {
    pub fn new(max_turns: usize) -> Self {
        Self {
            history: ChatHistory::new(max_turns),
            ..Self::default()
        }
    }

    /// 把本轮相对 baseline 改动过的字段写到 self（最新存储副本）上，
    /// 未改动的字段保留其它轮次的写入
    pub fn merge_changes(&mut self, baseline: &Self, current: &Self) {
        if current.history != baseline.history {
            self.history = current.history.clone();
        }
        if current.debug != baseline.debug {
            self.debug = current.debug;
        }
        if current.prompt_folder != baseline.prompt_folder {
            self.prompt_folder = current.prompt_folder.clone();
        }
        if current.documents != baseline.documents {
            self.documents = current.documents.clone();
        }
        if current.welcomed != baseline.welcomed {
            self.welcomed = current.welcomed;
        }
    }

    /// `/reset`：清空历史、文档与模板选择，保留调试开关
    pub fn reset(&mut self) {
        self.history.clear();
        self.documents.clear();
        self.prompt_folder = None;
    }
}

/// 当前轮次的临时状态
#[derive(Debug, Default)]
pub struct TempState {
    /// 本轮持有的会话租约（豁免轮次为 None）
    pub lease: Option<Lease>,
    /// 规范化后的用户输入
    pub input: String,
    pub action_plan: Option<Plan>,
    /// 计划就绪的时刻，最后一个动作执行完时用于计算耗时
    pub started_at: Option<Instant>,
    /// 已执行动作的输出，按执行顺序
    pub action_outputs: Vec<(String, String)>,
}

impl TempState {
    pub fn lease_id(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.lease_id.as_str())
    }

    /// 记录动作输出；同名动作再次执行时原位覆盖，保持首次出现的顺序
    pub fn record_output(&mut self, action: &str, output: impl Into<String>) {
        let output = output.into();
        match self.action_outputs.iter_mut().find(|(name, _)| name == action) {
            Some(entry) => entry.1 = output,
            None => self.action_outputs.push((action.to_string(), output)),
        }
    }

    /// 在 action 之前记录的所有输出；action 尚未执行过时返回全部输出
    pub fn outputs_before(&self, action: &str) -> &[(String, String)] {
        let end = self
            .action_outputs
            .iter()
            .position(|(name, _)| name == action)
            .unwrap_or(self.action_outputs.len());
        &self.action_outputs[..end]
    }
}

/// 处理器与动作共享的轮次状态（并行动作各自短暂加锁）
pub type SharedTurnState = tokio::sync::Mutex<TurnState>;

/// 单个轮次可见的全部状态
#[derive(Debug)]
pub struct TurnState {
    pub conversation: ConversationState,
    pub temp: TempState,
    /// 加载时的会话状态快照；None 表示未加载，不会回写
    pub baseline: Option<ConversationState>,
}

impl TurnState {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversation: ConversationState::new(max_turns),
            temp: TempState::default(),
            baseline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Message;

    #[test]
    fn test_record_output_keeps_first_position() {
        let mut temp = TempState::default();
        temp.record_output("a", "1");
        temp.record_output("b", "2");
        temp.record_output("a", "3");
        assert_eq!(
            temp.action_outputs,
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_outputs_before() {
        let mut temp = TempState::default();
        temp.record_output("a", "1");
        temp.record_output("b", "2");
        assert!(temp.outputs_before("a").is_empty());
        assert_eq!(temp.outputs_before("b"), &[("a".to_string(), "1".to_string())]);
        assert_eq!(temp.outputs_before("c").len(), 2);
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let baseline = ConversationState::new(10);
        let mut current = baseline.clone();
        current.history.push(Message::user("hi"));

        // 其它轮次在此期间打开了调试
        let mut stored = baseline.clone();
        stored.debug = true;

        stored.merge_changes(&baseline, &current);
        assert!(stored.debug);
        assert_eq!(stored.history, current.history);
    }

    #[test]
    fn test_reset_keeps_debug() {
        let mut state = ConversationState::new(10);
        state.debug = true;
        state.prompt_folder = Some("chatGPT".into());
        state.history.push(Message::user("hi"));
        state.documents.push(UploadedDocument {
            file_name: "a.pdf".into(),
            url: None,
        });
        state.reset();
        assert!(state.debug);
        assert!(state.history.is_empty());
        assert!(state.documents.is_empty());
        assert_eq!(state.prompt_folder, None);
    }
}
