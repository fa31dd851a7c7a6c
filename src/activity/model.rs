//! Bot Framework 活动模型
//!
//! 只保留轮次管线需要的字段：type / name / text，以及构成 ConversationKey 的
//! channelId / recipient.id / conversation.id 三元组。

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 活动类型（与 Bot Framework `type` 字段一致）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    Message,
    Event,
    ConversationUpdate,
    Invoke,
    Typing,
    #[serde(other)]
    Other,
}

/// 频道账号（用户或机器人）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// 会话账号
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default)]
    pub is_group: Option<bool>,
}

/// 入站活动
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(default)]
    pub id: Option<String>,
    /// event 活动的名称，如 ContinueConversation
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub from: ChannelAccount,
    pub recipient: ChannelAccount,
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub members_added: Vec<ChannelAccount>,
}

impl Activity {
    /// 构造一条普通用户消息（本地驱动与测试使用）
    pub fn message(
        channel_id: impl Into<String>,
        recipient_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: ActivityType::Message,
            id: Some(uuid::Uuid::new_v4().to_string()),
            name: None,
            text: Some(text.into()),
            channel_id: channel_id.into(),
            service_url: None,
            from: ChannelAccount::new("user"),
            recipient: ChannelAccount::new(recipient_id),
            conversation: ConversationAccount {
                id: conversation_id.into(),
                is_group: None,
            },
            members_added: Vec::new(),
        }
    }

    /// 构造一个命名 event 活动
    pub fn event(
        channel_id: impl Into<String>,
        recipient_id: impl Into<String>,
        conversation_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut activity = Self::message(channel_id, recipient_id, conversation_id, "");
        activity.kind = ActivityType::Event;
        activity.name = Some(name.into());
        activity.text = None;
        activity
    }

    pub fn with_from(mut self, from: ChannelAccount) -> Self {
        self.from = from;
        self
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.channel_id, &self.recipient.id, &self.conversation.id)
    }

    /// 去掉消息文本中的 Teams @ 提及标签
    pub fn remove_recipient_mention(&mut self) {
        if self.kind != ActivityType::Message {
            return;
        }
        if let Some(text) = self.text.as_deref() {
            self.text = Some(strip_mentions(text));
        }
    }
}

/// 会话执行槽的唯一标识：`{channelId}/{recipientId}/conversations/{conversationId}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(channel_id: &str, recipient_id: &str, conversation_id: &str) -> Self {
        Self(format!(
            "{}/{}/conversations/{}",
            channel_id, recipient_id, conversation_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 出站活动
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundActivity {
    Message {
        text: String,
    },
    Typing,
    #[serde(rename_all = "camelCase")]
    Trace {
        name: String,
        label: String,
        value: String,
        value_type: String,
    },
}

impl OutboundActivity {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message { .. })
    }
}

static AT_MENTION_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉 Teams @ 提及标签，如 <at>Copilot</at>
pub fn strip_mentions(s: &str) -> String {
    let re = AT_MENTION_RE.get_or_init(|| Regex::new(r#"<at[^>]*>.*?</at>\s*"#).unwrap());
    re.replace_all(s, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_key_format() {
        let activity = Activity::message("msteams", "bot1", "c1", "hi");
        assert_eq!(
            activity.conversation_key().as_str(),
            "msteams/bot1/conversations/c1"
        );
    }

    #[test]
    fn test_deserialize_bot_framework_activity() {
        let raw = r#"{
            "type": "message",
            "id": "a1",
            "text": "<at>Copilot</at> /history",
            "channelId": "msteams",
            "serviceUrl": "https://smba.trafficmanager.net/emea/",
            "from": {"id": "29:user", "name": "Ada"},
            "recipient": {"id": "28:bot"},
            "conversation": {"id": "19:abc", "isGroup": true}
        }"#;
        let mut activity: Activity = serde_json::from_str(raw).unwrap();
        assert_eq!(activity.kind, ActivityType::Message);
        assert_eq!(activity.from.name.as_deref(), Some("Ada"));
        activity.remove_recipient_mention();
        assert_eq!(activity.text(), "/history");
        assert_eq!(
            activity.conversation_key().to_string(),
            "msteams/28:bot/conversations/19:abc"
        );
    }

    #[test]
    fn test_unknown_activity_type() {
        let raw = r#"{"type":"messageReaction","channelId":"msteams",
            "recipient":{"id":"b"},"conversation":{"id":"c"}}"#;
        let activity: Activity = serde_json::from_str(raw).unwrap();
        assert_eq!(activity.kind, ActivityType::Other);
    }

    #[test]
    fn test_outbound_serialization() {
        let trace = OutboundActivity::Trace {
            name: "OnTurnError Trace".into(),
            label: "TurnError".into(),
            value: "boom".into(),
            value_type: "https://www.botframework.com/schemas/error".into(),
        };
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["type"], "trace");
        assert_eq!(json["valueType"], "https://www.botframework.com/schemas/error");
        let typing = serde_json::to_value(OutboundActivity::Typing).unwrap();
        assert_eq!(typing["type"], "typing");
    }
}
