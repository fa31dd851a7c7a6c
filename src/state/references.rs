//! 会话引用登记表
//!
//! 记录可用于主动消息的会话引用；由 BotApp 持有并按句柄传给需要的组件，进程内共享。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::activity::{Activity, ConversationKey};

/// 主动发送消息所需的会话引用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    pub channel_id: String,
    pub service_url: Option<String>,
    pub conversation_id: String,
    pub bot_id: String,
    pub user_id: String,
}

impl ConversationReference {
    pub fn from_activity(activity: &Activity) -> Self {
        Self {
            channel_id: activity.channel_id.clone(),
            service_url: activity.service_url.clone(),
            conversation_id: activity.conversation.id.clone(),
            bot_id: activity.recipient.id.clone(),
            user_id: activity.from.id.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversationReferences {
    refs: RwLock<HashMap<ConversationKey, ConversationReference>>,
}

impl ConversationReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录（或覆盖）活动所在会话的引用
    pub async fn add(&self, activity: &Activity) {
        let reference = ConversationReference::from_activity(activity);
        self.refs
            .write()
            .await
            .insert(activity.conversation_key(), reference);
    }

    pub async fn get(&self, key: &ConversationKey) -> Option<ConversationReference> {
        self.refs.read().await.get(key).cloned()
    }

    pub async fn all(&self) -> Vec<ConversationReference> {
        self.refs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.refs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.refs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_overwrites_same_conversation() {
        let refs = ConversationReferences::new();
        let a = Activity::message("msteams", "bot1", "c1", "hi");
        refs.add(&a).await;
        refs.add(&a).await;
        assert_eq!(refs.len().await, 1);
        let stored = refs.get(&a.conversation_key()).await.unwrap();
        assert_eq!(stored.bot_id, "bot1");
        assert_eq!(stored.conversation_id, "c1");
    }
}
