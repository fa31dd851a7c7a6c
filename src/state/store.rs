//! 会话状态存储
//!
//! 状态在获得租约之后加载、释放租约之前保存。豁免轮次不持有租约，
//! 保存时只合并各自改动过的字段（见 ConversationState::merge_changes）。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::turn::ConversationState;
use crate::activity::ConversationKey;
use crate::core::BotError;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取会话状态；不存在时返回 None
    async fn load(&self, key: &ConversationKey) -> Result<Option<ConversationState>, BotError>;

    async fn save(&self, key: &ConversationKey, state: &ConversationState) -> Result<(), BotError>;

    async fn delete(&self, key: &ConversationKey) -> Result<(), BotError>;
}

/// 内存状态存储（以 JSON 保存，行为与外部存储一致：读出的是副本）
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<ConversationKey, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &ConversationKey) -> Result<Option<ConversationState>, BotError> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .map(|raw| serde_json::from_str(raw).map_err(|e| BotError::State(e.to_string())))
            .transpose()
    }

    async fn save(&self, key: &ConversationKey, state: &ConversationState) -> Result<(), BotError> {
        let raw = serde_json::to_string(state).map_err(|e| BotError::State(e.to_string()))?;
        self.entries.write().await.insert(key.clone(), raw);
        Ok(())
    }

    async fn delete(&self, key: &ConversationKey) -> Result<(), BotError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Message;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStateStore::new();
        let key = ConversationKey::new("msteams", "b", "c");
        assert!(store.load(&key).await.unwrap().is_none());

        let mut state = ConversationState::new(10);
        state.debug = true;
        state.history.push(Message::user("hi"));
        store.save(&key, &state).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), Some(state));
        store.delete(&key).await.unwrap();
        assert!(store.is_empty().await);
    }
}
