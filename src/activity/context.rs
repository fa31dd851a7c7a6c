//! 轮次上下文
//!
//! TurnContext 持有当前入站活动与出站发送端；仅属于单个进行中的轮次，轮次结束即丢弃。
//! 发送第一条 message 时自动停止 typing 指示器。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::model::{Activity, ActivityType, ConversationKey, OutboundActivity};
use crate::core::BotError;

/// 出站活动发送端（消息传输适配层实现）
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send(&self, activity: OutboundActivity) -> Result<(), BotError>;
}

/// 收集型发送端：把出站活动缓存在内存里，由调用方一次性取走（expectReplies 模式、本地驱动、测试）
#[derive(Debug, Default)]
pub struct CollectingSender {
    sent: Mutex<Vec<OutboundActivity>>,
}

impl CollectingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取走已缓存的活动
    pub fn take(&self) -> Vec<OutboundActivity> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn snapshot(&self) -> Vec<OutboundActivity> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 只看 message 活动的文本
    pub fn messages(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|a| match a {
                OutboundActivity::Message { text } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActivitySender for CollectingSender {
    async fn send(&self, activity: OutboundActivity) -> Result<(), BotError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(activity);
        Ok(())
    }
}

/// 单个轮次的上下文
pub struct TurnContext {
    activity: Activity,
    sender: Arc<dyn ActivitySender>,
    typing_interval: Option<Duration>,
    typing: Mutex<Option<CancellationToken>>,
    sent_texts: Mutex<Vec<String>>,
}

impl TurnContext {
    pub fn new(activity: Activity, sender: Arc<dyn ActivitySender>) -> Self {
        Self {
            activity,
            sender,
            typing_interval: None,
            typing: Mutex::new(None),
            sent_texts: Mutex::new(Vec::new()),
        }
    }

    /// 开启 typing 指示器（None 表示关闭）
    pub fn with_typing_interval(mut self, interval: Option<Duration>) -> Self {
        self.typing_interval = interval;
        self
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }

    pub fn conversation_key(&self) -> ConversationKey {
        self.activity.conversation_key()
    }

    /// 当前用户输入
    pub fn input(&self) -> &str {
        self.activity.text()
    }

    pub async fn send_activity(&self, activity: OutboundActivity) -> Result<(), BotError> {
        if let OutboundActivity::Message { text } = &activity {
            self.stop_typing();
            self.sent_texts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(text.clone());
        }
        self.sender.send(activity).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), BotError> {
        self.send_activity(OutboundActivity::message(text)).await
    }

    pub async fn send_trace(
        &self,
        name: &str,
        value: &str,
        value_type: &str,
        label: &str,
    ) -> Result<(), BotError> {
        self.send_activity(OutboundActivity::Trace {
            name: name.to_string(),
            label: label.to_string(),
            value: value.to_string(),
            value_type: value_type.to_string(),
        })
        .await
    }

    /// 本轮已发送的 message 文本
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_texts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn responded(&self) -> bool {
        !self.sent_texts.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// 启动 typing 指示器：每个间隔发送一次 typing，直到发出第一条 message 或轮次结束。
    /// 非 message 活动、已在运行或未开启时忽略。
    pub fn start_typing(&self) {
        let Some(interval) = self.typing_interval else {
            return;
        };
        if self.activity.kind != ActivityType::Message {
            return;
        }
        let mut slot = self.typing.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if sender.send(OutboundActivity::Typing).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn stop_typing(&self) {
        if let Some(token) = self
            .typing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            token.cancel();
        }
    }
}

impl Drop for TurnContext {
    fn drop(&mut self) {
        self.stop_typing();
    }
}
