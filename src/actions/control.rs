//! 会话控制类动作：debugOn / debugOff / forgetDocuments / unknown

use async_trait::async_trait;
use serde_json::Value;

use super::registry::Action;
use crate::activity::TurnContext;
use crate::core::{ActionError, BotError};
use crate::state::SharedTurnState;

pub const DEBUG_ON: &str = "debugOn";
pub const DEBUG_OFF: &str = "debugOff";
pub const FORGET_DOCUMENTS: &str = "forgetDocuments";
pub const UNKNOWN: &str = "unknown";

pub const UNKNOWN_REPLY: &str =
    "I'm sorry, I could not understand your intent. Please try again or make your command shorter.";

fn send_failed(e: BotError) -> ActionError {
    ActionError::Failed(format!("send failed: {}", e))
}

/// 开关调试模式
pub struct SetDebug {
    enabled: bool,
}

impl SetDebug {
    pub fn on() -> Self {
        Self { enabled: true }
    }

    pub fn off() -> Self {
        Self { enabled: false }
    }
}

#[async_trait]
impl Action for SetDebug {
    fn name(&self) -> &str {
        if self.enabled {
            DEBUG_ON
        } else {
            DEBUG_OFF
        }
    }

    fn description(&self) -> &str {
        if self.enabled {
            "Turn on debug output for this conversation"
        } else {
            "Turn off debug output for this conversation"
        }
    }

    async fn run(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        _params: Value,
    ) -> Result<String, ActionError> {
        state.lock().await.conversation.debug = self.enabled;
        let reply = if self.enabled { "Debug is on" } else { "Debug is off" };
        ctx.send_text(reply).await.map_err(send_failed)?;
        Ok(reply.to_string())
    }
}

/// 忘记本会话上传过的文档与网页
pub struct ForgetDocuments;

#[async_trait]
impl Action for ForgetDocuments {
    fn name(&self) -> &str {
        FORGET_DOCUMENTS
    }

    fn description(&self) -> &str {
        "Forget the documents and web pages uploaded to this conversation"
    }

    async fn run(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        _params: Value,
    ) -> Result<String, ActionError> {
        forget_documents(ctx, state).await
    }
}

/// `/forget` 关键字与 forgetDocuments 动作共用
pub async fn forget_documents(
    ctx: &TurnContext,
    state: &SharedTurnState,
) -> Result<String, ActionError> {
    let forgotten = {
        let mut state = state.lock().await;
        std::mem::take(&mut state.conversation.documents)
    };
    let reply = if forgotten.is_empty() {
        "There is nothing to forget.".to_string()
    } else {
        let names = forgotten
            .iter()
            .map(|d| d.file_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(target: "bot.coordinator", "Uploaded documents have been forgotten: {}.", names);
        format!("Uploaded documents have been forgotten: {}.", names)
    };
    ctx.send_text(reply.clone()).await.map_err(send_failed)?;
    Ok(reply)
}

/// 规划器选不出动作时的兜底
pub struct UnknownAction;

#[async_trait]
impl Action for UnknownAction {
    fn name(&self) -> &str {
        UNKNOWN
    }

    fn description(&self) -> &str {
        "Use when no other action matches the request"
    }

    async fn run(
        &self,
        ctx: &TurnContext,
        _state: &SharedTurnState,
        _params: Value,
    ) -> Result<String, ActionError> {
        ctx.send_text(UNKNOWN_REPLY).await.map_err(send_failed)?;
        Ok(UNKNOWN_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::activity::{Activity, CollectingSender};
    use crate::state::{TurnState, UploadedDocument};
    use tokio::sync::Mutex;

    fn ctx(sender: Arc<CollectingSender>) -> TurnContext {
        TurnContext::new(Activity::message("msteams", "bot1", "c1", "x"), sender)
    }

    #[tokio::test]
    async fn test_debug_toggle() {
        let sender = Arc::new(CollectingSender::new());
        let state = Mutex::new(TurnState::new(10));
        SetDebug::on()
            .run(&ctx(sender.clone()), &state, Value::Null)
            .await
            .unwrap();
        assert!(state.lock().await.conversation.debug);
        SetDebug::off()
            .run(&ctx(sender.clone()), &state, Value::Null)
            .await
            .unwrap();
        assert!(!state.lock().await.conversation.debug);
        assert_eq!(sender.messages(), vec!["Debug is on", "Debug is off"]);
    }

    #[tokio::test]
    async fn test_forget_documents() {
        let sender = Arc::new(CollectingSender::new());
        let state = Mutex::new(TurnState::new(10));
        forget_documents(&ctx(sender.clone()), &state).await.unwrap();

        state.lock().await.conversation.documents = vec![
            UploadedDocument {
                file_name: "a.pdf".into(),
                url: None,
            },
            UploadedDocument {
                file_name: "https://contoso.com".into(),
                url: Some("https://contoso.com".into()),
            },
        ];
        ForgetDocuments
            .run(&ctx(sender.clone()), &state, Value::Null)
            .await
            .unwrap();
        assert!(state.lock().await.conversation.documents.is_empty());
        assert_eq!(
            sender.messages(),
            vec![
                "There is nothing to forget.",
                "Uploaded documents have been forgotten: a.pdf, https://contoso.com."
            ]
        );
    }
}
