//! Planner：提示模板补全与任务规划
//!
//! complete_prompt 按模板名拼 system + 聊天历史后调用 LLM，把 LLM 错误折算为 PromptStatus；
//! begin_task 用会话当前模板（默认 plan）得到计划。非 success 状态一律视为终止失败，不在这里重试。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::plan::{parse_plan, Plan};
use crate::activity::TurnContext;
use crate::core::BotError;
use crate::llm::{LlmClient, LlmError};
use crate::state::{Message, Role, SharedTurnState};

/// 默认规划模板名
pub const PLAN_PROMPT: &str = "plan";
/// getSemanticInfo 使用的问答模板
pub const CHAT_PROMPT: &str = "chat";
pub const CHAT_GPT_PROMPT: &str = "chatGPT";
pub const QUESTION_DOCUMENT_PROMPT: &str = "questionDocument";

const PLAN_TEMPLATE: &str = r#"You are an AI copilot inside Microsoft Teams. Decide which actions answer the user's request.

Available actions:
{{$actions}}

Reply ONLY with a JSON plan of this shape:
{"type": "plan", "commands": [{"type": "DO", "action": "<action name>", "parameters": {"entity": "<subject>"}}, {"type": "SAY", "response": "<text for the user>"}]}
Use only the actions listed above. Use "unknown" when nothing fits."#;

const CHAT_TEMPLATE: &str = r#"You are an AI copilot inside Microsoft Teams. Answer the user's question concisely and factually in Markdown.

{{$context}}"#;

const CHAT_GPT_TEMPLATE: &str =
    "You are a helpful assistant. Answer the user's last message conversationally in Markdown.";

const QUESTION_DOCUMENT_TEMPLATE: &str = r#"You answer questions using only the documents the user uploaded to this conversation.

Uploaded documents:
{{$documents}}

{{$context}}

If the answer is not in the documents, say so."#;

/// 模板补全的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Success,
    Error,
    RateLimited,
    InvalidResponse,
    TooLong,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStatus::Success => "success",
            PromptStatus::Error => "error",
            PromptStatus::RateLimited => "rate_limited",
            PromptStatus::InvalidResponse => "invalid_response",
            PromptStatus::TooLong => "too_long",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptResponse {
    pub status: PromptStatus,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl PromptResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: PromptStatus::Success,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(status: PromptStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PromptStatus::Success
    }

    /// success 时返回文本，否则转成 BotError::Planner
    pub fn into_result(self) -> Result<String, BotError> {
        match self.status {
            PromptStatus::Success => Ok(self.message.unwrap_or_default()),
            status => Err(BotError::Planner(format!(
                "prompt completion returned {}: {}",
                status.as_str(),
                self.error.unwrap_or_default()
            ))),
        }
    }
}

impl From<LlmError> for PromptResponse {
    fn from(err: LlmError) -> Self {
        let status = match err {
            LlmError::RateLimited => PromptStatus::RateLimited,
            LlmError::ContextTooLong => PromptStatus::TooLong,
            LlmError::Timeout | LlmError::ApiError(_) => PromptStatus::Error,
        };
        PromptResponse::failure(status, err.to_string())
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// 用指定模板补全当前会话，context 填入模板的 {{$context}}
    async fn complete_with_context(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        template: &str,
        context: &str,
    ) -> PromptResponse;

    async fn complete_prompt(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        template: &str,
    ) -> PromptResponse {
        self.complete_with_context(ctx, state, template, "").await
    }

    /// 未选择模板时使用的模板名
    fn default_template(&self) -> &str {
        PLAN_PROMPT
    }

    /// 以会话当前模板规划本轮任务
    async fn begin_task(&self, ctx: &TurnContext, state: &SharedTurnState) -> Result<Plan, BotError> {
        let template = state
            .lock()
            .await
            .conversation
            .prompt_folder
            .clone()
            .unwrap_or_else(|| self.default_template().to_string());
        let text = self.complete_prompt(ctx, state, &template).await.into_result()?;
        let plan = parse_plan(&text);
        if !plan.is_valid() {
            return Err(BotError::Planner(format!(
                "template {} produced an empty plan",
                template
            )));
        }
        Ok(plan)
    }
}

/// 基于 LlmClient 的 Planner：持有模板表与动作目录
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    templates: HashMap<String, String>,
    default_template: String,
    /// 注入 plan 模板 {{$actions}} 的动作目录（注册表建好后设置）
    action_catalog: RwLock<String>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let templates = [
            (PLAN_PROMPT, PLAN_TEMPLATE),
            (CHAT_PROMPT, CHAT_TEMPLATE),
            (CHAT_GPT_PROMPT, CHAT_GPT_TEMPLATE),
            (QUESTION_DOCUMENT_PROMPT, QUESTION_DOCUMENT_TEMPLATE),
        ]
        .into_iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect();
        Self {
            llm,
            templates,
            default_template: PLAN_PROMPT.to_string(),
            action_catalog: RwLock::new(String::new()),
        }
    }

    pub fn with_default_template(mut self, name: impl Into<String>) -> Self {
        self.default_template = name.into();
        self
    }

    /// 增加或覆盖模板
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    pub fn set_action_catalog(&self, catalog: impl Into<String>) {
        *self
            .action_catalog
            .write()
            .unwrap_or_else(|e| e.into_inner()) = catalog.into();
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn render(&self, body: &str, vars: &[(&str, String)]) -> String {
        let mut out = body.to_string();
        for (name, value) in vars {
            out = out.replace(&format!("{{{{${}}}}}", name), value);
        }
        out
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn complete_with_context(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        template: &str,
        context: &str,
    ) -> PromptResponse {
        let Some(body) = self.templates.get(template) else {
            return PromptResponse::failure(
                PromptStatus::Error,
                format!("unknown prompt template: {}", template),
            );
        };

        let messages = {
            let state = state.lock().await;
            let documents = state
                .conversation
                .documents
                .iter()
                .map(|d| format!("- {}", d.file_name))
                .collect::<Vec<_>>()
                .join("\n");
            let catalog = self
                .action_catalog
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            let input = if state.temp.input.is_empty() {
                ctx.input().to_string()
            } else {
                state.temp.input.clone()
            };
            let system = self.render(
                body,
                &[
                    ("actions", catalog),
                    ("documents", documents),
                    ("context", context.to_string()),
                    ("input", input.clone()),
                ],
            );

            // 历史里已有本轮输入时不再重复追加
            let mut messages = vec![Message::system(system)];
            messages.extend(state.conversation.history.messages().iter().cloned());
            let already_asked =
                matches!(messages.last(), Some(m) if m.role == Role::User && m.content == input);
            if !already_asked && !input.is_empty() {
                messages.push(Message::user(input));
            }
            messages
        };

        tracing::debug!(
            target: "bot.planner",
            template,
            messages = messages.len(),
            "completing prompt"
        );

        match self.llm.complete(&messages).await {
            Ok(text) if text.trim().is_empty() => {
                PromptResponse::failure(PromptStatus::InvalidResponse, "empty completion")
            }
            Ok(text) => PromptResponse::success(text),
            Err(e) => {
                tracing::warn!(target: "bot.planner", template, "prompt completion failed: {}", e);
                PromptResponse::from(e)
            }
        }
    }

    fn default_template(&self) -> &str {
        &self.default_template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Activity, CollectingSender};
    use crate::llm::mock::PLAN_PROMPT_MARKER;
    use crate::llm::MockLlmClient;
    use crate::state::TurnState;
    use tokio::sync::Mutex;

    fn ctx(text: &str) -> TurnContext {
        let activity = Activity::message("msteams", "bot1", "c1", text);
        TurnContext::new(activity, Arc::new(CollectingSender::new()))
    }

    #[test]
    fn test_plan_template_carries_marker() {
        assert!(PLAN_TEMPLATE.contains(PLAN_PROMPT_MARKER));
        assert!(PLAN_TEMPLATE.contains("{{$actions}}"));
    }

    #[tokio::test]
    async fn test_begin_task_with_default_mock() {
        let llm = Arc::new(MockLlmClient::new());
        let planner = LlmPlanner::new(llm.clone());
        planner.set_action_catalog("- getSemanticInfo: look up an entity");
        let state = Mutex::new(TurnState::new(10));
        state.lock().await.temp.input = "Contoso".to_string();

        let plan = planner.begin_task(&ctx("Contoso"), &state).await.unwrap();
        assert_eq!(plan.commands[0].action(), Some("getSemanticInfo"));

        let sent = llm.last_call().unwrap();
        assert!(sent[0].content.contains("- getSemanticInfo: look up an entity"));
        assert_eq!(sent.last().unwrap().content, "Contoso");
    }

    #[tokio::test]
    async fn test_non_success_status_is_terminal() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error(LlmError::RateLimited);
        let planner = LlmPlanner::new(llm.clone());
        let state = Mutex::new(TurnState::new(10));

        let resp = planner.complete_prompt(&ctx("hi"), &state, PLAN_PROMPT).await;
        assert_eq!(resp.status, PromptStatus::RateLimited);

        llm.push_error(LlmError::ContextTooLong);
        let err = planner.begin_task(&ctx("hi"), &state).await.unwrap_err();
        assert!(matches!(err, BotError::Planner(_)));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_template_and_empty_reply() {
        let llm = Arc::new(MockLlmClient::with_responses(["   "]));
        let planner = LlmPlanner::new(llm);
        let state = Mutex::new(TurnState::new(10));

        let resp = planner.complete_prompt(&ctx("hi"), &state, "nope").await;
        assert_eq!(resp.status, PromptStatus::Error);
        let resp = planner.complete_prompt(&ctx("hi"), &state, CHAT_PROMPT).await;
        assert_eq!(resp.status, PromptStatus::InvalidResponse);
    }

    #[tokio::test]
    async fn test_selected_prompt_folder_is_used() {
        let llm = Arc::new(MockLlmClient::with_responses(["plain answer"]));
        let planner = LlmPlanner::new(llm.clone());
        let state = Mutex::new(TurnState::new(10));
        state.lock().await.conversation.prompt_folder = Some(CHAT_GPT_PROMPT.to_string());

        let plan = planner.begin_task(&ctx("hello"), &state).await.unwrap();
        assert_eq!(plan.first_say(), Some("plain answer"));
        assert_eq!(llm.last_call().unwrap()[0].content, CHAT_GPT_TEMPLATE);
    }
}
