//! getSemanticInfo：用规划器的 chat 模板回答关于某个实体 / 主题的问题

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::registry::TypedAction;
use crate::activity::TurnContext;
use crate::core::ActionError;
use crate::planner::{Planner, CHAT_PROMPT};
use crate::state::{Message, SharedTurnState};

pub const GET_SEMANTIC_INFO: &str = "getSemanticInfo";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SemanticInfoParams {
    /// 要查询的公司、人物或主题
    #[serde(default)]
    pub entity: Option<String>,
    /// 之前动作的输出，按动作名
    #[serde(flatten)]
    #[schemars(skip)]
    pub prior_outputs: BTreeMap<String, Value>,
}

pub struct GetSemanticInfo {
    planner: Arc<dyn Planner>,
    parallel_with: Vec<String>,
}

impl GetSemanticInfo {
    pub fn new(planner: Arc<dyn Planner>) -> Self {
        Self {
            planner,
            parallel_with: Vec::new(),
        }
    }

    /// 声明可并行执行的兄弟动作
    pub fn with_parallel(mut self, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parallel_with = actions.into_iter().map(Into::into).collect();
        self
    }
}

fn prompt_context(params: &SemanticInfoParams) -> String {
    let mut sections = Vec::new();
    if let Some(entity) = params.entity.as_deref().filter(|e| !e.is_empty()) {
        sections.push(format!("Subject: {}", entity));
    }
    for (action, output) in &params.prior_outputs {
        let text = match output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        sections.push(format!("Output of {}:\n{}", action, text));
    }
    sections.join("\n\n")
}

#[async_trait]
impl TypedAction for GetSemanticInfo {
    type Params = SemanticInfoParams;

    fn name(&self) -> &str {
        GET_SEMANTIC_INFO
    }

    fn description(&self) -> &str {
        "Answer a general question about a company, person or topic"
    }

    fn can_run_with(&self) -> Vec<String> {
        self.parallel_with.clone()
    }

    async fn run_typed(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: SemanticInfoParams,
    ) -> Result<String, ActionError> {
        ctx.start_typing();
        let context = prompt_context(&params);
        let answer = self
            .planner
            .complete_with_context(ctx, state, CHAT_PROMPT, &context)
            .await
            .into_result()
            .map_err(|e| ActionError::Planner(e.to_string()))?;

        ctx.send_text(answer.clone())
            .await
            .map_err(|e| ActionError::Failed(format!("send failed: {}", e)))?;
        state
            .lock()
            .await
            .conversation
            .history
            .push(Message::assistant(answer.clone()));
        Ok(answer)
    }
}
