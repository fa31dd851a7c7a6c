//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / can_run_with / run），由 ActionRegistry 按名注册与查找。
//! 带类型参数的动作实现 TypedAction，注册时包一层：参数在分发边界反序列化，失败即 InvalidParameters，
//! schema 由 schemars 生成并写入规划提示。每次执行输出一行 JSON 审计日志。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::activity::TurnContext;
use crate::core::ActionError;
use crate::state::SharedTurnState;

/// 动作 trait：名称、描述（写入规划提示）、可并行执行的兄弟动作、参数 schema、异步执行
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 可与本动作并行执行的动作名
    fn can_run_with(&self) -> Vec<String> {
        Vec::new()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行动作，返回输出文本（供后续动作串联）
    async fn run(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: Value,
    ) -> Result<String, ActionError>;
}

/// 带类型参数的动作
#[async_trait]
pub trait TypedAction: Send + Sync {
    type Params: DeserializeOwned + JsonSchema + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn can_run_with(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run_typed(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: Self::Params,
    ) -> Result<String, ActionError>;
}

/// 把 TypedAction 适配为 Action
pub struct Typed<A>(pub A);

#[async_trait]
impl<A: TypedAction> Action for Typed<A> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn can_run_with(&self) -> Vec<String> {
        self.0.can_run_with()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(A::Params)).unwrap_or(Value::Null)
    }

    async fn run(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: Value,
    ) -> Result<String, ActionError> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };
        let typed: A::Params =
            serde_json::from_value(params).map_err(|e| ActionError::InvalidParameters {
                action: self.0.name().to_string(),
                reason: e.to_string(),
            })?;
        self.0.run_typed(ctx, state, typed).await
    }
}

/// 动作注册表：按名称存储 Arc<dyn Action>
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        let name = action.name().to_string();
        self.actions.insert(name, Arc::new(action));
    }

    pub fn register_arc(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn register_typed<A: TypedAction + 'static>(&mut self, action: A) {
        self.register(Typed(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// 按名称排序遍历
    pub fn actions(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.values()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 规划提示中的动作目录：每行 `- name: description`，后附参数 schema
    pub fn catalog(&self) -> String {
        self.actions
            .values()
            .map(|a| {
                format!(
                    "- {}: {}\n  parameters: {}",
                    a.name(),
                    a.description(),
                    a.parameters_schema()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_schema_json(&self) -> String {
        let actions: Vec<Value> = self
            .actions
            .values()
            .map(|a| {
                serde_json::json!({
                    "name": a.name(),
                    "description": a.description(),
                    "canRunWith": a.can_run_with(),
                    "parameters": a.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&actions).unwrap_or_else(|_| "[]".to_string())
    }

    /// 执行动作并输出 JSON 审计日志
    pub async fn execute(
        &self,
        name: &str,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: Value,
    ) -> Result<String, ActionError> {
        let action = self
            .get(name)
            .ok_or_else(|| ActionError::Unknown(name.to_string()))?;
        let start = Instant::now();
        let params_preview = params_preview(&params);
        let result = action.run(ctx, state, params).await;

        let audit = serde_json::json!({
            "event": "action_audit",
            "action": name,
            "ok": result.is_ok(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview,
        });
        tracing::info!(target: "bot.coordinator", audit = %audit.to_string(), "action");
        result
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Activity, CollectingSender};
    use crate::state::TurnState;
    use serde::Deserialize;
    use tokio::sync::Mutex;

    #[derive(Deserialize, JsonSchema)]
    struct GreetParams {
        name: String,
    }

    struct Greet;

    #[async_trait]
    impl TypedAction for Greet {
        type Params = GreetParams;

        fn name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Say hello"
        }

        async fn run_typed(
            &self,
            _ctx: &TurnContext,
            _state: &SharedTurnState,
            params: GreetParams,
        ) -> Result<String, ActionError> {
            Ok(format!("hello {}", params.name))
        }
    }

    fn ctx() -> TurnContext {
        TurnContext::new(
            Activity::message("msteams", "bot1", "c1", "hi"),
            Arc::new(CollectingSender::new()),
        )
    }

    #[tokio::test]
    async fn test_typed_params_validated_at_boundary() {
        let mut registry = ActionRegistry::new();
        registry.register_typed(Greet);
        let state = Mutex::new(TurnState::new(10));

        let out = registry
            .execute("greet", &ctx(), &state, serde_json::json!({"name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(out, "hello Ada");

        let err = registry
            .execute("greet", &ctx(), &state, serde_json::json!({"name": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameters { ref action, .. } if action == "greet"));

        let err = registry
            .execute("missing", &ctx(), &state, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unknown(_)));
    }

    #[test]
    fn test_schema_and_catalog() {
        let mut registry = ActionRegistry::new();
        registry.register_typed(Greet);
        let schema = registry.get("greet").unwrap().parameters_schema();
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert!(registry.catalog().starts_with("- greet: Say hello"));
        assert!(registry.to_schema_json().contains("\"canRunWith\""));
    }
}
