//! ActionDispatchCoordinator：按计划顺序执行 DO / SAY 命令
//!
//! 1. plan_ready：校验计划，必要时兜底到 fallback 动作，交换 (DO, SAY)，把可并行的兄弟 DO 挂到主动作上
//! 2. do_command：把之前动作的输出并入参数，主动作与并行动作 fan-out / fan-in
//! 3. 最后一个 DO 执行完即停止，调试模式下报告耗时
//!
//! 动作错误不在这里捕获，直接向上传播，剩余命令不再执行。

use std::sync::Arc;

use futures_util::future::{try_join, try_join_all};
use serde_json::{Map, Value};
use tokio::time::Instant;

use super::names;
use super::registry::ActionRegistry;
use crate::activity::TurnContext;
use crate::core::BotError;
use crate::planner::{swap_do_and_say, DoCommand, Plan, PredictedCommand};
use crate::state::{Message, SharedTurnState};

/// 单条 DO 命令执行后的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// 继续执行后续命令，携带动作输出
    Continue(String),
    /// 停止执行本计划
    Stop,
}

pub struct ActionDispatchCoordinator {
    registry: Arc<ActionRegistry>,
    fallback_action: Option<String>,
}

impl ActionDispatchCoordinator {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            fallback_action: None,
        }
    }

    /// 没有 DO 命令的计划改为执行该动作（参数 entity 为用户输入）
    pub fn with_fallback_action(mut self, action: Option<String>) -> Self {
        self.fallback_action = action.filter(|a| !a.is_empty());
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// 规范化计划并写入 temp 状态；计划无效时返回 None
    pub async fn plan_ready(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        mut plan: Plan,
    ) -> Result<Option<Plan>, BotError> {
        if !plan.is_valid() {
            tracing::warn!(target: "bot.coordinator", "Action plan has no commands, stopping");
            state.lock().await.temp.action_plan = Some(plan);
            return Ok(None);
        }
        tracing::info!(
            target: "bot.coordinator",
            "Original Action plan: {}",
            plan.to_pretty_json()
        );

        if let Some(fallback) = self.fallback_action.as_deref() {
            if !plan.has_do_command() {
                tracing::warn!(
                    target: "bot.coordinator",
                    "The action plan does not contain any \"DO\" command. Falling back to {}",
                    fallback
                );
                if let Some(say) = plan.first_say().filter(|s| !s.is_empty()) {
                    ctx.send_text(say.to_string()).await?;
                }
                let input = state.lock().await.temp.input.clone();
                plan.commands.retain(|c| !c.is_say());
                plan.commands.push(PredictedCommand::Do(
                    DoCommand::new(fallback).with_param("entity", input),
                ));
            }
        }

        swap_do_and_say(&mut plan.commands);
        self.attach_parallel_actions(&mut plan.commands);

        tracing::info!(
            target: "bot.coordinator",
            "Updated Action plan: {}",
            plan.to_pretty_json()
        );

        let debug = {
            let mut state = state.lock().await;
            state.temp.action_plan = Some(plan.clone());
            state.temp.started_at = Some(Instant::now());
            state.conversation.debug
        };
        if debug {
            ctx.send_text(format!(
                "**[DEBUG INFO]**\n```json\n{}\n```",
                plan.to_pretty_json()
            ))
            .await?;
        }

        ctx.start_typing();
        Ok(Some(plan))
    }

    /// 对声明了 can_run_with 的已注册动作：找到计划中它的第一个 DO，
    /// 把兄弟动作的第一个 DO 从主序列移到它的 parallel_actions
    fn attach_parallel_actions(&self, commands: &mut Vec<PredictedCommand>) {
        for action in self.registry.actions() {
            let siblings = action.can_run_with();
            if siblings.is_empty() {
                continue;
            }
            let Some(mut primary) = commands.iter().position(|c| c.action() == Some(action.name()))
            else {
                continue;
            };
            if let PredictedCommand::Do(cmd) = &mut commands[primary] {
                cmd.parallel_actions.clear();
            }

            for sibling in &siblings {
                if !self.registry.contains(sibling) {
                    continue;
                }
                let found = commands
                    .iter()
                    .enumerate()
                    .position(|(i, c)| i != primary && c.action() == Some(sibling.as_str()));
                let Some(index) = found else {
                    continue;
                };
                let PredictedCommand::Do(sibling_cmd) = commands.remove(index) else {
                    continue;
                };
                if index < primary {
                    primary -= 1;
                }
                if let PredictedCommand::Do(cmd) = &mut commands[primary] {
                    cmd.parallel_actions.push(sibling_cmd);
                }
            }
        }
    }

    /// 参数 + 在该动作之前记录的动作输出
    async fn chained_params(&self, state: &SharedTurnState, cmd: &DoCommand) -> Value {
        let mut params: Map<String, Value> = cmd.parameters.clone();
        let state = state.lock().await;
        for (name, output) in state.temp.outputs_before(&cmd.action) {
            params.insert(name.clone(), Value::String(output.clone()));
        }
        Value::Object(params)
    }

    /// 执行一条 DO 命令（含并行动作）
    pub async fn do_command(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        cmd: &DoCommand,
    ) -> Result<CommandOutcome, BotError> {
        if cmd.action.is_empty() || !self.registry.contains(&cmd.action) {
            tracing::error!(
                target: "bot.coordinator",
                "An action named {:?} was predicted but no handler is registered",
                cmd.action
            );
            if self.registry.contains(names::UNKNOWN) {
                self.registry
                    .execute(names::UNKNOWN, ctx, state, Value::Object(Map::new()))
                    .await?;
            }
            return Ok(CommandOutcome::Stop);
        }
        tracing::info!(target: "bot.coordinator", "DoCommandActionName: {}", cmd.action);

        let params = self.chained_params(state, cmd).await;
        ctx.start_typing();

        let output = if cmd.parallel_actions.is_empty() {
            self.registry.execute(&cmd.action, ctx, state, params).await?
        } else {
            // 并行动作只拿自己的参数
            let siblings = cmd.parallel_actions.iter().map(|sibling| {
                let sibling_params = Value::Object(sibling.parameters.clone());
                self.registry.execute(&sibling.action, ctx, state, sibling_params)
            });
            let primary = self.registry.execute(&cmd.action, ctx, state, params);
            let (output, _) = try_join(primary, try_join_all(siblings)).await?;
            output
        };

        state
            .lock()
            .await
            .temp
            .record_output(&cmd.action, output.clone());

        if self.is_last_action(ctx, state, &cmd.action).await? {
            Ok(CommandOutcome::Stop)
        } else {
            Ok(CommandOutcome::Continue(output))
        }
    }

    /// 计划的最后一条命令是否为该动作的 DO；没有计划时视为最后一个。
    /// 调试模式下在最后一个动作处报告从计划就绪到现在的耗时。
    pub async fn is_last_action(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        action: &str,
    ) -> Result<bool, BotError> {
        let (is_last, elapsed) = {
            let state = state.lock().await;
            let Some(plan) = state.temp.action_plan.as_ref() else {
                return Ok(true);
            };
            let is_last = plan.ends_with_action(action);
            let elapsed = state
                .temp
                .started_at
                .filter(|_| is_last && state.conversation.debug)
                .map(|t| t.elapsed());
            (is_last, elapsed)
        };

        if let Some(elapsed) = elapsed {
            let message = format!(
                "**[DEBUG INFO]**\nExecution time: {} seconds",
                elapsed.as_secs_f64()
            );
            tracing::info!(target: "bot.coordinator", "{}", message);
            ctx.send_text(message).await?;
        }
        Ok(is_last)
    }

    /// plan_ready 后按顺序执行全部命令；SAY 发送文本并写入历史
    pub async fn execute_plan(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        plan: Plan,
    ) -> Result<(), BotError> {
        let Some(plan) = self.plan_ready(ctx, state, plan).await? else {
            return Ok(());
        };

        for command in &plan.commands {
            match command {
                PredictedCommand::Say(say) => {
                    if say.response.is_empty() {
                        continue;
                    }
                    ctx.send_text(say.response.clone()).await?;
                    state
                        .lock()
                        .await
                        .conversation
                        .history
                        .push(Message::assistant(say.response.clone()));
                }
                PredictedCommand::Do(cmd) => {
                    if self.do_command(ctx, state, cmd).await? == CommandOutcome::Stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
