//! 助手轮次处理器：关键字命令、规划 + 动作分发、新成员欢迎

use std::sync::Arc;

use async_trait::async_trait;

use super::commands::KeywordCommands;
use super::pipeline::TurnHandler;
use crate::actions::ActionDispatchCoordinator;
use crate::activity::{ActivityType, BotMessageKeyword, TurnContext};
use crate::core::BotError;
use crate::planner::Planner;
use crate::state::{ConversationReferences, Message, SharedTurnState};

pub struct AssistantTurnHandler {
    planner: Arc<dyn Planner>,
    coordinator: Arc<ActionDispatchCoordinator>,
    commands: KeywordCommands,
    references: Arc<ConversationReferences>,
    bot_id: Option<String>,
}

impl AssistantTurnHandler {
    pub fn new(
        planner: Arc<dyn Planner>,
        coordinator: Arc<ActionDispatchCoordinator>,
        commands: KeywordCommands,
        references: Arc<ConversationReferences>,
    ) -> Self {
        Self {
            planner,
            coordinator,
            commands,
            references,
            bot_id: None,
        }
    }

    /// 机器人自己的账号 id；为空时用活动的 recipient.id 识别
    pub fn with_bot_id(mut self, bot_id: Option<String>) -> Self {
        self.bot_id = bot_id;
        self
    }

    async fn on_message(&self, ctx: &TurnContext, state: &SharedTurnState) -> Result<(), BotError> {
        if let Some(keyword) = BotMessageKeyword::match_prefix(ctx.input()) {
            return self.commands.handle(keyword, ctx, state).await;
        }
        let input = ctx.input().trim().to_string();
        if input.is_empty() {
            tracing::debug!(target: "bot.pipeline", "Empty message, nothing to plan");
            return Ok(());
        }

        {
            let mut state = state.lock().await;
            state.temp.input = input.clone();
            state.conversation.history.push(Message::user(input));
        }
        ctx.start_typing();

        let plan = self.planner.begin_task(ctx, state).await?;
        self.coordinator.execute_plan(ctx, state, plan).await
    }

    /// 非机器人成员加入时，每个会话只欢迎一次
    async fn on_members_added(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
    ) -> Result<(), BotError> {
        let activity = ctx.activity();
        let bot_id = self.bot_id.as_deref().unwrap_or(&activity.recipient.id);
        if !activity.members_added.iter().any(|m| m.id != bot_id) {
            return Ok(());
        }

        let first_time = {
            let mut state = state.lock().await;
            !std::mem::replace(&mut state.conversation.welcomed, true)
        };
        if first_time {
            ctx.send_text(self.commands.welcome_message()).await?;
            self.references.add(activity).await;
        }
        Ok(())
    }
}

#[async_trait]
impl TurnHandler for AssistantTurnHandler {
    async fn on_turn(&self, ctx: &TurnContext, state: &SharedTurnState) -> Result<(), BotError> {
        match ctx.activity().kind {
            ActivityType::Message => self.on_message(ctx, state).await,
            ActivityType::ConversationUpdate => self.on_members_added(ctx, state).await,
            ref other => {
                tracing::debug!(target: "bot.pipeline", kind = ?other, "No handler for activity type");
                Ok(())
            }
        }
    }
}
