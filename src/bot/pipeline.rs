//! TurnPipeline：每个入站轮次的 获取租约 / 执行 / 释放 协议
//!
//! ```text
//! RECEIVED -> EXEMPT -> DISPATCH
//!          -> LEASE_PENDING -> LEASE_HELD -> DISPATCH -> RELEASED
//!                           -> LEASE_DENIED -> REJECTED
//! ```
//!
//! 关键字命令、被改写为 message 的 ContinueConversation 事件以及其它非 message 活动不走租约；
//! 只有普通用户消息需要租约。租约被占用时告诉用户稍候并放弃本轮，处理器不会执行。
//! 持有租约的轮次无论处理器成功、出错还是 panic，after 阶段都会释放租约。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::activity::{ActivityType, BotMessageKeyword, TurnContext};
use crate::core::BotError;
use crate::lease::{ConversationLeaseManager, LeaseError};
use crate::state::{ConversationReferences, SharedTurnState, StateStore, TempState, TurnState};

pub const CONTINUE_CONVERSATION_EVENT: &str = "ContinueConversation";
pub const PLEASE_WAIT_MESSAGE: &str =
    "Please wait for the previous action to complete before sending a new request.";

/// 轮次处理器（规划 / 动作层）
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn on_turn(&self, ctx: &TurnContext, state: &SharedTurnState) -> Result<(), BotError>;
}

/// before 阶段的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeforeTurn {
    /// 不走租约，直接分发
    Exempt,
    /// 已持有租约（或未配置租约后端），继续分发
    Proceed,
    /// 租约被占用，本轮放弃
    Rejected,
}

/// 一个轮次的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Rejected,
}

pub struct TurnPipeline {
    leases: Option<Arc<ConversationLeaseManager>>,
    states: Arc<dyn StateStore>,
    references: Arc<ConversationReferences>,
    max_turns: usize,
}

impl TurnPipeline {
    /// leases 为 None 时不做会话互斥
    pub fn new(
        leases: Option<Arc<ConversationLeaseManager>>,
        states: Arc<dyn StateStore>,
        references: Arc<ConversationReferences>,
    ) -> Self {
        Self {
            leases,
            states,
            references,
            max_turns: 10,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn references(&self) -> &Arc<ConversationReferences> {
        &self.references
    }

    /// before 阶段：判断是否豁免，否则获取会话租约并登记会话引用
    pub async fn before_turn(
        &self,
        ctx: &mut TurnContext,
        temp: &mut TempState,
    ) -> Result<BeforeTurn, BotError> {
        ctx.activity_mut().remove_recipient_mention();

        match ctx.activity().kind {
            ActivityType::Message => {
                if BotMessageKeyword::match_prefix(ctx.input()).is_some() {
                    return Ok(BeforeTurn::Exempt);
                }
            }
            ActivityType::Event
                if ctx.activity().name.as_deref() == Some(CONTINUE_CONVERSATION_EVENT) =>
            {
                ctx.activity_mut().kind = ActivityType::Message;
                return Ok(BeforeTurn::Exempt);
            }
            _ => return Ok(BeforeTurn::Exempt),
        }

        let key = ctx.conversation_key();
        if let Some(leases) = &self.leases {
            match leases.acquire_lease(&key).await {
                Ok(lease) => temp.lease = Some(lease),
                Err(LeaseError::Contention(_)) => {
                    tracing::warn!(target: "bot.pipeline", key = %key, "Lease already held, rejecting turn");
                    ctx.send_text(PLEASE_WAIT_MESSAGE).await?;
                    return Ok(BeforeTurn::Rejected);
                }
                Err(e) => {
                    tracing::error!(target: "bot.pipeline", key = %key, error = %e, "Error acquiring lease");
                    return Err(e.into());
                }
            }
        }

        self.references.add(ctx.activity()).await;
        Ok(BeforeTurn::Proceed)
    }

    /// after 阶段：去掉末尾未回答的用户消息、保存会话状态、释放租约。
    /// 豁免轮次可能与持有租约的轮次同时运行，所以只回写本轮改动过的字段。
    /// 保存与释放失败只记录日志。
    pub async fn after_turn(&self, ctx: &TurnContext, turn: &mut TurnState) {
        let key = ctx.conversation_key();

        if let Some(baseline) = turn.baseline.take() {
            if turn.conversation.history.trim_dangling_user_turn() {
                tracing::debug!(target: "bot.pipeline", key = %key, "Dropped unanswered user turn from history");
            }
            let merged = match self.states.load(&key).await {
                Ok(Some(mut stored)) => {
                    stored.merge_changes(&baseline, &turn.conversation);
                    stored
                }
                Ok(None) => turn.conversation.clone(),
                Err(e) => {
                    tracing::error!(target: "bot.pipeline", key = %key, error = %e, "Error reloading conversation state");
                    turn.conversation.clone()
                }
            };
            if let Err(e) = self.states.save(&key, &merged).await {
                tracing::error!(target: "bot.pipeline", key = %key, error = %e, "Error saving conversation state");
            }
        }

        if let (Some(leases), Some(lease)) = (&self.leases, turn.temp.lease.take()) {
            if let Err(e) = leases.release_lease(&key, &lease.lease_id).await {
                tracing::error!(target: "bot.pipeline", key = %key, error = %e, "Error releasing lease");
            }
        }
    }

    async fn load_state(&self, ctx: &TurnContext, turn: &mut TurnState) -> Result<(), BotError> {
        if let Some(mut conversation) = self.states.load(&ctx.conversation_key()).await? {
            conversation.history.set_max_turns(self.max_turns);
            turn.conversation = conversation;
        }
        turn.baseline = Some(turn.conversation.clone());
        turn.temp.input = ctx.input().to_string();
        Ok(())
    }

    /// 执行完整轮次。处理器的错误在 after 阶段之后原样返回，panic 转为 BotError::Panicked
    pub async fn run_turn(
        &self,
        ctx: &mut TurnContext,
        handler: &dyn TurnHandler,
    ) -> Result<TurnOutcome, BotError> {
        let mut turn = TurnState::new(self.max_turns);
        if self.before_turn(ctx, &mut turn.temp).await? == BeforeTurn::Rejected {
            return Ok(TurnOutcome::Rejected);
        }

        let ctx: &TurnContext = ctx;
        let loaded = self.load_state(ctx, &mut turn).await;
        let shared: SharedTurnState = Mutex::new(turn);
        let result = match loaded {
            Ok(()) => AssertUnwindSafe(handler.on_turn(ctx, &shared))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(BotError::Panicked(panic_message(panic)))),
            Err(e) => Err(e),
        };

        let mut turn = shared.into_inner();
        self.after_turn(ctx, &mut turn).await;
        ctx.stop_typing();
        result.map(|_| TurnOutcome::Completed)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
