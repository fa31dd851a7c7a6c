//! BotApp：按配置装配全部组件，并提供顶层轮次错误处理
//!
//! 组件通过构造参数显式传递（租约管理器、状态存储、会话引用登记表、HTTP 客户端、规划器、动作注册表），
//! 不使用全局单例。

use std::sync::Arc;
use std::time::Duration;

use super::commands::KeywordCommands;
use super::handler::AssistantTurnHandler;
use super::pipeline::{TurnHandler, TurnOutcome, TurnPipeline};
use crate::actions::{register_builtin_actions, Action, ActionDispatchCoordinator, ActionRegistry};
use crate::activity::{Activity, ActivitySender, CollectingSender, OutboundActivity, TurnContext};
use crate::config::{AppConfig, LeaseBackend};
use crate::core::{ActionError, BotError};
use crate::http::{
    ApiKeyAuth, AuthHeaderProvider, HttpTransport, NoAuth, ReqwestTransport, RetryableHttpClient,
};
use crate::lease::{
    AzureBlobStore, BlobStore, ConversationLeaseManager, MemoryBlobStore, SqliteBlobStore,
};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::planner::{LlmPlanner, Planner};
use crate::state::{ConversationReferences, MemoryStateStore, StateStore};

pub const GENERIC_ERROR_MESSAGE: &str =
    "The bot encountered an error or bug. Please try again in a moment.";
pub const RATE_LIMIT_MESSAGE: &str =
    "The service is receiving too many requests right now. Please try again in a few moments.";
pub const ERROR_TRACE_NAME: &str = "OnTurnError Trace";
pub const ERROR_TRACE_LABEL: &str = "TurnError";
pub const ERROR_TRACE_TYPE: &str = "https://www.botframework.com/schemas/error";

pub struct BotApp {
    config: AppConfig,
    pipeline: TurnPipeline,
    handler: Arc<dyn TurnHandler>,
    references: Arc<ConversationReferences>,
    http: Arc<RetryableHttpClient>,
}

impl BotApp {
    pub fn builder(config: AppConfig) -> BotAppBuilder {
        BotAppBuilder::new(config)
    }

    /// 全部使用配置中的后端
    pub fn from_config(config: AppConfig) -> Result<Self, BotError> {
        BotAppBuilder::new(config).build()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn references(&self) -> &Arc<ConversationReferences> {
        &self.references
    }

    pub fn http(&self) -> &Arc<RetryableHttpClient> {
        &self.http
    }

    /// 处理一个入站活动；出错时先交给顶层错误处理再返回错误
    pub async fn handle_activity(
        &self,
        activity: Activity,
        sender: Arc<dyn ActivitySender>,
    ) -> Result<TurnOutcome, BotError> {
        let mut ctx = TurnContext::new(activity, sender)
            .with_typing_interval(self.config.bot.typing_interval());
        match self.pipeline.run_turn(&mut ctx, self.handler.as_ref()).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                on_turn_error(&ctx, &err).await;
                Err(err)
            }
        }
    }

    /// expectReplies 风格：返回本轮全部出站活动（错误已转为消息与 trace）
    pub async fn process_activity(&self, activity: Activity) -> Vec<OutboundActivity> {
        let sender = Arc::new(CollectingSender::new());
        let _ = self.handle_activity(activity, sender.clone()).await;
        sender.take()
    }
}

fn is_rate_limited(err: &BotError) -> bool {
    match err {
        BotError::Http(e) | BotError::Action(ActionError::Http(e)) => e.is_rate_limited(),
        _ => false,
    }
}

/// 顶层错误处理：记录错误，发送通用失败消息与 trace 活动
pub async fn on_turn_error(ctx: &TurnContext, err: &BotError) {
    tracing::error!(
        target: "bot.pipeline",
        key = %ctx.conversation_key(),
        "[onTurnError] unhandled error: {}",
        err
    );
    let message = if is_rate_limited(err) {
        RATE_LIMIT_MESSAGE
    } else {
        GENERIC_ERROR_MESSAGE
    };
    if let Err(e) = ctx.send_text(message).await {
        tracing::error!(target: "bot.pipeline", "Failed to send error message: {}", e);
    }
    if let Err(e) = ctx
        .send_trace(ERROR_TRACE_NAME, &err.to_string(), ERROR_TRACE_TYPE, ERROR_TRACE_LABEL)
        .await
    {
        tracing::error!(target: "bot.pipeline", "Failed to send error trace: {}", e);
    }
}

/// BotApp 构建器：未显式提供的组件按配置创建
pub struct BotAppBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    state_store: Option<Arc<dyn StateStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthHeaderProvider>>,
    extra_actions: Vec<Arc<dyn Action>>,
}

impl BotAppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            blob_store: None,
            state_store: None,
            transport: None,
            auth: None,
            extra_actions: Vec::new(),
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定租约存储（覆盖 storage.lease_backend）
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthHeaderProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// 额外注册的动作（同名时覆盖内置动作）
    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.extra_actions.push(Arc::new(action));
        self
    }

    fn lease_store(&self) -> Option<Arc<dyn BlobStore>> {
        if let Some(store) = &self.blob_store {
            return Some(Arc::clone(store));
        }
        let storage = &self.config.storage;
        match storage.lease_backend {
            LeaseBackend::None => None,
            LeaseBackend::Memory => Some(Arc::new(MemoryBlobStore::new())),
            LeaseBackend::Sqlite => storage
                .sqlite_path
                .as_ref()
                .map(|path| Arc::new(SqliteBlobStore::new(path)) as Arc<dyn BlobStore>),
            LeaseBackend::Azure => storage.azure_container_url.as_ref().map(|url| {
                Arc::new(AzureBlobStore::new(
                    url.clone(),
                    storage.azure_sas_token.clone().unwrap_or_default(),
                )) as Arc<dyn BlobStore>
            }),
        }
    }

    fn http_client(&self) -> Result<RetryableHttpClient, BotError> {
        let http = &self.config.http;
        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(t) => Arc::clone(t),
            None => Arc::new(
                ReqwestTransport::new(http.base_url.clone(), Duration::from_secs(http.timeout_secs))
                    .map_err(|e| BotError::Transport(e.to_string()))?,
            ),
        };
        let auth: Arc<dyn AuthHeaderProvider> = match (&self.auth, &http.client_id, &http.client_secret) {
            (Some(auth), _, _) => Arc::clone(auth),
            (None, Some(id), Some(secret)) => Arc::new(ApiKeyAuth::new(id.clone(), secret.clone())),
            _ => Arc::new(NoAuth),
        };
        Ok(RetryableHttpClient::with_policy(transport, auth, http.retry_policy()))
    }

    pub fn build(self) -> Result<BotApp, BotError> {
        self.config.validate()?;
        let cfg = &self.config;

        let leases = self.lease_store().map(|store| {
            Arc::new(
                ConversationLeaseManager::new(store).with_lease_secs(cfg.storage.lease_duration_secs),
            )
        });
        tracing::info!(
            target: "bot.pipeline",
            backend = ?cfg.storage.lease_backend,
            container = %cfg.storage.container_name,
            enabled = leases.is_some(),
            "Conversation lease manager configured"
        );

        let http = Arc::new(self.http_client()?);
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(cfg));

        let llm_planner = Arc::new(
            LlmPlanner::new(llm).with_default_template(cfg.planner.default_prompt.clone()),
        );
        if !llm_planner.has_template(&cfg.planner.default_prompt) {
            return Err(BotError::Config(format!(
                "planner.default_prompt {} is not a known prompt template",
                cfg.planner.default_prompt
            )));
        }
        let planner: Arc<dyn Planner> = llm_planner.clone();

        let mut registry = ActionRegistry::new();
        register_builtin_actions(
            &mut registry,
            Arc::clone(&planner),
            Arc::clone(&http),
            cfg.planner.web_max_chars,
        );
        for action in &self.extra_actions {
            registry.register_arc(Arc::clone(action));
        }
        if let Some(fallback) = cfg.planner.fallback_action.as_deref() {
            if !registry.contains(fallback) {
                return Err(BotError::Config(format!(
                    "planner.fallback_action {} is not a registered action",
                    fallback
                )));
            }
        }
        llm_planner.set_action_catalog(registry.catalog());
        tracing::info!(target: "bot.coordinator", actions = ?registry.action_names(), "Actions registered");

        let coordinator = Arc::new(
            ActionDispatchCoordinator::new(Arc::new(registry))
                .with_fallback_action(cfg.planner.fallback_action.clone()),
        );

        let references = Arc::new(ConversationReferences::new());
        let states: Arc<dyn StateStore> = match &self.state_store {
            Some(s) => Arc::clone(s),
            None => Arc::new(MemoryStateStore::new()),
        };
        let pipeline = TurnPipeline::new(leases, states, Arc::clone(&references))
            .with_max_turns(cfg.bot.max_turns);

        let handler = AssistantTurnHandler::new(
            planner,
            coordinator,
            KeywordCommands::new(cfg.bot.welcome_message.clone()),
            Arc::clone(&references),
        )
        .with_bot_id(cfg.bot.bot_id.clone());

        Ok(BotApp {
            config: self.config,
            pipeline,
            handler: Arc::new(handler),
            references,
            http,
        })
    }
}
