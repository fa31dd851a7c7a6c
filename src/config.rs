//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COPILOT__*` 覆盖
//! （双下划线表示嵌套，如 `COPILOT__STORAGE__LEASE_BACKEND=sqlite`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::BotError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotSection,
    pub storage: StorageSection,
    pub http: HttpSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
}

/// [bot] 段：机器人名称、历史轮数、typing 指示器、欢迎语
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    pub name: String,
    /// 机器人自身的频道账号 id（用于在 membersAdded 中识别自己）
    pub bot_id: Option<String>,
    /// 聊天历史保留轮数（实际保留 max_turns*2 条消息）
    pub max_turns: usize,
    pub typing_indicator: bool,
    pub typing_interval_ms: u64,
    pub welcome_message: String,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: "AI Copilot".to_string(),
            bot_id: None,
            max_turns: 10,
            typing_indicator: true,
            typing_interval_ms: 1000,
            welcome_message: "Hello! I'm your AI Copilot. Ask me about any company, person or topic, or type /history, /document or /debug.".to_string(),
        }
    }
}

impl BotSection {
    /// typing 指示器间隔；关闭时为 None
    pub fn typing_interval(&self) -> Option<Duration> {
        self.typing_indicator
            .then(|| Duration::from_millis(self.typing_interval_ms.max(1)))
    }
}

/// 租约存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaseBackend {
    /// 不做会话互斥（单用户调试）
    None,
    #[default]
    Memory,
    Sqlite,
    Azure,
}

/// [storage] 段：租约后端与参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub lease_backend: LeaseBackend,
    pub lease_duration_secs: u32,
    pub container_name: String,
    pub sqlite_path: Option<PathBuf>,
    /// 形如 https://{account}.blob.core.windows.net/{container}
    pub azure_container_url: Option<String>,
    pub azure_sas_token: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            lease_backend: LeaseBackend::Memory,
            lease_duration_secs: 60,
            container_name: "conversation-leases".to_string(),
            sqlite_path: None,
            azure_container_url: None,
            azure_sas_token: None,
        }
    }
}

/// [http] 段：后端 API 地址、超时与重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub benign_error_substrings: Vec<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        let policy = crate::http::RetryPolicy::default();
        Self {
            base_url: String::new(),
            timeout_secs: 120,
            max_retry_attempts: policy.max_retry_attempts,
            initial_retry_delay_ms: policy.initial_retry_delay.as_millis() as u64,
            benign_error_substrings: policy.benign_error_substrings,
            client_id: None,
            client_secret: None,
        }
    }
}

impl HttpSection {
    pub fn retry_policy(&self) -> crate::http::RetryPolicy {
        crate::http::RetryPolicy {
            max_retry_attempts: self.max_retry_attempts,
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            benign_error_substrings: self.benign_error_substrings.clone(),
        }
    }
}

/// [llm] 段：OpenAI 兼容后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 需要 OPENAI_API_KEY，否则退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

/// [planner] 段：默认提示模板、无 DO 命令时的兜底动作、网页正文截断长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub default_prompt: String,
    pub fallback_action: Option<String>,
    pub web_max_chars: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            default_prompt: "plan".to_string(),
            fallback_action: None,
            web_max_chars: 8000,
        }
    }
}

impl AppConfig {
    /// 检查组合是否合法（如 sqlite 后端缺少路径）
    pub fn validate(&self) -> Result<(), BotError> {
        match self.storage.lease_backend {
            LeaseBackend::Sqlite if self.storage.sqlite_path.is_none() => {
                return Err(BotError::Config(
                    "storage.sqlite_path is required for the sqlite lease backend".to_string(),
                ));
            }
            LeaseBackend::Azure if self.storage.azure_container_url.is_none() => {
                return Err(BotError::Config(
                    "storage.azure_container_url is required for the azure lease backend"
                        .to_string(),
                ));
            }
            _ => {}
        }
        if self.storage.lease_duration_secs == 0 || self.storage.lease_duration_secs > 60 {
            return Err(BotError::Config(format!(
                "storage.lease_duration_secs must be within 1..=60, got {}",
                self.storage.lease_duration_secs
            )));
        }
        if self.bot.max_turns == 0 {
            return Err(BotError::Config("bot.max_turns must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 COPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COPILOT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("http.benign_error_substrings")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bot.max_turns, 10);
        assert_eq!(cfg.bot.typing_interval(), Some(Duration::from_millis(1000)));
        assert_eq!(cfg.storage.lease_backend, LeaseBackend::Memory);
        assert_eq!(cfg.storage.lease_duration_secs, 60);
        assert_eq!(cfg.http.timeout_secs, 120);
        assert_eq!(cfg.http.max_retry_attempts, 3);
        assert_eq!(cfg.http.initial_retry_delay_ms, 500);
        assert_eq!(cfg.planner.default_prompt, "plan");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        std::fs::write(
            &path,
            r#"
[bot]
max_turns = 4
typing_indicator = false

[storage]
lease_backend = "sqlite"
sqlite_path = "/tmp/leases.db"

[planner]
fallback_action = "getSemanticInfo"
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.bot.max_turns, 4);
        assert_eq!(cfg.bot.typing_interval(), None);
        assert_eq!(cfg.storage.lease_backend, LeaseBackend::Sqlite);
        assert_eq!(cfg.planner.fallback_action.as_deref(), Some("getSemanticInfo"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_combinations() {
        let mut cfg = AppConfig::default();
        cfg.storage.lease_backend = LeaseBackend::Sqlite;
        assert!(matches!(cfg.validate(), Err(BotError::Config(_))));

        let mut cfg = AppConfig::default();
        cfg.storage.lease_backend = LeaseBackend::Azure;
        assert!(matches!(cfg.validate(), Err(BotError::Config(_))));

        let mut cfg = AppConfig::default();
        cfg.storage.lease_duration_secs = 90;
        assert!(matches!(cfg.validate(), Err(BotError::Config(_))));
    }
}
