//! 认证头提供者
//!
//! 每次请求前都重新获取认证头；返回 None 表示拿不到认证信息，请求不会发出。

use std::collections::BTreeMap;

use async_trait::async_trait;

#[async_trait]
pub trait AuthHeaderProvider: Send + Sync {
    /// 注入到每个非 token 请求的认证头
    async fn auth_headers(&self) -> Option<BTreeMap<String, String>>;

    /// 重试前请求缺少 Authorization 头时使用的 Bearer token
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// 不需要认证的后端
#[derive(Debug, Clone, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthHeaderProvider for NoAuth {
    async fn auth_headers(&self) -> Option<BTreeMap<String, String>> {
        Some(BTreeMap::new())
    }
}

/// Copilot 后端的客户端 id / secret 认证
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    client_id: String,
    client_secret: String,
}

impl ApiKeyAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl AuthHeaderProvider for ApiKeyAuth {
    async fn auth_headers(&self) -> Option<BTreeMap<String, String>> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return None;
        }
        let mut headers = BTreeMap::new();
        headers.insert("X-API-Client-Id".to_string(), self.client_id.clone());
        headers.insert("X-API-Secret".to_string(), self.client_secret.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Some(headers)
    }
}

/// 固定 Bearer token
#[derive(Debug, Clone)]
pub struct StaticBearer {
    token: String,
}

impl StaticBearer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthHeaderProvider for StaticBearer {
    async fn auth_headers(&self) -> Option<BTreeMap<String, String>> {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.token));
        Some(headers)
    }

    async fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}
