//! 可重试 HTTP 客户端
//!
//! 请求拦截：除 token 端点外，每次发送前重新获取认证头注入请求。
//! 响应拦截：失败时按状态码分类，按 URL 记录重试次数，指数退避后重发；
//! 成功或最终失败时删除该 URL 的计数。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::auth::AuthHeaderProvider;
use super::error::{HttpError, TransportError};
use super::transport::{ApiRequest, ApiResponse, HttpTransport};

/// 可重试的状态码（404 / 422 也在内：后端索引最终一致，短时间内可能查不到）
pub const RETRYABLE_STATUS_CODES: [u16; 11] = [401, 403, 404, 408, 413, 422, 429, 500, 502, 503, 504];

/// URL 中包含这些片段的请求视为 token 请求：不注入认证头，重试时也不补 Authorization
const TOKEN_URL_MARKERS: [&str; 3] = ["access-token", "token", "jwt"];

pub fn is_token_request(url: &str) -> bool {
    TOKEN_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retry_attempts: u32,
    pub initial_retry_delay: Duration,
    /// 命中这些片段的最终失败只记 debug，不记 error
    pub benign_error_substrings: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(500),
            benign_error_substrings: vec![
                "No news can be found from NewsEdge".to_string(),
                "Azure has not provided the response due to a content filter being triggered"
                    .to_string(),
            ],
        }
    }
}

impl RetryPolicy {
    /// 第 n 次重试前的等待：2^n * initial_retry_delay
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        self.initial_retry_delay
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

/// 一次失败的请求
#[derive(Debug)]
enum Failure {
    Status(ApiResponse),
    Network(TransportError),
}

impl Failure {
    fn into_error(self, url: &str, attempts: u32) -> HttpError {
        match self {
            Failure::Status(resp) => HttpError::Status {
                url: url.to_string(),
                status: resp.status,
                body: resp.body,
                attempts,
            },
            Failure::Network(e) => HttpError::Network {
                url: url.to_string(),
                message: e.0,
                attempts,
            },
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Status(resp) => write!(f, "Request failed with status code {}", resp.status),
            Failure::Network(e) => write!(f, "Network error: {}", e),
        }
    }
}

/// 带拦截器与按 URL 重试计数的 HTTP 客户端
pub struct RetryableHttpClient {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthHeaderProvider>,
    policy: RetryPolicy,
    /// 按 URL 计数，不区分调用方：同一 URL 的并发请求共用一个计数，
    /// 任一请求成功都会清零其它请求的计数
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl RetryableHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, auth: Arc<dyn AuthHeaderProvider>) -> Self {
        Self::with_policy(transport, auth, RetryPolicy::default())
    }

    pub fn with_policy(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthHeaderProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            auth,
            policy,
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 当前记录的重试次数（无记录为 0）
    pub fn retry_count(&self, url: &str) -> u32 {
        self.counts().get(url).copied().unwrap_or(0)
    }

    /// 正在记录重试次数的 URL 数量
    pub fn tracked_urls(&self) -> usize {
        self.counts().len()
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.retry_counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn increment_retry_count(&self, url: &str) -> u32 {
        let mut counts = self.counts();
        let count = counts.entry(url.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_retry_count(&self, url: &str) {
        self.counts().remove(url);
    }

    /// 网络失败总是可重试；可重试状态码仅在计数未达上限时重试
    fn should_retry(&self, failure: &Failure, retry_count: u32) -> bool {
        match failure {
            Failure::Network(_) => true,
            Failure::Status(resp) => {
                RETRYABLE_STATUS_CODES.contains(&resp.status)
                    && retry_count < self.policy.max_retry_attempts
            }
        }
    }

    fn is_benign(&self, err: &HttpError) -> bool {
        if matches!(err, HttpError::Network { .. }) {
            return false;
        }
        let message = err.to_string();
        self.policy
            .benign_error_substrings
            .iter()
            .any(|s| message.contains(s.as_str()))
    }

    /// 请求拦截：非 token 请求注入最新的认证头
    async fn intercept_request(&self, request: &mut ApiRequest) -> Result<(), HttpError> {
        if is_token_request(&request.url) {
            return Ok(());
        }
        match self.auth.auth_headers().await {
            Some(headers) => {
                request.headers.extend(headers);
                Ok(())
            }
            None => Err(HttpError::MissingAuth {
                url: request.url.clone(),
            }),
        }
    }

    /// 发送请求并按策略重试，返回 2xx 响应或最终错误
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, HttpError> {
        let url = request.url.clone();
        let token_request = is_token_request(&url);
        let mut attempts = 0u32;

        loop {
            if let Err(e) = self.intercept_request(&mut request).await {
                self.reset_retry_count(&url);
                tracing::error!(target: "bot.apiProvider", url = %url, "{}", e);
                return Err(e);
            }

            attempts += 1;
            let failure = match self.transport.send(&request).await {
                Ok(resp) if resp.is_success() => {
                    self.reset_retry_count(&url);
                    return Ok(resp);
                }
                Ok(resp) => Failure::Status(resp),
                Err(e) => Failure::Network(e),
            };
            tracing::warn!(target: "bot.apiProvider", url = %url, "Response failed: {}", failure);

            let retry_count = self.retry_count(&url);
            if self.should_retry(&failure, retry_count)
                && retry_count <= self.policy.max_retry_attempts
            {
                let retry_count = self.increment_retry_count(&url);
                let delay = self.policy.retry_delay(retry_count);

                if !token_request && request.header("Authorization").is_none() {
                    if let Some(token) = self.auth.bearer_token().await {
                        request
                            .headers
                            .insert("Authorization".to_string(), format!("Bearer {}", token));
                    }
                }

                tracing::warn!(
                    target: "bot.apiProvider",
                    delay_ms = delay.as_millis() as u64,
                    "retrying {} for {} time....",
                    url,
                    retry_count
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            self.reset_retry_count(&url);
            let err = failure.into_error(&url, attempts);
            if self.is_benign(&err) {
                tracing::debug!(target: "bot.apiProvider", url = %url, "{}", err);
            } else {
                tracing::error!(target: "bot.apiProvider", url = %url, status = ?err.status(), "{}", err);
            }
            return Err(err);
        }
    }

    pub async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        Ok(self.send(ApiRequest::get(url)).await?.body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let resp = self.send(ApiRequest::get(url)).await?;
        resp.json().map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let body = serde_json::to_value(body).map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let resp = self.send(ApiRequest::post(url, body)).await?;
        resp.json().map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
