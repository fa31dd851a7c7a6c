//! HTTP 客户端错误

use thiserror::Error;

/// 传输层错误：请求没有拿到任何响应（连接失败、超时等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

/// RetryableHttpClient 的最终错误（不可重试或重试耗尽）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Request to {url} failed with status code {status} after {attempts} attempt(s): {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
        attempts: u32,
    },

    #[error("Request to {url} failed after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        message: String,
        attempts: u32,
    },

    #[error("No authorization header found in the request config.")]
    MissingAuth { url: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    pub fn url(&self) -> &str {
        match self {
            HttpError::Status { url, .. }
            | HttpError::Network { url, .. }
            | HttpError::MissingAuth { url }
            | HttpError::Decode { url, .. } => url,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 实际发出的请求次数
    pub fn attempts(&self) -> u32 {
        match self {
            HttpError::Status { attempts, .. } | HttpError::Network { attempts, .. } => *attempts,
            HttpError::MissingAuth { .. } => 0,
            HttpError::Decode { .. } => 1,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}
