//! 租约存储抽象
//!
//! BlobStore 对应一个 blob 容器：每个会话键对应一个（可能为空的）blob，
//! 租约锁在 blob 上，到期自动失效。内存 / SQLite / Azure Blob 三种实现。

use async_trait::async_trait;
use thiserror::Error;

/// 租约时长上限（秒），与 Azure Blob 固定租约的最大值一致
pub const MAX_LEASE_SECS: u32 = 60;

/// blob 名称的最大长度
const MAX_BLOB_NAME_LEN: usize = 1024;

/// 单个名称中保留 `/` 分隔的最大段数
const MAX_PATH_SEGMENTS: usize = 255;

/// 存储层错误（对应 Azure Blob 的错误码）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("The specified blob does not exist: {0}")]
    BlobNotFound(String),

    #[error("There is already a lease present on blob {0}")]
    LeaseAlreadyPresent(String),

    #[error("The lease ID specified did not match the lease on blob {0}")]
    LeaseIdMismatch(String),

    #[error("There is currently no lease on blob {0}")]
    LeaseNotPresent(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// 会话租约错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    /// 会话已被其他轮次持有：调用方应拒绝本轮而不是重试
    #[error("Conversation {0} is already leased by another turn")]
    Contention(String),

    #[error("Lease store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Please provide a non-empty key")]
    InvalidKey,
}

/// blob 容器接口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 容器不存在时创建；已存在视为成功
    async fn create_container_if_not_exists(&self) -> Result<(), StoreError>;

    /// 在 blob 上获取租约，返回新的 lease id；blob 不存在时返回 BlobNotFound
    async fn acquire_lease(&self, blob: &str, duration_secs: u32) -> Result<String, StoreError>;

    /// 用 lease id 释放租约
    async fn release_lease(&self, blob: &str, lease_id: &str) -> Result<(), StoreError>;

    async fn blob_exists(&self, blob: &str) -> Result<bool, StoreError>;

    /// 写入空 blob。blob 上若有有效租约则返回 LeaseAlreadyPresent
    async fn create_empty_blob(&self, blob: &str) -> Result<(), StoreError>;
}

/// 把会话键转换为合法的 blob 名称：
/// 丢弃空的路径段（首段除外），第 255 段之后不再插入 `/`，
/// 然后按 URI 组件编码并截断到 1024 个字符。
pub fn sanitize_blob_key(key: &str) -> Result<String, LeaseError> {
    if key.is_empty() {
        return Err(LeaseError::InvalidKey);
    }

    let mut parts = key.split('/');
    let mut joined = parts.next().unwrap_or_default().to_string();
    for (idx, part) in parts.enumerate().map(|(i, p)| (i + 1, p)) {
        if part.is_empty() {
            continue;
        }
        if idx < MAX_PATH_SEGMENTS {
            joined.push('/');
        }
        joined.push_str(part);
    }

    let mut encoded = encode_uri_component(&joined);
    encoded.truncate(MAX_BLOB_NAME_LEN);
    Ok(encoded)
}

/// URI 组件编码：保留 A-Z a-z 0-9 与 `-_.!~*'()`，其余按 UTF-8 字节编码为 %XX
pub fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
