//! 会话租约管理器
//!
//! 为每个 ConversationKey 在 blob 上加 60 秒租约，保证同一会话同一时刻只有一个轮次在处理。
//! 租约被占用时返回 Contention，由轮次管线拒绝本轮；不在内部重试。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use super::store::{sanitize_blob_key, BlobStore, LeaseError, StoreError, MAX_LEASE_SECS};
use crate::activity::ConversationKey;

/// 已获取的会话租约
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub lease_id: String,
    pub key: ConversationKey,
    pub acquired_at: DateTime<Utc>,
    pub duration: Duration,
}

/// 会话租约管理器：BlobStore 之上的一层薄编排
pub struct ConversationLeaseManager {
    store: Arc<dyn BlobStore>,
    container_ready: OnceCell<()>,
    lease_secs: u32,
}

impl ConversationLeaseManager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            container_ready: OnceCell::new(),
            lease_secs: MAX_LEASE_SECS,
        }
    }

    /// 自定义租约时长（1..=60 秒）
    pub fn with_lease_secs(mut self, secs: u32) -> Self {
        self.lease_secs = secs.clamp(1, MAX_LEASE_SECS);
        self
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs as u64)
    }

    /// 确保容器存在。所有调用方共享同一次创建；创建失败不缓存，下次调用重新尝试
    async fn ensure_container(&self) -> Result<(), LeaseError> {
        self.container_ready
            .get_or_try_init(|| async { self.store.create_container_if_not_exists().await })
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(target: "bot.leaseManager", error = %e, "Failed to create lease container");
                LeaseError::StoreUnavailable(e.to_string())
            })
    }

    async fn blob_name(&self, key: &ConversationKey) -> Result<String, LeaseError> {
        self.ensure_container().await?;
        sanitize_blob_key(key.as_str())
    }

    /// 获取会话租约
    ///
    /// blob 不存在时先创建空 blob 再获取一次；租约已被占用时返回 `LeaseError::Contention`，
    /// 其余存储错误返回 `LeaseError::StoreUnavailable`。
    pub async fn acquire_lease(&self, key: &ConversationKey) -> Result<Lease, LeaseError> {
        let blob = self.blob_name(key).await?;
        let lease_id = match self.store.acquire_lease(&blob, self.lease_secs).await {
            Ok(id) => id,
            Err(StoreError::BlobNotFound(_)) => {
                tracing::warn!(
                    target: "bot.leaseManager",
                    key = %key,
                    "Blob not found, creating blob and acquiring lease."
                );
                self.create_blob_if_not_exists(key, &blob).await?;
                self.store
                    .acquire_lease(&blob, self.lease_secs)
                    .await
                    .map_err(|e| self.map_store_error(key, e))?
            }
            Err(e) => return Err(self.map_store_error(key, e)),
        };

        tracing::debug!(target: "bot.leaseManager", key = %key, lease_id = %lease_id, "Lease acquired");
        Ok(Lease {
            lease_id,
            key: key.clone(),
            acquired_at: Utc::now(),
            duration: self.lease_duration(),
        })
    }

    async fn create_blob_if_not_exists(
        &self,
        key: &ConversationKey,
        blob: &str,
    ) -> Result<(), LeaseError> {
        let exists = self
            .store
            .blob_exists(blob)
            .await
            .map_err(|e| self.map_store_error(key, e))?;
        if !exists {
            // 与另一实例并发创建时，对方可能已经拿到租约：表现为 LeaseAlreadyPresent -> Contention
            self.store
                .create_empty_blob(blob)
                .await
                .map_err(|e| self.map_store_error(key, e))?;
        }
        Ok(())
    }

    /// 释放会话租约；租约已过期或已释放时存储返回的错误原样交给调用方记录
    pub async fn release_lease(
        &self,
        key: &ConversationKey,
        lease_id: &str,
    ) -> Result<(), LeaseError> {
        let blob = self.blob_name(key).await?;
        self.store
            .release_lease(&blob, lease_id)
            .await
            .map_err(|e| LeaseError::StoreUnavailable(e.to_string()))?;
        tracing::debug!(target: "bot.leaseManager", key = %key, lease_id = %lease_id, "Lease released");
        Ok(())
    }

    fn map_store_error(&self, key: &ConversationKey, e: StoreError) -> LeaseError {
        match e {
            StoreError::LeaseAlreadyPresent(_) => LeaseError::Contention(key.to_string()),
            other => LeaseError::StoreUnavailable(other.to_string()),
        }
    }
}
