//! 进程内租约存储
//!
//! 单实例部署与测试使用；过期时间基于 tokio 时钟，可在测试中暂停推进。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::store::{BlobStore, StoreError};

#[derive(Debug, Default)]
struct BlobEntry {
    lease: Option<(String, Instant)>,
}

impl BlobEntry {
    /// 当前有效的 lease id（已过期视为无租约）
    fn active_lease(&self, now: Instant) -> Option<&str> {
        match &self.lease {
            Some((id, expires_at)) if *expires_at > now => Some(id.as_str()),
            _ => None,
        }
    }
}

/// 内存 blob 容器
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, BlobEntry>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_container_if_not_exists(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn acquire_lease(&self, blob: &str, duration_secs: u32) -> Result<String, StoreError> {
        let now = Instant::now();
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = blobs
            .get_mut(blob)
            .ok_or_else(|| StoreError::BlobNotFound(blob.to_string()))?;
        if entry.active_lease(now).is_some() {
            return Err(StoreError::LeaseAlreadyPresent(blob.to_string()));
        }
        let lease_id = uuid::Uuid::new_v4().to_string();
        entry.lease = Some((
            lease_id.clone(),
            now + Duration::from_secs(duration_secs as u64),
        ));
        Ok(lease_id)
    }

    async fn release_lease(&self, blob: &str, lease_id: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = blobs
            .get_mut(blob)
            .ok_or_else(|| StoreError::BlobNotFound(blob.to_string()))?;
        match entry.active_lease(now) {
            Some(id) if id == lease_id => {
                entry.lease = None;
                Ok(())
            }
            Some(_) => Err(StoreError::LeaseIdMismatch(blob.to_string())),
            None => Err(StoreError::LeaseNotPresent(blob.to_string())),
        }
    }

    async fn blob_exists(&self, blob: &str) -> Result<bool, StoreError> {
        Ok(self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(blob))
    }

    async fn create_empty_blob(&self, blob: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let entry = blobs.entry(blob.to_string()).or_default();
        if entry.active_lease(now).is_some() {
            return Err(StoreError::LeaseAlreadyPresent(blob.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_requires_blob() {
        let store = MemoryBlobStore::new();
        assert_eq!(
            store.acquire_lease("k", 60).await,
            Err(StoreError::BlobNotFound("k".into()))
        );
        store.create_empty_blob("k").await.unwrap();
        assert!(store.acquire_lease("k", 60).await.is_ok());
        assert_eq!(
            store.acquire_lease("k", 60).await,
            Err(StoreError::LeaseAlreadyPresent("k".into()))
        );
    }

    #[tokio::test]
    async fn test_release_checks_lease_id() {
        let store = MemoryBlobStore::new();
        store.create_empty_blob("k").await.unwrap();
        let id = store.acquire_lease("k", 60).await.unwrap();
        assert_eq!(
            store.release_lease("k", "other").await,
            Err(StoreError::LeaseIdMismatch("k".into()))
        );
        store.release_lease("k", &id).await.unwrap();
        assert_eq!(
            store.release_lease("k", &id).await,
            Err(StoreError::LeaseNotPresent("k".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires() {
        let store = MemoryBlobStore::new();
        store.create_empty_blob("k").await.unwrap();
        store.acquire_lease("k", 60).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.acquire_lease("k", 60).await.is_err());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.acquire_lease("k", 60).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_on_leased_blob_fails() {
        let store = MemoryBlobStore::new();
        store.create_empty_blob("k").await.unwrap();
        store.acquire_lease("k", 60).await.unwrap();
        assert_eq!(
            store.create_empty_blob("k").await,
            Err(StoreError::LeaseAlreadyPresent("k".into()))
        );
        assert_eq!(store.blob_count(), 1);
    }
}
