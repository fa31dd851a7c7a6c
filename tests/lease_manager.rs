//! 会话租约集成测试：互斥、过期自愈、并发创建、释放语义、SQLite 跨实例

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use teams_copilot::activity::ConversationKey;
use teams_copilot::lease::{
    BlobStore, ConversationLeaseManager, LeaseError, MemoryBlobStore, SqliteBlobStore, StoreError,
};

fn key(conversation: &str) -> ConversationKey {
    ConversationKey::new("msteams", "bot1", conversation)
}

#[tokio::test]
async fn test_concurrent_acquire_has_single_winner() {
    let manager = Arc::new(ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new())));
    let k = key("c1");

    let attempts = (0..8).map(|_| {
        let manager = Arc::clone(&manager);
        let k = k.clone();
        tokio::spawn(async move { manager.acquire_lease(&k).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for r in results.iter().filter(|r| r.is_err()) {
        assert_eq!(
            r.as_ref().unwrap_err(),
            &LeaseError::Contention("msteams/bot1/conversations/c1".into())
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_lease_expires() {
    let manager = ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new()));
    let k = key("c1");

    // 持有者崩溃，从不释放
    let _abandoned = manager.acquire_lease(&k).await.unwrap();
    assert!(matches!(
        manager.acquire_lease(&k).await,
        Err(LeaseError::Contention(_))
    ));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(manager.acquire_lease(&k).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_custom_lease_duration() {
    let manager =
        ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new())).with_lease_secs(15);
    let k = key("c1");
    manager.acquire_lease(&k).await.unwrap();

    tokio::time::advance(Duration::from_secs(14)).await;
    assert!(manager.acquire_lease(&k).await.is_err());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(manager.acquire_lease(&k).await.is_ok());
}

#[tokio::test]
async fn test_release_twice_reports_error() {
    let manager = ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new()));
    let k = key("c1");
    let lease = manager.acquire_lease(&k).await.unwrap();

    manager.release_lease(&k, &lease.lease_id).await.unwrap();
    assert!(matches!(
        manager.release_lease(&k, &lease.lease_id).await,
        Err(LeaseError::StoreUnavailable(_))
    ));
    // 释放失败不影响之后的获取
    assert!(manager.acquire_lease(&k).await.is_ok());
}

#[tokio::test]
async fn test_release_with_foreign_lease_id_keeps_lease() {
    let manager = ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new()));
    let k = key("c1");
    let _lease = manager.acquire_lease(&k).await.unwrap();

    assert!(manager.release_lease(&k, "not-mine").await.is_err());
    assert!(matches!(
        manager.acquire_lease(&k).await,
        Err(LeaseError::Contention(_))
    ));
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let manager = ConversationLeaseManager::new(Arc::new(MemoryBlobStore::new()));
    let empty: ConversationKey = serde_json::from_str("\"\"").unwrap();
    assert_eq!(manager.acquire_lease(&empty).await, Err(LeaseError::InvalidKey));
}

/// 容器创建失败一次之后恢复
struct FlakyContainerStore {
    inner: MemoryBlobStore,
    failures_left: std::sync::Mutex<u32>,
    create_calls: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl BlobStore for FlakyContainerStore {
    async fn create_container_if_not_exists(&self) -> Result<(), StoreError> {
        self.create_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(StoreError::Backend("container service unavailable".into()));
        }
        Ok(())
    }

    async fn acquire_lease(&self, blob: &str, duration_secs: u32) -> Result<String, StoreError> {
        self.inner.acquire_lease(blob, duration_secs).await
    }

    async fn release_lease(&self, blob: &str, lease_id: &str) -> Result<(), StoreError> {
        self.inner.release_lease(blob, lease_id).await
    }

    async fn blob_exists(&self, blob: &str) -> Result<bool, StoreError> {
        self.inner.blob_exists(blob).await
    }

    async fn create_empty_blob(&self, blob: &str) -> Result<(), StoreError> {
        self.inner.create_empty_blob(blob).await
    }
}

#[tokio::test]
async fn test_container_creation_failure_is_retried() {
    let store = Arc::new(FlakyContainerStore {
        inner: MemoryBlobStore::new(),
        failures_left: std::sync::Mutex::new(1),
        create_calls: std::sync::atomic::AtomicU32::new(0),
    });
    let manager = ConversationLeaseManager::new(store.clone());
    let k = key("c1");

    assert!(matches!(
        manager.acquire_lease(&k).await,
        Err(LeaseError::StoreUnavailable(_))
    ));
    let lease = manager.acquire_lease(&k).await.unwrap();
    manager.release_lease(&k, &lease.lease_id).await.unwrap();
    manager.acquire_lease(&k).await.unwrap();

    // 成功之后不再重复创建容器
    assert_eq!(
        store.create_calls.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn test_sqlite_instances_share_leases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leases.db");
    let first = ConversationLeaseManager::new(Arc::new(SqliteBlobStore::new(&path)));
    let second = ConversationLeaseManager::new(Arc::new(SqliteBlobStore::new(&path)));
    let k = key("c1");

    let lease = first.acquire_lease(&k).await.unwrap();
    assert!(matches!(
        second.acquire_lease(&k).await,
        Err(LeaseError::Contention(_))
    ));
    assert!(second.acquire_lease(&key("c2")).await.is_ok());

    first.release_lease(&k, &lease.lease_id).await.unwrap();
    assert!(second.acquire_lease(&k).await.is_ok());
}
