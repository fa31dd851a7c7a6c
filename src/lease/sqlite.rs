//! SQLite 租约存储
//!
//! 同一主机上的多个机器人进程共享一个数据库文件即可互斥同一会话。
//! 每次操作打开独立连接并在 IMMEDIATE 事务中完成检查与写入，过期时间使用墙钟毫秒。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::store::{BlobStore, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite blob 容器（表 `lease_blobs`）
#[derive(Debug, Clone)]
pub struct SqliteBlobStore {
    path: PathBuf,
}

/// 行状态：(lease_id, lease_expires_at_ms)
type LeaseRow = (Option<String>, Option<i64>);

impl SqliteBlobStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        Ok(conn)
    }

    /// 在阻塞线程池里执行一次数据库操作
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("sqlite task failed: {}", e)))?
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn lease_is_active(row: &LeaseRow, now: i64) -> bool {
    matches!(row, (Some(_), Some(expires_at)) if *expires_at > now)
}

fn read_row(conn: &Connection, blob: &str) -> Result<Option<LeaseRow>, StoreError> {
    conn.query_row(
        "SELECT lease_id, lease_expires_at FROM lease_blobs WHERE name = ?1",
        params![blob],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(backend)
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn create_container_if_not_exists(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS lease_blobs (
                    name TEXT PRIMARY KEY,
                    lease_id TEXT,
                    lease_expires_at INTEGER
                );",
            )
            .map_err(backend)
        })
        .await
    }

    async fn acquire_lease(&self, blob: &str, duration_secs: u32) -> Result<String, StoreError> {
        let blob = blob.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let now = now_ms();
            let row = read_row(&tx, &blob)?.ok_or_else(|| StoreError::BlobNotFound(blob.clone()))?;
            if lease_is_active(&row, now) {
                return Err(StoreError::LeaseAlreadyPresent(blob));
            }
            let lease_id = uuid::Uuid::new_v4().to_string();
            let expires_at = now + i64::from(duration_secs) * 1000;
            tx.execute(
                "UPDATE lease_blobs SET lease_id = ?1, lease_expires_at = ?2 WHERE name = ?3",
                params![lease_id, expires_at, blob],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)?;
            Ok(lease_id)
        })
        .await
    }

    async fn release_lease(&self, blob: &str, lease_id: &str) -> Result<(), StoreError> {
        let blob = blob.to_string();
        let lease_id = lease_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let row = read_row(&tx, &blob)?.ok_or_else(|| StoreError::BlobNotFound(blob.clone()))?;
            if !lease_is_active(&row, now_ms()) {
                return Err(StoreError::LeaseNotPresent(blob));
            }
            if row.0.as_deref() != Some(lease_id.as_str()) {
                return Err(StoreError::LeaseIdMismatch(blob));
            }
            tx.execute(
                "UPDATE lease_blobs SET lease_id = NULL, lease_expires_at = NULL WHERE name = ?1",
                params![blob],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn blob_exists(&self, blob: &str) -> Result<bool, StoreError> {
        let blob = blob.to_string();
        self.with_conn(move |conn| Ok(read_row(conn, &blob)?.is_some()))
            .await
    }

    async fn create_empty_blob(&self, blob: &str) -> Result<(), StoreError> {
        let blob = blob.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            match read_row(&tx, &blob)? {
                Some(row) if lease_is_active(&row, now_ms()) => {
                    return Err(StoreError::LeaseAlreadyPresent(blob));
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE lease_blobs SET lease_id = NULL, lease_expires_at = NULL WHERE name = ?1",
                        params![blob],
                    )
                    .map_err(backend)?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO lease_blobs (name, lease_id, lease_expires_at) VALUES (?1, NULL, NULL)",
                        params![blob],
                    )
                    .map_err(backend)?;
                }
            }
            tx.commit().map_err(backend)
        })
        .await
    }
}
