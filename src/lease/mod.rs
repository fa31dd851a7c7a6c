//! 会话租约：跨进程 / 跨实例的会话级互斥
//!
//! - **store**: BlobStore 原语、错误类型、blob 名称规范化
//! - **manager**: ConversationLeaseManager（获取 / 释放）
//! - **memory / sqlite / azure**: 三种存储后端

pub mod azure;
pub mod manager;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use azure::AzureBlobStore;
pub use manager::{ConversationLeaseManager, Lease};
pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;
pub use store::{sanitize_blob_key, BlobStore, LeaseError, StoreError, MAX_LEASE_SECS};
