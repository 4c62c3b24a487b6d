//! Key-value store capability shared by the request path, the workers and
//! the distributed lock.
//!
//! Two adapters implement [`CacheStore`]:
//! - [`redis_store::RedisStore`]: the shared production store
//! - [`memory::InMemoryStore`]: single-process store with an injectable clock

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Proof of holding a named lock. The token identifies this holder so a
/// release cannot remove a lock someone else acquired after ours expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(LockHandle),
    Denied,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Unconditional overwrite with an expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Single non-blocking attempt. Returns `Denied` if any holder exists.
    async fn acquire_lock(&self, name: &str, timeout: Duration) -> Result<LockOutcome, StoreError>;

    /// Returns `false` when the lock had already expired or changed hands.
    async fn release(&self, handle: &LockHandle) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub fn price_key(product_id: &str) -> String {
    format!("price:{}", product_id)
}

pub(crate) fn new_lock_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
