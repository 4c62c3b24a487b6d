use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::store::{new_lock_token, CacheStore, LockHandle, LockOutcome, StoreError};

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at_ms: i64,
}

impl StoredValue {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// DashMap-backed store for single-node runs and tests.
///
/// Expiry is evaluated lazily against the injected clock on every read, so
/// advancing a `ManualClock` past the TTL makes entries disappear exactly as
/// they would in Redis.
#[derive(Clone)]
pub struct InMemoryStore {
    values: Arc<DashMap<String, StoredValue>>,
    locks: Arc<DashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            locks: Arc::new(DashMap::new()),
            clock,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent `set` fail, to exercise degraded paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.values.iter().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_ms() + ttl.as_millis() as i64
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now_ms();
        if let Some(entry) = self.values.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.data.clone()));
            }
            drop(entry); // release the shard read lock before removing
            self.values.remove_if(key, |_, value| value.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("writes disabled".to_string()));
        }
        let stored = StoredValue {
            data: value,
            expires_at_ms: self.expiry(ttl),
        };
        self.values.insert(key.to_string(), stored);
        Ok(())
    }

    async fn acquire_lock(&self, name: &str, timeout: Duration) -> Result<LockOutcome, StoreError> {
        let now = self.clock.now_ms();
        let token = new_lock_token();
        let stored = StoredValue {
            data: token.clone().into_bytes(),
            expires_at_ms: self.expiry(timeout),
        };

        // the entry API holds the shard write lock, making check-and-set atomic
        match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Ok(LockOutcome::Denied);
                }
                occupied.insert(stored);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
            }
        }

        Ok(LockOutcome::Acquired(LockHandle {
            name: name.to_string(),
            token,
        }))
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let removed = self.locks.remove_if(&handle.name, |_, value| {
            !value.is_expired(now) && value.data == handle.token.as_bytes()
        });
        Ok(removed.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
