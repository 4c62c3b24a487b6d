use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{CacheStore, LockHandle, LockOutcome, StoreError};

/// Named, time-bounded mutual exclusion shared by every worker process.
///
/// Acquisition is one non-blocking attempt. The hold time caps how long a
/// crashed holder can keep others out.
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
    name: String,
    hold: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CacheStore>, name: impl Into<String>, hold: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            hold,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn try_acquire(&self) -> Result<LockOutcome, StoreError> {
        let outcome = self.store.acquire_lock(&self.name, self.hold).await?;
        debug!(lock = %self.name, acquired = matches!(outcome, LockOutcome::Acquired(_)), "Lock attempt");
        Ok(outcome)
    }

    /// Returns `false` if the hold time ran out before we released.
    pub async fn release(&self, handle: LockHandle) -> Result<bool, StoreError> {
        let released = self.store.release(&handle).await?;
        if !released {
            warn!(lock = %self.name, "Lock expired before release; another holder may have started");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_second_attempt_is_denied_while_held() {
        let store = Arc::new(InMemoryStore::new());
        let lock_a = DistributedLock::new(store.clone(), "recalculate_global_lock", Duration::from_secs(60));
        let lock_b = DistributedLock::new(store, "recalculate_global_lock", Duration::from_secs(60));

        let handle = match lock_a.try_acquire().await.unwrap() {
            LockOutcome::Acquired(handle) => handle,
            LockOutcome::Denied => panic!("expected first holder to win"),
        };
        assert_eq!(lock_b.try_acquire().await.unwrap(), LockOutcome::Denied);

        assert!(lock_a.release(handle).await.unwrap());
        assert!(matches!(lock_b.try_acquire().await.unwrap(), LockOutcome::Acquired(_)));
    }

    #[tokio::test]
    async fn test_hold_time_expiry_frees_lock() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let lock = DistributedLock::new(store, "recalculate_global_lock", Duration::from_secs(60));

        let crashed = lock.try_acquire().await.unwrap();
        assert!(matches!(crashed, LockOutcome::Acquired(_)));

        clock.advance(Duration::from_secs(60));
        assert!(matches!(lock.try_acquire().await.unwrap(), LockOutcome::Acquired(_)));
    }
}
