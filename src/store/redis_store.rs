use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Connection, Pool};
use tracing::{debug, info};

use crate::store::{new_lock_token, CacheStore, LockHandle, LockOutcome, StoreError};

/// Deletes the lock only if it still holds our token.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const POOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the connection pool shared by the store and the job queue.
pub fn create_redis_pool(url: &str) -> Result<Pool, StoreError> {
    let mut config = deadpool_redis::Config::from_url(url);
    let pool_config = config.pool.get_or_insert_with(deadpool_redis::PoolConfig::default);
    pool_config.timeouts.wait = Some(POOL_TIMEOUT);
    pool_config.timeouts.create = Some(POOL_TIMEOUT);
    pool_config.timeouts.recycle = Some(POOL_TIMEOUT);

    let pool = config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::Connection(format!("failed to create Redis pool: {e}")))?;

    info!(url = %url, "Redis pool created");
    Ok(pool)
}

/// Redis-backed [`CacheStore`]. Expiry is delegated to Redis (`PX`).
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(command_error)?;
        debug!(key = %key, hit = value.is_some(), "Redis GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let ttl_ms = ttl.as_millis() as u64;
        let _: () = conn.pset_ex(key, value, ttl_ms).await.map_err(command_error)?;
        debug!(key = %key, ttl_ms, "Redis SET");
        Ok(())
    }

    async fn acquire_lock(&self, name: &str, timeout: Duration) -> Result<LockOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let token = new_lock_token();

        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(timeout.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        match reply {
            Some(_) => Ok(LockOutcome::Acquired(LockHandle {
                name: name.to_string(),
                token,
            })),
            None => Ok(LockOutcome::Denied),
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(&handle.name)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }
}
