use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Connection, Pool};
use tracing::{debug, warn};

use crate::models::RecalculationJob;
use crate::queue::{decode_job, encode_job, Delivery, JobQueue, QueueError};

/// Promotes due delayed jobs, then moves one ready job to the in-flight
/// list and records its lease deadline.
const RESERVE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, payload in ipairs(due) do
    redis.call('ZREM', KEYS[2], payload)
    redis.call('LPUSH', KEYS[1], payload)
end
local payload = redis.call('RPOPLPUSH', KEYS[1], KEYS[3])
if payload then
    redis.call('HSET', KEYS[4], payload, ARGV[2])
end
return payload
"#;

const ACK_SCRIPT: &str = r#"
redis.call('LREM', KEYS[1], 1, ARGV[1])
return redis.call('HDEL', KEYS[2], ARGV[1])
"#;

const REQUEUE_EXPIRED_SCRIPT: &str = r#"
local entries = redis.call('HGETALL', KEYS[3])
local moved = 0
for i = 1, #entries, 2 do
    local payload = entries[i]
    if tonumber(entries[i + 1]) <= tonumber(ARGV[1]) then
        redis.call('LREM', KEYS[2], 1, payload)
        redis.call('HDEL', KEYS[3], payload)
        redis.call('RPUSH', KEYS[1], payload)
        moved = moved + 1
    end
end
return moved
"#;

/// Redis-backed [`JobQueue`].
///
/// Layout under `queue:<name>`:
/// - `:ready` list, pushed left and popped right
/// - `:delayed` sorted set scored by ready-at milliseconds
/// - `:processing` list of reserved payloads
/// - `:leases` hash from payload to lease deadline
///
/// The serialized job doubles as the delivery receipt; every retry gets a
/// fresh `enqueued_at`, so payloads are unique.
#[derive(Clone)]
pub struct RedisJobQueue {
    pool: Pool,
    ready_key: String,
    delayed_key: String,
    processing_key: String,
    leases_key: String,
    visibility_timeout: Duration,
}

impl RedisJobQueue {
    pub fn new(pool: Pool, name: &str, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            ready_key: format!("queue:{}:ready", name),
            delayed_key: format!("queue:{}:delayed", name),
            processing_key: format!("queue:{}:processing", name),
            leases_key: format!("queue:{}:leases", name),
            visibility_timeout,
        }
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))
    }
}

fn command_error(e: redis::RedisError) -> QueueError {
    if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
        QueueError::Connection(e.to_string())
    } else {
        QueueError::Command(e.to_string())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &RecalculationJob, delay: Duration) -> Result<(), QueueError> {
        let payload = encode_job(job)?;
        let mut conn = self.connection().await?;

        if delay.is_zero() {
            let _: i64 = conn.lpush(&self.ready_key, &payload).await.map_err(command_error)?;
        } else {
            let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            let _: i64 = conn
                .zadd(&self.delayed_key, &payload, ready_at)
                .await
                .map_err(command_error)?;
        }

        debug!(job_id = %job.id, attempt = job.attempt, delay_ms = delay.as_millis() as u64, "Enqueued job");
        Ok(())
    }

    async fn reserve(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let now = Utc::now().timestamp_millis();
        let lease_until = now + self.visibility_timeout.as_millis() as i64;

        let payload: Option<String> = redis::Script::new(RESERVE_SCRIPT)
            .key(&self.ready_key)
            .key(&self.delayed_key)
            .key(&self.processing_key)
            .key(&self.leases_key)
            .arg(now)
            .arg(lease_until)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match decode_job(&payload) {
            Ok(job) => Ok(Some(Delivery { job, receipt: payload })),
            Err(e) => {
                // an undecodable payload would be redelivered forever; drop it
                warn!(error = %e, payload = %payload, "Discarding malformed job payload");
                let _: i64 = redis::Script::new(ACK_SCRIPT)
                    .key(&self.processing_key)
                    .key(&self.leases_key)
                    .arg(&payload)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(command_error)?;
                Err(e)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::Script::new(ACK_SCRIPT)
            .key(&self.processing_key)
            .key(&self.leases_key)
            .arg(&delivery.receipt)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        debug!(job_id = %delivery.job.id, "Acked job");
        Ok(())
    }

    async fn requeue_expired(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let moved: i64 = redis::Script::new(REQUEUE_EXPIRED_SCRIPT)
            .key(&self.ready_key)
            .key(&self.processing_key)
            .key(&self.leases_key)
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(moved.max(0) as usize)
    }
}
