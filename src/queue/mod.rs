//! Task-queue capability for recalculation jobs.
//!
//! Delivery is at-least-once: `reserve` hands out a job under a lease and
//! only `ack` removes it. A job whose lease runs out without an ack (the
//! worker crashed mid-run) goes back to the ready queue on the next
//! `requeue_expired` sweep.

pub mod memory;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RecalculationJob;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A reserved job. `receipt` is the opaque token `ack` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job: RecalculationJob,
    pub receipt: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// `Duration::ZERO` makes the job ready immediately.
    async fn enqueue(&self, job: &RecalculationJob, delay: Duration) -> Result<(), QueueError>;

    /// Takes the oldest ready job, promoting due delayed jobs first.
    async fn reserve(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Returns in-flight jobs with expired leases to the ready queue.
    async fn requeue_expired(&self) -> Result<usize, QueueError>;
}

pub(crate) fn encode_job(job: &RecalculationJob) -> Result<String, QueueError> {
    serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))
}

pub(crate) fn decode_job(payload: &str) -> Result<RecalculationJob, QueueError> {
    serde_json::from_str(payload).map_err(|e| QueueError::Serialization(e.to_string()))
}
