//! Queue consumer for recalculation jobs.
//!
//! Each consumer reserves one delivery, runs it and then settles it:
//!
//! | Outcome            | Status recorded        | Delivery                 |
//! |--------------------|------------------------|--------------------------|
//! | `Success`          | `success`              | acked                    |
//! | `Skipped`          | `skipped`              | acked                    |
//! | `RetryableFailure` | `retrying` or `failed` | retry enqueued, acked    |
//! | `PermanentFailure` | `failed`               | acked                    |
//!
//! Acks are late. If the retry cannot be enqueued the delivery is left
//! unacked so its lease runs out and the queue hands it out again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::jobs::RecalculationRunner;
use crate::models::{JobState, JobStatus, RunOutcome};
use crate::queue::{Delivery, JobQueue, QueueError};
use crate::services::job_status_service::record_job_status;
use crate::store::CacheStore;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub status_ttl: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.worker_poll_interval(),
            status_ttl: config.job_status_ttl(),
        }
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    runner: Arc<dyn RecalculationRunner>,
    store: Arc<dyn CacheStore>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        runner: Arc<dyn RecalculationRunner>,
        store: Arc<dyn CacheStore>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            runner,
            store,
            settings,
        }
    }

    /// Reserves and settles at most one job. `Ok(None)` means the queue was
    /// empty.
    pub async fn process_next(&self) -> Result<Option<RunOutcome>, QueueError> {
        let Some(delivery) = self.queue.reserve().await? else {
            return Ok(None);
        };

        let job = &delivery.job;
        info!(job_id = %job.id, attempt = job.attempt, "Processing recalculation job");
        let outcome = self.runner.run(job).await;
        self.settle(&delivery, &outcome).await?;
        Ok(Some(outcome))
    }

    async fn settle(&self, delivery: &Delivery, outcome: &RunOutcome) -> Result<(), QueueError> {
        let job = &delivery.job;
        let status = match outcome {
            RunOutcome::Success { updated_count } => {
                JobStatus::new(job, JobState::Success, Some(*updated_count), None)
            }
            RunOutcome::Skipped { reason } => JobStatus::new(job, JobState::Skipped, None, Some(reason.clone())),
            RunOutcome::RetryableFailure { reason } if job.can_retry() => {
                let retry = job.next_attempt();
                let backoff = Duration::from_secs(job.backoff_secs);
                if let Err(e) = self.queue.enqueue(&retry, backoff).await {
                    error!(job_id = %job.id, "Could not enqueue retry, leaving delivery for redelivery: {}", e);
                    return Err(e);
                }
                info!(
                    job_id = %job.id,
                    next_attempt = retry.attempt,
                    backoff_secs = job.backoff_secs,
                    "Scheduled retry"
                );
                JobStatus::new(job, JobState::Retrying, None, Some(reason.clone()))
            }
            RunOutcome::RetryableFailure { reason } => {
                error!(
                    job_id = %job.id,
                    attempts = job.attempt + 1,
                    "Retry budget exhausted: {}",
                    reason
                );
                JobStatus::new(job, JobState::Failed, None, Some(reason.clone()))
            }
            RunOutcome::PermanentFailure { reason } => {
                JobStatus::new(job, JobState::Failed, None, Some(reason.clone()))
            }
        };

        if let Err(e) = record_job_status(self.store.as_ref(), &status, self.settings.status_ttl).await {
            warn!(job_id = %job.id, "Failed to record job status: {}", e);
        }

        self.queue.ack(delivery).await
    }

    /// Consumes until `cancel` fires. A job already running is finished
    /// before the loop checks for cancellation again.
    pub async fn run(&self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("Worker queue error: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!("Worker stopped");
    }

    pub async fn run_pool(self: Arc<Self>, concurrency: usize, cancel: CancellationToken) {
        info!("🚀 Starting {} worker consumers", concurrency);
        let consumers = (0..concurrency.max(1)).map(|_| {
            let worker = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        });

        for result in futures::future::join_all(consumers).await {
            if let Err(e) = result {
                error!("Worker consumer panicked: {}", e);
            }
        }
    }
}
