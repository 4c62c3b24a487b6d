use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::queue::{JobQueue, QueueError};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically returns jobs abandoned by crashed workers to the ready
/// queue.
pub struct QueueMaintenanceService {
    scheduler: JobScheduler,
    queue: Arc<dyn JobQueue>,
    interval: Duration,
}

impl QueueMaintenanceService {
    pub async fn new(queue: Arc<dyn JobQueue>, interval: Duration) -> Result<Self, QueueError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| QueueError::Command(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            queue,
            interval,
        })
    }

    pub async fn start(&mut self) -> Result<(), QueueError> {
        let queue = self.queue.clone();
        let job = Job::new_repeated_async(self.interval, move |_uuid, _l| {
            let queue = queue.clone();
            Box::pin(async move {
                sweep(queue.as_ref()).await;
            })
        })
        .map_err(|e| QueueError::Command(format!("Failed to create sweep job: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| QueueError::Command(format!("Failed to add sweep job: {}", e)))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| QueueError::Command(format!("Failed to start scheduler: {}", e)))?;

        info!("📅 Scheduled: requeue_expired every {:?}", self.interval);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), QueueError> {
        info!("🛑 Stopping queue maintenance...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| QueueError::Command(format!("Failed to stop scheduler: {}", e)))?;
        Ok(())
    }
}

/// One maintenance pass. Errors are logged; the next tick tries again.
pub async fn sweep(queue: &dyn JobQueue) -> usize {
    match queue.requeue_expired().await {
        Ok(0) => 0,
        Ok(moved) => {
            info!("Requeued {} expired job deliveries", moved);
            moved
        }
        Err(e) => {
            error!("Failed to requeue expired jobs: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::RecalculationJob;
    use crate::queue::memory::InMemoryJobQueue;

    #[tokio::test]
    async fn test_sweep_redelivers_abandoned_job() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = InMemoryJobQueue::with_clock(Duration::from_secs(300), clock.clone());
        queue.enqueue(&RecalculationJob::new(5, 30), Duration::ZERO).await.unwrap();
        let _abandoned = queue.reserve().await.unwrap().unwrap();

        assert_eq!(sweep(&queue).await, 0);
        clock.advance(Duration::from_secs(301));
        assert_eq!(sweep(&queue).await, 1);
        assert_eq!(queue.ready_len(), 1);
    }
}
