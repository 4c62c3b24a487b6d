use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::models::RecalculationJob;
use crate::queue::{Delivery, JobQueue, QueueError};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<RecalculationJob>,
    delayed: Vec<(i64, RecalculationJob)>,
    in_flight: HashMap<String, (RecalculationJob, i64)>,
}

/// Single-process queue with the same delivery semantics as the Redis one.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
}

impl InMemoryJobQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self::with_clock(visibility_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(visibility_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            clock,
            visibility_timeout,
        }
    }

    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.state.lock().delayed.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    fn promote_due(state: &mut QueueState, now_ms: i64) {
        let mut due = Vec::new();
        state.delayed.retain(|(ready_at, job)| {
            if *ready_at <= now_ms {
                due.push((*ready_at, job.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(ready_at, _)| *ready_at);
        state.ready.extend(due.into_iter().map(|(_, job)| job));
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &RecalculationJob, delay: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if delay.is_zero() {
            state.ready.push_back(job.clone());
        } else {
            let ready_at = self.clock.now_ms() + delay.as_millis() as i64;
            state.delayed.push((ready_at, job.clone()));
        }
        Ok(())
    }

    async fn reserve(&self) -> Result<Option<Delivery>, QueueError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        Self::promote_due(&mut state, now);

        let Some(job) = state.ready.pop_front() else {
            return Ok(None);
        };

        let receipt = uuid::Uuid::new_v4().to_string();
        let lease_until = now + self.visibility_timeout.as_millis() as i64;
        state.in_flight.insert(receipt.clone(), (job.clone(), lease_until));

        Ok(Some(Delivery { job, receipt }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn requeue_expired(&self) -> Result<usize, QueueError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, (_, lease_until))| *lease_until <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in &expired {
            if let Some((job, _)) = state.in_flight.remove(receipt) {
                state.ready.push_back(job);
            }
        }
        Ok(expired.len())
    }
}
