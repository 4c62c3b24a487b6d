use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to recompute every cached price.
///
/// Carries no business payload: one job always means "recompute
/// everything". The fields are delivery metadata used by the worker to
/// bound retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationJob {
    pub id: Uuid,
    pub attempt: u32,
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl RecalculationJob {
    pub fn new(max_retries: u32, backoff_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 0,
            max_retries,
            backoff_secs,
            enqueued_at: Utc::now(),
        }
    }

    /// Same job, one attempt later. The id is kept so status lookups follow
    /// the job across retries.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }
}

/// Result of one pipeline run, inspected by the worker to decide what
/// happens to the delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { updated_count: usize },
    Skipped { reason: String },
    RetryableFailure { reason: String },
    PermanentFailure { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Success,
    Skipped,
    Retrying,
    Failed,
}

/// Last recorded state of a job, stored under `job:<id>:status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub attempt: u32,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(job: &RecalculationJob, status: JobState, updated_count: Option<usize>, reason: Option<String>) -> Self {
        Self {
            job_id: job.id,
            attempt: job.attempt,
            status,
            updated_count,
            reason,
            finished_at: Utc::now(),
        }
    }
}

pub fn job_status_key(job_id: &Uuid) -> String {
    format!("job:{}:status", job_id)
}
