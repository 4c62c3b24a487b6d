use std::time::Duration;

use uuid::Uuid;

use crate::models::{job_status_key, JobStatus};
use crate::store::{CacheStore, StoreError};

pub async fn record_job_status(store: &dyn CacheStore, status: &JobStatus, ttl: Duration) -> Result<(), StoreError> {
    let payload = serde_json::to_vec(status).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.set(&job_status_key(&status.job_id), payload, ttl).await
}

pub async fn get_job_status(store: &dyn CacheStore, job_id: &Uuid) -> Result<Option<JobStatus>, StoreError> {
    let Some(bytes) = store.get(&job_status_key(job_id)).await? else {
        return Ok(None);
    };
    let status = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Some(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobState, RecalculationJob};
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_latest_status_wins() {
        let store = InMemoryStore::new();
        let job = RecalculationJob::new(5, 30);

        let retrying = JobStatus::new(&job, JobState::Retrying, None, Some("timeout".to_string()));
        record_job_status(&store, &retrying, Duration::from_secs(3600)).await.unwrap();
        let done = JobStatus::new(&job.next_attempt(), JobState::Success, Some(10), None);
        record_job_status(&store, &done, Duration::from_secs(3600)).await.unwrap();

        let found = get_job_status(&store, &job.id).await.unwrap().unwrap();
        assert_eq!(found.status, JobState::Success);
        assert_eq!(found.attempt, 1);
        assert_eq!(found.updated_count, Some(10));
    }

    #[tokio::test]
    async fn test_unknown_job_has_no_status() {
        let store = InMemoryStore::new();
        assert!(get_job_status(&store, &Uuid::new_v4()).await.unwrap().is_none());
    }
}
