use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{JobStatus, RecalculationJob};
use crate::services::job_status_service::get_job_status;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/recalculate", post(enqueue_recalculation))
        .route("/:job_id", get(job_status))
}

#[derive(Debug, Serialize)]
struct EnqueuedJob {
    job_id: Uuid,
}

/// POST /api/v1/jobs/recalculate - Queue a full recalculation
async fn enqueue_recalculation(State(state): State<AppState>) -> Result<(StatusCode, Json<EnqueuedJob>), AppError> {
    let job = RecalculationJob::new(state.config.job_max_retries, state.config.job_retry_backoff_secs);

    state.queue.enqueue(&job, Duration::ZERO).await.map_err(|e| {
        error!("Failed to enqueue recalculation job: {}", e);
        AppError::from(e)
    })?;

    info!("POST /jobs/recalculate - Queued job {}", job.id);
    Ok((StatusCode::ACCEPTED, Json(EnqueuedJob { job_id: job.id })))
}

/// GET /api/v1/jobs/:job_id - Latest recorded status
async fn job_status(
    Path(job_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<JobStatus>, AppError> {
    info!("GET /jobs/{} - Getting job status", job_id);
    let status = get_job_status(state.store.as_ref(), &job_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(status))
}
