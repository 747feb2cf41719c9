//! Job status, cancellation and listing handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use slidecast_models::{Job, JobId, JobStatus};

use crate::error::ApiResult;
use crate::state::AppState;

/// Job snapshot with the success flag inlined.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub job: Job,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub success: bool,
    pub jobs: Vec<Job>,
}

pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.renders.status(&JobId::from_string(job_id)).await?;
    Ok(Json(JobStatusResponse { success: true, job }))
}

/// Cancel a job. Cancelling a finished job succeeds without changing it.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let outcome = state.renders.cancel(&JobId::from_string(job_id)).await?;
    let job = outcome.job();

    Ok(Json(CancelJobResponse {
        success: true,
        job_id: job.job_id.to_string(),
        status: job.status,
        message: outcome.message().to_string(),
    }))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<JobListResponse>> {
    let jobs = state.renders.list().await?;
    Ok(Json(JobListResponse {
        success: true,
        jobs,
    }))
}
