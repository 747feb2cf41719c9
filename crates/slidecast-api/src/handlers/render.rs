//! Render submission handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use slidecast_models::{JobStatus, RenderRequest};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRenderResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// Start a render job.
///
/// Returns as soon as the job exists; rendering continues in the
/// background and is observed through the status endpoint.
pub async fn submit_render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitRenderResponse>> {
    let Json(request) = payload?;
    let scenes = request.scenes.len();

    let job = state.renders.submit(request).await?;
    info!(job_id = %job.job_id, scenes, "Render submitted");

    Ok(Json(SubmitRenderResponse {
        success: true,
        job_id: job.job_id.to_string(),
        status: job.status,
        message: "Render job started".to_string(),
    }))
}
