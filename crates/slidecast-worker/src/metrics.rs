//! Render job metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names.
pub mod names {
    pub const JOBS_SUBMITTED: &str = "slidecast_jobs_submitted_total";
    pub const JOBS_COMPLETED: &str = "slidecast_jobs_completed_total";
    pub const JOBS_FAILED: &str = "slidecast_jobs_failed_total";
    pub const JOBS_CANCELLED: &str = "slidecast_jobs_cancelled_total";
    pub const JOBS_ACTIVE: &str = "slidecast_jobs_active";
    pub const JOB_DURATION: &str = "slidecast_job_duration_seconds";
    pub const FFMPEG_STAGE_DURATION: &str = "slidecast_ffmpeg_stage_duration_seconds";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED).increment(1);
}

pub fn record_job_completed(duration: Duration) {
    counter!(names::JOBS_COMPLETED).increment(1);
    histogram!(names::JOB_DURATION).record(duration.as_secs_f64());
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED).increment(1);
}

/// Adjust the number of jobs currently processing.
pub fn record_active_jobs(delta: f64) {
    gauge!(names::JOBS_ACTIVE).increment(delta);
}

/// Record an FFmpeg stage (`scene` or `mux`).
pub fn record_ffmpeg_stage(stage: &'static str, duration: Duration) {
    histogram!(names::FFMPEG_STAGE_DURATION, "stage" => stage).record(duration.as_secs_f64());
}
