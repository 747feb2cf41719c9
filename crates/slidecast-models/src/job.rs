//! Render job record and its lifecycle.
//!
//! A [`Job`] is only ever mutated through [`Job::apply`], which takes a
//! [`JobPatch`] and enforces the lifecycle rules: terminal states are final,
//! progress never regresses, and the step log is append-only.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, background work not started yet
    #[default]
    Pending,
    /// Background pipeline is running
    Processing,
    /// Output published
    Completed,
    /// Pipeline stopped on an error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed entry of the step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Result data recorded when a job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// Fetchable location of the rendered file
    pub output_ref: String,
    pub file_size_bytes: u64,
    /// Wall-clock time the job took
    pub duration_seconds: f64,
}

/// A render job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), never decreases
    #[serde(default)]
    pub progress: u8,

    /// Append-only log of completed steps
    #[serde(default)]
    pub steps: Vec<StepEntry>,

    /// In-flight step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(job_id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            progress: 0,
            steps: Vec::new(),
            current_step: None,
            output_ref: None,
            file_size_bytes: None,
            duration_seconds: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time the job reached its terminal state, if it did.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at).or(self.cancelled_at)
    }

    /// Apply a patch as one unit.
    ///
    /// Either every field of the patch is applied or, on error, none is.
    pub fn apply(&mut self, patch: JobPatch, now: DateTime<Utc>) -> Result<(), PatchError> {
        if self.status.is_terminal() {
            return Err(PatchError::Terminal(self.status));
        }

        if let Some(next) = patch.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(PatchError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        if let Some(progress) = patch.progress {
            self.progress = self.progress.max(progress.min(100));
        }

        if !patch.steps.is_empty() {
            self.current_step = None;
            self.steps
                .extend(patch.steps.into_iter().map(|message| StepEntry {
                    message,
                    timestamp: now,
                }));
        }

        if let Some(message) = patch.current_step {
            self.current_step = Some(message);
        }

        if let Some(output) = patch.output {
            self.output_ref = Some(output.output_ref);
            self.file_size_bytes = Some(output.file_size_bytes);
            self.duration_seconds = Some(output.duration_seconds);
        }

        if let Some(message) = patch.error_message {
            self.error_message = Some(message);
        }

        if let Some(next) = patch.status {
            if next != self.status {
                self.enter(next, now);
            }
        }

        self.updated_at = now;
        Ok(())
    }

    fn enter(&mut self, next: JobStatus, now: DateTime<Utc>) {
        self.status = next;
        match next {
            JobStatus::Pending => {}
            JobStatus::Processing => {
                self.started_at.get_or_insert(now);
            }
            JobStatus::Completed => {
                self.progress = 100;
                self.current_step = None;
                self.completed_at = Some(now);
            }
            JobStatus::Failed => {
                self.current_step = None;
                self.failed_at = Some(now);
            }
            JobStatus::Cancelled => {
                self.current_step = None;
                self.error_message = None;
                self.cancelled_at = Some(now);
            }
        }
    }
}

/// Partial update of a [`Job`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub steps: Vec<String>,
    /// New in-flight step. Appending a step or entering a terminal state clears it.
    pub current_step: Option<String>,
    pub output: Option<JobOutput>,
    pub error_message: Option<String>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Append a completed step. Clears the in-flight step unless the same
    /// patch sets a new one.
    pub fn step(mut self, message: impl Into<String>) -> Self {
        self.steps.push(message.into());
        self
    }

    pub fn current_step(mut self, message: impl Into<String>) -> Self {
        self.current_step = Some(message.into());
        self
    }

    pub fn output(mut self, output: JobOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Patch rejected by the lifecycle rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("job is already {0}")]
    Terminal(JobStatus),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId::new(), Utc::now())
    }

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
        assert_eq!(JobId::from_string("abc").as_str(), "abc");
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);

        job.apply(JobPatch::new().status(JobStatus::Processing).progress(5), Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.apply(JobPatch::new().current_step("rendering scene 1/2"), Utc::now())
            .unwrap();
        assert_eq!(job.current_step.as_deref(), Some("rendering scene 1/2"));

        job.apply(JobPatch::new().step("scene 1/2 done").progress(40), Utc::now())
            .unwrap();
        assert!(job.current_step.is_none());
        assert_eq!(job.steps.len(), 1);

        job.apply(
            JobPatch::new()
                .status(JobStatus::Completed)
                .step("render finished")
                .output(JobOutput {
                    output_ref: "http://localhost/videos/x/output.mp4".into(),
                    file_size_bytes: 1024,
                    duration_seconds: 12.5,
                }),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert_eq!(job.file_size_bytes, Some(1024));
        assert_eq!(job.steps.last().unwrap().message, "render finished");
    }

    #[test]
    fn test_progress_never_regresses_and_is_clamped() {
        let mut job = job();
        job.apply(JobPatch::new().status(JobStatus::Processing).progress(60), Utc::now())
            .unwrap();
        job.apply(JobPatch::new().progress(30), Utc::now()).unwrap();
        assert_eq!(job.progress, 60);
        job.apply(JobPatch::new().progress(250), Utc::now()).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = job();
        job.apply(JobPatch::new().status(JobStatus::Cancelled), Utc::now())
            .unwrap();
        let snapshot = job.clone();

        let err = job
            .apply(JobPatch::new().status(JobStatus::Processing).progress(50), Utc::now())
            .unwrap_err();
        assert_eq!(err, PatchError::Terminal(JobStatus::Cancelled));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut job = job();
        let err = job
            .apply(JobPatch::new().status(JobStatus::Completed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_cancel_clears_error_and_current_step() {
        let mut job = job();
        job.apply(
            JobPatch::new()
                .status(JobStatus::Processing)
                .current_step("encoding video 10%"),
            Utc::now(),
        )
        .unwrap();
        job.apply(JobPatch::new().status(JobStatus::Cancelled), Utc::now())
            .unwrap();
        assert!(job.current_step.is_none());
        assert!(job.error_message.is_none());
        assert!(job.cancelled_at.is_some());
        assert!(job.completed_at.is_none());
        assert!(job.failed_at.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Cancelled).unwrap(), "\"cancelled\"");
        let json = serde_json::to_value(job()).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("currentStep").is_none());
        assert_eq!(json["status"], "pending");
    }
}
