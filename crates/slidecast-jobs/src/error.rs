//! Registry error types.

use slidecast_models::{JobId, JobStatus, PatchError};
use thiserror::Error;

pub type JobsResult<T> = Result<T, JobsError>;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Update rejected for job {job_id}: {source}")]
    Rejected {
        job_id: JobId,
        #[source]
        source: PatchError,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl JobsError {
    pub fn rejected(job_id: &JobId, source: PatchError) -> Self {
        Self::Rejected {
            job_id: job_id.clone(),
            source,
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Terminal status the update ran into, if that is why it was rejected.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        match self {
            JobsError::Rejected {
                source: PatchError::Terminal(status),
                ..
            } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobsError::NotFound(_))
    }
}
