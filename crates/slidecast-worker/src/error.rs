//! Worker error types.

use slidecast_jobs::JobsError;
use slidecast_media::MediaError;
use slidecast_models::{InputError, JobId};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid render request: {0}")]
    Input(#[from] InputError),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job cancelled")]
    Cancelled,

    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("Job store error: {0}")]
    Store(#[from] JobsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a store error, turning unknown jobs into [`WorkerError::JobNotFound`].
    pub fn from_store(err: JobsError) -> Self {
        match err {
            JobsError::NotFound(id) => Self::JobNotFound(id),
            other => Self::Store(other),
        }
    }

    /// Whether this error is a cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Message recorded on a failed job.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.detail(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_detection() {
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(WorkerError::from(MediaError::Cancelled).is_cancelled());
        assert!(!WorkerError::from(MediaError::FfmpegNotFound).is_cancelled());
    }

    #[test]
    fn test_store_not_found_maps_to_job_not_found() {
        let err = WorkerError::from_store(JobsError::NotFound(JobId::from_string("x")));
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[test]
    fn test_user_message_includes_ffmpeg_stderr() {
        let err = WorkerError::from(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("segment_0003.mp4: No such file or directory".to_string()),
            Some(1),
        ));
        assert_eq!(
            err.user_message(),
            "FFmpeg exited with non-zero status (exit code 1): segment_0003.mp4: No such file or directory"
        );
    }
}
