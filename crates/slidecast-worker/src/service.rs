//! Render service: job submission, status and cancellation.

use std::sync::Arc;

use chrono::Utc;
use slidecast_jobs::JobStore;
use slidecast_media::{Encoder, MediaFetcher};
use slidecast_models::{Job, JobId, JobPatch, JobStatus, RenderRequest};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::controls::{ControlTable, JobControl};
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::{cleanup_job_dir, RenderPipeline};

/// Result of a cancel request.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job was pending or processing and is now cancelled.
    Cancelled(Job),
    /// The job had already reached a terminal state; nothing changed.
    AlreadyFinished(Job),
}

impl CancelOutcome {
    pub fn job(&self) -> &Job {
        match self {
            CancelOutcome::Cancelled(job) | CancelOutcome::AlreadyFinished(job) => job,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled(_) => "Job cancelled",
            CancelOutcome::AlreadyFinished(_) => "Job already finished",
        }
    }
}

/// Entry point for render jobs.
pub struct RenderService {
    store: Arc<dyn JobStore>,
    pipeline: Arc<RenderPipeline>,
    controls: ControlTable,
    config: Arc<WorkerConfig>,
    limiter: Option<Arc<Semaphore>>,
}

impl RenderService {
    pub fn new(
        store: Arc<dyn JobStore>,
        encoder: Arc<dyn Encoder>,
        fetcher: Arc<dyn MediaFetcher>,
        config: WorkerConfig,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = match config.max_concurrent_jobs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let pipeline = Arc::new(RenderPipeline::new(
            store.clone(),
            encoder,
            fetcher,
            config.clone(),
        ));

        Self {
            store,
            pipeline,
            controls: ControlTable::new(),
            config,
            limiter,
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Jobs submitted but not yet finished.
    pub fn active_jobs(&self) -> usize {
        self.controls.len()
    }

    /// Validate `request`, create a pending job and start it in the background.
    ///
    /// Returns as soon as the job record exists. Invalid requests never
    /// create a job.
    pub async fn submit(&self, request: RenderRequest) -> WorkerResult<Job> {
        request.validate()?;

        let job_id = JobId::new();
        let job = Job::new(job_id.clone(), Utc::now());
        self.store
            .create(job.clone())
            .await
            .map_err(WorkerError::from_store)?;

        let control = self.controls.register(&job_id);
        metrics::record_job_submitted();
        info!(
            job_id = %job_id,
            scenes = request.scenes.len(),
            duration = request.total_duration(),
            "Render job accepted"
        );

        tokio::spawn(supervise(
            job_id,
            Arc::new(request),
            control,
            self.pipeline.clone(),
            self.store.clone(),
            self.controls.clone(),
            self.config.clone(),
            self.limiter.clone(),
        ));

        Ok(job)
    }

    /// Latest snapshot of a job.
    pub async fn status(&self, job_id: &JobId) -> WorkerResult<Job> {
        self.store.get(job_id).await.map_err(WorkerError::from_store)
    }

    /// All retained jobs, newest first.
    pub async fn list(&self) -> WorkerResult<Vec<Job>> {
        self.store.list().await.map_err(WorkerError::from_store)
    }

    /// Cancel a job.
    ///
    /// The `cancelled` transition is committed first so a completion racing
    /// with this call cannot be overwritten. Only then are the job's
    /// processes signalled and its working directory removed. Cancelling a
    /// finished job is a no-op.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<CancelOutcome> {
        let patch = JobPatch::new().status(JobStatus::Cancelled);
        let job = match self.store.update(job_id, patch).await {
            Ok(job) => job,
            Err(e) if e.terminal_status().is_some() => {
                debug!(job_id = %job_id, "Cancel ignored: {}", e);
                let job = self.status(job_id).await?;
                return Ok(CancelOutcome::AlreadyFinished(job));
            }
            Err(e) => return Err(WorkerError::from_store(e)),
        };

        metrics::record_job_cancelled();

        if let Some(control) = self.controls.get(job_id) {
            let signalled = control.cancel();
            info!(job_id = %job_id, processes = signalled, "Job cancelled");
            if signalled > 0 {
                schedule_kill(control, self.config.cancel_grace);
            }
        } else {
            info!(job_id = %job_id, "Job cancelled");
        }

        cleanup_job_dir(&self.config, job_id).await;

        Ok(CancelOutcome::Cancelled(job))
    }
}

/// SIGKILL whatever survives the grace period.
fn schedule_kill(control: Arc<JobControl>, grace: std::time::Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let killed = control.kill_remaining();
        if killed > 0 {
            warn!(processes = killed, "Force-killed processes after cancel grace period");
        }
    });
}

/// Background task of one job: waits for a slot, runs the pipeline in its
/// own task and records a failure if that task panics.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    job_id: JobId,
    request: Arc<RenderRequest>,
    control: Arc<JobControl>,
    pipeline: Arc<RenderPipeline>,
    store: Arc<dyn JobStore>,
    controls: ControlTable,
    config: Arc<WorkerConfig>,
    limiter: Option<Arc<Semaphore>>,
) {
    let _permit = match limiter {
        Some(semaphore) => {
            debug!(job_id = %job_id, available = semaphore.available_permits(), "Waiting for render slot");
            tokio::select! {
                biased;
                _ = control.cancelled() => {
                    controls.remove(&job_id);
                    return;
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        error!(job_id = %job_id, "Render slot unavailable: {}", e);
                        record_failure(&store, &job_id, "Internal error: render slot unavailable").await;
                        controls.remove(&job_id);
                        return;
                    }
                },
            }
        }
        None => None,
    };

    let task = tokio::spawn({
        let job_id = job_id.clone();
        let control = control.clone();
        async move { pipeline.execute(job_id, request, control).await }
    });

    if let Err(e) = task.await {
        error!(job_id = %job_id, "Render task aborted: {}", e);
        record_failure(&store, &job_id, "Internal error: render task aborted").await;
        cleanup_job_dir(&config, &job_id).await;
    }

    controls.remove(&job_id);
}

async fn record_failure(store: &Arc<dyn JobStore>, job_id: &JobId, message: &str) {
    metrics::record_job_failed();
    let patch = JobPatch::new().status(JobStatus::Failed).error(message);
    if let Err(e) = store.update(job_id, patch).await {
        warn!(job_id = %job_id, "Failed to record job failure: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_outcome_messages() {
        let job = Job::new(JobId::from_string("job-1"), Utc::now());
        let cancelled = CancelOutcome::Cancelled(job.clone());
        let finished = CancelOutcome::AlreadyFinished(job);

        assert_eq!(cancelled.message(), "Job cancelled");
        assert_eq!(finished.message(), "Job already finished");
        assert_eq!(finished.job().job_id.as_str(), "job-1");
    }
}
