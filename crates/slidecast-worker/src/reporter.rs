//! Projection of pipeline progress onto the job record.
//!
//! Every update goes through the job store as one patch. An update rejected
//! because the job reached a terminal state (a concurrent cancel) surfaces as
//! [`WorkerError::Cancelled`], which stops the pipeline.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use slidecast_jobs::JobStore;
use slidecast_media::{FfmpegProgress, ProgressCallback};
use slidecast_models::{Job, JobId, JobPatch, JobStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Progress budget of each pipeline stage.
pub mod budget {
    pub const STARTED: u8 = 5;
    pub const AUDIO_START: u8 = 10;
    pub const AUDIO_DONE: u8 = 15;
    pub const IMAGES_START: u8 = 20;
    pub const IMAGES_DONE: u8 = 30;
    pub const SCENES_START: u8 = 35;
    pub const SCENES_DONE: u8 = 60;
    pub const SUBTITLES_READY: u8 = 62;
    pub const MANIFEST_START: u8 = 65;
    pub const MANIFEST_DONE: u8 = 68;
    pub const ENCODE_START: u8 = 70;
    pub const ENCODE_FLOOR: u8 = 75;
    pub const ENCODE_DONE: u8 = 95;
    pub const OUTPUT_READY: u8 = 98;

    /// Linear interpolation of `done / total` into `[start, end]`.
    pub fn interpolate(start: u8, end: u8, done: usize, total: usize) -> u8 {
        if total == 0 {
            return end;
        }
        let span = end.saturating_sub(start) as usize;
        start + (span * done.min(total) / total) as u8
    }

    /// Map an encoder percentage onto the encode budget.
    pub fn encode(percent: f64) -> u8 {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        let span = (ENCODE_DONE - ENCODE_FLOOR) as f64;
        (ENCODE_FLOOR + (percent * span / 100.0).floor() as u8).clamp(ENCODE_FLOOR, ENCODE_DONE)
    }
}

/// Writes step and progress updates for one job.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    last_progress: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        Self {
            store,
            job_id,
            last_progress: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Highest progress value written so far.
    pub fn last_progress(&self) -> u8 {
        self.last_progress.load(Ordering::Relaxed)
    }

    /// Apply a patch to the job.
    pub async fn apply(&self, patch: JobPatch) -> WorkerResult<Job> {
        let progress = patch.progress;
        match self.store.update(&self.job_id, patch).await {
            Ok(job) => {
                if let Some(p) = progress {
                    self.last_progress.fetch_max(p.min(100), Ordering::Relaxed);
                }
                Ok(job)
            }
            Err(e) if e.terminal_status() == Some(JobStatus::Cancelled) => Err(WorkerError::Cancelled),
            Err(e) => Err(WorkerError::from_store(e)),
        }
    }

    /// Move the job to `processing`.
    pub async fn start(&self, message: impl Into<String>) -> WorkerResult<Job> {
        self.apply(
            JobPatch::new()
                .status(JobStatus::Processing)
                .step(message)
                .progress(budget::STARTED),
        )
        .await
    }

    /// Replace the in-flight step.
    pub async fn current(&self, message: impl Into<String>, progress: u8) -> WorkerResult<Job> {
        self.apply(JobPatch::new().current_step(message).progress(progress))
            .await
    }

    /// Append a completed step, clearing the in-flight one.
    pub async fn step(&self, message: impl Into<String>, progress: u8) -> WorkerResult<Job> {
        self.apply(JobPatch::new().step(message).progress(progress))
            .await
    }
}

/// Timing of the mux progress estimator.
#[derive(Debug, Clone, Copy)]
pub struct MuxTiming {
    /// Encoder silence before estimates are synthesized
    pub quiescence: Duration,
    /// Estimator period
    pub tick: Duration,
    /// Nominal minimum encode duration
    pub nominal: Duration,
}

/// Time-based estimate of the encoder percentage, capped below 100.
pub fn estimate_percent(elapsed: Duration, nominal: Duration) -> f64 {
    if nominal.is_zero() {
        return 99.0;
    }
    (elapsed.as_secs_f64() / nominal.as_secs_f64() * 100.0).min(99.0)
}

/// Reports final-encode progress while the encoder runs.
///
/// Native encoder updates are forwarded as they arrive. When the encoder has
/// been silent for longer than the quiescence window, a periodic estimate
/// based on elapsed time keeps the percentage moving. The estimator task
/// stops on [`MuxProgressMonitor::finish`] or drop.
pub struct MuxProgressMonitor {
    handle: JoinHandle<()>,
}

impl MuxProgressMonitor {
    /// Spawn the monitor. Returns it with the callback to hand the encoder.
    ///
    /// `expected_ms` is the expected output length used to turn encoder
    /// output time into a percentage.
    pub fn spawn(
        reporter: ProgressReporter,
        expected_ms: i64,
        timing: MuxTiming,
    ) -> (Self, ProgressCallback) {
        let (tx, mut rx) = mpsc::unbounded_channel::<f64>();

        let callback: ProgressCallback = Box::new(move |progress: FfmpegProgress| {
            let _ = tx.send(progress.percentage(expected_ms));
        });

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut last_native = Instant::now();
            let mut last_percent: i64 = -1;
            let mut ticker = tokio::time::interval(timing.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let percent = tokio::select! {
                    update = rx.recv() => match update {
                        Some(percent) => {
                            last_native = Instant::now();
                            percent
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if last_native.elapsed() <= timing.quiescence {
                            continue;
                        }
                        estimate_percent(started.elapsed(), timing.nominal)
                    }
                };

                let shown = percent.floor() as i64;
                if shown <= last_percent {
                    continue;
                }
                last_percent = shown;

                let result = reporter
                    .current(format!("encoding video {}%", shown), budget::encode(percent))
                    .await;
                if let Err(e) = result {
                    debug!(job_id = %reporter.job_id(), "Stopping mux progress updates: {}", e);
                    break;
                }
            }
        });

        (Self { handle }, callback)
    }

    /// Stop the estimator and wait until no update can land any more.
    pub async fn finish(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for MuxProgressMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use slidecast_jobs::InMemoryJobStore;

    #[test]
    fn test_interpolate() {
        assert_eq!(budget::interpolate(35, 60, 0, 4), 35);
        assert_eq!(budget::interpolate(35, 60, 1, 4), 41);
        assert_eq!(budget::interpolate(35, 60, 4, 4), 60);
        assert_eq!(budget::interpolate(20, 30, 7, 5), 30);
        assert_eq!(budget::interpolate(20, 30, 0, 0), 30);
    }

    #[test]
    fn test_encode_mapping() {
        assert_eq!(budget::encode(0.0), 75);
        assert_eq!(budget::encode(50.0), 85);
        assert_eq!(budget::encode(100.0), 95);
        assert_eq!(budget::encode(140.0), 95);
        assert_eq!(budget::encode(f64::NAN), 75);
    }

    #[test]
    fn test_estimate_is_capped() {
        let nominal = Duration::from_secs(30);
        assert!((estimate_percent(Duration::from_secs(15), nominal) - 50.0).abs() < 1e-9);
        assert_eq!(estimate_percent(Duration::from_secs(300), nominal), 99.0);
        assert!(budget::encode(99.0) < budget::ENCODE_DONE);
    }

    async fn processing_job(store: &Arc<InMemoryJobStore>) -> JobId {
        let job = Job::new(JobId::new(), Utc::now());
        let id = job.job_id.clone();
        store.create(job).await.unwrap();
        store
            .update(&id, JobPatch::new().status(JobStatus::Processing).progress(70))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_monitor_forwards_native_progress() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = processing_job(&store).await;
        let reporter = ProgressReporter::new(store.clone(), id.clone());

        let timing = MuxTiming {
            quiescence: Duration::from_secs(60),
            tick: Duration::from_secs(60),
            nominal: Duration::from_secs(30),
        };
        let (monitor, callback) = MuxProgressMonitor::spawn(reporter, 10_000, timing);

        callback(FfmpegProgress {
            out_time_ms: 5_000,
            ..Default::default()
        });
        // Out-of-order update must not regress anything
        callback(FfmpegProgress {
            out_time_ms: 2_000,
            ..Default::default()
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.finish().await;

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.progress, 85);
        assert_eq!(job.current_step.as_deref(), Some("encoding video 50%"));
    }

    #[tokio::test]
    async fn test_monitor_estimates_when_encoder_is_silent() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = processing_job(&store).await;
        let reporter = ProgressReporter::new(store.clone(), id.clone());

        let timing = MuxTiming {
            quiescence: Duration::from_millis(20),
            tick: Duration::from_millis(10),
            nominal: Duration::from_millis(200),
        };
        let (monitor, _callback) = MuxProgressMonitor::spawn(reporter, 10_000, timing);

        let mut seen = Vec::new();
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            seen.push(store.get(&id).await.unwrap().progress);
        }
        drop(monitor);

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        let last = *seen.last().unwrap();
        assert!(last > budget::ENCODE_FLOOR, "estimator never advanced: {:?}", seen);
        assert!(last < budget::ENCODE_DONE);
    }

    #[tokio::test]
    async fn test_reporter_surfaces_cancellation() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = processing_job(&store).await;
        store
            .update(&id, JobPatch::new().status(JobStatus::Cancelled))
            .await
            .unwrap();

        let reporter = ProgressReporter::new(store.clone(), id);
        let err = reporter.step("scene 1/2 done", 40).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
