//! The render pipeline of a single job.
//!
//! Stages run in order: fetch audio, fetch all images concurrently, render
//! every scene sequentially, write the concat manifest, then one concat +
//! mux encode. Each run starts from an empty working directory. On success
//! the output is moved to the published tree and the working directory is
//! removed; nothing a job fetched is ever reachable under `/videos`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use slidecast_jobs::JobStore;
use slidecast_media::subtitles::subtitles_filter;
use slidecast_media::{
    segment_file_name, write_concat_manifest, write_srt, Encoder, MediaFetcher, MediaResult,
    MuxSpec, SceneSpec,
};
use slidecast_models::{Job, JobId, JobOutput, JobPatch, JobStatus, RenderRequest};
use tokio::fs;
use tracing::{debug, warn, Instrument};

use crate::config::WorkerConfig;
use crate::controls::JobControl;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::{scene_position, JobLogger, RenderStage};
use crate::metrics;
use crate::reporter::{budget, MuxProgressMonitor, MuxTiming, ProgressReporter};

/// File layout of a job's working directory.
#[derive(Debug, Clone)]
struct WorkPaths {
    root: PathBuf,
    images: PathBuf,
    segments: PathBuf,
    audio: PathBuf,
    manifest: PathBuf,
    subtitles: PathBuf,
    output: PathBuf,
    output_name: String,
    published: PathBuf,
}

impl WorkPaths {
    fn new(config: &WorkerConfig, job_id: &JobId, request: &RenderRequest) -> Self {
        let root = config.job_dir(job_id.as_str());
        let output_name = format!("output.{}", request.video_settings.container_format.extension());
        Self {
            published: config.published_dir(job_id.as_str()),
            images: root.join("images"),
            segments: root.join("segments"),
            audio: root.join(format!("audio.{}", file_extension(&request.audio_ref, "mp3"))),
            manifest: root.join("concat.txt"),
            subtitles: root.join("subtitles.srt"),
            output: root.join(&output_name),
            output_name,
            root,
        }
    }

    fn published_output(&self) -> PathBuf {
        self.published.join(&self.output_name)
    }

    fn image(&self, index: usize, reference: &str) -> PathBuf {
        self.images
            .join(format!("image_{:04}.{}", index, file_extension(reference, "img")))
    }
}

/// Extension of a reference's path component, if it looks like one.
fn file_extension(reference: &str, default: &str) -> String {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| default.to_string())
}

/// Remove a path, logging failures instead of returning them.
async fn remove_quietly(path: &Path) {
    let result = match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Cleanup failed: {}", e);
        }
    }
}

/// Remove a job's working directory and anything it published (best effort).
pub async fn cleanup_job_dir(config: &WorkerConfig, job_id: &JobId) {
    remove_quietly(&config.job_dir(job_id.as_str())).await;
    remove_quietly(&config.published_dir(job_id.as_str())).await;
}

/// Await `fut` unless the job is cancelled first.
async fn cancellable<T, F>(control: &JobControl, fut: F) -> WorkerResult<T>
where
    F: Future<Output = MediaResult<T>>,
{
    tokio::select! {
        biased;
        _ = control.cancelled() => Err(WorkerError::Cancelled),
        result = fut => result.map_err(WorkerError::from),
    }
}

/// Drives one render job from `pending` to a terminal state.
pub struct RenderPipeline {
    store: Arc<dyn JobStore>,
    encoder: Arc<dyn Encoder>,
    fetcher: Arc<dyn MediaFetcher>,
    config: Arc<WorkerConfig>,
}

impl RenderPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        encoder: Arc<dyn Encoder>,
        fetcher: Arc<dyn MediaFetcher>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            store,
            encoder,
            fetcher,
            config,
        }
    }

    /// Run the job to completion, failure or cancellation.
    ///
    /// Errors never escape: they are recorded on the job record.
    pub async fn execute(&self, job_id: JobId, request: Arc<RenderRequest>, control: Arc<JobControl>) {
        let logger = JobLogger::new(&job_id, request.scenes.len());
        let span = logger.span();
        self.execute_inner(job_id, request, control, logger)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        job_id: JobId,
        request: Arc<RenderRequest>,
        control: Arc<JobControl>,
        logger: JobLogger,
    ) {
        let started = Instant::now();
        let reporter = ProgressReporter::new(self.store.clone(), job_id.clone());
        let paths = WorkPaths::new(&self.config, &job_id, &request);

        metrics::record_active_jobs(1.0);

        let result = match self.run(&request, &reporter, &control, &paths, &logger).await {
            Ok(file_size_bytes) => self.complete(&reporter, &paths, file_size_bytes, started).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(job) => {
                metrics::record_job_completed(started.elapsed());
                logger.completed(
                    job.output_ref.as_deref().unwrap_or_default(),
                    job.file_size_bytes.unwrap_or_default(),
                    started.elapsed(),
                );
            }
            Err(e) if e.is_cancelled() => {
                logger.cancelled();
                cleanup_job_dir(&self.config, &job_id).await;
            }
            Err(e) => {
                let message = e.user_message();
                logger.failed(&message);
                metrics::record_job_failed();
                self.fail(&job_id, message).await;
                cleanup_job_dir(&self.config, &job_id).await;
            }
        }

        metrics::record_active_jobs(-1.0);
    }

    async fn run(
        &self,
        request: &RenderRequest,
        reporter: &ProgressReporter,
        control: &JobControl,
        paths: &WorkPaths,
        logger: &JobLogger,
    ) -> WorkerResult<u64> {
        let settings = &request.video_settings;
        let total = request.scenes.len();

        logger.started(settings.width, settings.height, settings.framerate);
        reporter
            .start(format!(
                "render started: {} scenes, {}x{}@{}fps",
                total, settings.width, settings.height, settings.framerate
            ))
            .await?;

        // Never reuse files from an earlier run
        remove_quietly(&paths.root).await;
        remove_quietly(&paths.published).await;
        fs::create_dir_all(&paths.images).await?;
        fs::create_dir_all(&paths.segments).await?;

        reporter.current("downloading audio", budget::AUDIO_START).await?;
        let stage_started = Instant::now();
        let audio_bytes =
            cancellable(control, self.fetcher.fetch(&request.audio_ref, &paths.audio)).await?;
        logger.stage(
            RenderStage::Audio,
            stage_started.elapsed(),
            &format!("audio downloaded ({} bytes)", audio_bytes),
        );
        reporter.step("audio downloaded", budget::AUDIO_DONE).await?;

        let stage_started = Instant::now();
        let images = self.download_images(request, reporter, control, paths).await?;
        logger.stage(
            RenderStage::Images,
            stage_started.elapsed(),
            &format!("{} images downloaded", images.len()),
        );

        let stage_started = Instant::now();
        let segments = self
            .render_scenes(request, &images, reporter, control, paths, logger)
            .await?;
        logger.stage(
            RenderStage::Scenes,
            stage_started.elapsed(),
            &format!("{} scenes rendered", segments.len()),
        );

        let stage_started = Instant::now();
        let subtitle_filter = if request.has_subtitles()
            && write_srt(&paths.subtitles, &request.scenes).await?
        {
            logger.stage(RenderStage::Subtitles, stage_started.elapsed(), "subtitle file written");
            reporter.step("subtitles prepared", budget::SUBTITLES_READY).await?;
            Some(subtitles_filter(
                &paths.subtitles,
                &request.subtitle_settings,
                settings.height,
            ))
        } else {
            None
        };

        reporter.current("writing concat manifest", budget::MANIFEST_START).await?;
        let stage_started = Instant::now();
        write_concat_manifest(&paths.manifest, &segments).await?;
        logger.stage(RenderStage::Manifest, stage_started.elapsed(), "concat manifest written");
        reporter.step("concat manifest written", budget::MANIFEST_DONE).await?;

        self.encode(request, reporter, control, paths, subtitle_filter, logger)
            .await?;

        let file_size_bytes = self.publish(paths, logger).await?;
        reporter
            .step(
                format!(
                    "output file created: {:.2} MB",
                    file_size_bytes as f64 / (1024.0 * 1024.0)
                ),
                budget::OUTPUT_READY,
            )
            .await?;

        remove_quietly(&paths.root).await;

        Ok(file_size_bytes)
    }

    /// Move the finished output into the published tree.
    async fn publish(&self, paths: &WorkPaths, logger: &JobLogger) -> WorkerResult<u64> {
        let stage_started = Instant::now();
        let destination = paths.published_output();
        fs::create_dir_all(&paths.published).await?;
        fs::rename(&paths.output, &destination).await?;

        let file_size_bytes = fs::metadata(&destination).await?.len();
        logger.stage(
            RenderStage::Publish,
            stage_started.elapsed(),
            &format!("published {} ({} bytes)", destination.display(), file_size_bytes),
        );
        Ok(file_size_bytes)
    }

    async fn download_images(
        &self,
        request: &RenderRequest,
        reporter: &ProgressReporter,
        control: &JobControl,
        paths: &WorkPaths,
    ) -> WorkerResult<Vec<PathBuf>> {
        let total = request.scenes.len();
        reporter
            .current(format!("downloading images 0/{}", total), budget::IMAGES_START)
            .await?;

        let mut downloads: FuturesUnordered<_> = request
            .scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| {
                let dest = paths.image(index, &scene.image_ref);
                let fetcher = self.fetcher.clone();
                async move {
                    let result = fetcher.fetch(&scene.image_ref, &dest).await;
                    (index, result.map(|_| dest))
                }
            })
            .collect();

        let mut images = vec![PathBuf::new(); total];
        let mut done = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = control.cancelled() => return Err(WorkerError::Cancelled),
                next = downloads.next() => next,
            };
            let Some((index, result)) = next else {
                break;
            };

            // First failure aborts the rest; dropping `downloads` cancels them
            images[index] = result?;
            done += 1;
            reporter
                .current(
                    format!("downloading images {}/{}", done, total),
                    budget::interpolate(budget::IMAGES_START, budget::IMAGES_DONE, done, total),
                )
                .await?;
        }

        reporter
            .step(
                format!("all images downloaded ({}/{})", done, total),
                budget::IMAGES_DONE,
            )
            .await?;
        Ok(images)
    }

    async fn render_scenes(
        &self,
        request: &RenderRequest,
        images: &[PathBuf],
        reporter: &ProgressReporter,
        control: &JobControl,
        paths: &WorkPaths,
        logger: &JobLogger,
    ) -> WorkerResult<Vec<PathBuf>> {
        let settings = &request.video_settings;
        let total = request.scenes.len();
        let mut segments = Vec::with_capacity(total);

        for (index, (scene, image)) in request.scenes.iter().zip(images).enumerate() {
            if control.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }

            let label = scene_position(index, total);
            reporter
                .current(
                    format!("rendering scene {}", label),
                    budget::interpolate(budget::SCENES_START, budget::SCENES_DONE, index, total),
                )
                .await?;

            let spec = SceneSpec {
                image: image.clone(),
                output: paths.segments.join(segment_file_name(index)),
                duration: scene.duration(),
                width: settings.width,
                height: settings.height,
                framerate: settings.framerate,
                scene_index: index,
                effect_type: request.effect_type,
                render_method: request.render_method,
            };

            let stage_started = Instant::now();
            let motion = self.encoder.render_segment(&spec, control.group()).await?;
            metrics::record_ffmpeg_stage(RenderStage::Scenes.as_str(), stage_started.elapsed());
            logger.scene(index, &motion.effect.to_string(), stage_started.elapsed());

            segments.push(spec.output);
            reporter
                .step(
                    format!("scene {} done", label),
                    budget::interpolate(budget::SCENES_START, budget::SCENES_DONE, index + 1, total),
                )
                .await?;
        }

        reporter.step("all scenes rendered", budget::SCENES_DONE).await?;
        Ok(segments)
    }

    async fn encode(
        &self,
        request: &RenderRequest,
        reporter: &ProgressReporter,
        control: &JobControl,
        paths: &WorkPaths,
        subtitle_filter: Option<String>,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        // Output stops at the shorter stream
        let scenes_total = request.total_duration();
        let audio_duration = cancellable(
            control,
            self.encoder.media_duration(&paths.audio, control.group()),
        )
        .await;
        let expected = match audio_duration {
            Ok(audio) => scenes_total.min(audio),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                logger.warning(
                    RenderStage::Mux,
                    &format!("audio duration probe failed: {}", e),
                );
                scenes_total
            }
        };
        logger.mux_started(expected, subtitle_filter.is_some());

        reporter.current("encoding video 0%", budget::ENCODE_START).await?;

        let timing = MuxTiming {
            quiescence: self.config.mux_quiescence,
            tick: self.config.mux_fallback_tick,
            nominal: self.config.mux_nominal,
        };
        let (monitor, on_progress) =
            MuxProgressMonitor::spawn(reporter.clone(), (expected * 1000.0) as i64, timing);

        let spec = MuxSpec {
            manifest: paths.manifest.clone(),
            audio: paths.audio.clone(),
            output: paths.output.clone(),
            container: request.video_settings.container_format,
            subtitle_filter,
        };

        let stage_started = Instant::now();
        let result = self
            .encoder
            .concat_and_mux(&spec, control.group(), on_progress)
            .await;
        monitor.finish().await;
        result?;
        metrics::record_ffmpeg_stage(RenderStage::Mux.as_str(), stage_started.elapsed());
        logger.stage(RenderStage::Mux, stage_started.elapsed(), "final video encoded");

        reporter.step("encoding finished", budget::ENCODE_DONE).await?;
        Ok(())
    }

    async fn complete(
        &self,
        reporter: &ProgressReporter,
        paths: &WorkPaths,
        file_size_bytes: u64,
        started: Instant,
    ) -> WorkerResult<Job> {
        let job_id = reporter.job_id().as_str();
        let output = JobOutput {
            output_ref: self.config.output_url(job_id, &paths.output_name),
            file_size_bytes,
            duration_seconds: (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
        };

        reporter
            .apply(
                JobPatch::new()
                    .status(JobStatus::Completed)
                    .step("render finished")
                    .output(output),
            )
            .await
    }

    async fn fail(&self, job_id: &JobId, message: String) {
        let patch = JobPatch::new().status(JobStatus::Failed).error(message);
        match self.store.update(job_id, patch).await {
            Ok(_) => {}
            Err(e) if e.terminal_status().is_some() => {
                debug!(job_id = %job_id, "Job already finished, not recording failure: {}", e);
            }
            Err(e) => warn!(job_id = %job_id, "Failed to record job failure: {}", e),
        }
    }
}
