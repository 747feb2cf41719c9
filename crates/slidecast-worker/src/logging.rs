//! Structured log lines of a render job.
//!
//! Every line carries `job_id` and, where it applies, the pipeline `stage`
//! and scene position, so one job can be followed through JSON logs.

use std::fmt;
use std::time::Duration;

use slidecast_models::JobId;
use tracing::{debug, error, info, warn, Span};

/// Pipeline stage named in log lines and FFmpeg stage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Audio,
    Images,
    Scenes,
    Subtitles,
    Manifest,
    Mux,
    Publish,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Audio => "audio",
            RenderStage::Images => "images",
            RenderStage::Scenes => "scenes",
            RenderStage::Subtitles => "subtitles",
            RenderStage::Manifest => "manifest",
            RenderStage::Mux => "mux",
            RenderStage::Publish => "publish",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"3/8"`-style position of a scene, 1-based.
pub fn scene_position(index: usize, total: usize) -> String {
    format!("{}/{}", index + 1, total)
}

/// Logger of one render job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    scenes: usize,
}

impl JobLogger {
    pub fn new(job_id: &JobId, scenes: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            scenes,
        }
    }

    /// Span wrapped around the job's background task.
    pub fn span(&self) -> Span {
        tracing::info_span!("render_job", job_id = %self.job_id, scenes = self.scenes)
    }

    pub fn started(&self, width: u32, height: u32, framerate: u32) {
        info!(
            job_id = %self.job_id,
            scenes = self.scenes,
            "Render started at {}x{}@{}fps", width, height, framerate
        );
    }

    /// A stage finished.
    pub fn stage(&self, stage: RenderStage, elapsed: Duration, detail: &str) {
        info!(
            job_id = %self.job_id,
            stage = %stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "{}", detail
        );
    }

    /// One scene segment was rendered.
    pub fn scene(&self, index: usize, effect: &str, elapsed: Duration) {
        debug!(
            job_id = %self.job_id,
            stage = %RenderStage::Scenes,
            scene = %scene_position(index, self.scenes),
            effect,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scene rendered"
        );
    }

    /// The final encode starts with `expected_secs` of output to produce.
    pub fn mux_started(&self, expected_secs: f64, subtitles: bool) {
        info!(
            job_id = %self.job_id,
            stage = %RenderStage::Mux,
            expected_secs,
            subtitles,
            "Encoding final video"
        );
    }

    pub fn warning(&self, stage: RenderStage, message: &str) {
        warn!(job_id = %self.job_id, stage = %stage, "{}", message);
    }

    pub fn failed(&self, message: &str) {
        error!(job_id = %self.job_id, "Render failed: {}", message);
    }

    pub fn cancelled(&self) {
        info!(job_id = %self.job_id, "Render cancelled, cleaning up");
    }

    pub fn completed(&self, output_ref: &str, file_size_bytes: u64, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            output_ref,
            file_size_bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            "Render completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(RenderStage::Mux.to_string(), "mux");
        assert_eq!(RenderStage::Scenes.as_str(), "scenes");
        assert_eq!(RenderStage::Publish.as_str(), "publish");
    }

    #[test]
    fn test_scene_position_is_one_based() {
        assert_eq!(scene_position(0, 3), "1/3");
        assert_eq!(scene_position(2, 3), "3/3");
    }
}
