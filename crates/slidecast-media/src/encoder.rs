//! Encoder seam used by the render pipeline.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::FfmpegRunner;
use crate::concat::{build_mux_command, MuxSpec};
use crate::error::MediaResult;
use crate::motion::MotionPath;
use crate::probe;
use crate::process::ProcessGroup;
use crate::progress::ProgressCallback;
use crate::scene::{build_scene_command, SceneSpec};

/// External video encoder.
///
/// Every process an implementation starts must be spawned through `group`,
/// so cancelling the group reaches it.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Render one scene segment.
    async fn render_segment(&self, spec: &SceneSpec, group: &ProcessGroup) -> MediaResult<MotionPath>;

    /// Concatenate segments and mux the narration track.
    async fn concat_and_mux(
        &self,
        spec: &MuxSpec,
        group: &ProcessGroup,
        on_progress: ProgressCallback,
    ) -> MediaResult<()>;

    /// Duration of a media file in seconds.
    async fn media_duration(&self, path: &Path, group: &ProcessGroup) -> MediaResult<f64>;
}

/// [`Encoder`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }

    fn runner(&self, group: &ProcessGroup) -> FfmpegRunner {
        FfmpegRunner::new().with_group(group.clone())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn render_segment(&self, spec: &SceneSpec, group: &ProcessGroup) -> MediaResult<MotionPath> {
        let (cmd, motion) = build_scene_command(spec)?;
        debug!(
            scene = spec.scene_index,
            effect = %motion.effect,
            frames = motion.total_frames,
            "Rendering scene segment"
        );

        self.runner(group).run(&cmd).await?;
        Ok(motion)
    }

    async fn concat_and_mux(
        &self,
        spec: &MuxSpec,
        group: &ProcessGroup,
        on_progress: ProgressCallback,
    ) -> MediaResult<()> {
        let cmd = build_mux_command(spec);
        info!(output = %spec.output.display(), "Encoding final video");

        self.runner(group).run_with_progress(&cmd, on_progress).await
    }

    async fn media_duration(&self, path: &Path, group: &ProcessGroup) -> MediaResult<f64> {
        probe::media_duration(path, group).await
    }
}
