//! Concat manifest and the final concat + audio mux pass.

use std::path::{Path, PathBuf};

use slidecast_models::ContainerFormat;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;

/// Constant quality for the final output.
const OUTPUT_CRF: u8 = 28;

/// Inputs and settings of the final encode.
#[derive(Debug, Clone)]
pub struct MuxSpec {
    /// Concat manifest listing segments in scene order
    pub manifest: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub container: ContainerFormat,
    /// Optional `subtitles` filter burning captions in
    pub subtitle_filter: Option<String>,
}

/// Render the concat manifest for `segments` (in order).
pub fn concat_manifest(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Write the concat manifest to `path`.
pub async fn write_concat_manifest(path: impl AsRef<Path>, segments: &[PathBuf]) -> MediaResult<()> {
    tokio::fs::write(path, concat_manifest(segments)).await?;
    Ok(())
}

/// Build the concat + mux command.
///
/// The output stops at the shorter of the video and audio streams.
pub fn build_mux_command(spec: &MuxSpec) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&spec.manifest, &spec.output)
        .concat_input()
        .add_input(&spec.audio)
        .output_args(["-map", "0:v:0", "-map", "1:a:0"]);

    if let Some(filter) = &spec.subtitle_filter {
        cmd = cmd.video_filter(filter.clone());
    }

    cmd = cmd
        .video_codec("libx264")
        .audio_codec("aac")
        .preset("medium")
        .crf(OUTPUT_CRF)
        .pixel_format("yuv420p");

    if spec.container.supports_faststart() {
        cmd = cmd.output_args(["-movflags", "+faststart"]);
    }

    cmd.output_args(["-threads", "0", "-shortest"])
}
