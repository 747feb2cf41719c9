//! Scene segment rendering.

use std::path::PathBuf;

use slidecast_models::{EffectType, RenderMethod};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::motion::{compute_motion_path, MotionPath};

/// Constant quality for scene segments.
const SEGMENT_CRF: u8 = 23;

/// Everything needed to render one scene into a segment.
#[derive(Debug, Clone)]
pub struct SceneSpec {
    pub image: PathBuf,
    pub output: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Position of the scene in the request
    pub scene_index: usize,
    pub effect_type: EffectType,
    pub render_method: RenderMethod,
}

/// Deterministic segment file name for a scene position.
pub fn segment_file_name(scene_index: usize) -> String {
    format!("segment_{:04}.mp4", scene_index)
}

/// Scale the image to cover the frame and crop the overflow.
fn cover_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
        w = width,
        h = height
    )
}

/// Build the FFmpeg command rendering a scene.
pub fn build_scene_command(spec: &SceneSpec) -> MediaResult<(FfmpegCommand, MotionPath)> {
    let motion = compute_motion_path(
        spec.effect_type,
        spec.render_method,
        spec.scene_index,
        spec.duration,
        spec.width,
        spec.height,
        spec.framerate,
    )?;

    let preset = match spec.render_method {
        RenderMethod::Standard => "ultrafast",
        RenderMethod::HighQuality => "medium",
    };

    let filter = format!("{},{}", cover_filter(spec.width, spec.height), motion.filter);

    let cmd = FfmpegCommand::new(&spec.image, &spec.output)
        .loop_input()
        .video_filter(filter)
        .video_codec("libx264")
        .preset(preset)
        .crf(SEGMENT_CRF)
        .pixel_format("yuv420p")
        .output_arg("-an")
        .duration(spec.duration);

    Ok((cmd, motion))
}
