//! FFmpeg CLI wrapper for slideshow rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Per-job process groups for graceful-then-forced termination
//! - Motion path (Ken-Burns zoom / pan) filter generation
//! - Scene segment rendering, concat manifests and the final audio mux
//! - Subtitle files and burn-in styling
//! - Input fetching over HTTP or from the local filesystem

pub mod command;
pub mod concat;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod motion;
pub mod probe;
pub mod process;
pub mod progress;
pub mod scene;
pub mod subtitles;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{build_mux_command, write_concat_manifest, MuxSpec};
pub use encoder::{Encoder, FfmpegEncoder};
pub use error::{MediaError, MediaResult};
pub use fetch::{HttpFetcher, MediaFetcher};
pub use motion::{compute_motion_path, pan_amount, MotionEffect, MotionPath};
pub use probe::media_duration;
pub use process::ProcessGroup;
pub use progress::{FfmpegProgress, ProgressCallback};
pub use scene::{build_scene_command, segment_file_name, SceneSpec};
pub use subtitles::{build_srt, force_style, hex_to_ass_color, write_srt};
