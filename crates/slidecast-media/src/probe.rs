//! FFprobe duration probing.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};
use crate::process::ProcessGroup;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Duration in seconds of an audio or video file.
///
/// `ffprobe` is spawned through `group`, so cancelling the group stops it.
pub async fn media_duration(path: impl AsRef<Path>, group: &ProcessGroup) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let mut command = Command::new("ffprobe");
    command
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = group.spawn(&mut command)?;
    let pid = child.id();
    let output = child.wait_with_output().await;
    if let Some(pid) = pid {
        group.release(pid);
    }
    let output = output?;

    if !output.status.success() && group.is_cancelled() {
        return Err(MediaError::Cancelled);
    }
    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_duration(&output.stdout)
}

fn parse_duration(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::FfprobeFailed {
            message: "No duration in FFprobe output".to_string(),
            stderr: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let json = br#"{"format": {"filename": "a.mp3", "duration": "42.512000"}}"#;
        assert!((parse_duration(json).unwrap() - 42.512).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_missing() {
        let json = br#"{"format": {"filename": "a.mp3"}}"#;
        assert!(matches!(parse_duration(json), Err(MediaError::FfprobeFailed { .. })));
        assert!(parse_duration(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = media_duration("/nonexistent/narration.mp3", &ProcessGroup::new()).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_group_refuses_spawn() {
        if check_ffprobe().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("narration.mp3");
        std::fs::write(&audio, b"not really audio").unwrap();

        let group = ProcessGroup::new();
        group.terminate_all();
        let result = media_duration(&audio, &group).await;
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert_eq!(group.active(), 0);
    }
}
