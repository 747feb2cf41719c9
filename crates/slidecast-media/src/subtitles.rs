//! Subtitle files and burn-in styling.
//!
//! Cues are placed on the rendered video timeline: each scene's cue starts
//! where its segment starts in the concatenated output.

use std::fmt::Write as _;
use std::path::Path;

use slidecast_models::{Scene, SubtitleSettings};

use crate::error::MediaResult;

/// Vertical resolution libass uses for SRT input.
const ASS_PLAY_RES_Y: f64 = 288.0;

const DEFAULT_TEXT_COLOR: &str = "FFFFFF";
const DEFAULT_BOX_COLOR: &str = "000000";

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Build SRT content for scenes with subtitle text.
///
/// Returns `None` when no scene has text.
pub fn build_srt(scenes: &[Scene]) -> Option<String> {
    let mut srt = String::new();
    let mut cue = 0;
    let mut offset = 0.0;

    for scene in scenes {
        let start = offset;
        offset += scene.duration();

        let Some(text) = scene.subtitle_text.as_deref().map(str::trim) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        cue += 1;
        let _ = write!(
            srt,
            "{}\n{} --> {}\n{}\n\n",
            cue,
            format_srt_time(start),
            format_srt_time(offset),
            text
        );
    }

    (cue > 0).then_some(srt)
}

/// Write the SRT file for `scenes`. Returns `false` when there was nothing to write.
pub async fn write_srt(path: impl AsRef<Path>, scenes: &[Scene]) -> MediaResult<bool> {
    match build_srt(scenes) {
        Some(content) => {
            tokio::fs::write(path, content).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Convert `#RRGGBB` to an ASS colour (`&HBBGGRR&`).
pub fn hex_to_ass_color(hex: &str) -> Option<String> {
    parse_hex(hex).map(|(r, g, b)| format!("&H{:02X}{:02X}{:02X}&", b, g, r))
}

/// ASS colour with alpha (`&HAABBGGRR`); alpha 0 is opaque.
fn ass_color_with_alpha(hex: &str, fallback: &str, alpha: u8) -> String {
    let (r, g, b) = parse_hex(hex)
        .or_else(|| parse_hex(fallback))
        .unwrap_or((0, 0, 0));
    format!("&H{:02X}{:02X}{:02X}{:02X}", alpha, b, g, r)
}

/// ASS `force_style` for the given settings and output height.
pub fn force_style(settings: &SubtitleSettings, video_height: u32) -> String {
    let scale = ASS_PLAY_RES_Y / video_height.max(1) as f64;
    let opacity = settings.opacity.clamp(0.0, 1.0);

    let font_size = (settings.font_size as f64 * scale).round().max(1.0);

    // Numpad alignment: 1-3 bottom row, 7-9 top row
    let column = match settings.position_x {
        x if x < 100.0 / 3.0 => 1,
        x if x > 200.0 / 3.0 => 3,
        _ => 2,
    };
    let y = settings.position_y.clamp(0.0, 100.0);
    let (alignment, margin_pct) = if y >= 50.0 {
        (column, 100.0 - y)
    } else {
        (column + 6, y)
    };
    let margin_v = (margin_pct / 100.0 * ASS_PLAY_RES_Y).round();

    let back_alpha = ((1.0 - opacity) * 255.0).round() as u8;
    let border_style = if opacity > 0.0 { 3 } else { 1 };
    let shadow = if settings.shadow { 1 } else { 0 };

    let font = settings.font.replace([',', '\'', ':'], " ");

    format!(
        "FontName={},FontSize={},PrimaryColour={},BackColour={},OutlineColour={},BorderStyle={},Outline=1,Shadow={},Alignment={},MarginV={}",
        font.trim(),
        font_size,
        ass_color_with_alpha(&settings.color, DEFAULT_TEXT_COLOR, 0),
        ass_color_with_alpha(&settings.background, DEFAULT_BOX_COLOR, back_alpha),
        ass_color_with_alpha(&settings.background, DEFAULT_BOX_COLOR, back_alpha),
        border_style,
        shadow,
        alignment,
        margin_v,
    )
}

/// `subtitles` filter burning `srt_path` into the video.
pub fn subtitles_filter(srt_path: &Path, settings: &SubtitleSettings, video_height: u32) -> String {
    let path = srt_path
        .to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'");
    format!(
        "subtitles={}:force_style='{}'",
        path,
        force_style(settings, video_height)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(start: f64, end: f64, text: Option<&str>) -> Scene {
        Scene {
            index: None,
            start_time: start,
            end_time: end,
            image_ref: "img.jpg".into(),
            subtitle_text: text.map(String::from),
        }
    }

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3.5), "00:00:03,500");
        assert_eq!(format_srt_time(3725.042), "01:02:05,042");
    }

    #[test]
    fn test_build_srt_skips_scenes_without_text() {
        let scenes = vec![
            scene(0.0, 3.0, Some("First")),
            scene(3.0, 5.0, None),
            scene(5.0, 9.5, Some("  Third  ")),
        ];
        let srt = build_srt(&scenes).unwrap();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:03,000\nFirst\n\n2\n00:00:05,000 --> 00:00:09,500\nThird\n\n"
        );
    }

    #[test]
    fn test_build_srt_follows_video_timeline() {
        // A leading gap on the narration timeline does not exist in the video
        let scenes = vec![scene(2.0, 4.0, Some("A")), scene(4.0, 7.0, Some("B"))];
        let srt = build_srt(&scenes).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:02,000\nA"));
        assert!(srt.contains("2\n00:00:02,000 --> 00:00:05,000\nB"));
    }

    #[test]
    fn test_build_srt_none_without_text() {
        assert!(build_srt(&[scene(0.0, 1.0, None), scene(1.0, 2.0, Some(" "))]).is_none());
    }

    #[test]
    fn test_hex_to_ass_color() {
        assert_eq!(hex_to_ass_color("#FF8800").as_deref(), Some("&H0088FF&"));
        assert_eq!(hex_to_ass_color("112233").as_deref(), Some("&H332211&"));
        assert!(hex_to_ass_color("#FFF").is_none());
        assert!(hex_to_ass_color("zzzzzz").is_none());
    }

    #[test]
    fn test_force_style_defaults() {
        let settings = SubtitleSettings::default();
        let style = force_style(&settings, 1080);
        assert!(style.contains("FontName=Arial"));
        // 48px at 1080p in a 288-line script
        assert!(style.contains("FontSize=13"));
        assert!(style.contains("PrimaryColour=&H00FFFFFF"));
        // 50% opacity box
        assert!(style.contains("BackColour=&H80000000"));
        assert!(style.contains("BorderStyle=3"));
        assert!(style.contains("Shadow=1"));
        assert!(style.contains("Alignment=2"));
        assert!(style.contains("MarginV=43"));
    }

    #[test]
    fn test_force_style_top_left_without_box() {
        let settings = SubtitleSettings {
            color: "not-a-color".into(),
            opacity: 0.0,
            shadow: false,
            position_x: 10.0,
            position_y: 10.0,
            ..SubtitleSettings::default()
        };
        let style = force_style(&settings, 720);
        assert!(style.contains("PrimaryColour=&H00FFFFFF"));
        assert!(style.contains("BorderStyle=1"));
        assert!(style.contains("Shadow=0"));
        assert!(style.contains("Alignment=7"));
        assert!(style.contains("MarginV=29"));
    }

    #[test]
    fn test_subtitles_filter_escapes_path() {
        let filter = subtitles_filter(
            Path::new("/tmp/job's:dir/subtitles.srt"),
            &SubtitleSettings::default(),
            1080,
        );
        assert!(filter.starts_with("subtitles=/tmp/job\\'s\\:dir/subtitles.srt:force_style='"));
    }
}
