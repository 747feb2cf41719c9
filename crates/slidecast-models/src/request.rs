//! Render request definitions.
//!
//! A request is immutable once accepted: the orchestrator only ever reads it.
//! Field names follow the JSON contract used by the web client (camelCase),
//! and the older `imageUrl` / `text` / `audioUrl` / `format` names are
//! accepted as aliases.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Largest accepted output width (8K UHD).
pub const MAX_WIDTH: u32 = 7680;
/// Largest accepted output height (8K UHD).
pub const MAX_HEIGHT: u32 = 4320;
/// Largest accepted output framerate.
pub const MAX_FRAMERATE: u32 = 120;

/// A timed still image with optional subtitle text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Client-side scene index. Informative only: segment naming and
    /// motion variation use the scene's position in the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// Scene start on the narration timeline, in seconds
    pub start_time: f64,

    /// Scene end on the narration timeline, in seconds
    pub end_time: f64,

    /// Fetchable reference (URL or local path) of the scene image
    #[serde(alias = "imageUrl", default)]
    pub image_ref: String,

    /// Subtitle text shown while the scene is on screen
    #[serde(alias = "text", default, skip_serializing_if = "Option::is_none")]
    pub subtitle_text: Option<String>,
}

impl Scene {
    /// Scene duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Mov,
    Mkv,
}

impl ContainerFormat {
    /// File extension for the container.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Mov => "mov",
            ContainerFormat::Mkv => "mkv",
        }
    }

    /// Whether `-movflags +faststart` applies to this container.
    pub fn supports_faststart(&self) -> bool {
        matches!(self, ContainerFormat::Mp4 | ContainerFormat::Mov)
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Output frame size, rate and container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    #[serde(alias = "format")]
    pub container_format: ContainerFormat,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            framerate: 25,
            container_format: ContainerFormat::Mp4,
        }
    }
}

/// Burned-in subtitle appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtitleSettings {
    pub enabled: bool,

    /// Font family name
    #[serde(alias = "fontFamily")]
    pub font: String,

    /// Font size in output pixels
    pub font_size: u32,

    /// Text colour (`#RRGGBB`)
    pub color: String,

    /// Box colour behind the text (`#RRGGBB`)
    #[serde(alias = "backgroundColor")]
    pub background: String,

    /// Box opacity in `[0, 1]`; zero disables the box
    pub opacity: f64,

    /// Drop shadow behind the text
    #[serde(alias = "textShadow", deserialize_with = "deserialize_shadow")]
    pub shadow: bool,

    /// Horizontal anchor as a percentage of the frame width
    #[serde(alias = "x")]
    pub position_x: f64,

    /// Vertical anchor as a percentage of the frame height
    #[serde(alias = "y")]
    pub position_y: f64,
}

impl Default for SubtitleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            font: "Arial".to_string(),
            font_size: 48,
            color: "#FFFFFF".to_string(),
            background: "#000000".to_string(),
            opacity: 0.5,
            shadow: true,
            position_x: 50.0,
            position_y: 85.0,
        }
    }
}

/// Accepts either a boolean or a CSS `text-shadow` string ("none" / empty = off).
fn deserialize_shadow<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ShadowValue {
        Flag(bool),
        Css(String),
    }

    Ok(match ShadowValue::deserialize(deserializer)? {
        ShadowValue::Flag(flag) => flag,
        ShadowValue::Css(css) => {
            let css = css.trim();
            !css.is_empty() && !css.eq_ignore_ascii_case("none")
        }
    })
}

/// Motion effect applied to every scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    /// Ken-Burns zoom
    #[default]
    Zoom,
    /// Pan inside a fixed zoom margin
    Pan,
}

impl EffectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::Zoom => "zoom",
            EffectType::Pan => "pan",
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scene render quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum RenderMethod {
    /// 6x upsample with default resampling, fast encoder preset
    #[default]
    #[serde(rename = "standard")]
    Standard,
    /// 2x Lanczos upsample, slower encoder preset
    #[serde(rename = "highQuality", alias = "high_quality", alias = "lanczos")]
    HighQuality,
}

impl RenderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMethod::Standard => "standard",
            RenderMethod::HighQuality => "highQuality",
        }
    }
}

/// A request to render a narrated slideshow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Ordered scenes
    #[serde(default)]
    pub scenes: Vec<Scene>,

    /// Fetchable reference of the narration track
    #[serde(alias = "audioUrl", default)]
    pub audio_ref: String,

    #[serde(default)]
    pub video_settings: VideoSettings,

    #[serde(default)]
    pub subtitle_settings: SubtitleSettings,

    #[serde(default)]
    pub effect_type: EffectType,

    #[serde(default)]
    pub render_method: RenderMethod,
}

impl RenderRequest {
    /// Validate the request before a job is created.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.scenes.is_empty() {
            return Err(InputError::NoScenes);
        }

        if self.audio_ref.trim().is_empty() {
            return Err(InputError::MissingAudio);
        }

        let settings = &self.video_settings;
        if settings.width == 0
            || settings.height == 0
            || settings.width > MAX_WIDTH
            || settings.height > MAX_HEIGHT
            || settings.width % 2 != 0
            || settings.height % 2 != 0
        {
            return Err(InputError::InvalidFrameSize {
                width: settings.width,
                height: settings.height,
            });
        }

        if settings.framerate == 0 || settings.framerate > MAX_FRAMERATE {
            return Err(InputError::InvalidFramerate(settings.framerate));
        }

        let mut previous_start = f64::NEG_INFINITY;
        for (index, scene) in self.scenes.iter().enumerate() {
            if !scene.start_time.is_finite() || !scene.end_time.is_finite() || scene.start_time < 0.0 {
                return Err(InputError::InvalidSceneTime { index });
            }
            if scene.end_time <= scene.start_time {
                return Err(InputError::EmptyScene {
                    index,
                    start: scene.start_time,
                    end: scene.end_time,
                });
            }
            if scene.start_time < previous_start {
                return Err(InputError::ScenesOutOfOrder { index });
            }
            if scene.image_ref.trim().is_empty() {
                return Err(InputError::MissingImage { index });
            }
            previous_start = scene.start_time;
        }

        Ok(())
    }

    /// Sum of all scene durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.scenes.iter().map(Scene::duration).sum()
    }

    /// Whether any subtitle cue would be burned in.
    pub fn has_subtitles(&self) -> bool {
        self.subtitle_settings.enabled
            && self
                .scenes
                .iter()
                .any(|s| s.subtitle_text.as_deref().is_some_and(|t| !t.trim().is_empty()))
    }
}

/// Malformed render request. Rejected at submission; no job is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("No scenes provided")]
    NoScenes,

    #[error("No audio reference provided")]
    MissingAudio,

    #[error("Scene {index} has no image reference")]
    MissingImage { index: usize },

    #[error("Scene {index} has end time {end} not after start time {start}")]
    EmptyScene { index: usize, start: f64, end: f64 },

    #[error("Scene {index} has an invalid time range")]
    InvalidSceneTime { index: usize },

    #[error("Scene {index} starts before the previous scene")]
    ScenesOutOfOrder { index: usize },

    #[error("Invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("Invalid framerate {0}")]
    InvalidFramerate(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(start: f64, end: f64) -> Scene {
        Scene {
            index: None,
            start_time: start,
            end_time: end,
            image_ref: "https://cdn.example.com/a.jpg".to_string(),
            subtitle_text: None,
        }
    }

    fn request(scenes: Vec<Scene>) -> RenderRequest {
        RenderRequest {
            scenes,
            audio_ref: "https://cdn.example.com/narration.mp3".to_string(),
            video_settings: VideoSettings::default(),
            subtitle_settings: SubtitleSettings::default(),
            effect_type: EffectType::Pan,
            render_method: RenderMethod::Standard,
        }
    }

    #[test]
    fn test_valid_request() {
        let req = request(vec![scene(0.0, 3.0), scene(3.0, 13.0), scene(13.0, 19.0)]);
        assert!(req.validate().is_ok());
        assert!((req.total_duration() - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_empty_scene_list() {
        assert_eq!(request(vec![]).validate(), Err(InputError::NoScenes));
    }

    #[test]
    fn test_rejects_missing_audio() {
        let mut req = request(vec![scene(0.0, 1.0)]);
        req.audio_ref = "  ".to_string();
        assert_eq!(req.validate(), Err(InputError::MissingAudio));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let req = request(vec![scene(0.0, 2.0), scene(2.0, 2.0)]);
        assert!(matches!(req.validate(), Err(InputError::EmptyScene { index: 1, .. })));
    }

    #[test]
    fn test_rejects_unsorted_scenes() {
        let req = request(vec![scene(5.0, 6.0), scene(1.0, 2.0)]);
        assert_eq!(req.validate(), Err(InputError::ScenesOutOfOrder { index: 1 }));
    }

    #[test]
    fn test_rejects_missing_image() {
        let mut req = request(vec![scene(0.0, 2.0)]);
        req.scenes[0].image_ref.clear();
        assert_eq!(req.validate(), Err(InputError::MissingImage { index: 0 }));
    }

    #[test]
    fn test_rejects_odd_frame_size() {
        let mut req = request(vec![scene(0.0, 2.0)]);
        req.video_settings.width = 1921;
        assert!(matches!(req.validate(), Err(InputError::InvalidFrameSize { .. })));
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r##"{
            "scenes": [{"startTime": 0, "endTime": 4.5, "imageUrl": "https://x/1.jpg", "text": "Hello"}],
            "audioUrl": "https://x/a.mp3",
            "videoSettings": {"width": 1280, "height": 720, "format": "mov"},
            "subtitleSettings": {"enabled": true, "fontFamily": "Roboto", "backgroundColor": "#112233",
                                 "textShadow": "2px 2px 4px #000", "x": 50, "y": 90},
            "effectType": "pan",
            "renderMethod": "lanczos"
        }"##;

        let req: RenderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.scenes[0].image_ref, "https://x/1.jpg");
        assert_eq!(req.scenes[0].subtitle_text.as_deref(), Some("Hello"));
        assert_eq!(req.audio_ref, "https://x/a.mp3");
        assert_eq!(req.video_settings.width, 1280);
        assert_eq!(req.video_settings.framerate, 25);
        assert_eq!(req.video_settings.container_format, ContainerFormat::Mov);
        assert_eq!(req.subtitle_settings.font, "Roboto");
        assert_eq!(req.subtitle_settings.background, "#112233");
        assert!(req.subtitle_settings.shadow);
        assert_eq!(req.effect_type, EffectType::Pan);
        assert_eq!(req.render_method, RenderMethod::HighQuality);
        assert!(req.has_subtitles());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_settings_missing() {
        let json = r#"{"scenes": [{"startTime": 0, "endTime": 1, "imageRef": "a.jpg"}], "audioRef": "a.mp3"}"#;
        let req: RenderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.video_settings, VideoSettings::default());
        assert_eq!(req.effect_type, EffectType::Zoom);
        assert_eq!(req.render_method, RenderMethod::Standard);
        assert!(!req.has_subtitles());
    }

    #[test]
    fn test_shadow_none_string_disables_shadow() {
        let settings: SubtitleSettings = serde_json::from_str(r#"{"textShadow": "none"}"#).unwrap();
        assert!(!settings.shadow);
    }
}
