//! Motion path filters for still images.
//!
//! Every expression is written in terms of the zoompan output frame number
//! `on`, never wall-clock time, so a given set of inputs always renders the
//! same motion. The scene index only picks a variant.

use std::fmt;

use slidecast_models::{EffectType, RenderMethod};

use crate::error::{MediaError, MediaResult};

/// Total zoom change over a Ken-Burns scene.
pub const ZOOM_AMOUNT: f64 = 0.08;
/// Zoom factor at the start of a zoom-out (`1 + ZOOM_AMOUNT`).
const ZOOM_MAX: f64 = 1.08;
/// Fixed zoom that creates the margin a pan moves in.
pub const PAN_ZOOM: f64 = 1.2;
/// Scenes at least this long use the back-and-forth wave.
pub const LONG_PAN_SECS: f64 = 9.0;
/// Triangle wave cycles over a long pan.
pub const WAVE_CYCLES: f64 = 1.5;

/// Upsample factor for the fast zoom path.
const STANDARD_UPSCALE: u32 = 6;
/// Upsample factor for the Lanczos zoom path.
const HIGH_QUALITY_UPSCALE: u32 = 2;

/// Named motion variant applied to a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionEffect {
    ZoomIn,
    ZoomOut,
    ZoomInLeft,
    ZoomOutRight,
    ZoomInTop,
    ZoomOutBottom,
    PanLeft,
    PanRight,
    PanUp,
    PanDown,
    PanWaveHorizontal,
    PanWaveVertical,
}

impl MotionEffect {
    const ZOOM_CYCLE: [MotionEffect; 6] = [
        MotionEffect::ZoomIn,
        MotionEffect::ZoomOut,
        MotionEffect::ZoomInLeft,
        MotionEffect::ZoomOutRight,
        MotionEffect::ZoomInTop,
        MotionEffect::ZoomOutBottom,
    ];

    const PAN_CYCLE: [MotionEffect; 4] = [
        MotionEffect::PanLeft,
        MotionEffect::PanRight,
        MotionEffect::PanUp,
        MotionEffect::PanDown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MotionEffect::ZoomIn => "zoom_in",
            MotionEffect::ZoomOut => "zoom_out",
            MotionEffect::ZoomInLeft => "zoom_in_left",
            MotionEffect::ZoomOutRight => "zoom_out_right",
            MotionEffect::ZoomInTop => "zoom_in_top",
            MotionEffect::ZoomOutBottom => "zoom_out_bottom",
            MotionEffect::PanLeft => "pan_left",
            MotionEffect::PanRight => "pan_right",
            MotionEffect::PanUp => "pan_up",
            MotionEffect::PanDown => "pan_down",
            MotionEffect::PanWaveHorizontal => "pan_wave_horizontal",
            MotionEffect::PanWaveVertical => "pan_wave_vertical",
        }
    }
}

impl fmt::Display for MotionEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Filter chain and metadata for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPath {
    /// FFmpeg filter chain applied after the cover crop
    pub filter: String,
    pub effect: MotionEffect,
    /// Fraction of the pan margin used, for pan effects
    pub pan_amount: Option<f64>,
    /// Number of output frames the motion spans
    pub total_frames: u64,
}

/// Fraction of the pan margin to travel for a scene of `duration` seconds.
pub fn pan_amount(duration: f64) -> f64 {
    if duration < 5.0 {
        0.4
    } else if duration < LONG_PAN_SECS {
        0.6
    } else {
        1.0
    }
}

/// Compute the motion filter for a scene.
///
/// Fails with [`MediaError::InvalidMotion`] when the duration is not a
/// positive finite number or the frame geometry is empty.
pub fn compute_motion_path(
    effect_type: EffectType,
    render_method: RenderMethod,
    scene_index: usize,
    duration: f64,
    width: u32,
    height: u32,
    framerate: u32,
) -> MediaResult<MotionPath> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::InvalidMotion(format!(
            "scene duration must be positive, got {}",
            duration
        )));
    }
    if width == 0 || height == 0 || framerate == 0 {
        return Err(MediaError::InvalidMotion(format!(
            "invalid frame geometry {}x{}@{}",
            width, height, framerate
        )));
    }

    let total_frames = ((duration * framerate as f64).ceil() as u64).max(1);
    let frame = Frame {
        width,
        height,
        framerate,
        total_frames,
    };

    Ok(match effect_type {
        EffectType::Zoom => zoom_path(&frame, render_method, scene_index),
        EffectType::Pan => pan_path(&frame, scene_index, duration),
    })
}

struct Frame {
    width: u32,
    height: u32,
    framerate: u32,
    total_frames: u64,
}

fn zoom_path(frame: &Frame, method: RenderMethod, scene_index: usize) -> MotionPath {
    let effect = MotionEffect::ZOOM_CYCLE[scene_index % MotionEffect::ZOOM_CYCLE.len()];
    let f = frame.total_frames;

    let zoom_in = format!("1+{}*on/{}", ZOOM_AMOUNT, f);
    let zoom_out = format!("{}-{}*on/{}", ZOOM_MAX, ZOOM_AMOUNT, f);
    let center_x = "(iw-iw/zoom)/2";
    let center_y = "(ih-ih/zoom)/2";

    let (z, x, y) = match effect {
        MotionEffect::ZoomIn => (zoom_in, center_x, center_y),
        MotionEffect::ZoomOut => (zoom_out, center_x, center_y),
        MotionEffect::ZoomInLeft => (zoom_in, "(iw-iw/zoom)/4", center_y),
        MotionEffect::ZoomOutRight => (zoom_out, "(iw-iw/zoom)*3/4", center_y),
        MotionEffect::ZoomInTop => (zoom_in, center_x, "(ih-ih/zoom)/4"),
        _ => (zoom_out, center_x, "(ih-ih/zoom)*3/4"),
    };

    // Zooming an upsampled frame keeps sub-pixel crop offsets from snapping
    let (factor, flags) = match method {
        RenderMethod::Standard => (STANDARD_UPSCALE, ""),
        RenderMethod::HighQuality => (HIGH_QUALITY_UPSCALE, ":flags=lanczos"),
    };
    let (sw, sh) = (frame.width * factor, frame.height * factor);

    let filter = format!(
        "scale={sw}:{sh}{flags},zoompan=z='{z}':x='{x}':y='{y}':d={f}:s={sw}x{sh}:fps={fps},scale={w}:{h}{flags}",
        fps = frame.framerate,
        w = frame.width,
        h = frame.height,
    );

    MotionPath {
        filter,
        effect,
        pan_amount: None,
        total_frames: f,
    }
}

fn pan_path(frame: &Frame, scene_index: usize, duration: f64) -> MotionPath {
    let amount = pan_amount(duration);
    let f = frame.total_frames;

    let center_x = format!("(iw-iw/{})/2", PAN_ZOOM);
    let center_y = format!("(ih-ih/{})/2", PAN_ZOOM);

    // Linear move from the centre toward one margin edge
    let toward = |center: &str, sign: char| format!("{c}{sign}{c}*{amount}*on/{f}", c = center);
    // Triangle wave in [-1, 1]: starts at -1, ends on the +1 peak after 1.5 cycles
    let wave = |center: &str| {
        let p = format!("{}*on/{}", WAVE_CYCLES, f);
        format!("{c}+{c}*{amount}*(1-4*abs({p}-floor({p})-0.5))", c = center)
    };

    let effect = if duration >= LONG_PAN_SECS {
        if scene_index % 2 == 0 {
            MotionEffect::PanWaveHorizontal
        } else {
            MotionEffect::PanWaveVertical
        }
    } else {
        MotionEffect::PAN_CYCLE[scene_index % MotionEffect::PAN_CYCLE.len()]
    };

    let (x, y) = match effect {
        MotionEffect::PanLeft => (toward(&center_x, '-'), center_y),
        MotionEffect::PanRight => (toward(&center_x, '+'), center_y),
        MotionEffect::PanUp => (center_x.clone(), toward(&center_y, '-')),
        MotionEffect::PanDown => (center_x.clone(), toward(&center_y, '+')),
        MotionEffect::PanWaveHorizontal => (wave(&center_x), center_y),
        _ => (center_x.clone(), wave(&center_y)),
    };

    let filter = format!(
        "zoompan=z='{z}':x='{x}':y='{y}':d={f}:s={w}x{h}:fps={fps}",
        z = PAN_ZOOM,
        w = frame.width,
        h = frame.height,
        fps = frame.framerate,
    );

    MotionPath {
        filter,
        effect,
        pan_amount: Some(amount),
        total_frames: f,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pan(index: usize, duration: f64) -> MotionPath {
        compute_motion_path(EffectType::Pan, RenderMethod::Standard, index, duration, 1920, 1080, 25)
            .unwrap()
    }

    fn zoom(index: usize, method: RenderMethod) -> MotionPath {
        compute_motion_path(EffectType::Zoom, method, index, 5.0, 1920, 1080, 25).unwrap()
    }

    #[test]
    fn test_motion_path_is_deterministic() {
        for index in 0..8 {
            assert_eq!(pan(index, 7.3), pan(index, 7.3));
            assert_eq!(zoom(index, RenderMethod::Standard), zoom(index, RenderMethod::Standard));
        }
    }

    #[test]
    fn test_zoom_variants_cycle_by_index() {
        let labels: Vec<&str> = (0..12)
            .map(|i| zoom(i, RenderMethod::Standard).effect.label())
            .collect();
        assert_eq!(
            &labels[..6],
            ["zoom_in", "zoom_out", "zoom_in_left", "zoom_out_right", "zoom_in_top", "zoom_out_bottom"]
        );
        assert_eq!(labels[..6], labels[6..]);
    }

    #[test]
    fn test_zoom_ramps_eight_percent_over_frames() {
        let path = zoom(0, RenderMethod::Standard);
        assert_eq!(path.total_frames, 125);
        assert!(path.filter.contains("z='1+0.08*on/125'"));
        assert!(path.filter.starts_with("scale=11520:6480,zoompan="));
        assert!(path.filter.ends_with(",scale=1920:1080"));
        assert!(!path.filter.contains("lanczos"));

        let out = zoom(1, RenderMethod::Standard);
        assert!(out.filter.contains("z='1.08-0.08*on/125'"));
    }

    #[test]
    fn test_high_quality_uses_lanczos_double_upsample() {
        let path = zoom(2, RenderMethod::HighQuality);
        assert!(path.filter.starts_with("scale=3840:2160:flags=lanczos,zoompan="));
        assert!(path.filter.ends_with("scale=1920:1080:flags=lanczos"));
        assert!(path.filter.contains("x='(iw-iw/zoom)/4'"));
        assert!(path.filter.contains(":s=3840x2160:fps=25"));
    }

    #[test]
    fn test_pan_amount_thresholds() {
        assert_eq!(pan_amount(4.9), 0.4);
        assert_eq!(pan_amount(5.0), 0.6);
        assert_eq!(pan_amount(8.9), 0.6);
        assert_eq!(pan_amount(9.0), 1.0);
        assert_eq!(pan_amount(30.0), 1.0);
    }

    #[test]
    fn test_short_pans_cycle_directions() {
        let labels: Vec<&str> = (0..4).map(|i| pan(i, 4.0).effect.label()).collect();
        assert_eq!(labels, ["pan_left", "pan_right", "pan_up", "pan_down"]);

        let left = pan(0, 4.0);
        assert_eq!(left.pan_amount, Some(0.4));
        assert!(left.filter.contains("x='(iw-iw/1.2)/2-(iw-iw/1.2)/2*0.4*on/100'"));
        assert!(left.filter.contains("y='(ih-ih/1.2)/2'"));
        assert!(left.filter.contains("z='1.2'"));
        assert!(left.filter.ends_with(":d=100:s=1920x1080:fps=25"));
    }

    #[test]
    fn test_long_pan_alternates_axis() {
        let even = pan(0, 9.0);
        assert_eq!(even.effect, MotionEffect::PanWaveHorizontal);
        assert!(even.filter.contains("x='(iw-iw/1.2)/2+(iw-iw/1.2)/2*1*(1-4*abs(1.5*on/225-floor(1.5*on/225)-0.5))'"));
        assert!(even.filter.contains("y='(ih-ih/1.2)/2'"));

        let odd = pan(3, 12.0);
        assert_eq!(odd.effect, MotionEffect::PanWaveVertical);
        assert!(odd.filter.contains("x='(iw-iw/1.2)/2'"));
        assert!(odd.filter.contains("y='(ih-ih/1.2)/2+(ih-ih/1.2)/2*1*"));
    }

    #[test]
    fn test_three_scene_pan_sequence() {
        let durations = [3.0, 10.0, 6.0];
        let paths: Vec<MotionPath> = durations
            .iter()
            .enumerate()
            .map(|(i, d)| pan(i, *d))
            .collect();

        assert_eq!(paths[0].effect, MotionEffect::PanLeft);
        assert_eq!(paths[0].pan_amount, Some(0.4));

        assert_eq!(paths[1].effect, MotionEffect::PanWaveVertical);
        assert_eq!(paths[1].pan_amount, Some(1.0));

        assert_eq!(paths[2].effect, MotionEffect::PanUp);
        assert_eq!(paths[2].pan_amount, Some(0.6));
    }

    #[test]
    fn test_frame_count_rounds_up() {
        let path = compute_motion_path(EffectType::Pan, RenderMethod::Standard, 0, 3.01, 1280, 720, 30)
            .unwrap();
        assert_eq!(path.total_frames, 91);
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        for duration in [0.0, -1.0, f64::NAN] {
            let result =
                compute_motion_path(EffectType::Zoom, RenderMethod::Standard, 0, duration, 1920, 1080, 25);
            assert!(matches!(result, Err(MediaError::InvalidMotion(_))));
        }
    }
}
