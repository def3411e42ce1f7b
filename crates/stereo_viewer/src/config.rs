use crate::{error::ConfigError, renderer::projection::FovTangents};
use clap::{Parser, ValueEnum};
use pacing::ResolutionTuning;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `stereo_viewer` - a stereo passthrough compositor with a video overlay.
///
/// Tracks a (simulated) head pose every display cycle, composites both eyes
/// into one stereo texture from the decoded video and the reconstructed room
/// planes, and mirrors the result into a desktop window.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Video container shown on the overlay plane. Decoded with ffmpeg.
    #[arg(long, env = "STEREO_VIDEO")]
    pub video: PathBuf,

    /// Per-eye render width at scale 1.0, in pixels.
    #[arg(long, env = "STEREO_EYE_WIDTH", default_value_t = 1024)]
    pub eye_width: u32,

    /// Per-eye render height at scale 1.0, in pixels.
    #[arg(long, env = "STEREO_EYE_HEIGHT", default_value_t = 1024)]
    pub eye_height: u32,

    /// How the two eyes are packed into the stereo texture.
    #[arg(long, value_enum, default_value_t = Packing::SideBySide)]
    pub packing: Packing,

    /// Pose prediction horizon in frame durations past the target vsync.
    ///
    /// Values between 2 and 4 are the useful range.
    #[arg(long, env = "STEREO_PREDICTION_FRAMES", default_value_t = 3.0)]
    pub prediction_frames: f64,

    /// How the render loop waits for GPU completion.
    #[arg(long, value_enum, default_value_t = SyncPolicy::HardWait)]
    pub sync: SyncPolicy,

    /// Maximum submissions in flight with `--sync bounded-queue`.
    #[arg(long, default_value_t = 2)]
    pub queue_depth: usize,

    /// JSON file with tuning values. Missing fields keep their defaults.
    #[arg(long, env = "STEREO_TUNING")]
    pub tuning: Option<PathBuf>,

    /// Pin the render scale and disable dynamic resolution.
    #[arg(long)]
    pub fixed_scale: Option<f32>,

    /// The video carries both eyes side by side; each eye samples its half.
    #[arg(long)]
    pub side_by_side_video: bool,

    /// Decode video only.
    #[arg(long)]
    pub mute: bool,

    /// Simulate the user denying hand tracking.
    #[arg(long)]
    pub deny_hand_tracking: bool,

    /// Simulate the user denying world sensing (plane anchors).
    #[arg(long)]
    pub deny_world_sensing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Packing {
    /// Eyes next to each other, texture is twice as wide as one eye.
    SideBySide,
    /// Eyes stacked, texture is twice as tall as one eye.
    OverUnder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncPolicy {
    HardWait,
    BoundedQueue,
}

/// GPU completion policy of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Block on every submission before starting the next cycle.
    #[default]
    HardWait,
    /// Allow up to `depth` submissions in flight; block only at the bound.
    BoundedQueue { depth: usize },
}

impl SyncMode {
    /// Number of submissions allowed to be outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        match *self {
            Self::HardWait => 1,
            Self::BoundedQueue { depth } => depth.max(1),
        }
    }
}

impl Config {
    pub fn sync_mode(&self) -> SyncMode {
        match self.sync {
            SyncPolicy::HardWait => SyncMode::HardWait,
            SyncPolicy::BoundedQueue => SyncMode::BoundedQueue {
                depth: self.queue_depth,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eye_width == 0 || self.eye_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "eye resolution must be non-zero, got {}x{}",
                self.eye_width, self.eye_height
            )));
        }
        if !self.prediction_frames.is_finite() || self.prediction_frames < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "prediction multiplier must be a non-negative number, got {}",
                self.prediction_frames
            )));
        }
        if !(2.0..=4.0).contains(&self.prediction_frames) {
            log::warn!(
                "Prediction multiplier {} is outside the useful 2-4 frame range",
                self.prediction_frames
            );
        }
        if let Some(scale) = self.fixed_scale {
            if !(scale > 0.0 && scale.is_finite()) {
                return Err(ConfigError::Invalid(format!("fixed scale must be positive, got {scale}")));
            }
        }
        if self.sync == SyncPolicy::BoundedQueue && self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Loads the tuning file if one was given, otherwise the defaults.
    pub fn load_tuning(&self) -> Result<Tuning, ConfigError> {
        let mut tuning = match &self.tuning {
            Some(path) => Tuning::load(path)?,
            None => Tuning::default(),
        };
        // Each queued cycle holds one frame uniform ring position.
        if let SyncMode::BoundedQueue { depth } = self.sync_mode() {
            if depth > tuning.frames_in_flight {
                return Err(ConfigError::Invalid(format!(
                    "queue depth {depth} exceeds frames_in_flight {}",
                    tuning.frames_in_flight
                )));
            }
        }
        if let Some(scale) = self.fixed_scale {
            tuning.resolution = ResolutionTuning {
                enabled: false,
                initial_scale: scale,
                min_scale: scale,
                max_scale: scale,
                ..tuning.resolution
            };
        }
        Ok(tuning)
    }
}

/// Values that are tuned per device rather than chosen per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub resolution: ResolutionTuning,
    pub tangents: FovTangents,
    /// Interpupillary distance in meters.
    pub ipd: f32,
    pub near: f32,
    pub far: f32,
    /// Distance of the fullscreen video quad from the eye, in meters.
    pub panel_depth: f32,
    /// Distance of the overlay plane entity in front of the viewer.
    pub focal_distance: f32,
    pub overlay_scale: f32,
    pub frames_in_flight: usize,
    pub max_planes: usize,
    /// Seconds of audio kept queued ahead of the newest video frame.
    pub audio_lead: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            resolution: ResolutionTuning::default(),
            tangents: FovTangents::default(),
            ipd: 0.063,
            near: 0.1,
            far: 10.0,
            panel_depth: 1.0,
            focal_distance: 1.0,
            overlay_scale: 1.0,
            frames_in_flight: 3,
            max_planes: 512,
            audio_lead: 0.1,
        }
    }
}

impl Tuning {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tuning: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tuning.validate()?;
        log::info!("Loaded tuning from {}", path.display());
        Ok(tuning)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(ConfigError::Invalid(format!(
                "clip planes must satisfy 0 < near < far, got near={} far={}",
                self.near, self.far
            )));
        }
        if self.frames_in_flight == 0 || self.max_planes == 0 {
            return Err(ConfigError::Invalid(
                "frames_in_flight and max_planes must be at least 1".into(),
            ));
        }
        if self.audio_lead < 0.0 {
            return Err(ConfigError::Invalid("audio_lead must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tuning_keeps_defaults() {
        let tuning: Tuning = serde_json::from_str(r#"{ "ipd": 0.07, "resolution": { "step": 0.1 } }"#).unwrap();
        assert!((tuning.ipd - 0.07).abs() < 1e-6);
        assert!((tuning.resolution.step - 0.1).abs() < 1e-6);
        assert_eq!(tuning.resolution.min_scale, ResolutionTuning::default().min_scale);
        assert_eq!(tuning.max_planes, 512);
        assert_eq!(tuning.frames_in_flight, 3);
    }

    #[test]
    fn invalid_clip_planes_are_rejected() {
        let tuning = Tuning {
            near: 1.0,
            far: 0.5,
            ..Tuning::default()
        };
        assert!(matches!(tuning.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_tuning_file_is_a_read_error() {
        let err = Tuning::load(Path::new("/nonexistent/tuning.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn cli_defaults_and_sync_mode() {
        let cfg = Config::try_parse_from(["stereo_viewer", "--video", "clip.mp4"]).unwrap();
        assert_eq!(cfg.packing, Packing::SideBySide);
        assert_eq!(cfg.sync_mode(), SyncMode::HardWait);
        assert!(cfg.validate().is_ok());

        let cfg = Config::try_parse_from([
            "stereo_viewer",
            "--video",
            "clip.mp4",
            "--sync",
            "bounded-queue",
            "--queue-depth",
            "3",
            "--packing",
            "over-under",
        ])
        .unwrap();
        assert_eq!(cfg.sync_mode(), SyncMode::BoundedQueue { depth: 3 });
        assert_eq!(cfg.sync_mode().max_in_flight(), 3);
        assert_eq!(cfg.packing, Packing::OverUnder);
    }

    #[test]
    fn fixed_scale_pins_resolution() {
        let cfg = Config::try_parse_from(["stereo_viewer", "--video", "a.mp4", "--fixed-scale", "0.8"]).unwrap();
        let tuning = cfg.load_tuning().unwrap();
        assert!(!tuning.resolution.enabled);
        assert!((tuning.resolution.min_scale - 0.8).abs() < 1e-6);
        assert!((tuning.resolution.max_scale - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_eye_size_is_invalid() {
        let cfg = Config::try_parse_from(["stereo_viewer", "--video", "a.mp4", "--eye-width", "0"]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn queue_depth_is_bounded_by_frames_in_flight() {
        let args = |depth: &'static str| {
            Config::try_parse_from(["stereo_viewer", "--video", "a.mp4", "--sync", "bounded-queue", "--queue-depth", depth])
                .unwrap()
        };
        // Default tuning keeps three frames in flight.
        assert!(args("3").load_tuning().is_ok());
        assert!(matches!(args("4").load_tuning(), Err(ConfigError::Invalid(_))));
    }
}
