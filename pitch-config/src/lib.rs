//! Strongly typed configuration schema.
//!
//! Grounded on `braid-config-data::MainbrainConfig`: every struct denies
//! unknown fields, every optional key has a `#[serde(default = "...")]`
//! function, and loading goes through a `thiserror::Error` enum rather than
//! an untyped nested dictionary, so a malformed or unknown key fails at
//! load time instead of surfacing as a missing-field panic deep in a
//! pipeline thread.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixFmtPref {
    Gray8,
    Yuy2,
    Mjpg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default = "default_pixfmt_pref")]
    pub pixfmt: Vec<PixFmtPref>,
    pub exposure_us: Option<u32>,
    pub gain: Option<f64>,
    pub wb_mode: Option<String>,
}

fn default_pixfmt_pref() -> Vec<PixFmtPref> {
    vec![PixFmtPref::Mjpg, PixFmtPref::Yuy2, PixFmtPref::Gray8]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    DropOldest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_drop_policy")]
    pub drop_policy: DropPolicy,
}

fn default_queue_size() -> usize {
    6
}
fn default_drop_policy() -> DropPolicy {
    DropPolicy::DropOldest
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            drop_policy: default_drop_policy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorType {
    Classical,
    Ml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassicalMode {
    A,
    B,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(rename = "type", default = "default_detector_type")]
    pub detector_type: DetectorType,
    #[serde(default = "default_classical_mode")]
    pub mode: ClassicalMode,
    #[serde(default = "default_area_min")]
    pub area_min: f64,
    #[serde(default = "default_area_max")]
    pub area_max: f64,
    #[serde(default = "default_circularity_threshold")]
    pub circularity_threshold: f64,
    #[serde(default = "default_aspect_ratio_max")]
    pub aspect_ratio_max: f64,
    #[serde(default = "default_velocity_consistency_px")]
    pub velocity_consistency_px: f64,
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_ml_input_size")]
    pub input_size: u32,
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f64,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
    pub class_id: Option<u32>,
}

fn default_detector_type() -> DetectorType {
    DetectorType::Classical
}
fn default_classical_mode() -> ClassicalMode {
    ClassicalMode::A
}
fn default_area_min() -> f64 {
    4.0
}
fn default_area_max() -> f64 {
    2000.0
}
fn default_circularity_threshold() -> f64 {
    0.6
}
fn default_aspect_ratio_max() -> f64 {
    2.0
}
fn default_velocity_consistency_px() -> f64 {
    150.0
}
fn default_ml_input_size() -> u32 {
    640
}
fn default_conf_threshold() -> f64 {
    0.4
}
fn default_iou_threshold() -> f64 {
    0.45
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detector_type: default_detector_type(),
            mode: default_classical_mode(),
            area_min: default_area_min(),
            area_max: default_area_max(),
            circularity_threshold: default_circularity_threshold(),
            aspect_ratio_max: default_aspect_ratio_max(),
            velocity_consistency_px: default_velocity_consistency_px(),
            model_path: None,
            input_size: default_ml_input_size(),
            conf_threshold: default_conf_threshold(),
            iou_threshold: default_iou_threshold(),
            class_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StereoConfig {
    #[serde(default = "default_pairing_tolerance_ms")]
    pub pairing_tolerance_ms: f64,
    #[serde(default = "default_epipolar_epsilon_px")]
    pub epipolar_epsilon_px: f64,
    #[serde(default = "default_z_min_ft")]
    pub z_min_ft: f64,
    #[serde(default = "default_z_max_ft")]
    pub z_max_ft: f64,
    #[serde(default = "default_max_3d_jump_in")]
    pub max_3d_jump_in: f64,
}

fn default_pairing_tolerance_ms() -> f64 {
    8.0
}
fn default_epipolar_epsilon_px() -> f64 {
    3.0
}
fn default_z_min_ft() -> f64 {
    3.0
}
fn default_z_max_ft() -> f64 {
    80.0
}
fn default_max_3d_jump_in() -> f64 {
    12.0
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            pairing_tolerance_ms: default_pairing_tolerance_ms(),
            epipolar_epsilon_px: default_epipolar_epsilon_px(),
            z_min_ft: default_z_min_ft(),
            z_max_ft: default_z_max_ft(),
            max_3d_jump_in: default_max_3d_jump_in(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    #[serde(default = "default_min_active_frames")]
    pub min_active_frames: u32,
    #[serde(default = "default_end_gap_frames")]
    pub end_gap_frames: u32,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: f64,
    #[serde(default = "default_pre_roll_ms")]
    pub pre_roll_ms: f64,
    #[serde(default = "default_post_roll_ms")]
    pub post_roll_ms: f64,
    #[serde(default)]
    pub use_plate_gate: bool,
}

fn default_min_active_frames() -> u32 {
    5
}
fn default_end_gap_frames() -> u32 {
    10
}
fn default_min_observations() -> usize {
    3
}
fn default_min_duration_ms() -> f64 {
    100.0
}
fn default_pre_roll_ms() -> f64 {
    500.0
}
fn default_post_roll_ms() -> f64 {
    500.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_active_frames: default_min_active_frames(),
            end_gap_frames: default_end_gap_frames(),
            min_observations: default_min_observations(),
            min_duration_ms: default_min_duration_ms(),
            pre_roll_ms: default_pre_roll_ms(),
            post_roll_ms: default_post_roll_ms(),
            use_plate_gate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallType {
    Baseball,
    Softball,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub plate_plane_z_ft: f64,
    #[serde(default = "default_release_plane_z_ft")]
    pub release_plane_z_ft: f64,
    #[serde(default = "default_batter_height_in")]
    pub batter_height_in: f64,
    #[serde(default = "default_top_ratio")]
    pub top_ratio: f64,
    #[serde(default = "default_bottom_ratio")]
    pub bottom_ratio: f64,
    #[serde(default = "default_ball_type")]
    pub ball_type: BallType,
}

fn default_release_plane_z_ft() -> f64 {
    50.0
}
fn default_batter_height_in() -> f64 {
    72.0
}
fn default_top_ratio() -> f64 {
    0.53
}
fn default_bottom_ratio() -> f64 {
    0.27
}
fn default_ball_type() -> BallType {
    BallType::Baseball
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            plate_plane_z_ft: 0.0,
            release_plane_z_ft: default_release_plane_z_ft(),
            batter_height_in: default_batter_height_in(),
            top_ratio: default_top_ratio(),
            bottom_ratio: default_bottom_ratio(),
            ball_type: default_ball_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub save_detections: bool,
    #[serde(default = "default_true")]
    pub save_observations: bool,
    #[serde(default)]
    pub save_training_frames: bool,
    #[serde(default = "default_frame_save_interval")]
    pub frame_save_interval: u32,
}

fn default_true() -> bool {
    true
}
fn default_frame_save_interval() -> u32 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub stereo: StereoConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub recording: RecordingConfig,
}

impl Config {
    /// Load and validate a configuration file. Fails fast on unknown keys
    /// (via `deny_unknown_fields`) or out-of-range values (via
    /// [`Config::validate`]).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Invalid("camera width/height must be > 0".into()));
        }
        if self.camera.fps <= 0.0 {
            return Err(Error::Invalid("camera fps must be > 0".into()));
        }
        if self.capture.queue_size == 0 {
            return Err(Error::Invalid("capture.queue_size must be > 0".into()));
        }
        if self.stereo.z_min_ft >= self.stereo.z_max_ft {
            return Err(Error::Invalid("stereo.z_min_ft must be < z_max_ft".into()));
        }
        if self.stereo.pairing_tolerance_ms <= 0.0 {
            return Err(Error::Invalid(
                "stereo.pairing_tolerance_ms must be > 0".into(),
            ));
        }
        if self.tracking.min_active_frames == 0 {
            return Err(Error::Invalid(
                "tracking.min_active_frames must be > 0".into(),
            ));
        }
        if self.tracking.end_gap_frames == 0 {
            return Err(Error::Invalid("tracking.end_gap_frames must be > 0".into()));
        }
        if self.tracking.min_observations == 0 {
            return Err(Error::Invalid(
                "tracking.min_observations must be > 0".into(),
            ));
        }
        if self.metrics.top_ratio <= self.metrics.bottom_ratio {
            return Err(Error::Invalid(
                "metrics.top_ratio must be > bottom_ratio".into(),
            ));
        }
        if self.detector.conf_threshold < 0.0 || self.detector.conf_threshold > 1.0 {
            return Err(Error::Invalid(
                "detector.conf_threshold must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Derive a [`pitch_types::StrikeZone`] from `metrics`.
    pub fn strike_zone(&self) -> pitch_types::StrikeZone {
        let height_ft = self.metrics.batter_height_in / 12.0;
        let top = height_ft * self.metrics.top_ratio;
        let bottom = height_ft * self.metrics.bottom_ratio;
        // Standard home plate half-width, 8.5 in, in feet.
        let half_width_ft = 8.5 / 12.0;
        let z = self.metrics.plate_plane_z_ft;
        pitch_types::StrikeZone {
            top_left: (-half_width_ft, top, z),
            top_right: (half_width_ft, top, z),
            bottom_left: (-half_width_ft, bottom, z),
            bottom_right: (half_width_ft, bottom, z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [camera]
        width = 640
        height = 480
        fps = 120.0

        [recording]
        output_dir = "/tmp/pitchtrack-sessions"
        "#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let cfg: Config = toml::from_str(minimal_toml()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.capture.queue_size, 6);
        assert_eq!(cfg.tracking.min_active_frames, 5);
        assert_eq!(cfg.tracking.end_gap_frames, 10);
        assert!(cfg.recording.save_detections);
    }

    #[test]
    fn unknown_key_fails_fast() {
        let toml_text = format!(
            "{}\n[camera]\nwidth=1\nheight=1\nfps=1.0\nbogus_key=1\n",
            minimal_toml()
        );
        let result: std::result::Result<Config, toml::de::Error> = toml::from_str(&toml_text);
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_z_fails_validation() {
        let mut cfg: Config = toml::from_str(minimal_toml()).unwrap();
        cfg.stereo.z_min_ft = 90.0;
        cfg.stereo.z_max_ft = 80.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, minimal_toml()).unwrap();
        let cfg = Config::load_from_file(&path).unwrap();
        assert_eq!(cfg.camera.width, 640);
    }
}
