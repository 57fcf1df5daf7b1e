//! Shared data model for the stereo pitch-tracking pipeline.
//!
//! This crate plays the same role in this workspace that `flydra-types`
//! plays in the corpus it is modeled on: a dependency-light vocabulary of
//! plain data types that every other crate in the pipeline shares, so that
//! none of them need to depend on each other just to pass a [`Frame`] or a
//! [`StereoObservation`] around.

mod calibration;
mod frame;
mod pitch;
mod roi;

pub use calibration::{CalibrationProfile, CameraIntrinsics, StereoGeometry};
pub use frame::{CameraSide, Detection, DetectorMode, Frame, PixelFormat};
pub use pitch::{
    FailureCode, PerCameraFrames, PitchData, PitchSummary, StrikeZone, TrackingEvent,
    TrackingEventKind, TrajectoryDiagnostics,
};
pub use roi::RoiPolygon;

use serde::{Deserialize, Serialize};

/// A single triangulated 3D observation of the ball, with the 2D detections
/// that produced it.
///
/// `t_ns` is the mean of the two contributing frames' capture timestamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StereoObservation {
    pub t_ns: i64,
    pub left_px: (f64, f64),
    pub right_px: (f64, f64),
    /// Rig-coordinate 3D point in feet: X lateral, Y vertical, Z toward plate.
    pub point_ft: (f64, f64, f64),
    /// Optional 3x3 covariance, row-major, in feet^2.
    pub covariance: Option<[[f64; 3]; 3]>,
    /// In [0, 1]. Combines epipolar agreement and reprojection residual.
    pub quality: f64,
    /// In [0, 1]. Product of the two detections' confidences and `quality`.
    pub confidence: f64,
}

impl StereoObservation {
    pub fn x_ft(&self) -> f64 {
        self.point_ft.0
    }
    pub fn y_ft(&self) -> f64 {
        self.point_ft.1
    }
    pub fn z_ft(&self) -> f64 {
        self.point_ft.2
    }
}

/// A named, on-disk recording of a capture run, rooted at the configured
/// recording root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub schema_version: u32,
    pub app_version: String,
    pub session_id: String,
    pub start_utc: chrono::DateTime<chrono::Utc>,
    pub end_utc: Option<chrono::DateTime<chrono::Utc>>,
    pub pitch_count: u32,
    pub session_left_video: Option<String>,
    pub session_right_video: Option<String>,
    pub session_left_timestamps: Option<String>,
    pub session_right_timestamps: Option<String>,
    pub calibration_exported: bool,
}

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
