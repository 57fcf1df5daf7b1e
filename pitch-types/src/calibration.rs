use serde::{Deserialize, Serialize};

/// Per-camera intrinsics, as produced by an external calibration tool.
/// Never produced by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub serial: String,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Radial/tangential distortion coefficients, in whatever order the
    /// calibration tool used; this core does not interpret them beyond
    /// passing them through to distortion-correction (out of scope for
    /// triangulation itself, which operates on rectified coordinates).
    pub distortion: Vec<f64>,
}

/// Stereo rig geometry: baseline and the two 3x4 projection matrices used
/// for linear triangulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StereoGeometry {
    pub baseline_ft: f64,
    /// Row-major 3x4 projection matrix for the left camera, in rectified
    /// rig coordinates.
    pub projection_left: [[f64; 4]; 3],
    /// Row-major 3x4 projection matrix for the right camera, in rectified
    /// rig coordinates.
    pub projection_right: [[f64; 4]; 3],
}

/// Inputs to the core that are never produced by it: per-camera intrinsics,
/// stereo geometry, and the reference planes/serials the profile was
/// calibrated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub left_serial: String,
    pub right_serial: String,
    pub left_intrinsics: CameraIntrinsics,
    pub right_intrinsics: CameraIntrinsics,
    pub stereo: StereoGeometry,
    pub plate_plane_z_ft: f64,
}
