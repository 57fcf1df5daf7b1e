use crate::frame::{CameraSide, Frame};
use crate::StereoObservation;
use serde::{Deserialize, Serialize};

/// Frames drained from the pre-roll ring (or buffered in a pitch's active
/// window), one list per camera.
#[derive(Debug, Clone, Default)]
pub struct PerCameraFrames {
    pub left: Vec<Frame>,
    pub right: Vec<Frame>,
}

impl PerCameraFrames {
    pub fn get(&self, side: CameraSide) -> &Vec<Frame> {
        match side {
            CameraSide::Left => &self.left,
            CameraSide::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: CameraSide) -> &mut Vec<Frame> {
        match side {
            CameraSide::Left => &mut self.left,
            CameraSide::Right => &mut self.right,
        }
    }
}

/// Aggregate produced on pitch finalization. Invariants: observations sorted
/// strictly increasing by `t_ns`, `end_ns >= start_ns`, `len() >=
/// min_observations` when `valid`.
#[derive(Debug, Clone)]
pub struct PitchData {
    /// 1-based, monotonically incremented exactly once per pitch.
    pub pitch_index: u32,
    pub start_ns: i64,
    pub end_ns: i64,
    pub pre_roll_frames: PerCameraFrames,
    pub observations: Vec<StereoObservation>,
    pub valid: bool,
}

impl PitchData {
    /// Duration of the pitch from first to last accepted detection.
    pub fn duration_ms(&self) -> f64 {
        (self.end_ns - self.start_ns) as f64 / 1_000_000.0
    }

    /// Checks the strictly-increasing-`t_ns` invariant. Used by tests and by
    /// the recorder before writing `observations/stereo_observations.json`.
    pub fn observations_strictly_ordered(&self) -> bool {
        self.observations
            .windows(2)
            .all(|w| w[0].t_ns < w[1].t_ns)
    }
}

/// Reasons the Metrics Analyzer may fail to produce a trustworthy summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCode {
    InsufficientPoints,
    IllConditioned,
    NonMonotonicZ,
    NoPlateCrossing,
    OptDidNotConverge,
    RadarOutlier,
    TimeSyncSuspect,
}

/// Diagnostics carried alongside a [`PitchSummary`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryDiagnostics {
    pub residual_rmse: Option<f64>,
    pub jacobian_condition_number: Option<f64>,
    pub observation_count: usize,
    pub failure_codes: Vec<FailureCode>,
    pub sanity_violations: Vec<String>,
    pub fitted_time_offset_ms: Option<f64>,
}

/// A strike-zone rectangle on the plate plane, parameterized by corner
/// points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrikeZone {
    pub top_left: (f64, f64, f64),
    pub top_right: (f64, f64, f64),
    pub bottom_left: (f64, f64, f64),
    pub bottom_right: (f64, f64, f64),
}

impl StrikeZone {
    /// Classify `(x, y)` on the plate plane into the outer rectangle and a
    /// 3x3 grid (row/col in 0..2). `is_strike` is true iff strictly inside
    /// the outer rectangle.
    pub fn classify(&self, x: f64, y: f64) -> (bool, u8, u8) {
        let x_min = self.top_left.0.min(self.bottom_left.0);
        let x_max = self.top_right.0.max(self.bottom_right.0);
        let y_min = self.bottom_left.1.min(self.bottom_right.1);
        let y_max = self.top_left.1.max(self.top_right.1);

        let is_strike = x > x_min && x < x_max && y > y_min && y < y_max;

        let col = (((x - x_min) / (x_max - x_min)) * 3.0)
            .floor()
            .clamp(0.0, 2.0) as u8;
        // Row 0 is the top of the zone, matching the usual catcher's-eye view.
        let row = (((y_max - y) / (y_max - y_min)) * 3.0)
            .floor()
            .clamp(0.0, 2.0) as u8;
        (is_strike, row, col)
    }
}

/// Output of the Metrics Analyzer, also the on-the-wire shape written into
/// the pitch manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchSummary {
    pub pitch_id: String,
    pub t_start_ns: i64,
    pub t_end_ns: i64,
    pub plate_crossing_xyz_ft: [f64; 3],
    pub plate_crossing_t_ns: i64,
    pub release_point_ft: [f64; 3],
    pub run_in: f64,
    pub rise_in: f64,
    pub measured_speed_mph: f64,
    pub rotation_rpm: Option<f64>,
    pub model: String,
    pub expected_error_ft: f64,
    pub confidence: f64,
    pub is_strike: bool,
    pub zone_row: u8,
    pub zone_col: u8,
    pub diagnostics: TrajectoryDiagnostics,
}

/// One entry in the state machine's bounded event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub t_ns: i64,
    pub kind: TrackingEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackingEventKind {
    EnteredRampUp { first_detection_ns: i64 },
    PromotedToActive { pitch_index: u32 },
    AbandonedRampUp { gap_frames: u32 },
    Finalized { pitch_index: u32, accepted: bool },
    RejectedPitch { reason: String },
    CallbackFailedRolledBack { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strike_zone_classifies_row_and_column() {
        let zone = StrikeZone {
            top_left: (0.0, 3.5, 0.0),
            top_right: (1.42, 3.5, 0.0),
            bottom_left: (0.0, 1.7, 0.0),
            bottom_right: (1.42, 1.7, 0.0),
        };
        let (is_strike, row, col) = zone.classify(0.71, 2.6);
        assert!(is_strike);
        assert_eq!(row, 1);
        assert_eq!(col, 1);

        let (is_strike, _, _) = zone.classify(1.5, 2.6);
        assert!(!is_strike);
    }
}
