use crate::triangulate::triangulate_dlt;
use pitch_config::StereoConfig;
use pitch_types::{CalibrationProfile, CameraSide, Detection, StereoObservation};
use std::collections::VecDeque;

struct PendingDetection {
    detection: Detection,
}

/// Pairs left/right detections by timestamp and epipolar geometry, then
/// triangulates.
///
/// Grounded on `flydra2`'s per-frame cross-camera correspondence step,
/// simplified here to the fixed two-camera case (no general N-camera
/// combinatorial matching is needed) and on `mvg`'s triangulation entry
/// point, specialized in [`crate::triangulate`].
pub struct StereoMatcher {
    calibration: CalibrationProfile,
    pairing_tolerance_ns: f64,
    epipolar_epsilon_px: f64,
    z_min_ft: f64,
    z_max_ft: f64,
    left_window: VecDeque<PendingDetection>,
    right_window: VecDeque<PendingDetection>,
}

impl StereoMatcher {
    pub fn new(calibration: CalibrationProfile, cfg: &StereoConfig) -> Self {
        Self {
            calibration,
            pairing_tolerance_ns: cfg.pairing_tolerance_ms * 1.0e6,
            epipolar_epsilon_px: cfg.epipolar_epsilon_px,
            z_min_ft: cfg.z_min_ft,
            z_max_ft: cfg.z_max_ft,
            left_window: VecDeque::new(),
            right_window: VecDeque::new(),
        }
    }

    /// Feeds one new detection from either camera. Returns a
    /// [`StereoObservation`] if this detection completes a pair, `None`
    /// otherwise (the detection is buffered in the sliding window awaiting a
    /// partner, or was discarded).
    pub fn push_detection(&mut self, detection: Detection) -> Option<StereoObservation> {
        let (own_window, other_window, is_left) = match detection.camera {
            CameraSide::Left => (&mut self.left_window, &mut self.right_window, true),
            CameraSide::Right => (&mut self.right_window, &mut self.left_window, false),
        };

        evict_stale(other_window, detection.t_capture_monotonic_ns, self.pairing_tolerance_ns);
        evict_stale(own_window, detection.t_capture_monotonic_ns, self.pairing_tolerance_ns);

        let mut best: Option<(usize, f64, f64)> = None; // (index, time_gap, epipolar_residual)
        for (idx, pending) in other_window.iter().enumerate() {
            let dt = (pending.detection.t_capture_monotonic_ns - detection.t_capture_monotonic_ns)
                .unsigned_abs() as f64;
            if dt > self.pairing_tolerance_ns {
                continue;
            }
            let (left_v, right_v) = if is_left {
                (detection.v_px, pending.detection.v_px)
            } else {
                (pending.detection.v_px, detection.v_px)
            };
            let residual = (left_v - right_v).abs();
            if residual > self.epipolar_epsilon_px {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, best_dt, best_residual)) => {
                    dt < *best_dt || (dt == *best_dt && residual < *best_residual)
                }
            };
            if better {
                best = Some((idx, dt, residual));
            }
        }

        if let Some((idx, _dt, residual)) = best {
            let partner = other_window.remove(idx).unwrap().detection;
            let (left_det, right_det) = if is_left {
                (detection, partner)
            } else {
                (partner, detection)
            };
            return self.finalize_pair(left_det, right_det, residual);
        }

        own_window.push_back(PendingDetection { detection });
        None
    }

    fn finalize_pair(
        &self,
        left: Detection,
        right: Detection,
        epipolar_residual: f64,
    ) -> Option<StereoObservation> {
        let point_ft =
            triangulate_dlt(&self.calibration.stereo, (left.u_px, left.v_px), (right.u_px, right.v_px))?;
        if point_ft.2 < self.z_min_ft || point_ft.2 > self.z_max_ft {
            tracing::debug!(z_ft = point_ft.2, "rejecting observation: Z out of range");
            return None;
        }

        let quality = (1.0 - epipolar_residual / self.epipolar_epsilon_px).clamp(0.0, 1.0);
        let confidence = left.confidence * right.confidence * quality;
        let t_ns = (left.t_capture_monotonic_ns + right.t_capture_monotonic_ns) / 2;

        Some(StereoObservation {
            t_ns,
            left_px: (left.u_px, left.v_px),
            right_px: (right.u_px, right.v_px),
            point_ft,
            covariance: None,
            quality,
            confidence,
        })
    }
}

/// Evicts entries older than 4x the pairing tolerance relative to
/// `reference_t_ns`; unpaired detections older than the window are
/// discarded. The 4x margin keeps a just-missed partner around
/// long enough to be evicted by an explicit age check rather than by window
/// length, since frame rate (and therefore the natural count-based window
/// size) varies by camera configuration.
fn evict_stale(window: &mut VecDeque<PendingDetection>, reference_t_ns: i64, tolerance_ns: f64) {
    while let Some(front) = window.front() {
        let age = (reference_t_ns - front.detection.t_capture_monotonic_ns) as f64;
        if age > tolerance_ns * 4.0 {
            window.pop_front();
        } else {
            break;
        }
    }
}
