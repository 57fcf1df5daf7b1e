//! Metrics Analyzer: fits a trajectory to a completed pitch's stereo
//! observations and derives plate-crossing, velocity, break, strike-zone
//! classification and a confidence scalar.
//!
//! `analyze` is a pure function; it never raises on bad input — failures
//! are carried in [`pitch_types::TrajectoryDiagnostics::failure_codes`]
//! with `confidence` driven toward zero instead.

mod fit;

use pitch_config::MetricsConfig;
use pitch_types::{FailureCode, PitchData, PitchSummary, StrikeZone, TrajectoryDiagnostics};

use fit::{samples_from_observations, Sample, TrajectoryFit};

const MIN_OBSERVATIONS: usize = 5;
const VELOCITY_RANGE_MPH: (f64, f64) = (30.0, 110.0);
const BREAK_RANGE_IN: f64 = 30.0;
const RELEASE_HEIGHT_RANGE_FT: (f64, f64) = (1.0, 8.0);
/// Window, measured backward from the release point, over which the
/// release velocity is averaged.
const RELEASE_VELOCITY_WINDOW_S: f64 = 0.02;
const FT_PER_MPH_SEC: f64 = 1.4667; // 1 mph = 1.4667 ft/s

/// Fits a trajectory to `pitch.observations` and produces a [`PitchSummary`].
/// Never panics or returns `Err`; instead low-confidence/failed fits are
/// represented in the returned summary's diagnostics.
pub fn analyze(pitch: &PitchData, pitch_id: &str, metrics_cfg: &MetricsConfig, zone: &StrikeZone) -> PitchSummary {
    let mut diagnostics = TrajectoryDiagnostics {
        observation_count: pitch.observations.len(),
        ..Default::default()
    };

    if pitch.observations.len() < MIN_OBSERVATIONS {
        diagnostics.failure_codes.push(FailureCode::InsufficientPoints);
        return failed_summary(pitch, pitch_id, diagnostics);
    }

    let (t_ref_ns, samples) = samples_from_observations(&pitch.observations);
    let problem = TrajectoryFit::new(samples.clone());
    let (fitted, report) =
        levenberg_marquardt::LevenbergMarquardt::new().minimize(problem);

    if !report.termination.was_successful() {
        diagnostics.failure_codes.push(FailureCode::OptDidNotConverge);
        return failed_summary(pitch, pitch_id, diagnostics);
    }

    if !z_is_monotonic(&fitted, &samples) {
        diagnostics.failure_codes.push(FailureCode::NonMonotonicZ);
        return failed_summary(pitch, pitch_id, diagnostics);
    }

    let residual_rmse = residual_rmse(&fitted, &samples);
    let condition_number = jacobian_condition_number(&fitted);
    diagnostics.residual_rmse = Some(residual_rmse);
    diagnostics.jacobian_condition_number = condition_number;
    diagnostics.fitted_time_offset_ms = Some(fitted.time_offset_s() * 1000.0);

    let t_min = samples.iter().map(|s| s.t_rel_s).fold(f64::INFINITY, f64::min);
    let t_max = samples.iter().map(|s| s.t_rel_s).fold(f64::NEG_INFINITY, f64::max);

    let plate_crossing = find_crossing(&fitted, metrics_cfg.plate_plane_z_ft, t_min, t_max);
    let Some(plate_t) = plate_crossing else {
        diagnostics.failure_codes.push(FailureCode::NoPlateCrossing);
        return failed_summary(pitch, pitch_id, diagnostics);
    };
    let plate_state = fitted.state_at(plate_t);
    let plate_crossing_t_ns = t_ref_ns + (plate_t * 1_000_000_000.0).round() as i64;

    let release_t = find_crossing(&fitted, metrics_cfg.release_plane_z_ft, t_min - 1.0, t_max)
        .unwrap_or(t_min);
    let release_state = fitted.state_at(release_t);

    let release_speed_state = fitted.state_at(release_t + RELEASE_VELOCITY_WINDOW_S);
    let [_, _, _, vx, vy, vz] = release_speed_state;
    let measured_speed_mph = (vx * vx + vy * vy + vz * vz).sqrt() / FT_PER_MPH_SEC;

    // Gravity-only baseline from the release state, used to isolate break
    // due to drag/spin from the ball's own straight-line ballistic path.
    let baseline_plate = fit::integrate(release_state, release_t, plate_t, 0.0);
    let run_in = (plate_state[0] - baseline_plate[0]) * 12.0;
    let rise_in = (plate_state[1] - baseline_plate[1]) * 12.0;

    let (is_strike, zone_row, zone_col) = zone.classify(plate_state[0], plate_state[1]);

    let mut sanity_violations = Vec::new();
    if measured_speed_mph < VELOCITY_RANGE_MPH.0 || measured_speed_mph > VELOCITY_RANGE_MPH.1 {
        sanity_violations.push(format!("velocity {measured_speed_mph:.1} mph out of range"));
    }
    if run_in.abs() > BREAK_RANGE_IN || rise_in.abs() > BREAK_RANGE_IN {
        sanity_violations.push(format!("break ({run_in:.1}, {rise_in:.1}) in out of range"));
    }
    if release_state[1] < RELEASE_HEIGHT_RANGE_FT.0 || release_state[1] > RELEASE_HEIGHT_RANGE_FT.1 {
        sanity_violations.push(format!("release height {:.2} ft out of range", release_state[1]));
    }
    diagnostics.sanity_violations = sanity_violations.clone();

    let confidence = confidence_score(
        residual_rmse,
        condition_number,
        pitch.observations.len(),
        sanity_violations.len(),
    );
    let expected_error_ft = residual_rmse * condition_number.unwrap_or(1.0).sqrt().min(10.0);

    PitchSummary {
        pitch_id: pitch_id.to_string(),
        t_start_ns: pitch.start_ns,
        t_end_ns: pitch.end_ns,
        plate_crossing_xyz_ft: [plate_state[0], plate_state[1], plate_state[2]],
        plate_crossing_t_ns,
        release_point_ft: [release_state[0], release_state[1], release_state[2]],
        run_in,
        rise_in,
        measured_speed_mph,
        rotation_rpm: None,
        model: "ballistic-quadratic-drag-rk4".to_string(),
        expected_error_ft,
        confidence,
        is_strike,
        zone_row,
        zone_col,
        diagnostics,
    }
}

fn failed_summary(pitch: &PitchData, pitch_id: &str, diagnostics: TrajectoryDiagnostics) -> PitchSummary {
    PitchSummary {
        pitch_id: pitch_id.to_string(),
        t_start_ns: pitch.start_ns,
        t_end_ns: pitch.end_ns,
        plate_crossing_xyz_ft: [0.0; 3],
        plate_crossing_t_ns: pitch.end_ns,
        release_point_ft: [0.0; 3],
        run_in: 0.0,
        rise_in: 0.0,
        measured_speed_mph: 0.0,
        rotation_rpm: None,
        model: "ballistic-quadratic-drag-rk4".to_string(),
        expected_error_ft: f64::INFINITY,
        confidence: 0.0,
        is_strike: false,
        zone_row: 1,
        zone_col: 1,
        diagnostics,
    }
}

/// Z must move monotonically along the traversal direction; a wobble
/// means the fit found a degenerate (e.g. near-zero-velocity) solution.
fn z_is_monotonic(fit: &TrajectoryFit, samples: &[Sample]) -> bool {
    let z_first = fit.state_at(samples.first().map(|s| s.t_rel_s).unwrap_or(0.0))[2];
    let z_last = fit.state_at(samples.last().map(|s| s.t_rel_s).unwrap_or(0.0))[2];
    let direction = (z_last - z_first).signum();
    if direction == 0.0 {
        return false;
    }
    let mut t = samples.first().map(|s| s.t_rel_s).unwrap_or(0.0);
    let t_end = samples.last().map(|s| s.t_rel_s).unwrap_or(0.0);
    let step = (t_end - t) / 20.0;
    if step == 0.0 {
        return true;
    }
    let mut prev_z = fit.state_at(t)[2];
    t += step;
    while (step > 0.0 && t <= t_end) || (step < 0.0 && t >= t_end) {
        let z = fit.state_at(t)[2];
        if (z - prev_z) * direction > 1e-6 {
            return false;
        }
        prev_z = z;
        t += step;
    }
    true
}

/// Finds `t` in `[lo, hi]` (extended slightly past the observed window for
/// the release-plane search) where Z crosses `target_z`, via bisection on
/// the monotonically-decreasing Z(t).
fn find_crossing(fit: &TrajectoryFit, target_z: f64, lo: f64, hi: f64) -> Option<f64> {
    let z = |t: f64| fit.state_at(t)[2];
    let mut lo = lo;
    let mut hi = hi;
    let z_lo = z(lo);
    let z_hi = z(hi);
    if (z_lo - target_z).abs() < 1e-9 {
        return Some(lo);
    }
    if (z_lo - target_z).signum() == (z_hi - target_z).signum() {
        return None;
    }
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        let z_mid = z(mid);
        if (z_mid - target_z).abs() < 1e-6 {
            return Some(mid);
        }
        if (z_mid - target_z).signum() == (z_lo - target_z).signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some((lo + hi) / 2.0)
}

fn residual_rmse(fit: &TrajectoryFit, samples: &[Sample]) -> f64 {
    let sum_sq: f64 = samples
        .iter()
        .map(|s| {
            let state = fit.state_at(s.t_rel_s);
            let dx = state[0] - s.x;
            let dy = state[1] - s.y;
            let dz = state[2] - s.z;
            dx * dx + dy * dy + dz * dz
        })
        .sum();
    (sum_sq / (samples.len() as f64 * 3.0)).sqrt()
}

fn jacobian_condition_number(fit: &TrajectoryFit) -> Option<f64> {
    let mut copy = fit.clone();
    let jacobian = levenberg_marquardt::differentiate_numerically(&mut copy)?;
    let svd = jacobian.svd(false, false);
    let max = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let min = svd
        .singular_values
        .iter()
        .cloned()
        .filter(|v| *v > 1e-12)
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() && min > 0.0 {
        Some(max / min)
    } else {
        None
    }
}

fn confidence_score(
    residual_rmse: f64,
    condition_number: Option<f64>,
    observation_count: usize,
    sanity_violation_count: usize,
) -> f64 {
    // Residual term: decays from 1.0 as RMSE grows past a few inches.
    let residual_term = (1.0 - residual_rmse / 0.5).clamp(0.0, 1.0);
    // Conditioning term: a well-posed fit sits near 1e2-1e3; penalize above 1e5.
    let condition_term = match condition_number {
        Some(cond) if cond.is_finite() => (1.0 - (cond / 1e5).min(1.0)).clamp(0.0, 1.0),
        _ => 0.3,
    };
    let count_term = ((observation_count as f64 - MIN_OBSERVATIONS as f64) / 20.0).clamp(0.0, 1.0);
    let sanity_term = if sanity_violation_count == 0 { 1.0 } else { 0.3 };

    (0.4 * residual_term + 0.25 * condition_term + 0.15 * count_term + 0.2 * sanity_term).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_types::StereoObservation;

    fn strike_zone() -> StrikeZone {
        StrikeZone {
            top_left: (-0.708, 3.5, 0.0),
            top_right: (0.708, 3.5, 0.0),
            bottom_left: (-0.708, 1.7, 0.0),
            bottom_right: (0.708, 1.7, 0.0),
        }
    }

    fn synthetic_pitch(vx: f64, vy: f64, vz: f64, k: f64, n: usize) -> PitchData {
        let state0 = [0.1, 6.0, 55.0, vx, vy, vz];
        let mut observations = Vec::new();
        let mut t = 0.0;
        for i in 0..n {
            let s = fit::integrate(state0, 0.0, t, k);
            observations.push(StereoObservation {
                t_ns: (t * 1_000_000_000.0) as i64 + 1_000_000,
                left_px: (0.0, 0.0),
                right_px: (0.0, 0.0),
                point_ft: (s[0], s[1], s[2]),
                covariance: None,
                quality: 0.9,
                confidence: 0.9,
            });
            t += 0.015;
            let _ = i;
        }
        PitchData {
            pitch_index: 1,
            start_ns: observations.first().unwrap().t_ns,
            end_ns: observations.last().unwrap().t_ns,
            pre_roll_frames: Default::default(),
            observations,
            valid: true,
        }
    }

    #[test]
    fn analyze_recovers_plausible_speed_for_synthetic_fastball() {
        let pitch = synthetic_pitch(2.0, -3.0, -135.0, 0.0015, 25);
        let cfg = MetricsConfig::default();
        let zone = strike_zone();
        let summary = analyze(&pitch, "test-pitch-1", &cfg, &zone);

        assert!(summary.diagnostics.failure_codes.is_empty(), "{:?}", summary.diagnostics);
        assert!(summary.measured_speed_mph > 80.0 && summary.measured_speed_mph < 100.0);
        assert!(summary.confidence > 0.3);
    }

    #[test]
    fn too_few_observations_yields_insufficient_points() {
        let pitch = synthetic_pitch(2.0, -3.0, -135.0, 0.0015, 3);
        let cfg = MetricsConfig::default();
        let zone = strike_zone();
        let summary = analyze(&pitch, "test-pitch-2", &cfg, &zone);
        assert_eq!(summary.confidence, 0.0);
        assert!(summary
            .diagnostics
            .failure_codes
            .contains(&FailureCode::InsufficientPoints));
    }

    #[test]
    fn velocity_estimate_is_stable_across_repeated_fits() {
        let pitch = synthetic_pitch(2.0, -3.0, -135.0, 0.0015, 25);
        let cfg = MetricsConfig::default();
        let zone = strike_zone();
        let speeds: Vec<f64> = (0..5)
            .map(|_| analyze(&pitch, "test-pitch-3", &cfg, &zone).measured_speed_mph)
            .collect();
        let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
        let variance = speeds.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / speeds.len() as f64;
        assert!(variance.sqrt() < 0.2, "stddev too high: {}", variance.sqrt());
    }
}
