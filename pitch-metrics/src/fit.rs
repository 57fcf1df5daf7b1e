//! Ballistic-plus-quadratic-drag trajectory fit.
//!
//! Grounded on `bundle-adj::BundleAdjuster`'s `levenberg_marquardt::
//! LeastSquaresProblem` implementation: the same four-method shape
//! (`set_params`/`params`/`residuals`/`jacobian`), the same choice to get
//! the Jacobian from `levenberg_marquardt::differentiate_numerically`
//! rather than hand-derive it (bundle-adj derives its own only because its
//! residual is linear-in-distortion-coefficients and cheap to
//! differentiate by hand; RK4-integrated residuals here are neither), and
//! the same `LevenbergMarquardt::new().minimize(problem)` entry point. The
//! initial guess comes from a per-axis cubic polynomial fit via `lstsq`,
//! mirroring `strand_cam::clock_model::fit_time_model`'s use of the same
//! crate for a (much simpler) linear fit.

use nalgebra::{DVector, Dyn, Owned, OMatrix, OVector, U4};

use pitch_types::StereoObservation;

/// Standard gravity, ft/s^2.
const G_FT_S2: f64 = 32.174;
/// RK4 fixed step, seconds. Spec §4.7 calls for 1-2 ms.
const RK4_STEP_S: f64 = 0.0015;
/// Prior on the drag coefficient: most baseballs sit close to this value,
/// in 1/ft, for a quadratic-drag model normalized by mass.
const DRAG_PRIOR: f64 = 0.0015;
const DRAG_PRIOR_SIGMA: f64 = 0.0008;
/// Bound on the per-pitch time-offset free parameter, seconds (spec's
/// default +/-5ms), expressed as the Gaussian prior's sigma.
const TIME_OFFSET_PRIOR_SIGMA: f64 = 0.005;

/// One (t_sec, x, y, z) sample relative to the fit's reference time.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub t_rel_s: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn samples_from_observations(observations: &[StereoObservation]) -> (i64, Vec<Sample>) {
    let t_ref_ns = observations.iter().map(|o| o.t_ns).min().unwrap_or(0);
    let samples = observations
        .iter()
        .map(|o| Sample {
            t_rel_s: (o.t_ns - t_ref_ns) as f64 / 1_000_000_000.0,
            x: o.point_ft.0,
            y: o.point_ft.1,
            z: o.point_ft.2,
        })
        .collect();
    (t_ref_ns, samples)
}

/// Per-axis cubic polynomial fit, used only to seed the nonlinear fit's
/// initial position/velocity at `t_rel_s = 0`.
fn cubic_seed(samples: &[Sample]) -> ([f64; 3], [f64; 3]) {
    let n = samples.len();
    let mut a_rows = Vec::with_capacity(n * 4);
    let (mut bx, mut by, mut bz) = (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
    for s in samples {
        let t = s.t_rel_s;
        a_rows.extend_from_slice(&[t * t * t, t * t, t, 1.0]);
        bx.push(s.x);
        by.push(s.y);
        bz.push(s.z);
    }
    let a = OMatrix::<f64, Dyn, U4>::from_row_slice(&a_rows);
    let epsilon = 1e-10;

    let fit_axis = |b: &[f64]| -> (f64, f64) {
        let b = OVector::<f64, Dyn>::from_row_slice(b);
        match lstsq::lstsq(&a, &b, epsilon) {
            // solution = [c3, c2, c1, c0] for c3*t^3 + c2*t^2 + c1*t + c0.
            // Position and velocity at t=0 are c0 and c1 respectively.
            Ok(result) => (result.solution[3], result.solution[2]),
            Err(_) => (b[b.len() / 2], 0.0),
        }
    };

    let (x0, vx0) = fit_axis(&bx);
    let (y0, vy0) = fit_axis(&by);
    let (z0, vz0) = fit_axis(&bz);
    ([x0, y0, z0], [vx0, vy0, vz0])
}

/// State integrated by RK4: position then velocity.
type State = [f64; 6];

fn derivative(state: &State, k: f64) -> State {
    let [_, _, _, vx, vy, vz] = *state;
    let speed = (vx * vx + vy * vy + vz * vz).sqrt();
    [
        vx,
        vy,
        vz,
        -k * speed * vx,
        -G_FT_S2 - k * speed * vy,
        -k * speed * vz,
    ]
}

fn rk4_step(state: &State, h: f64, k: f64) -> State {
    let add = |a: &State, b: &State, scale: f64| -> State {
        let mut out = [0.0; 6];
        for i in 0..6 {
            out[i] = a[i] + b[i] * scale;
        }
        out
    };
    let k1 = derivative(state, k);
    let k2 = derivative(&add(state, &k1, h / 2.0), k);
    let k3 = derivative(&add(state, &k2, h / 2.0), k);
    let k4 = derivative(&add(state, &k3, h), k);
    let mut out = [0.0; 6];
    for i in 0..6 {
        out[i] = state[i] + (h / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    out
}

/// Integrates from `state0` at `t0` to `t_target`, in fixed `RK4_STEP_S`
/// sub-steps (the last one shortened to land exactly on `t_target`).
pub fn integrate(state0: State, t0: f64, t_target: f64, k: f64) -> State {
    let dt = t_target - t0;
    if dt == 0.0 {
        return state0;
    }
    let dir = dt.signum();
    let n_steps = (dt.abs() / RK4_STEP_S).ceil().max(1.0) as usize;
    let h = dt / n_steps as f64 * dir.abs(); // dt/n_steps already carries sign
    let mut state = state0;
    let mut t = t0;
    for i in 0..n_steps {
        let step_h = if i == n_steps - 1 { t_target - t } else { h };
        state = rk4_step(&state, step_h, k);
        t += step_h;
    }
    state
}

/// Nonlinear least-squares problem: fit `(x0, y0, z0, vx0, vy0, vz0, k,
/// dt_offset)` to a set of (t, x, y, z) samples via RK4-integrated
/// residuals, with Gaussian priors on `k` and `dt_offset` appended as
/// extra residual rows.
#[derive(Clone)]
pub struct TrajectoryFit {
    samples: Vec<Sample>,
    params: DVector<f64>,
}

impl TrajectoryFit {
    pub fn new(samples: Vec<Sample>) -> Self {
        let (pos0, vel0) = cubic_seed(&samples);
        let params = DVector::from_vec(vec![
            pos0[0], pos0[1], pos0[2], vel0[0], vel0[1], vel0[2], DRAG_PRIOR, 0.0,
        ]);
        Self { samples, params }
    }

    fn state0(&self) -> State {
        let p = &self.params;
        [p[0], p[1], p[2], p[3], p[4], p[5]]
    }

    fn drag(&self) -> f64 {
        self.params[6]
    }

    fn dt_offset(&self) -> f64 {
        self.params[7]
    }

    /// Evaluates the fitted trajectory's state at `t_rel_s` (relative to
    /// the fit's `t_ref`), honoring the fitted time offset.
    pub fn state_at(&self, t_rel_s: f64) -> State {
        integrate(self.state0(), 0.0, t_rel_s + self.dt_offset(), self.drag())
    }

    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    pub fn drag_coefficient(&self) -> f64 {
        self.drag()
    }

    pub fn time_offset_s(&self) -> f64 {
        self.dt_offset()
    }
}

impl levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn> for TrajectoryFit {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params = x.clone();
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut residuals = Vec::with_capacity(self.samples.len() * 3 + 2);
        for sample in &self.samples {
            let state = self.state_at(sample.t_rel_s);
            residuals.push(state[0] - sample.x);
            residuals.push(state[1] - sample.y);
            residuals.push(state[2] - sample.z);
        }
        residuals.push((self.drag() - DRAG_PRIOR) / DRAG_PRIOR_SIGMA);
        residuals.push(self.dt_offset() / TIME_OFFSET_PRIOR_SIGMA);
        Some(DVector::from_vec(residuals))
    }

    fn jacobian(&self) -> Option<levenberg_marquardt::SparseJacobian<f64>> {
        let mut copy = self.clone();
        let dense = levenberg_marquardt::differentiate_numerically(&mut copy)?;
        Some(levenberg_marquardt::SparseJacobian::from_dense(dense))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_samples(vx: f64, vy: f64, vz: f64) -> Vec<Sample> {
        // Pure ballistic (no drag) trajectory, sampled every 20ms for 0.3s,
        // used so the seeded cubic is close to exact and the fit should
        // converge with a small residual.
        let mut out = Vec::new();
        let mut t = 0.0;
        let state0 = [0.0, 6.0, 55.0, vx, vy, vz];
        while t <= 0.3 {
            let s = integrate(state0, 0.0, t, 0.0);
            out.push(Sample {
                t_rel_s: t,
                x: s[0],
                y: s[1],
                z: s[2],
            });
            t += 0.02;
        }
        out
    }

    #[test]
    fn cubic_seed_recovers_linear_velocity_with_no_drag() {
        let samples = make_samples(3.0, -2.0, -130.0);
        let (pos0, vel0) = cubic_seed(&samples);
        approx::assert_abs_diff_eq!(pos0[2], 55.0, epsilon = 0.2);
        approx::assert_abs_diff_eq!(vel0[2], -130.0, epsilon = 2.0);
    }

    #[test]
    fn fit_converges_close_to_generating_parameters() {
        let samples = make_samples(3.0, -2.0, -130.0);
        let mut fit = TrajectoryFit::new(samples);
        fit.params[6] = 0.0; // seed with no drag since the synthetic data has none
        let (fit, report) = levenberg_marquardt::LevenbergMarquardt::new().minimize(fit);
        assert!(report.termination.was_successful());
        let final_state = fit.state_at(0.2);
        let expected = integrate([0.0, 6.0, 55.0, 3.0, -2.0, -130.0], 0.0, 0.2, 0.0);
        approx::assert_abs_diff_eq!(final_state[2], expected[2], epsilon = 0.5);
    }
}
