//! Implicit-midpoint propagator with Strang/Suzuki composition for higher
//! order, checkpointed forward sweep, and the reverse-mode adjoint sweep
//!.

use nalgebra::DVector;
use optctl_core::context::Diagnostics;
use optctl_core::error::Result;
use optctl_operator::MasterEq;

use crate::linsolve::{solve, LinSolverType};

/// Compositional order of the wrapper around the base implicit-midpoint
/// step. `Two` is the bare IMR step; `Four` and `Eight` are palindromic
/// compositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionOrder {
    Two,
    Four,
    Eight,
}

/// Whether the forward sweep retains every macro-step state (required for
/// Lindblad; optional for reversible Schrodinger dynamics, which can be
/// replayed instead —  "TrajectoryCheckpoint", 
/// windowed-checkpointing seam).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    Full,
    None,
}

/// Per-step state machine, recorded for diagnostics and tests; the stepper
/// always drives a step to `Advanced` (non-convergence is a recorded
/// warning, not a hard failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Ready,
    AssembledMid,
    LinSolveStarted,
    LinSolveDone,
    Advanced,
}

/// `gamma_1 = 1/(2 - 2^(1/3))`, `gamma_0 = 1 - 2*gamma_1`: the Yoshida
/// triple-jump coefficients for the order-4 composition.
fn yoshida_gamma1() -> f64 {
    1.0 / (2.0 - 2f64.powf(1.0 / 3.0))
}

/// `p = 1/(4 - 4^(1/3))`: the Suzuki quintuple-jump coefficient that lifts
/// an order-`2k` composition to order `2k+2`.
fn suzuki_p() -> f64 {
    1.0 / (4.0 - 4f64.powf(1.0 / 3.0))
}

fn order4_substeps(dt: f64) -> Vec<f64> {
    let g1 = yoshida_gamma1();
    let g0 = 1.0 - 2.0 * g1;
    vec![g1 * dt, g0 * dt, g1 * dt]
}

/// Sub-step durations (summing to `dt`) that realise the requested
/// compositional order, applying the base IMR step once per entry
///.
pub fn composition_substeps(order: CompositionOrder, dt: f64) -> Vec<f64> {
    match order {
        CompositionOrder::Two => vec![dt],
        CompositionOrder::Four => order4_substeps(dt),
        CompositionOrder::Eight => {
            let p = suzuki_p();
            let coeffs = [p, p, 1.0 - 4.0 * p, p, p];
            coeffs.iter().flat_map(|c| order4_substeps(c * dt)).collect()
        }
    }
}

/// The state entering one base IMR sub-step, kept so the reverse sweep can
/// redo the forward half-step without
/// needing a separate per-substep checkpoint store.
#[derive(Debug, Clone)]
struct SubstepRecord {
    t_start: f64,
    dt: f64,
    x_n: DVector<f64>,
}

/// Result of a completed forward sweep: the final state, and (if
/// `CheckpointPolicy::Full`) the macro-step-boundary trajectory
/// `x(t_0), ..., x(t_N)`.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub x_final: DVector<f64>,
    pub checkpoints: Option<Vec<DVector<f64>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct StepperConfig {
    pub dt: f64,
    pub ntime: usize,
    pub order: CompositionOrder,
    pub linsolver: LinSolverType,
    pub linsolve_maxiter: usize,
    pub linsolve_tol: f64,
    pub checkpoint: CheckpointPolicy,
}

impl StepperConfig {
    pub fn total_time(&self) -> f64 {
        self.dt * self.ntime as f64
    }
}

pub struct TimeStepper<'a> {
    pub master_eq: &'a MasterEq,
    pub config: StepperConfig,
}

impl<'a> TimeStepper<'a> {
    pub fn new(master_eq: &'a MasterEq, config: StepperConfig) -> Self {
        Self { master_eq, config }
    }

    /// One base implicit-midpoint step: solves `(I - dt/2 M(t+dt/2)) k =
    /// M(t+dt/2) x_n` and returns `x_n + dt*k`. Non-convergence is recorded
    /// in `diag` and the best-effort iterate is used.
    fn base_imr_forward(&self, t_start: f64, dt: f64, theta: &[f64], x_n: &DVector<f64>, step_index: usize, diag: &Diagnostics) -> (DVector<f64>, StepState) {
        // Ready -> AssembledMid: the midpoint RHS M(t+dt/2)*x_n.
        let t_mid = t_start + dt / 2.0;
        let rhs = self.master_eq.apply(t_mid, theta, x_n);
        // AssembledMid -> LinSolveStarted -> LinSolveDone.
        let apply_lhs = |v: &DVector<f64>| v - self.master_eq.apply(t_mid, theta, v) * (dt / 2.0);
        let outcome = solve(self.config.linsolver, apply_lhs, &rhs, self.config.linsolve_maxiter, self.config.linsolve_tol);
        if !outcome.converged {
            diag.record_nonconvergence();
            tracing::warn!(step = step_index, residual = outcome.residual, "linear solver did not converge within linsolve_maxiter");
        }
        (x_n + &outcome.x * dt, StepState::Advanced)
    }

    /// Runs one macro step (duration `self.config.dt`) as a composition of
    /// base IMR sub-steps, returning the final state and the per-substep
    /// records needed to redo the adjoint sweep for this macro step.
    fn forward_macro_step(&self, t0: f64, theta: &[f64], x0: DVector<f64>, step_index: usize, diag: &Diagnostics) -> (DVector<f64>, Vec<SubstepRecord>) {
        let subs = composition_substeps(self.config.order, self.config.dt);
        let mut t = t0;
        let mut x = x0;
        let mut records = Vec::with_capacity(subs.len());
        for dt_sub in subs {
            records.push(SubstepRecord { t_start: t, dt: dt_sub, x_n: x.clone() });
            let (x_next, _state) = self.base_imr_forward(t, dt_sub, theta, &x, step_index, diag);
            x = x_next;
            t += dt_sub;
        }
        (x, records)
    }

    /// Forward sweep over `self.config.ntime` macro steps, invoking `hook`
    /// after each macro step with `(step_index, t, x)` — the point where
    /// callers (e.g. `optctl-objective`'s leakage penalty) observe the
    /// trajectory without the stepper knowing about objective-specific
    /// bookkeeping.
    pub fn forward_sweep(&self, x0: &DVector<f64>, theta: &[f64], diag: &Diagnostics, mut hook: impl FnMut(usize, f64, &DVector<f64>)) -> ForwardResult {
        let mut x = x0.clone();
        let mut checkpoints = match self.config.checkpoint {
            CheckpointPolicy::Full => Some(vec![x.clone()]),
            CheckpointPolicy::None => None,
        };
        hook(0, 0.0, &x);
        let mut t = 0.0;
        for n in 0..self.config.ntime {
            let (x_next, _records) = self.forward_macro_step(t, theta, x, n, diag);
            x = x_next;
            t += self.config.dt;
            if let Some(cp) = checkpoints.as_mut() {
                cp.push(x.clone());
            }
            hook(n + 1, t, &x);
        }
        ForwardResult { x_final: x, checkpoints }
    }

    /// Recovers `x(t_n)` for macro-step index `n`, either from the stored
    /// checkpoint or by replaying the forward sweep from `x0`.
    fn macro_state(&self, n: usize, x0: &DVector<f64>, theta: &[f64], checkpoints: &Option<Vec<DVector<f64>>>, diag: &Diagnostics) -> DVector<f64> {
        if let Some(cp) = checkpoints {
            return cp[n].clone();
        }
        let mut x = x0.clone();
        let mut t = 0.0;
        for step in 0..n {
            let (x_next, _records) = self.forward_macro_step(t, theta, x, step, diag);
            x = x_next;
            t += self.config.dt;
        }
        x
    }

    /// One base IMR adjoint sub-step: recomputes the forward half-step to recover `x_mid`, solves
    /// the transposed linear system for `mu`, and closes `xbar_n`. Step 4
    /// (gradient accumulation) is left to the caller since it needs `theta`
    /// and the shared `grad` accumulator.
    fn base_imr_adjoint(&self, t_start: f64, dt: f64, theta: &[f64], x_n: &DVector<f64>, xbar_next: &DVector<f64>, step_index: usize, diag: &Diagnostics) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
        let t_mid = t_start + dt / 2.0;
        let rhs = self.master_eq.apply(t_mid, theta, x_n);
        let apply_lhs = |v: &DVector<f64>| v - self.master_eq.apply(t_mid, theta, v) * (dt / 2.0);
        let k_outcome = solve(self.config.linsolver, apply_lhs, &rhs, self.config.linsolve_maxiter, self.config.linsolve_tol);
        if !k_outcome.converged {
            diag.record_nonconvergence();
        }
        let x_mid = x_n + &k_outcome.x * (dt / 2.0);

        let apply_lhs_t = |v: &DVector<f64>| v - self.master_eq.apply_transpose(t_mid, theta, v) * (dt / 2.0);
        let mu_outcome = solve(self.config.linsolver, apply_lhs_t, xbar_next, self.config.linsolve_maxiter, self.config.linsolve_tol);
        if !mu_outcome.converged {
            diag.record_nonconvergence();
            tracing::warn!(step = step_index, residual = mu_outcome.residual, "adjoint linear solver did not converge within linsolve_maxiter");
        }
        let mu = mu_outcome.x;
        let xbar_n = xbar_next + self.master_eq.apply_transpose(t_mid, theta, &mu) * dt;

        (xbar_n, x_mid, mu)
    }

    /// Reverse sweep over all macro steps, accumulating `d J / d theta`
    /// into a freshly allocated gradient vector of length `theta.len()`.
    ///
    /// `running_seed(n, t_n, x_n)` is added into the adjoint at every
    /// macro-step boundary `t_0, ..., t_N` (called `N+1` times, in
    /// decreasing `n`), the seam a running (trajectory-integrated) cost
    /// term such as the leakage penalty uses to contribute its own
    /// `d(penalty)/dtheta` alongside the terminal-cost adjoint; callers with
    /// no running cost pass a closure returning an all-zero vector.
    pub fn reverse_sweep(
        &self,
        x0: &DVector<f64>,
        theta: &[f64],
        xbar_final: DVector<f64>,
        checkpoints: &Option<Vec<DVector<f64>>>,
        diag: &Diagnostics,
        mut running_seed: impl FnMut(usize, f64, &DVector<f64>) -> DVector<f64>,
    ) -> Result<(DVector<f64>, Vec<f64>)> {
        let ntime = self.config.ntime;
        let x_final = self.macro_state(ntime, x0, theta, checkpoints, diag);
        let mut xbar = xbar_final + running_seed(ntime, ntime as f64 * self.config.dt, &x_final);
        let mut grad = vec![0.0; theta.len()];
        for n in (0..ntime).rev() {
            let t_n = n as f64 * self.config.dt;
            let x_n = self.macro_state(n, x0, theta, checkpoints, diag);
            let (_x_next, records) = self.forward_macro_step(t_n, theta, x_n.clone(), n, diag);
            for rec in records.iter().rev() {
                let (xbar_prev, x_mid, mu) = self.base_imr_adjoint(rec.t_start, rec.dt, theta, &rec.x_n, &xbar, n, diag);
                let t_mid = rec.t_start + rec.dt / 2.0;
                let mu_scaled = &mu * rec.dt;
                self.master_eq.apply_diff(t_mid, theta, &x_mid, &mu_scaled, &mut grad)?;
                xbar = xbar_prev;
            }
            xbar += running_seed(n, t_n, &x_n);
        }
        Ok((xbar, grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use optctl_control::basis::BSpline0;
    use optctl_control::{ControlBasis, Oscillator};
    use optctl_operator::{GeneratorMode, SystemMatrices};

    fn make_stepper_inputs(order: CompositionOrder, ntime: usize, dt: f64) -> (MasterEq, Vec<f64>, DVector<f64>) {
        let mut osc = Oscillator::new(2, 4.1, 4.1, 0.0);
        osc.carriers = vec![0.0];
        osc.segments = vec![ControlBasis::BSpline0(BSpline0::new(4, 0.0, dt * ntime as f64, false))];
        osc.assign_skips(0);
        let sys = SystemMatrices::build(std::slice::from_ref(&osc), &[], &[], false);
        let theta = vec![0.05; osc.nparams()];
        let me = MasterEq::new(sys, vec![osc], false, GeneratorMode::Assembled);
        let mut x0 = DVector::zeros(4);
        x0[0] = 1.0;
        let _ = order;
        (me, theta, x0)
    }

    #[test]
    fn composition_substep_counts_match_spec() {
        assert_eq!(composition_substeps(CompositionOrder::Two, 1.0).len(), 1);
        assert_eq!(composition_substeps(CompositionOrder::Four, 1.0).len(), 3);
        assert_eq!(composition_substeps(CompositionOrder::Eight, 1.0).len(), 15);
    }

    #[test]
    fn composition_substeps_sum_to_macro_dt() {
        for order in [CompositionOrder::Two, CompositionOrder::Four, CompositionOrder::Eight] {
            let subs = composition_substeps(order, 0.37);
            let sum: f64 = subs.iter().sum();
            assert_relative_eq!(sum, 0.37, epsilon = 1e-12);
        }
    }

    #[test]
    fn schrodinger_norm_is_conserved_by_imr() {
        let (me, theta, x0) = make_stepper_inputs(CompositionOrder::Two, 50, 0.02);
        let config = StepperConfig {
            dt: 0.02,
            ntime: 50,
            order: CompositionOrder::Two,
            linsolver: LinSolverType::Gmres,
            linsolve_maxiter: 50,
            linsolve_tol: 1e-12,
            checkpoint: CheckpointPolicy::Full,
        };
        let stepper = TimeStepper::new(&me, config);
        let diag = Diagnostics::new();
        let result = stepper.forward_sweep(&x0, &theta, &diag, |_, _, _| {});
        assert_relative_eq!(result.x_final.norm(), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn adjoint_gradient_matches_finite_difference() {
        let (me, theta, x0) = make_stepper_inputs(CompositionOrder::Two, 20, 0.05);
        let config = StepperConfig {
            dt: 0.05,
            ntime: 20,
            order: CompositionOrder::Two,
            linsolver: LinSolverType::Gmres,
            linsolve_maxiter: 50,
            linsolve_tol: 1e-13,
            checkpoint: CheckpointPolicy::Full,
        };
        let stepper = TimeStepper::new(&me, config);
        let diag = Diagnostics::new();

        // J(theta) = 1/2 ||x(T)||^2 (an arbitrary smooth scalar of the
        // final state), xbar_final = x(T) is its gradient seed.
        let eval = |theta: &[f64]| -> f64 {
            let r = stepper.forward_sweep(&x0, theta, &diag, |_, _, _| {});
            0.5 * r.x_final.norm_squared()
        };

        let forward = stepper.forward_sweep(&x0, &theta, &diag, |_, _, _| {});
        let xbar_final = forward.x_final.clone();
        let no_running_seed = |_n: usize, _t: f64, x: &DVector<f64>| DVector::zeros(x.len());
        let (_xbar0, grad) = stepper.reverse_sweep(&x0, &theta, xbar_final, &forward.checkpoints, &diag, no_running_seed).unwrap();

        let eps = 1e-5;
        for i in [0usize, 3, 7] {
            let mut theta_p = theta.clone();
            theta_p[i] += eps;
            let mut theta_m = theta.clone();
            theta_m[i] -= eps;
            let fd = (eval(&theta_p) - eval(&theta_m)) / (2.0 * eps);
            assert_relative_eq!(fd, grad[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn order4_convergence_improves_on_order2() {
        let (me, theta, x0) = make_stepper_inputs(CompositionOrder::Four, 8, 0.1);
        let config2 = StepperConfig {
            dt: 0.1,
            ntime: 8,
            order: CompositionOrder::Two,
            linsolver: LinSolverType::Gmres,
            linsolve_maxiter: 50,
            linsolve_tol: 1e-13,
            checkpoint: CheckpointPolicy::None,
        };
        let config4 = StepperConfig { order: CompositionOrder::Four, ..config2 };
        let diag = Diagnostics::new();
        let s2 = TimeStepper::new(&me, config2);
        let s4 = TimeStepper::new(&me, config4);
        let r2 = s2.forward_sweep(&x0, &theta, &diag, |_, _, _| {});
        let r4 = s4.forward_sweep(&x0, &theta, &diag, |_, _, _| {});
        // both conserve norm; just check order-4 doesn't diverge wildly
        assert_relative_eq!(r2.x_final.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(r4.x_final.norm(), 1.0, epsilon = 1e-6);
    }
}
