//! Finite control-parameterisation variants, dispatched statically over a
//! closed enum: a tagged sum with static dispatch, rather than a
//! virtual-interface hierarchy.

use crate::ramp::ramp_factor;
use optctl_core::error::{OptctlError, Result};

/// Index into the flat parameter vector for basis function `l`, quadrature
/// component `comp` (0 = p, 1 = q), under carrier `carrier_id` of
/// `n_carriers` total carriers on this oscillator.
fn param_index(skip: usize, l: usize, n_carriers: usize, carrier_id: usize, comp: usize) -> usize {
    skip + l * n_carriers * 2 + carrier_id * 2 + comp
}

/// Quadratic B-spline basis (Petersson style): local support `3*dtknot`,
/// `dtknot = (tstop-tstart)/(nsplines-2)`.
#[derive(Debug, Clone)]
pub struct BSpline2nd {
    pub nsplines: usize,
    pub tstart: f64,
    pub tstop: f64,
    pub skip: usize,
    pub enforce_zero_boundary: bool,
    dtknot: f64,
    width: f64,
    tcenter: Vec<f64>,
}

impl BSpline2nd {
    pub fn new(nsplines: usize, tstart: f64, tstop: f64, enforce_zero_boundary: bool) -> Self {
        assert!(nsplines > 2, "BSpline2nd needs at least 3 splines");
        let dtknot = (tstop - tstart) / (nsplines as f64 - 2.0);
        let width = 3.0 * dtknot;
        let tcenter = (0..nsplines)
            .map(|l| tstart + dtknot * ((l as f64 + 1.0) - 1.5))
            .collect();
        Self { nsplines, tstart, tstop, skip: 0, enforce_zero_boundary, dtknot, width, tcenter }
    }

    pub fn nparams(&self, n_carriers: usize) -> usize {
        self.nsplines * n_carriers * 2
    }

    /// `B_l(tau_l(t))`: canonical three-piece quadratic on
    /// `tau = (t - tcenter[l]) / width in (-1/2, 1/2)`.
    fn basisfunction(&self, l: usize, t: f64) -> f64 {
        let tau = (t - self.tcenter[l]) / self.width;
        if !(-0.5..0.5).contains(&tau) {
            return 0.0;
        }
        if (-0.5..-1.0 / 6.0).contains(&tau) {
            9.0 / 8.0 + 4.5 * tau + 4.5 * tau * tau
        } else if (-1.0 / 6.0..1.0 / 6.0).contains(&tau) {
            0.75 - 9.0 * tau * tau
        } else {
            9.0 / 8.0 - 4.5 * tau + 4.5 * tau * tau
        }
    }

    pub fn evaluate(&self, t: f64, theta: &[f64], n_carriers: usize, carrier_id: usize) -> (f64, f64) {
        if t < self.tstart || t > self.tstop {
            return (0.0, 0.0);
        }
        let mut p = 0.0;
        let mut q = 0.0;
        for l in 0..self.nsplines {
            let bl = self.basisfunction(l, t);
            if bl == 0.0 {
                continue;
            }
            p += theta[param_index(self.skip, l, n_carriers, carrier_id, 0)] * bl;
            q += theta[param_index(self.skip, l, n_carriers, carrier_id, 1)] * bl;
        }
        (p, q)
    }

    pub fn derivative(
        &self,
        t: f64,
        coeff_diff: &mut [f64],
        pbar: f64,
        qbar: f64,
        n_carriers: usize,
        carrier_id: usize,
    ) {
        if t < self.tstart || t > self.tstop {
            return;
        }
        for l in 0..self.nsplines {
            let bl = self.basisfunction(l, t);
            if bl == 0.0 {
                continue;
            }
            coeff_diff[param_index(self.skip, l, n_carriers, carrier_id, 0)] += bl * pbar;
            coeff_diff[param_index(self.skip, l, n_carriers, carrier_id, 1)] += bl * qbar;
        }
    }

    pub fn enforce_boundary(&self, theta: &mut [f64], n_carriers: usize, carrier_id: usize) {
        if !self.enforce_zero_boundary {
            return;
        }
        for &l in &[0, 1, self.nsplines - 2, self.nsplines - 1] {
            theta[param_index(self.skip, l, n_carriers, carrier_id, 0)] = 0.0;
            theta[param_index(self.skip, l, n_carriers, carrier_id, 1)] = 0.0;
        }
    }
}

/// Amplitude parameterised by quadratic B-splines, phase held fixed
/// (`scaling`, read from configuration) — a variant of [`BSpline2nd`] with
/// one real coefficient per spline instead of two.
#[derive(Debug, Clone)]
pub struct BSpline2ndAmplitude {
    pub nsplines: usize,
    pub scaling: f64,
    pub tstart: f64,
    pub tstop: f64,
    pub skip: usize,
    pub enforce_zero_boundary: bool,
    dtknot: f64,
    width: f64,
    tcenter: Vec<f64>,
}

impl BSpline2ndAmplitude {
    pub fn new(nsplines: usize, scaling: f64, tstart: f64, tstop: f64, enforce_zero_boundary: bool) -> Self {
        assert!(nsplines > 2, "BSpline2ndAmplitude needs at least 3 splines");
        let dtknot = (tstop - tstart) / (nsplines as f64 - 2.0);
        let width = 3.0 * dtknot;
        let tcenter = (0..nsplines)
            .map(|l| tstart + dtknot * ((l as f64 + 1.0) - 1.5))
            .collect();
        Self { nsplines, scaling, tstart, tstop, skip: 0, enforce_zero_boundary, dtknot, width, tcenter }
    }

    pub fn nparams(&self, _n_carriers: usize) -> usize {
        self.nsplines
    }

    fn basisfunction(&self, l: usize, t: f64) -> f64 {
        let tau = (t - self.tcenter[l]) / self.width;
        if !(-0.5..0.5).contains(&tau) {
            return 0.0;
        }
        if (-0.5..-1.0 / 6.0).contains(&tau) {
            9.0 / 8.0 + 4.5 * tau + 4.5 * tau * tau
        } else if (-1.0 / 6.0..1.0 / 6.0).contains(&tau) {
            0.75 - 9.0 * tau * tau
        } else {
            9.0 / 8.0 - 4.5 * tau + 4.5 * tau * tau
        }
    }

    fn amplitude_index(&self, l: usize) -> usize {
        self.skip + l
    }

    pub fn evaluate(&self, t: f64, theta: &[f64], _n_carriers: usize, _carrier_id: usize) -> (f64, f64) {
        if t < self.tstart || t > self.tstop {
            return (0.0, 0.0);
        }
        let mut amp = 0.0;
        for l in 0..self.nsplines {
            amp += theta[self.amplitude_index(l)] * self.basisfunction(l, t);
        }
        (amp * self.scaling.cos(), amp * self.scaling.sin())
    }

    pub fn derivative(
        &self,
        t: f64,
        coeff_diff: &mut [f64],
        pbar: f64,
        qbar: f64,
        _n_carriers: usize,
        _carrier_id: usize,
    ) {
        if t < self.tstart || t > self.tstop {
            return;
        }
        let dp_damp = self.scaling.cos();
        let dq_damp = self.scaling.sin();
        for l in 0..self.nsplines {
            let bl = self.basisfunction(l, t);
            if bl == 0.0 {
                continue;
            }
            coeff_diff[self.amplitude_index(l)] += bl * (dp_damp * pbar + dq_damp * qbar);
        }
    }

    pub fn enforce_boundary(&self, theta: &mut [f64]) {
        if !self.enforce_zero_boundary {
            return;
        }
        for &l in &[0, 1, self.nsplines - 2, self.nsplines - 1] {
            theta[self.amplitude_index(l)] = 0.0;
        }
    }
}

/// Piecewise-constant spline basis: local support `dtknot = T/nsplines`.
#[derive(Debug, Clone)]
pub struct BSpline0 {
    pub nsplines: usize,
    pub tstart: f64,
    pub tstop: f64,
    pub skip: usize,
    pub enforce_zero_boundary: bool,
    dtknot: f64,
}

impl BSpline0 {
    pub fn new(nsplines: usize, tstart: f64, tstop: f64, enforce_zero_boundary: bool) -> Self {
        assert!(nsplines > 0);
        let dtknot = (tstop - tstart) / nsplines as f64;
        Self { nsplines, tstart, tstop, skip: 0, enforce_zero_boundary, dtknot }
    }

    pub fn nparams(&self, n_carriers: usize) -> usize {
        self.nsplines * n_carriers * 2
    }

    fn interval_of(&self, t: f64) -> Option<usize> {
        if t < self.tstart || t >= self.tstop {
            return None;
        }
        let idx = ((t - self.tstart) / self.dtknot).floor() as usize;
        Some(idx.min(self.nsplines - 1))
    }

    pub fn evaluate(&self, t: f64, theta: &[f64], n_carriers: usize, carrier_id: usize) -> (f64, f64) {
        match self.interval_of(t) {
            Some(l) => (
                theta[param_index(self.skip, l, n_carriers, carrier_id, 0)],
                theta[param_index(self.skip, l, n_carriers, carrier_id, 1)],
            ),
            None => (0.0, 0.0),
        }
    }

    pub fn derivative(
        &self,
        t: f64,
        coeff_diff: &mut [f64],
        pbar: f64,
        qbar: f64,
        n_carriers: usize,
        carrier_id: usize,
    ) {
        if let Some(l) = self.interval_of(t) {
            coeff_diff[param_index(self.skip, l, n_carriers, carrier_id, 0)] += pbar;
            coeff_diff[param_index(self.skip, l, n_carriers, carrier_id, 1)] += qbar;
        }
    }

    pub fn enforce_boundary(&self, theta: &mut [f64], n_carriers: usize, carrier_id: usize) {
        if !self.enforce_zero_boundary {
            return;
        }
        theta[param_index(self.skip, 0, n_carriers, carrier_id, 0)] = 0.0;
        theta[param_index(self.skip, 0, n_carriers, carrier_id, 1)] = 0.0;
        theta[param_index(self.skip, self.nsplines - 1, n_carriers, carrier_id, 0)] = 0.0;
        theta[param_index(self.skip, self.nsplines - 1, n_carriers, carrier_id, 1)] = 0.0;
    }

    /// `(1/N_spline) * sum_l (alpha_l - alpha_{l-1})^2`, summed over both
    /// quadratures — the piecewise-constant roughness penalty.
    pub fn compute_variation(&self, theta: &[f64], n_carriers: usize, carrier_id: usize) -> f64 {
        let mut acc = 0.0;
        for l in 1..self.nsplines {
            for comp in 0..2 {
                let cur = theta[param_index(self.skip, l, n_carriers, carrier_id, comp)];
                let prev = theta[param_index(self.skip, l - 1, n_carriers, carrier_id, comp)];
                acc += (cur - prev).powi(2);
            }
        }
        acc / self.nsplines as f64
    }

    pub fn compute_variation_diff(
        &self,
        grad: &mut [f64],
        theta: &[f64],
        var_bar: f64,
        n_carriers: usize,
        carrier_id: usize,
    ) {
        let scale = 2.0 * var_bar / self.nsplines as f64;
        for l in 1..self.nsplines {
            for comp in 0..2 {
                let idx_cur = param_index(self.skip, l, n_carriers, carrier_id, comp);
                let idx_prev = param_index(self.skip, l - 1, n_carriers, carrier_id, comp);
                let diff = theta[idx_cur] - theta[idx_prev];
                grad[idx_cur] += scale * diff;
                grad[idx_prev] -= scale * diff;
            }
        }
    }
}

/// Step function with constant amplitude and a linear ramp at each edge.
/// Non-differentiable: gradient-based `runtype`s must reject it rather
/// than call `derivative`, which returns a recoverable error instead of
/// a derivative.
#[derive(Debug, Clone)]
pub struct StepBasis {
    pub step_amp_p: f64,
    pub step_amp_q: f64,
    pub tstart: f64,
    pub tstop: f64,
    pub tramp: f64,
    pub skip: usize,
}

impl StepBasis {
    pub fn new(step_amp_p: f64, step_amp_q: f64, tstart: f64, tstop: f64, tramp: f64) -> Self {
        Self { step_amp_p, step_amp_q, tstart, tstop, tramp, skip: 0 }
    }

    pub fn nparams(&self, _n_carriers: usize) -> usize {
        1
    }

    pub fn evaluate(&self, t: f64, _theta: &[f64], _n_carriers: usize, _carrier_id: usize) -> (f64, f64) {
        let ramp = ramp_factor(t, self.tstart, self.tstop, self.tramp);
        (ramp * self.step_amp_p, ramp * self.step_amp_q)
    }

    pub fn derivative(&self) -> Result<()> {
        Err(OptctlError::control_basis(
            "Step basis has no derivative; reject gradient/optimization runtypes with Step bases",
        ))
    }
}

/// Closed enumeration of control parameterisations, statically dispatched.
#[derive(Debug, Clone)]
pub enum ControlBasis {
    BSpline2nd(BSpline2nd),
    BSpline2ndAmplitude(BSpline2ndAmplitude),
    BSpline0(BSpline0),
    Step(StepBasis),
}

impl ControlBasis {
    pub fn tstart(&self) -> f64 {
        match self {
            Self::BSpline2nd(b) => b.tstart,
            Self::BSpline2ndAmplitude(b) => b.tstart,
            Self::BSpline0(b) => b.tstart,
            Self::Step(b) => b.tstart,
        }
    }

    pub fn tstop(&self) -> f64 {
        match self {
            Self::BSpline2nd(b) => b.tstop,
            Self::BSpline2ndAmplitude(b) => b.tstop,
            Self::BSpline0(b) => b.tstop,
            Self::Step(b) => b.tstop,
        }
    }

    pub fn skip(&self) -> usize {
        match self {
            Self::BSpline2nd(b) => b.skip,
            Self::BSpline2ndAmplitude(b) => b.skip,
            Self::BSpline0(b) => b.skip,
            Self::Step(b) => b.skip,
        }
    }

    pub fn set_skip(&mut self, skip: usize) {
        match self {
            Self::BSpline2nd(b) => b.skip = skip,
            Self::BSpline2ndAmplitude(b) => b.skip = skip,
            Self::BSpline0(b) => b.skip = skip,
            Self::Step(b) => b.skip = skip,
        }
    }

    pub fn nparams(&self, n_carriers: usize) -> usize {
        match self {
            Self::BSpline2nd(b) => b.nparams(n_carriers),
            Self::BSpline2ndAmplitude(b) => b.nparams(n_carriers),
            Self::BSpline0(b) => b.nparams(n_carriers),
            Self::Step(b) => b.nparams(n_carriers),
        }
    }

    pub fn is_differentiable(&self) -> bool {
        !matches!(self, Self::Step(_))
    }

    pub fn evaluate(&self, t: f64, theta: &[f64], n_carriers: usize, carrier_id: usize) -> (f64, f64) {
        match self {
            Self::BSpline2nd(b) => b.evaluate(t, theta, n_carriers, carrier_id),
            Self::BSpline2ndAmplitude(b) => b.evaluate(t, theta, n_carriers, carrier_id),
            Self::BSpline0(b) => b.evaluate(t, theta, n_carriers, carrier_id),
            Self::Step(b) => b.evaluate(t, theta, n_carriers, carrier_id),
        }
    }

    pub fn derivative(
        &self,
        t: f64,
        coeff_diff: &mut [f64],
        pbar: f64,
        qbar: f64,
        n_carriers: usize,
        carrier_id: usize,
    ) -> Result<()> {
        match self {
            Self::BSpline2nd(b) => {
                b.derivative(t, coeff_diff, pbar, qbar, n_carriers, carrier_id);
                Ok(())
            }
            Self::BSpline2ndAmplitude(b) => {
                b.derivative(t, coeff_diff, pbar, qbar, n_carriers, carrier_id);
                Ok(())
            }
            Self::BSpline0(b) => {
                b.derivative(t, coeff_diff, pbar, qbar, n_carriers, carrier_id);
                Ok(())
            }
            Self::Step(b) => b.derivative(),
        }
    }

    pub fn compute_variation(&self, theta: &[f64], n_carriers: usize, carrier_id: usize) -> f64 {
        match self {
            Self::BSpline0(b) => b.compute_variation(theta, n_carriers, carrier_id),
            _ => 0.0,
        }
    }

    pub fn compute_variation_diff(
        &self,
        grad: &mut [f64],
        theta: &[f64],
        var_bar: f64,
        n_carriers: usize,
        carrier_id: usize,
    ) {
        if let Self::BSpline0(b) = self {
            b.compute_variation_diff(grad, theta, var_bar, n_carriers, carrier_id);
        }
    }

    pub fn enforce_boundary(&self, theta: &mut [f64], n_carriers: usize, carrier_id: usize) {
        match self {
            Self::BSpline2nd(b) => b.enforce_boundary(theta, n_carriers, carrier_id),
            Self::BSpline2ndAmplitude(b) => b.enforce_boundary(theta),
            Self::BSpline0(b) => b.enforce_boundary(theta, n_carriers, carrier_id),
            Self::Step(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bspline2nd_basis_symmetric_at_sixth() {
        let b = BSpline2nd::new(10, 0.0, 10.0, false);
        let center = b.tcenter[5];
        let width = b.width;
        let t_left = center + (-1.0 / 6.0) * width;
        let t_right = center + (1.0 / 6.0) * width;
        // both formula pieces agree at the tie point tau = -1/6 and 1/6
        let v_lo = b.basisfunction(5, t_left);
        let v_hi = b.basisfunction(5, t_right);
        assert_relative_eq!(v_lo, v_hi, epsilon = 1e-10);
    }

    #[test]
    fn bspline2nd_zero_outside_support() {
        let b = BSpline2nd::new(10, 0.0, 10.0, false);
        assert_relative_eq!(b.basisfunction(5, b.tcenter[5] + 10.0 * b.width), 0.0);
    }

    #[test]
    fn bspline2nd_evaluate_sums_weighted_splines() {
        let mut b = BSpline2nd::new(10, 0.0, 10.0, false);
        b.skip = 0;
        let n_carriers = 1;
        let theta = vec![1.0; b.nparams(n_carriers)];
        let (p, q) = b.evaluate(5.0, &theta, n_carriers, 0);
        assert!(p > 0.0);
        assert_relative_eq!(p, q);
    }

    #[test]
    fn bspline2nd_enforce_boundary_zeroes_edge_splines() {
        let mut b = BSpline2nd::new(10, 0.0, 10.0, true);
        b.skip = 0;
        let n_carriers = 1;
        let mut theta = vec![1.0; b.nparams(n_carriers)];
        b.enforce_boundary(&mut theta, n_carriers, 0);
        for &l in &[0usize, 1, 8, 9] {
            assert_relative_eq!(theta[param_index(0, l, n_carriers, 0, 0)], 0.0);
        }
        assert_relative_eq!(theta[param_index(0, 5, n_carriers, 0, 0)], 1.0);
    }

    #[test]
    fn bspline0_compute_variation_zero_for_constant_params() {
        let b = BSpline0::new(5, 0.0, 10.0, false);
        let n_carriers = 1;
        let theta = vec![0.3; b.nparams(n_carriers)];
        assert_relative_eq!(b.compute_variation(&theta, n_carriers, 0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn bspline0_evaluate_is_piecewise_constant() {
        let mut b = BSpline0::new(5, 0.0, 10.0, false);
        b.skip = 0;
        let n_carriers = 1;
        let mut theta = vec![0.0; b.nparams(n_carriers)];
        theta[param_index(0, 2, n_carriers, 0, 0)] = 7.0;
        let (p, _q) = b.evaluate(4.5, &theta, n_carriers, 0);
        assert_relative_eq!(p, 7.0);
        let (p2, _q2) = b.evaluate(8.5, &theta, n_carriers, 0);
        assert_relative_eq!(p2, 0.0);
    }

    #[test]
    fn step_basis_ramp_and_nondifferentiable() {
        let step = StepBasis::new(1.0, 0.5, 0.0, 10.0, 1.0);
        let (p, q) = step.evaluate(5.0, &[], 1, 0);
        assert_relative_eq!(p, 1.0);
        assert_relative_eq!(q, 0.5);
        assert!(step.derivative().is_err());
    }

    #[test]
    fn control_basis_enum_reports_differentiability() {
        let step = ControlBasis::Step(StepBasis::new(1.0, 0.0, 0.0, 1.0, 0.1));
        assert!(!step.is_differentiable());
        let spline = ControlBasis::BSpline0(BSpline0::new(4, 0.0, 1.0, false));
        assert!(spline.is_differentiable());
    }
}
