//! Per-oscillator bundle: levels, carriers, one or more
//! time-segmented [`ControlBasis`]es, and optional pi-pulse overrides.

use crate::basis::ControlBasis;
use crate::ramp::ramp_factor;
use nalgebra::DMatrix;
use optctl_core::error::Result;
use optctl_core::kron;

/// A fixed-amplitude override window. While active, this oscillator's control returns a
/// constant ramped amplitude and every other oscillator is forced to zero.
#[derive(Debug, Clone, Copy)]
pub struct PiPulse {
    pub tstart: f64,
    pub tstop: f64,
    pub amp: f64,
    pub tramp: f64,
}

impl PiPulse {
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.tstart && t <= self.tstop
    }

    fn value(&self, t: f64) -> f64 {
        self.amp * ramp_factor(t, self.tstart, self.tstop, self.tramp)
    }
}

/// One modelled oscillator: a fixed number of levels, a transition/rotation
/// frequency pair, optional decoherence times, a list of carrier
/// frequencies, and the time-segmented control bases that parameterise its
/// complex drive envelope.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub nlevels: usize,
    pub trans_freq: f64,
    pub rot_freq: f64,
    pub self_kerr: f64,
    pub decay_time: Option<f64>,
    pub dephase_time: Option<f64>,
    pub carriers: Vec<f64>,
    pub segments: Vec<ControlBasis>,
    pub pi_pulses: Vec<PiPulse>,
}

impl Oscillator {
    pub fn new(nlevels: usize, trans_freq: f64, rot_freq: f64, self_kerr: f64) -> Self {
        Self {
            nlevels,
            trans_freq,
            rot_freq,
            self_kerr,
            decay_time: None,
            dephase_time: None,
            carriers: Vec::new(),
            segments: Vec::new(),
            pi_pulses: Vec::new(),
        }
    }

    pub fn n_carriers(&self) -> usize {
        self.carriers.len()
    }

    /// Total number of control parameters this oscillator owns, across all
    /// segments and carriers.
    pub fn nparams(&self) -> usize {
        self.segments.iter().map(|s| s.nparams(self.n_carriers())).sum()
    }

    /// Assigns increasing `skip` offsets to each segment, starting at
    /// `start`; returns the offset one past the last assigned parameter.
    pub fn assign_skips(&mut self, start: usize) -> usize {
        let mut offset = start;
        for seg in &mut self.segments {
            seg.set_skip(offset);
            offset += seg.nparams(self.n_carriers());
        }
        offset
    }

    fn segment_at(&self, t: f64) -> Option<&ControlBasis> {
        self.segments.iter().find(|s| t >= s.tstart() && t <= s.tstop())
    }

    fn active_pi_pulse(&self, t: f64) -> Option<&PiPulse> {
        self.pi_pulses.iter().find(|p| p.is_active(t))
    }

    /// Evaluates the lab-frame carrier-modulated amplitude `(f(t), g(t))`.
    /// Returns `None` when no segment covers `t` (equivalent to the zero
    /// control).
    ///
    /// Does not apply the pi-pulse cross-oscillator override by itself
    /// (this oscillator cannot see its siblings); callers iterating a full
    /// set of oscillators should use [`apply_pi_pulse_overrides`].
    pub fn eval_control(&self, t: f64, theta: &[f64]) -> (f64, f64) {
        let Some(seg) = self.segment_at(t) else { return (0.0, 0.0) };
        let n_carriers = self.n_carriers();
        let mut f = 0.0;
        let mut g = 0.0;
        for (c, &freq) in self.carriers.iter().enumerate() {
            let (p, q) = seg.evaluate(t, theta, n_carriers, c);
            let (s, co) = (freq * t).sin_cos();
            f += p * co - q * s;
            g += p * s + q * co;
        }
        (f, g)
    }

    /// Adjoint of [`Oscillator::eval_control`]: seeds `coeff_diff` with the
    /// vector-Jacobian product of the carrier-rotated sums.
    pub fn eval_control_diff(&self, t: f64, fbar: f64, gbar: f64, coeff_diff: &mut [f64]) -> Result<()> {
        let Some(seg) = self.segment_at(t) else { return Ok(()) };
        let n_carriers = self.n_carriers();
        for (c, &freq) in self.carriers.iter().enumerate() {
            let (s, co) = (freq * t).sin_cos();
            let pbar = fbar * co + gbar * s;
            let qbar = -fbar * s + gbar * co;
            seg.derivative(t, coeff_diff, pbar, qbar, n_carriers, c)?;
        }
        Ok(())
    }

    pub fn is_differentiable(&self) -> bool {
        self.segments.iter().all(ControlBasis::is_differentiable)
    }

    /// Lowering operator `a_k = I_pre ⊗ a ⊗ I_post` for this oscillator.
    pub fn lowering_operator(&self, dim_pre: usize, dim_post: usize) -> DMatrix<f64> {
        kron::embed(&kron::lowering_operator(self.nlevels), dim_pre, dim_post)
    }

    /// Number operator `N_k = a_k^T a_k`.
    pub fn number_operator(&self, dim_pre: usize, dim_post: usize) -> DMatrix<f64> {
        kron::embed(&kron::number_operator(self.nlevels), dim_pre, dim_post)
    }
}

/// Applies the pi-pulse override rule across a full set of oscillators: if
/// any oscillator has an active pi-pulse at `t`, every oscillator's control
/// is replaced — the pulsing one with its ramped amplitude, every other
/// with zero.
pub fn apply_pi_pulse_overrides(oscillators: &[Oscillator], t: f64, theta: &[f64]) -> Vec<(f64, f64)> {
    if let Some((pulsing, pulse)) = oscillators
        .iter()
        .enumerate()
        .find_map(|(i, o)| o.active_pi_pulse(t).map(|p| (i, p)))
    {
        oscillators
            .iter()
            .enumerate()
            .map(|(i, _)| if i == pulsing { (pulse.value(t), 0.0) } else { (0.0, 0.0) })
            .collect()
    } else {
        oscillators.iter().map(|o| o.eval_control(t, theta)).collect()
    }
}

/// True if any oscillator has an active pi-pulse window at `t`, i.e. the
/// pi-pulse override rule is in effect and no oscillator's generator
/// depends on `theta` at this instant.
pub fn oscillator_pi_override_active(oscillators: &[Oscillator], t: f64) -> bool {
    oscillators.iter().any(|o| o.active_pi_pulse(t).is_some())
}
