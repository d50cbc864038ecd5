//! Assembles and applies the instantaneous generator `M(t,theta)` acting on
//! the real-doubled, interleaved state.
//!
//! Operator assembly and matrix-free application are two implementations of
//! one `GeneratorAction` capability:
//!
//! - [`GeneratorMode::Assembled`] builds the full complex `D x D` generator
//!   (`D = N` Schrodinger, `D = N^2` Lindblad) once per call and multiplies.
//! - [`GeneratorMode::MatrixFree`] works directly with the `N x N`
//!   Hamiltonian and collapse operators, never materialising the `D x D`
//!   matrix; cheaper when `N` is small.
//!
//! Both must agree to round-off; see the `agreement` test.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use optctl_control::{apply_pi_pulse_overrides, oscillator_pi_override_active, Oscillator};
use optctl_core::error::Result;
use optctl_core::kron::complex_to_real_interleaved;
use optctl_core::state::{deinterleave, interleave};

use crate::system::SystemMatrices;

const NEG_I: Complex64 = Complex64::new(0.0, -1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    Assembled,
    MatrixFree,
}

/// `-i*(I kron H - H^T kron I)`, the vectorized Hamiltonian commutator
/// superoperator, `N^2 x N^2`.
fn commutator_lift(h: &DMatrix<Complex64>, n: usize) -> DMatrix<Complex64> {
    let i = DMatrix::<Complex64>::identity(n, n);
    (optctl_core::kron::kron_c(&i, h) - optctl_core::kron::kron_c(&h.transpose(), &i)) * NEG_I
}

/// Lifts a single-oscillator drive operator `A` (`N x N`) into its
/// Liouvillian commutator form if Lindblad, or `-iA` if Schrodinger.
fn lift_drive(a: &DMatrix<Complex64>, n: usize, lindblad: bool) -> DMatrix<Complex64> {
    if lindblad {
        commutator_lift(a, n)
    } else {
        a * NEG_I
    }
}

/// `sum_k (Cbar_k kron C_k) - 1/2 (I kron C_k^dagger C_k + (C_k^dagger
/// C_k)^T kron I)`, the vectorized dissipator.
fn dissipator_lift(collapse_ops: &[DMatrix<Complex64>], n: usize) -> DMatrix<Complex64> {
    let i = DMatrix::<Complex64>::identity(n, n);
    let mut d = DMatrix::<Complex64>::zeros(n * n, n * n);
    for c in collapse_ops {
        let c_dag_c = c.adjoint() * c;
        d += optctl_core::kron::kron_c(&c.conjugate(), c);
        d -= (optctl_core::kron::kron_c(&i, &c_dag_c) + optctl_core::kron::kron_c(&c_dag_c.transpose(), &i))
            * Complex64::new(0.5, 0.0);
    }
    d
}

pub struct MasterEq {
    pub sys: SystemMatrices,
    pub oscillators: Vec<Oscillator>,
    pub lindblad: bool,
    pub mode: GeneratorMode,
    pub n: usize,
    pub d: usize,
    drive_a_lifted: Vec<DMatrix<Complex64>>,
    drive_b_lifted: Vec<DMatrix<Complex64>>,
    drive_a_real: Vec<DMatrix<f64>>,
    drive_b_real: Vec<DMatrix<f64>>,
    dissipator: DMatrix<Complex64>,
    collapse_ops: Vec<DMatrix<Complex64>>,
}

impl MasterEq {
    pub fn new(sys: SystemMatrices, oscillators: Vec<Oscillator>, lindblad: bool, mode: GeneratorMode) -> Self {
        let n = sys.n;
        let d = if lindblad { n * n } else { n };
        let drive_a_lifted: Vec<_> = sys.drive_a.iter().map(|a| lift_drive(a, n, lindblad)).collect();
        let drive_b_lifted: Vec<_> = sys.drive_b.iter().map(|b| lift_drive(b, n, lindblad)).collect();
        let drive_a_real: Vec<_> = drive_a_lifted.iter().map(complex_to_real_interleaved).collect();
        let drive_b_real: Vec<_> = drive_b_lifted.iter().map(complex_to_real_interleaved).collect();
        let collapse_ops: Vec<_> = sys.collapse_ops.iter().map(|c| c.op.clone()).collect();
        let dissipator = if lindblad { dissipator_lift(&collapse_ops, n) } else { DMatrix::zeros(0, 0) };
        Self {
            sys,
            oscillators,
            lindblad,
            mode,
            n,
            d,
            drive_a_lifted,
            drive_b_lifted,
            drive_a_real,
            drive_b_real,
            dissipator,
            collapse_ops,
        }
    }

    fn active_controls(&self, t: f64, theta: &[f64]) -> Vec<(f64, f64)> {
        apply_pi_pulse_overrides(&self.oscillators, t, theta)
    }

    /// Assembles the full complex `D x D` generator at `(t, theta)`.
    pub fn generator_at(&self, t: f64, theta: &[f64]) -> DMatrix<Complex64> {
        let h = self.sys.hamiltonian_at(t);
        let mut g = if self.lindblad {
            commutator_lift(&h, self.n) + self.dissipator.clone()
        } else {
            h * NEG_I
        };
        for (q, (f, gq)) in self.active_controls(t, theta).into_iter().enumerate() {
            if f != 0.0 {
                g += &self.drive_a_lifted[q] * Complex64::new(f, 0.0);
            }
            if gq != 0.0 {
                g += &self.drive_b_lifted[q] * Complex64::new(gq, 0.0);
            }
        }
        g
    }

    /// `y <- M(t,theta)*x`, assembled path.
    fn apply_assembled(&self, t: f64, theta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        let xc = deinterleave(x);
        let g = self.generator_at(t, theta);
        interleave(&(g * xc))
    }

    /// `y <- M(t,theta)*x`, matrix-free path: direct `N x N` operations,
    /// never materialising the `D x D` generator.
    fn apply_matrix_free(&self, t: f64, theta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        let xc = deinterleave(x);
        let h = self.instantaneous_hamiltonian(t, theta);
        let n = self.n;
        let yc = if !self.lindblad {
            (&h * NEG_I) * &xc
        } else {
            let rho = optctl_core::state::vec_to_density(&xc, n);
            let mut y = (&h * &rho - &rho * &h) * NEG_I;
            for c in &self.collapse_ops {
                let c_dag = c.adjoint();
                y += c * &rho * &c_dag - (&c_dag * c * &rho + &rho * &c_dag * c) * Complex64::new(0.5, 0.0);
            }
            optctl_core::state::density_to_vec(&y)
        };
        interleave(&yc)
    }

    fn instantaneous_hamiltonian(&self, t: f64, theta: &[f64]) -> DMatrix<Complex64> {
        let mut h = self.sys.hamiltonian_at(t);
        for (q, (f, gq)) in self.active_controls(t, theta).into_iter().enumerate() {
            if f != 0.0 {
                h += &self.sys.drive_a[q] * Complex64::new(f, 0.0);
            }
            if gq != 0.0 {
                h += &self.sys.drive_b[q] * Complex64::new(gq, 0.0);
            }
        }
        h
    }

    pub fn apply(&self, t: f64, theta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        match self.mode {
            GeneratorMode::Assembled => self.apply_assembled(t, theta, x),
            GeneratorMode::MatrixFree => self.apply_matrix_free(t, theta, x),
        }
    }

    /// `y <- M(t,theta)^T * x`, needed by the transposed linear solve in the
    /// adjoint sweep. Since every term of `M` is the
    /// real-interleaved embedding of a complex-linear map, `M^T` is exactly
    /// the embedding of that map's Hermitian adjoint.
    pub fn apply_transpose(&self, t: f64, theta: &[f64], x: &DVector<f64>) -> DVector<f64> {
        let xc = deinterleave(x);
        let g = self.generator_at(t, theta);
        interleave(&(g.adjoint() * xc))
    }

    /// `grad += d(Mx)/dtheta^T * ybar`. No-op
    /// (and correctly so) during an active pi-pulse override window, since
    /// the generator does not depend on `theta` there.
    pub fn apply_diff(&self, t: f64, theta: &[f64], x: &DVector<f64>, ybar: &DVector<f64>, grad: &mut [f64]) -> Result<()> {
        if oscillator_pi_override_active(&self.oscillators, t) {
            return Ok(());
        }
        for (q, osc) in self.oscillators.iter().enumerate() {
            let fbar = (&self.drive_a_real[q] * x).dot(ybar);
            let gbar = (&self.drive_b_real[q] * x).dot(ybar);
            osc.eval_control_diff(t, fbar, gbar, grad)?;
        }
        Ok(())
    }
}
