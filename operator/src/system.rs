//! Time-invariant system matrices: the rotating-frame drift
//! Hamiltonian, per-oscillator drive operators, inter-oscillator coupling
//! operators (whose prefactor is time-dependent through the rotating-frame
//! detuning, so the *operator* itself is built once here and modulated by
//! [`crate::master_eq::MasterEq`] at evaluation time), and the Lindblad
//! collapse operators.

use nalgebra::DMatrix;
use num_complex::Complex64;
use optctl_control::Oscillator;
use optctl_core::kron;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// One inter-oscillator Jaynes-Cummings coupling term:
/// `J_pq * (a_p a_q^dagger * exp(-i*eta_pq*t) + h.c.)`, `eta_pq = rotfreq_p -
/// rotfreq_q`. The operator `a_p a_q^dagger` is time-invariant; only the
/// phase is time-dependent, so [`MasterEq`](crate::master_eq::MasterEq)
/// re-applies it at each evaluation.
#[derive(Debug, Clone)]
pub struct CouplingTerm {
    pub p: usize,
    pub q: usize,
    pub j_pq: f64,
    pub eta_pq: f64,
    /// `a_p a_q^dagger`, embedded in the full tensor-product space.
    pub op: DMatrix<Complex64>,
}

/// One Lindblad collapse operator and the label of which oscillator (and
/// decoherence channel) it belongs to, kept only for diagnostics.
#[derive(Debug, Clone)]
pub struct CollapseOperator {
    pub oscillator: usize,
    pub kind: CollapseKind,
    pub op: DMatrix<Complex64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseKind {
    Decay,
    Dephase,
}

/// Time-invariant building blocks shared by every evaluation of the
/// generator: the static part of the drift Hamiltonian, the per-oscillator
/// drive operators `A_q = a_q + a_q^dagger`, `B_q = i(a_q - a_q^dagger)`,
/// the coupling operators, and (for Lindblad runs) the collapse operators.
#[derive(Debug, Clone)]
pub struct SystemMatrices {
    pub n: usize,
    pub drift_static: DMatrix<Complex64>,
    pub drive_a: Vec<DMatrix<Complex64>>,
    pub drive_b: Vec<DMatrix<Complex64>>,
    pub coupling: Vec<CouplingTerm>,
    pub collapse_ops: Vec<CollapseOperator>,
}

impl SystemMatrices {
    /// `crosskerr` and `jkl` are given in the upper-triangular pair order
    /// `(0,1),(0,2),...,(0,Q-1),(1,2),...`, matching the flat-list
    /// configuration convention.
    pub fn build(oscillators: &[Oscillator], crosskerr: &[f64], jkl: &[f64], lindblad: bool) -> Self {
        let nlevels: Vec<usize> = oscillators.iter().map(|o| o.nlevels).collect();
        let n: usize = nlevels.iter().product();

        let dim_pre_post = |q: usize| -> (usize, usize) {
            let pre: usize = nlevels[..q].iter().product();
            let post: usize = nlevels[q + 1..].iter().product();
            (pre, post)
        };

        let number_ops: Vec<DMatrix<Complex64>> = oscillators
            .iter()
            .enumerate()
            .map(|(q, o)| {
                let (pre, post) = dim_pre_post(q);
                kron::to_complex(&o.number_operator(pre, post))
            })
            .collect();

        let mut drift = DMatrix::<Complex64>::zeros(n, n);
        for (q, osc) in oscillators.iter().enumerate() {
            let nq = &number_ops[q];
            // detuning_q * N_q - (xi_q/2) N_q(N_q - I)
            let detuning = osc.trans_freq - osc.rot_freq;
            drift += nq * Complex64::new(detuning, 0.0);
            let nq_minus_i = nq - DMatrix::<Complex64>::identity(n, n);
            drift -= (nq * &nq_minus_i) * Complex64::new(osc.self_kerr / 2.0, 0.0);
        }

        let mut pair = 0;
        for p in 0..oscillators.len() {
            for q in (p + 1)..oscillators.len() {
                if let Some(&xi_pq) = crosskerr.get(pair) {
                    drift += &number_ops[p] * &number_ops[q] * Complex64::new(xi_pq, 0.0);
                }
                pair += 1;
            }
        }

        let mut coupling = Vec::new();
        let mut pair = 0;
        for p in 0..oscillators.len() {
            for q in (p + 1)..oscillators.len() {
                if let Some(&j_pq) = jkl.get(pair) {
                    if j_pq != 0.0 {
                        let (pre_p, post_p) = dim_pre_post(p);
                        let (pre_q, post_q) = dim_pre_post(q);
                        let a_p = kron::embed_c(&kron::to_complex(&kron::lowering_operator(oscillators[p].nlevels)), pre_p, post_p);
                        let a_q_dag = kron::embed_c(
                            &kron::to_complex(&kron::lowering_operator(oscillators[q].nlevels).transpose()),
                            pre_q,
                            post_q,
                        );
                        let eta_pq = oscillators[p].rot_freq - oscillators[q].rot_freq;
                        coupling.push(CouplingTerm { p, q, j_pq, eta_pq, op: a_p * a_q_dag });
                    }
                }
                pair += 1;
            }
        }

        let mut drive_a = Vec::with_capacity(oscillators.len());
        let mut drive_b = Vec::with_capacity(oscillators.len());
        for (q, osc) in oscillators.iter().enumerate() {
            let (pre, post) = dim_pre_post(q);
            let a = kron::to_complex(&osc.lowering_operator(pre, post));
            let a_dag = a.adjoint();
            drive_a.push(&a + &a_dag);
            drive_b.push((&a - &a_dag) * I);
        }

        let mut collapse_ops = Vec::new();
        if lindblad {
            for (q, osc) in oscillators.iter().enumerate() {
                let (pre, post) = dim_pre_post(q);
                if let Some(t1) = osc.decay_time {
                    let a = kron::to_complex(&osc.lowering_operator(pre, post));
                    let scale = Complex64::new((1.0 / t1).sqrt(), 0.0);
                    collapse_ops.push(CollapseOperator { oscillator: q, kind: CollapseKind::Decay, op: a * scale });
                }
                if let Some(t2) = osc.dephase_time {
                    let nop = kron::to_complex(&osc.number_operator(pre, post));
                    let scale = Complex64::new((1.0 / t2).sqrt(), 0.0);
                    collapse_ops.push(CollapseOperator { oscillator: q, kind: CollapseKind::Dephase, op: nop * scale });
                }
            }
        }

        Self { n, drift_static: drift, drive_a, drive_b, coupling, collapse_ops }
    }

    /// Instantaneous drift Hamiltonian `H0 + sum coupling terms at time t`,
    /// complex `N x N`.
    pub fn hamiltonian_at(&self, t: f64) -> DMatrix<Complex64> {
        let mut h = self.drift_static.clone();
        for term in &self.coupling {
            let phase = Complex64::from_polar(1.0, -term.eta_pq * t);
            h += &term.op * (phase * Complex64::new(term.j_pq, 0.0));
            h += term.op.adjoint() * (phase.conj() * Complex64::new(term.j_pq, 0.0));
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_level_osc(trans: f64, rot: f64) -> Oscillator {
        Oscillator::new(2, trans, rot, 0.0)
    }

    #[test]
    fn drift_is_diagonal_for_resonant_single_oscillator() {
        let osc = two_level_osc(4.1, 4.1);
        let sys = SystemMatrices::build(&[osc], &[], &[], false);
        assert_relative_eq!(sys.drift_static[(0, 0)].re, 0.0, epsilon = 1e-12);
        assert_relative_eq!(sys.drift_static[(1, 1)].re, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn drive_operators_are_hermitian_and_antihermitian() {
        let osc = two_level_osc(4.1, 4.1);
        let sys = SystemMatrices::build(&[osc], &[], &[], false);
        let a = &sys.drive_a[0];
        assert_relative_eq!((a - a.adjoint()).norm(), 0.0, epsilon = 1e-12);
        let b = &sys.drive_b[0];
        assert_relative_eq!((b + b.adjoint()).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn lindblad_mode_builds_collapse_operators() {
        let mut osc = two_level_osc(4.1, 4.1);
        osc.decay_time = Some(10.0);
        osc.dephase_time = Some(20.0);
        let sys = SystemMatrices::build(&[osc], &[], &[], true);
        assert_eq!(sys.collapse_ops.len(), 2);
    }

    #[test]
    fn coupling_term_phase_is_time_dependent() {
        let p = two_level_osc(4.0, 4.0);
        let q = two_level_osc(5.0, 5.0);
        let sys = SystemMatrices::build(&[p, q], &[], &[0.003], false);
        assert_eq!(sys.coupling.len(), 1);
        let h0 = sys.hamiltonian_at(0.0);
        let h1 = sys.hamiltonian_at(1.0);
        assert!((h0 - h1).norm() > 1e-10);
    }
}
