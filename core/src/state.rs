//! The real-valued, interleaved state vector and
//! conversion helpers to/from the complex vector or density matrix it
//! represents.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Which equation of motion a state vector represents, and the resulting
/// Hilbert-space dimension `N` (so `x.len() == 2*N` for Schrodinger,
/// `2*N^2` for Lindblad).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Schrodinger { n: usize },
    Lindblad { n: usize },
}

impl StateKind {
    /// Complex-vector dimension `D`: `N` for Schrodinger, `N^2` for Lindblad.
    pub fn complex_dim(&self) -> usize {
        match self {
            StateKind::Schrodinger { n } => *n,
            StateKind::Lindblad { n } => n * n,
        }
    }

    /// Real interleaved vector length `2*D`.
    pub fn real_dim(&self) -> usize {
        2 * self.complex_dim()
    }

    pub fn hilbert_dim(&self) -> usize {
        match self {
            StateKind::Schrodinger { n } | StateKind::Lindblad { n } => *n,
        }
    }

    pub fn is_lindblad(&self) -> bool {
        matches!(self, StateKind::Lindblad { .. })
    }
}

/// Interleave a complex vector `(Re(c_0), Im(c_0), Re(c_1), ...)` into the
/// real storage format used throughout the engine.
pub fn interleave(complex: &DVector<Complex64>) -> DVector<f64> {
    let mut out = DVector::zeros(2 * complex.len());
    for (k, c) in complex.iter().enumerate() {
        out[2 * k] = c.re;
        out[2 * k + 1] = c.im;
    }
    out
}

/// Inverse of [`interleave`].
pub fn deinterleave(real: &DVector<f64>) -> DVector<Complex64> {
    assert_eq!(real.len() % 2, 0, "interleaved state must have even length");
    let d = real.len() / 2;
    DVector::from_iterator(d, (0..d).map(|k| Complex64::new(real[2 * k], real[2 * k + 1])))
}

/// Reshape a length-`N^2` complex vector into an `N x N` density matrix,
/// column-major to match `DMatrix`'s native layout.
pub fn vec_to_density(v: &DVector<Complex64>, n: usize) -> DMatrix<Complex64> {
    assert_eq!(v.len(), n * n);
    DMatrix::from_iterator(n, n, v.iter().copied())
}

/// Inverse of [`vec_to_density`].
pub fn density_to_vec(rho: &DMatrix<Complex64>) -> DVector<Complex64> {
    DVector::from_iterator(rho.len(), rho.iter().copied())
}

/// `||x||_2` of the real interleaved vector, equal to the complex-vector
/// 2-norm.
pub fn norm(x: &DVector<f64>) -> f64 {
    x.norm()
}

/// `tr(rho)` for a Lindblad state given in interleaved real form
///.
pub fn trace_real(x: &DVector<f64>, n: usize) -> f64 {
    let rho = vec_to_density(&deinterleave(x), n);
    rho.trace().re
}

/// Max absolute Hermiticity violation `max_ij |rho_ij - conj(rho_ji)|`.
pub fn hermiticity_violation(x: &DVector<f64>, n: usize) -> f64 {
    let rho = vec_to_density(&deinterleave(x), n);
    let mut max_dev: f64 = 0.0;
    for i in 0..n {
        for j in 0..n {
            let dev = (rho[(i, j)] - rho[(j, i)].conj()).norm();
            max_dev = max_dev.max(dev);
        }
    }
    max_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interleave_roundtrip() {
        let c = DVector::from_vec(vec![Complex64::new(1.0, 2.0), Complex64::new(-3.0, 0.5)]);
        let real = interleave(&c);
        assert_eq!(real.as_slice(), &[1.0, 2.0, -3.0, 0.5]);
        let back = deinterleave(&real);
        assert_eq!(back, c);
    }

    #[test]
    fn density_reshape_roundtrip() {
        let n = 2;
        let v = DVector::from_vec(vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
        ]);
        let rho = vec_to_density(&v, n);
        assert_relative_eq!(rho[(0, 0)].re, 1.0);
        let back = density_to_vec(&rho);
        assert_eq!(back, v);
    }

    #[test]
    fn trace_of_identity_like_state_is_one() {
        let n = 2;
        let mut v = DVector::zeros(n * n);
        v[0] = Complex64::new(0.5, 0.0);
        v[3] = Complex64::new(0.5, 0.0);
        let real = interleave(&v);
        assert_relative_eq!(trace_real(&real, n), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn hermitian_state_has_zero_violation() {
        let n = 2;
        let mut rho = DMatrix::<Complex64>::zeros(n, n);
        rho[(0, 0)] = Complex64::new(0.5, 0.0);
        rho[(1, 1)] = Complex64::new(0.5, 0.0);
        rho[(0, 1)] = Complex64::new(0.1, 0.2);
        rho[(1, 0)] = Complex64::new(0.1, -0.2);
        let real = interleave(&density_to_vec(&rho));
        assert_relative_eq!(hermiticity_violation(&real, n), 0.0, epsilon = 1e-12);
    }
}
