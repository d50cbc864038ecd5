//! Target unitaries: the closed set `{X, Y, Z, Hadamard,
//! CNOT}` plus a from-file variant, their action on a vectorized state, and
//! the rotating-frame rotation phase applied before comparison.
//!
//! A single `Gate` holds the real and imaginary parts of the target unitary
//! directly rather than a per-gate subclass hierarchy.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use optctl_core::error::{OptctlError, Result};
use optctl_core::kron::kron_c;
use optctl_core::EssentialMap;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// The target unitary `V`, expressed over the essential (computational)
/// subspace, `dim_ess x dim_ess`.
#[derive(Debug, Clone)]
pub struct Gate {
    pub dim_ess: usize,
    pub v: DMatrix<Complex64>,
}

impl Gate {
    fn from_real(dim: usize, entries: &[f64]) -> Self {
        Self { dim_ess: dim, v: DMatrix::from_row_slice(dim, dim, entries).map(|x| Complex64::new(x, 0.0)) }
    }

    pub fn x() -> Self {
        Self::from_real(2, &[0.0, 1.0, 1.0, 0.0])
    }

    pub fn y() -> Self {
        let mut v = DMatrix::<Complex64>::zeros(2, 2);
        v[(0, 1)] = -I;
        v[(1, 0)] = I;
        Self { dim_ess: 2, v }
    }

    pub fn z() -> Self {
        Self::from_real(2, &[1.0, 0.0, 0.0, -1.0])
    }

    pub fn hadamard() -> Self {
        let s = 1.0 / std::f64::consts::SQRT_2;
        Self::from_real(2, &[s, s, s, -s])
    }

    pub fn cnot() -> Self {
        #[rustfmt::skip]
        let entries = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
        ];
        Self::from_real(4, &entries)
    }

    /// `dim` essential levels; `re`/`im` are the row-major real and
    /// imaginary parts read from the file.
    pub fn from_parts(dim: usize, re: &[f64], im: &[f64]) -> Result<Self> {
        if re.len() != dim * dim || im.len() != dim * dim {
            return Err(OptctlError::shape(format!(
                "gate file entries do not match dim_ess^2 = {}",
                dim * dim
            )));
        }
        let v = DMatrix::from_row_slice(dim, dim, re).zip_map(&DMatrix::from_row_slice(dim, dim, im), |r, i| {
            Complex64::new(r, i)
        });
        Ok(Self { dim_ess: dim, v })
    }

    /// Applies the per-oscillator rotating-frame phase `exp(i*phi_q*T)`
    /// to `self.v`, returning the
    /// rotated gate. `gate_rot_freq[q]` and `nessential[q]` must align with
    /// the oscillator ordering used to build [`EssentialMap`].
    pub fn rotated(&self, nessential: &[usize], gate_rot_freq: &[f64], total_time: f64) -> Self {
        assert_eq!(nessential.len(), gate_rot_freq.len());
        let dim = self.dim_ess;
        let mut phase = vec![0.0_f64; dim];
        for (idx, p) in phase.iter_mut().enumerate() {
            let digits = decompose(idx, nessential);
            *p = digits.iter().zip(gate_rot_freq.iter()).map(|(d, f)| *d as f64 * f).sum::<f64>() * total_time;
        }
        let mut v = self.v.clone();
        for row in 0..dim {
            for col in 0..dim {
                v[(row, col)] *= Complex64::from_polar(1.0, phase[row] - phase[col]);
            }
        }
        Self { dim_ess: dim, v }
    }

    /// Embeds `self.v` into the full `N x N` tensor-product space, acting
    /// as the identity on guard levels, via `map`.
    pub fn embed_full(&self, map: &EssentialMap) -> DMatrix<Complex64> {
        let n = map.n_full();
        let mut full = DMatrix::<Complex64>::identity(n, n);
        for row in 0..n {
            if let Some(row_ess) = map.full_to_essential(row) {
                for col in 0..n {
                    if let Some(col_ess) = map.full_to_essential(col) {
                        full[(row, col)] = self.v[(row_ess, col_ess)];
                    } else {
                        full[(row, col)] = Complex64::new(0.0, 0.0);
                    }
                }
            }
        }
        full
    }

    /// `rho_target = V * psi` (Schrodinger) acting on the full-dimension
    /// state vector.
    pub fn apply_schrodinger(&self, map: &EssentialMap, psi: &DVector<Complex64>) -> DVector<Complex64> {
        self.embed_full(map) * psi
    }

    /// `rho_target = vec(V rho V^dagger) = (Vbar kron V) vec(rho)`
    /// (Lindblad).
    pub fn apply_lindblad(&self, map: &EssentialMap, rho_vec: &DVector<Complex64>) -> DVector<Complex64> {
        let v_full = self.embed_full(map);
        let op = kron_c(&v_full.conjugate(), &v_full);
        op * rho_vec
    }
}

fn decompose(mut flat: usize, radices: &[usize]) -> Vec<usize> {
    let mut digits = vec![0; radices.len()];
    for q in (0..radices.len()).rev() {
        digits[q] = flat % radices[q];
        flat /= radices[q];
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cnot_is_self_inverse() {
        let cnot = Gate::cnot();
        let squared = &cnot.v * &cnot.v;
        assert_relative_eq!((squared - DMatrix::<Complex64>::identity(4, 4)).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn y_gate_is_unitary() {
        let y = Gate::y();
        let prod = y.v.adjoint() * &y.v;
        assert_relative_eq!((prod - DMatrix::<Complex64>::identity(2, 2)).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn embed_full_is_identity_on_guard_levels() {
        let map = EssentialMap::new(&[3], &[2]);
        let x = Gate::x();
        let full = x.embed_full(&map);
        assert_relative_eq!(full[(2, 2)].re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(full[(0, 2)].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_preserves_unitarity() {
        let cnot = Gate::cnot();
        let rotated = cnot.rotated(&[2, 2], &[0.1, -0.05], 3.0);
        let prod = rotated.v.adjoint() * &rotated.v;
        assert_relative_eq!((prod - DMatrix::<Complex64>::identity(4, 4)).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn from_parts_rejects_wrong_length() {
        let err = Gate::from_parts(2, &[1.0], &[0.0, 0.0, 0.0, 0.0]);
        assert!(err.is_err());
    }
}
