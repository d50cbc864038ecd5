//! Kronecker-product constructors and the index-mapped raising/lowering ladder building blocks
//! shared by `optctl-control::Oscillator` and `optctl-operator::SystemMatrices`.

use nalgebra::DMatrix;
use num_complex::Complex64;

/// `A ⊗ B` for dense real matrices.
pub fn kron(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let (ar, ac) = a.shape();
    let (br, bc) = b.shape();
    let mut out = DMatrix::zeros(ar * br, ac * bc);
    for i in 0..ar {
        for j in 0..ac {
            let aij = a[(i, j)];
            if aij == 0.0 {
                continue;
            }
            for bi in 0..br {
                for bj in 0..bc {
                    out[(i * br + bi, j * bc + bj)] = aij * b[(bi, bj)];
                }
            }
        }
    }
    out
}

/// `I_pre ⊗ A ⊗ I_post`, the standard embedding of a single-oscillator
/// operator `A` into the full tensor-product Hilbert space.
pub fn embed(a: &DMatrix<f64>, dim_pre: usize, dim_post: usize) -> DMatrix<f64> {
    let i_pre = DMatrix::<f64>::identity(dim_pre, dim_pre);
    let i_post = DMatrix::<f64>::identity(dim_post, dim_post);
    kron(&kron(&i_pre, a), &i_post)
}

/// Lowering (annihilation) operator for an oscillator with `nlevels`
/// levels: `a|n> = sqrt(n)|n-1>`.
pub fn lowering_operator(nlevels: usize) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(nlevels, nlevels);
    for n in 1..nlevels {
        a[(n - 1, n)] = (n as f64).sqrt();
    }
    a
}

/// Number operator `N = a^T a` for an oscillator with `nlevels` levels.
pub fn number_operator(nlevels: usize) -> DMatrix<f64> {
    let a = lowering_operator(nlevels);
    a.transpose() * a
}

/// `I ⊗ A` (left identity of dimension `dim`).
pub fn left_identity_kron(dim: usize, a: &DMatrix<f64>) -> DMatrix<f64> {
    kron(&DMatrix::identity(dim, dim), a)
}

/// `A ⊗ I` (right identity of dimension `dim`).
pub fn right_identity_kron(a: &DMatrix<f64>, dim: usize) -> DMatrix<f64> {
    kron(a, &DMatrix::identity(dim, dim))
}

/// `A ⊗ B` for dense complex matrices.
pub fn kron_c(a: &DMatrix<Complex64>, b: &DMatrix<Complex64>) -> DMatrix<Complex64> {
    let (ar, ac) = a.shape();
    let (br, bc) = b.shape();
    let mut out = DMatrix::from_element(ar * br, ac * bc, Complex64::new(0.0, 0.0));
    for i in 0..ar {
        for j in 0..ac {
            let aij = a[(i, j)];
            if aij == Complex64::new(0.0, 0.0) {
                continue;
            }
            for bi in 0..br {
                for bj in 0..bc {
                    out[(i * br + bi, j * bc + bj)] = aij * b[(bi, bj)];
                }
            }
        }
    }
    out
}

/// `I_pre ⊗ A ⊗ I_post` for a complex single-oscillator operator `A`.
pub fn embed_c(a: &DMatrix<Complex64>, dim_pre: usize, dim_post: usize) -> DMatrix<Complex64> {
    let i_pre = DMatrix::<Complex64>::identity(dim_pre, dim_pre);
    let i_post = DMatrix::<Complex64>::identity(dim_post, dim_post);
    kron_c(&kron_c(&i_pre, a), &i_post)
}

/// Promotes a real dense matrix into its complex embedding (zero imaginary
/// part), used when mixing real drive operators with complex coupling terms.
pub fn to_complex(a: &DMatrix<f64>) -> DMatrix<Complex64> {
    a.map(|v| Complex64::new(v, 0.0))
}

/// Embeds a complex linear map `C` (`y = C x`) into the real 2D x 2D matrix
/// acting on the *interleaved* real storage `(Re(x_0), Im(x_0), Re(x_1), ...)`
/// used throughout the engine:
///
/// `M[2k,2j] = Re(C_kj)`, `M[2k,2j+1] = -Im(C_kj)`,
/// `M[2k+1,2j] = Im(C_kj)`, `M[2k+1,2j+1] = Re(C_kj)`.
///
/// This is the interleaved analogue of the block form `[[A,-B],[B,A]]`
/// used for `C = A + iB` stored as separate (Re;Im) blocks; the two
/// conventions agree up to a fixed permutation.
pub fn complex_to_real_interleaved(c: &DMatrix<Complex64>) -> DMatrix<f64> {
    let (rows, cols) = c.shape();
    let mut out = DMatrix::zeros(2 * rows, 2 * cols);
    for k in 0..rows {
        for j in 0..cols {
            let v = c[(k, j)];
            out[(2 * k, 2 * j)] = v.re;
            out[(2 * k, 2 * j + 1)] = -v.im;
            out[(2 * k + 1, 2 * j)] = v.im;
            out[(2 * k + 1, 2 * j + 1)] = v.re;
        }
    }
    out
}
