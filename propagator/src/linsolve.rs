//! Linear solve against `(I - dt/2 * M)` (and its transpose), matrix-free
//! over a closure so both the assembled and matrix-free `MasterEq` paths
//! share one solver.
//!
//! `linearsolver_type` selects between a truncated Neumann
//! series (exact for small `dt*||M||`) and a restarted, matrix-free GMRES
//! with Givens-rotation least-squares, since optctl does not depend on an
//! external sparse-iterative-solver crate (Non-goal "not a general
//! linear-algebra library").

use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinSolverType {
    Gmres,
    Neumann,
}

/// Outcome of one linear solve: the solution, whether it converged within
/// `maxiter`, the iteration count actually used, and the final residual
/// norm.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub x: DVector<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub residual: f64,
}

/// `K(j) = sum_{i=0}^{j} A^i`, truncated Neumann series approximation of
/// `(I - A)^{-1}`, exact in the limit for `||A|| < 1`.
pub fn solve_neumann(apply_a: impl Fn(&DVector<f64>) -> DVector<f64>, rhs: &DVector<f64>, maxiter: usize, tol: f64) -> SolveOutcome {
    let mut x = rhs.clone();
    let mut term = rhs.clone();
    let mut iterations = 0;
    let mut residual = f64::INFINITY;
    for j in 0..maxiter {
        term = apply_a(&term);
        x += &term;
        iterations = j + 1;
        residual = term.norm();
        if residual <= tol {
            break;
        }
    }
    SolveOutcome { x, converged: residual <= tol, iterations, residual }
}

/// Restarted GMRES(m) solving `A x = rhs` for a linear operator `apply_a`
/// given only as a matrix-vector product, using modified Gram-Schmidt
/// Arnoldi and incremental Givens rotations for the Hessenberg
/// least-squares problem.
pub fn solve_gmres(
    apply_a: impl Fn(&DVector<f64>) -> DVector<f64>,
    rhs: &DVector<f64>,
    maxiter: usize,
    tol: f64,
) -> SolveOutcome {
    let n = rhs.len();
    let restart = maxiter.max(1).min(n.max(1));
    let mut x = DVector::zeros(n);
    let mut total_iters = 0;
    let rhs_norm = rhs.norm().max(1e-300);

    loop {
        let r0 = rhs - apply_a(&x);
        let beta = r0.norm();
        if beta / rhs_norm <= tol {
            return SolveOutcome { x, converged: true, iterations: total_iters, residual: beta };
        }

        let mut v: Vec<DVector<f64>> = vec![&r0 / beta];
        let mut h: Vec<Vec<f64>> = Vec::new();
        let mut cs: Vec<f64> = Vec::new();
        let mut sn: Vec<f64> = Vec::new();
        let mut g: Vec<f64> = vec![beta];
        let mut residual = beta;
        let mut k_used = 0;

        for k in 0..restart {
            if total_iters >= maxiter {
                break;
            }
            total_iters += 1;
            k_used = k + 1;

            let mut w = apply_a(&v[k]);
            let mut hk = vec![0.0; k + 2];
            for (i, vi) in v.iter().enumerate() {
                let hij = w.dot(vi);
                hk[i] = hij;
                w -= vi * hij;
            }
            let hnext = w.norm();
            hk[k + 1] = hnext;

            for i in 0..k {
                let (c, s) = (cs[i], sn[i]);
                let (hi, hip1) = (hk[i], hk[i + 1]);
                hk[i] = c * hi + s * hip1;
                hk[i + 1] = -s * hi + c * hip1;
            }

            let (c, s) = givens(hk[k], hk[k + 1]);
            cs.push(c);
            sn.push(s);
            let hkk = c * hk[k] + s * hk[k + 1];
            hk[k] = hkk;
            hk[k + 1] = 0.0;
            h.push(hk);

            let g_k1 = -s * g[k];
            g[k] = c * g[k];
            g.push(g_k1);
            residual = g[k + 1].abs();

            if hnext > 1e-300 {
                v.push(w / hnext);
            } else {
                break;
            }
            if residual / rhs_norm <= tol {
                break;
            }
        }

        let y = solve_upper_triangular(&h, &g, k_used);
        for (j, yj) in y.iter().enumerate() {
            x += &v[j] * *yj;
        }

        if residual / rhs_norm <= tol || total_iters >= maxiter {
            return SolveOutcome { x, converged: residual / rhs_norm <= tol, iterations: total_iters, residual };
        }
    }
}

fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = 1.0 / (1.0 + t * t).sqrt();
        (t * s, s)
    } else {
        let t = b / a;
        let c = 1.0 / (1.0 + t * t).sqrt();
        (c, t * c)
    }
}

/// Back-substitution for the `k x k` upper-triangular Hessenberg-reduced
/// system, `h[i]` is row `i` (length `k+2`, only entries `0..=i` used).
fn solve_upper_triangular(h: &[Vec<f64>], g: &[f64], k: usize) -> Vec<f64> {
    let mut y = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[j][i] * y[j];
        }
        y[i] = if h[i][i].abs() > 1e-300 { sum / h[i][i] } else { 0.0 };
    }
    y
}

/// Dispatches to [`solve_gmres`] or [`solve_neumann`] per `LinSolverType`.
/// `apply_lhs` is always the operator of the system being solved, `(I -
/// dt/2*M)*v`, the same closure GMRES needs for `A x = rhs`. `solve_neumann`
/// instead wants the contraction `A = I - apply_lhs`, so that branch rebuilds
/// it from `apply_lhs` rather than receiving `apply_lhs` directly — passing
/// `apply_lhs` straight through to the Neumann series would sum powers of
/// `I - dt/2*M` itself, which does not shrink.
pub fn solve(
    kind: LinSolverType,
    apply_lhs: impl Fn(&DVector<f64>) -> DVector<f64>,
    rhs: &DVector<f64>,
    maxiter: usize,
    tol: f64,
) -> SolveOutcome {
    match kind {
        LinSolverType::Gmres => solve_gmres(apply_lhs, rhs, maxiter, tol),
        LinSolverType::Neumann => solve_neumann(|v| v - apply_lhs(v), rhs, maxiter, tol),
    }
}
