//! The outer optimization loop: a single `OptimProblem::eval` call per
//! iteration, a simple Armijo backtracking line search, and a convergence
//! check against `optim_tol_grad`.

use nalgebra::DVector;

use crate::problem::OptimProblem;

/// `optim_maxiter`/`optim_tol_grad` and the fixed parameters of the
/// backtracking line search.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub maxiter: usize,
    pub tol_grad: f64,
    pub initial_step: f64,
    pub armijo_c1: f64,
    pub backtrack_factor: f64,
    pub max_backtracks: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            maxiter: 200,
            tol_grad: 1e-5,
            initial_step: 1.0,
            armijo_c1: 1e-4,
            backtrack_factor: 0.5,
            max_backtracks: 20,
        }
    }
}

/// One row of the optimization trace.
#[derive(Debug, Clone)]
pub struct OptimizationStep {
    pub iter: usize,
    pub f: f64,
    pub grad_norm: f64,
    pub step_length: f64,
}

/// Outcome of [`run`]: the final parameter vector, objective value, and
/// whether the gradient-norm stopping criterion was met before `maxiter`.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub theta: DVector<f64>,
    pub f: f64,
    pub converged: bool,
    pub iterations: usize,
    pub history: Vec<OptimizationStep>,
}

/// Gradient descent with Armijo backtracking line search. Each iteration
/// evaluates `problem.eval` once at the current point (for `f` and `grad`)
/// and once more per backtracking trial (for `f` alone, `want_grad = false`)
/// — deliberately thin compared to a quasi-Newton driver, since optctl does
/// not carry curvature information across iterations.
pub fn run(problem: &OptimProblem, theta0: &DVector<f64>, config: DriverConfig) -> OptimizationResult {
    let mut theta = theta0.clone();
    let mut history = Vec::with_capacity(config.maxiter);

    let mut eval = problem.eval(&theta, true);
    let mut converged = eval.grad.norm() <= config.tol_grad;
    let mut iterations = 0;

    while !converged && iterations < config.maxiter {
        let grad_norm = eval.grad.norm();
        let descent = -&eval.grad;
        let directional_slope = eval.grad.dot(&descent);

        let mut step = config.initial_step;
        let mut accepted = false;
        for _ in 0..config.max_backtracks {
            let trial_theta = &theta + &descent * step;
            let trial = problem.eval(&trial_theta, false);
            if trial.f <= eval.f + config.armijo_c1 * step * directional_slope {
                theta = trial_theta;
                accepted = true;
                break;
            }
            step *= config.backtrack_factor;
        }

        history.push(OptimizationStep { iter: iterations, f: eval.f, grad_norm, step_length: step });

        if !accepted {
            tracing::warn!(iter = iterations, "backtracking line search failed to find a descent step");
            break;
        }

        iterations += 1;
        eval = problem.eval(&theta, true);
        converged = eval.grad.norm() <= config.tol_grad;
    }

    history.push(OptimizationStep { iter: iterations, f: eval.f, grad_norm: eval.grad.norm(), step_length: 0.0 });

    OptimizationResult { theta, f: eval.f, converged, iterations, history }
}

#[cfg(test)]
mod tests {
    // `OptimProblem` needs a populated `SystemMatrices`/`MasterEq`/stepper to
    // construct; this driver's convergence behaviour on a real problem is
    // exercised by the optctl-cli integration tests instead of unit tests
    // here. The Armijo acceptance condition itself is plain arithmetic and
    // not separately unit-tested.
}
