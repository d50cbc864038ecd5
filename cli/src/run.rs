//! The four `runtype` branches: `simulation` (one forward
//! sweep per initial condition, trajectories written to disk), `gradient`
//! (one `evalF`/`evalG` call, no outer loop), `optimization` (the full
//! gradient-descent-with-backtracking driver), and `evalcontrols` (samples
//! the control envelopes without propagating anything).

use std::path::{Path, PathBuf};
use std::time::Instant;

use nalgebra::DVector;
use optctl_config::output::{self, ControlSample, HistoryRow, TimingEntry};
use optctl_config::RunConfig;
use optctl_core::context::{Diagnostics, RunContext};
use optctl_core::error::Result;
use optctl_core::state::{deinterleave, interleave};
use optctl_objective::driver::{self, DriverConfig};
use optctl_objective::problem::{OptimProblem, OscillatorSlice, PenaltyWeights};
use optctl_objective::target::OptimTarget;
use optctl_operator::{GeneratorMode, MasterEq};

use crate::build;

/// Samples every oscillator's `(p, q, f, g)` at macro-step boundaries and
/// writes `control<q>.dat`. `p`/`q` are the raw per-segment quadratures
/// summed over carriers (the rotating-frame representation); `f`/`g` are
/// the carrier-modulated lab-frame amplitude from
/// [`optctl_control::Oscillator::eval_control`].
fn write_control_files(outdir: &Path, built: &build::BuiltOscillators, theta: &DVector<f64>, cfg: &RunConfig) -> Result<()> {
    let theta_slice = theta.as_slice();
    for (q, osc) in built.oscillators.iter().enumerate() {
        let mut samples = Vec::with_capacity(cfg.ntime + 1);
        for n in 0..=cfg.ntime {
            let t = n as f64 * cfg.dt;
            let (p, qq) = osc
                .segments
                .iter()
                .find(|s| t >= s.tstart() && t <= s.tstop())
                .map(|seg| {
                    let n_carriers = osc.n_carriers();
                    (0..n_carriers.max(1))
                        .map(|c| seg.evaluate(t, theta_slice, n_carriers, c))
                        .fold((0.0, 0.0), |(ap, aq), (p, q)| (ap + p, aq + q))
                })
                .unwrap_or((0.0, 0.0));
            let (f, g) = osc.eval_control(t, theta_slice);
            samples.push(ControlSample { t, p, q: qq, f, g });
        }
        output::write_control_file(&outdir.join(format!("control{q}.dat")), &samples)?;
    }
    Ok(())
}

fn build_problem<'a>(
    cfg: &RunConfig,
    built: &'a build::BuiltOscillators,
    stepper: optctl_propagator::TimeStepper<'a>,
) -> Result<OptimProblem<'a>> {
    let map = build::build_essential_map(cfg);
    let n_full = map.n_full();
    let n_ess = map.n_essential();
    let lindblad = cfg.collapse_type.is_lindblad();
    let objective = build::build_objective_type(cfg);
    let target_spec = build::build_target_spec(cfg)?;
    let target = OptimTarget::new(objective, target_spec, lindblad, map);
    let ic_set = build::build_initial_condition_set(cfg)?;

    let controls = built
        .oscillators
        .iter()
        .map(|o| OscillatorSlice { oscillator: o.clone(), theta_offset: 0, theta_len: o.nparams() })
        .collect();

    let weights = PenaltyWeights {
        regul_coeff: cfg.optim_regul_coeff,
        leakage_coeff: cfg.optim_penalty_coeff,
        variation_coeff: cfg.optim_penalty_dpdm_coeff,
        energy_coeff: cfg.optim_penalty_energy_coeff,
    };

    Ok(OptimProblem {
        stepper,
        target,
        ic_set,
        controls,
        weights,
        ctx: RunContext::single(),
        n_ess,
        n_full,
        lindblad,
    })
}

fn make_master_eq(cfg: &RunConfig, oscillators: Vec<optctl_control::Oscillator>) -> Result<MasterEq> {
    let sys = build::build_system(&oscillators, cfg)?;
    let lindblad = cfg.collapse_type.is_lindblad();
    Ok(MasterEq::new(sys, oscillators, lindblad, GeneratorMode::Assembled))
}

pub fn run_simulation(cfg: &RunConfig, outdir: &Path) -> Result<()> {
    let started = Instant::now();
    let built = build::build_oscillators(cfg);
    let theta = build::build_initial_theta(&built, cfg)?;
    let map = build::build_essential_map(cfg);
    let n_ess = map.n_essential();
    let lindblad = cfg.collapse_type.is_lindblad();
    let me = make_master_eq(cfg, built.oscillators.clone())?;
    let stepper_config = build::build_stepper_config(cfg);
    let stepper = optctl_propagator::TimeStepper::new(&me, stepper_config);
    let ic_set = build::build_initial_condition_set(cfg)?;
    let diag = Diagnostics::default();

    write_control_files(outdir, &built, &theta, cfg)?;

    let ninit = ic_set.ninit(n_ess, lindblad);
    for iinit in 0..ninit {
        let x0 = ic_set.prepare(iinit, n_ess, map.n_full(), &map, lindblad)?;
        let x0_real = interleave(&x0);
        let mut times = Vec::with_capacity(cfg.ntime + 1);
        let mut states = Vec::with_capacity(cfg.ntime + 1);
        let forward = stepper.forward_sweep(&x0_real, theta.as_slice(), &diag, |_step, t, x| {
            times.push(t);
            states.push(deinterleave(x).iter().copied().collect::<Vec<_>>());
        });
        let _ = forward;
        output::write_density_trajectory(
            &outdir.join(format!("rho_Re.iinit{iinit}.dat")),
            &outdir.join(format!("rho_Im.iinit{iinit}.dat")),
            &times,
            &states,
        )?;
    }

    tracing::info!(nonconvergence = diag.solver_nonconvergence_count(), "simulation complete");
    output::write_timing(&outdir.join("timing.dat"), &[TimingEntry { label: "simulation".into(), seconds: started.elapsed().as_secs_f64() }])?;
    Ok(())
}

pub fn run_evalcontrols(cfg: &RunConfig, outdir: &Path) -> Result<()> {
    let built = build::build_oscillators(cfg);
    let theta = build::build_initial_theta(&built, cfg)?;
    write_control_files(outdir, &built, &theta, cfg)?;
    Ok(())
}

pub fn run_gradient(cfg: &RunConfig, outdir: &Path) -> Result<()> {
    let started = Instant::now();
    let built = build::build_oscillators(cfg);
    let theta = build::build_initial_theta(&built, cfg)?;
    let me = make_master_eq(cfg, built.oscillators.clone())?;
    let stepper_config = build::build_stepper_config(cfg);
    let stepper = optctl_propagator::TimeStepper::new(&me, stepper_config);
    let problem = build_problem(cfg, &built, stepper)?;

    let eval = problem.eval(&theta, true);
    tracing::info!(f = eval.f, grad_norm = eval.grad.norm(), "gradient evaluation complete");

    write_control_files(outdir, &built, &theta, cfg)?;
    output::write_optim_history(
        &outdir.join("optim_history.dat"),
        &[HistoryRow { iter: 0, f: eval.f, grad_norm: eval.grad.norm(), step_length: 0.0 }],
    )?;
    output::write_params(&outdir.join("params.dat"), theta.as_slice())?;
    output::write_timing(&outdir.join("timing.dat"), &[TimingEntry { label: "gradient".into(), seconds: started.elapsed().as_secs_f64() }])?;
    Ok(())
}

pub fn run_optimization(cfg: &RunConfig, outdir: &Path) -> Result<()> {
    let started = Instant::now();
    let built = build::build_oscillators(cfg);
    let theta0 = build::build_initial_theta(&built, cfg)?;
    let me = make_master_eq(cfg, built.oscillators.clone())?;
    let stepper_config = build::build_stepper_config(cfg);
    let stepper = optctl_propagator::TimeStepper::new(&me, stepper_config);
    let problem = build_problem(cfg, &built, stepper)?;

    let driver_config = DriverConfig { maxiter: cfg.optim_maxiter, tol_grad: cfg.optim_tol_grad, ..DriverConfig::default() };
    let result = driver::run(&problem, &theta0, driver_config);
    tracing::info!(iterations = result.iterations, converged = result.converged, f = result.f, "optimization complete");

    let rows: Vec<HistoryRow> = result
        .history
        .iter()
        .map(|s| HistoryRow { iter: s.iter, f: s.f, grad_norm: s.grad_norm, step_length: s.step_length })
        .collect();
    output::write_optim_history(&outdir.join("optim_history.dat"), &rows)?;
    output::write_params(&outdir.join("params.dat"), result.theta.as_slice())?;
    write_control_files(outdir, &built, &result.theta, cfg)?;
    output::write_timing(&outdir.join("timing.dat"), &[TimingEntry { label: "optimization".into(), seconds: started.elapsed().as_secs_f64() }])?;
    Ok(())
}

pub fn config_log_path(outdir: &Path) -> PathBuf {
    outdir.join("config_log.dat")
}
