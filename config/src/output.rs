//! Output-file writers: `config_log.dat`, per-pulse
//! `control<q>.dat`, per-initial-condition `rho_Re/Im.iinit<i>.dat`,
//! `optim_history.dat`, `params.dat`, and `timing.dat`. All plain
//! whitespace-delimited text, written with `std::fs::File` + `write!`.

use num_complex::Complex64;
use optctl_core::error::Result;
use std::io::Write;
use std::path::Path;

use crate::RunConfig;

/// Records every resolved configuration field, one `key = value` per line,
/// mirroring the input file's own syntax.
pub fn write_config_log(path: &Path, cfg: &RunConfig) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "# optctl resolved configuration")?;
    writeln!(f, "nlevels={}", join_usize(&cfg.nlevels))?;
    writeln!(f, "nessential={}", join_usize(&cfg.nessential))?;
    writeln!(f, "ntime={}", cfg.ntime)?;
    writeln!(f, "dt={}", cfg.dt)?;
    writeln!(f, "transfreq={}", join_f64(&cfg.transfreq))?;
    writeln!(f, "rotfreq={}", join_f64(&cfg.rotfreq))?;
    writeln!(f, "selfkerr={}", join_f64(&cfg.selfkerr))?;
    writeln!(f, "crosskerr={}", join_f64(&cfg.crosskerr))?;
    writeln!(f, "Jkl={}", join_f64(&cfg.jkl))?;
    writeln!(f, "collapse_type={:?}", cfg.collapse_type)?;
    writeln!(f, "linearsolver_type={:?}", cfg.linearsolver_type)?;
    writeln!(f, "runtype={:?}", cfg.runtype)?;
    writeln!(f, "timestepper={:?}", cfg.timestepper)?;
    writeln!(f, "optim_objective={:?}", cfg.optim_objective)?;
    writeln!(f, "optim_regul_coeff={}", cfg.optim_regul_coeff)?;
    writeln!(f, "optim_penalty_coeff={}", cfg.optim_penalty_coeff)?;
    writeln!(f, "optim_penalty_dpdm_coeff={}", cfg.optim_penalty_dpdm_coeff)?;
    writeln!(f, "optim_penalty_energy_coeff={}", cfg.optim_penalty_energy_coeff)?;
    writeln!(f, "optim_maxiter={}", cfg.optim_maxiter)?;
    writeln!(f, "optim_tol_grad={}", cfg.optim_tol_grad)?;
    writeln!(f, "usematfree={}", cfg.usematfree)?;
    Ok(())
}

fn join_usize(v: &[usize]) -> String {
    v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
}

fn join_f64(v: &[f64]) -> String {
    v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
}

/// One row of a `control<q>.dat` file: the rotating-frame control amplitude
/// `(p, q)` and the lab-frame carrier-modulated amplitude `(f, g)` at time
/// `t` ( column layout `t, p(t), q(t), f(t), g(t)`).
#[derive(Debug, Clone, Copy)]
pub struct ControlSample {
    pub t: f64,
    pub p: f64,
    pub q: f64,
    pub f: f64,
    pub g: f64,
}

/// Writes one `control<q>.dat` file for oscillator `q`.
pub fn write_control_file(path: &Path, samples: &[ControlSample]) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "# t p(t) q(t) f(t) g(t)")?;
    for s in samples {
        writeln!(f, "{} {} {} {} {}", s.t, s.p, s.q, s.f, s.g)?;
    }
    Ok(())
}

/// Writes the real and imaginary parts of one initial condition's state
/// trajectory to `rho_Re.iinit<i>.dat` / `rho_Im.iinit<i>.dat`. Each row is
/// `t` followed by every entry of the (possibly vectorized density matrix)
/// state at that time, in the order produced by the propagator.
pub fn write_density_trajectory(path_re: &Path, path_im: &Path, times: &[f64], states: &[Vec<Complex64>]) -> Result<()> {
    let mut re = std::fs::File::create(path_re)?;
    let mut im = std::fs::File::create(path_im)?;
    for (t, state) in times.iter().zip(states.iter()) {
        write!(re, "{t}")?;
        write!(im, "{t}")?;
        for c in state {
            write!(re, " {}", c.re)?;
            write!(im, " {}", c.im)?;
        }
        writeln!(re)?;
        writeln!(im)?;
    }
    Ok(())
}

/// One row of `optim_history.dat`: iteration index, objective value,
/// gradient norm, and step length taken.
#[derive(Debug, Clone, Copy)]
pub struct HistoryRow {
    pub iter: usize,
    pub f: f64,
    pub grad_norm: f64,
    pub step_length: f64,
}

pub fn write_optim_history(path: &Path, rows: &[HistoryRow]) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "# iter J ||grad|| step_length")?;
    for r in rows {
        writeln!(f, "{} {} {} {}", r.iter, r.f, r.grad_norm, r.step_length)?;
    }
    Ok(())
}

/// Writes the final control parameter vector `theta`, one entry per line
///.
pub fn write_params(path: &Path, theta: &[f64]) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    for v in theta {
        writeln!(f, "{v}")?;
    }
    Ok(())
}

/// One named wall-clock timing entry for `timing.dat`.
#[derive(Debug, Clone)]
pub struct TimingEntry {
    pub label: String,
    pub seconds: f64,
}

pub fn write_timing(path: &Path, entries: &[TimingEntry]) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    for e in entries {
        writeln!(f, "{} {}", e.label, e.seconds)?;
    }
    Ok(())
}
