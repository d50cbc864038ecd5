//! Lowers a parsed [`optctl_config::RunConfig`] into the runtime domain
//! objects the library crates operate on: oscillators, the time-invariant
//! system matrices, the master equation, the time stepper, and the
//! optimization target. Kept separate from `main.rs` so the `run_*`
//! functions read as orchestration rather than construction.

use nalgebra::DVector;
use num_complex::Complex64;
use optctl_config::{
    ControlInit, GateName, InitialConditionSpec, LinSolverKind, OptimTargetSpec, RunConfig, SegmentSpec, TimeStepperKind,
};
use optctl_control::basis::{BSpline0, BSpline2nd, BSpline2ndAmplitude, StepBasis};
use optctl_control::{ControlBasis, Oscillator, PiPulse};
use optctl_core::error::{OptctlError, Result};
use optctl_core::EssentialMap;
use optctl_operator::{Gate, SystemMatrices};
use optctl_objective::target::{InitialConditionSet, ObjectiveType, TargetSpec};
use optctl_propagator::{CheckpointPolicy, CompositionOrder, LinSolverType, StepperConfig};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Default linear-solve residual tolerance; only `linearsolver_maxiter` is
/// exposed as a configuration key, so the tolerance itself is a fixed
/// engine constant rather than user-tunable.
const LINSOLVE_TOL: f64 = 1e-10;

fn segment_to_basis(seg: &SegmentSpec) -> ControlBasis {
    match *seg {
        SegmentSpec::Spline { nsplines, tstart, tstop } => ControlBasis::BSpline2nd(BSpline2nd::new(nsplines, tstart, tstop, false)),
        SegmentSpec::SplineAmplitude { nsplines, scaling, tstart, tstop } => {
            ControlBasis::BSpline2ndAmplitude(BSpline2ndAmplitude::new(nsplines, scaling, tstart, tstop, false))
        }
        SegmentSpec::Step0 { nsplines, tstart, tstop } => ControlBasis::BSpline0(BSpline0::new(nsplines, tstart, tstop, false)),
        SegmentSpec::Step { amp_p, amp_q, ramp } => ControlBasis::Step(StepBasis::new(amp_p, amp_q, 0.0, 0.0, ramp)),
    }
}

/// One oscillator's slice of the flat `theta` vector, so
/// [`build_initial_theta`] can fill in `control_initialization<q>` per
/// oscillator.
struct ThetaRange {
    offset: usize,
    len: usize,
}

pub struct BuiltOscillators {
    pub oscillators: Vec<Oscillator>,
    pub nparams: usize,
    ranges: Vec<ThetaRange>,
}

/// Builds every oscillator from `cfg`, assigns each control basis its flat
/// `theta` offset, and attaches pi-pulse overrides.
pub fn build_oscillators(cfg: &RunConfig) -> BuiltOscillators {
    let total_time = cfg.total_time();
    let mut oscillators = Vec::with_capacity(cfg.n_oscillators());
    let mut ranges = Vec::with_capacity(cfg.n_oscillators());
    let mut offset = 0;

    let needs_decay = matches!(cfg.collapse_type, optctl_config::CollapseType::Decay | optctl_config::CollapseType::Both);
    let needs_dephase = matches!(cfg.collapse_type, optctl_config::CollapseType::Dephase | optctl_config::CollapseType::Both);

    for q in 0..cfg.n_oscillators() {
        let mut osc = Oscillator::new(cfg.nlevels[q], cfg.transfreq[q], cfg.rotfreq[q], cfg.selfkerr[q]);
        osc.carriers = cfg.carrier_frequency[q].clone();
        if needs_decay {
            osc.decay_time = cfg.decay_time.get(q).copied();
        }
        if needs_dephase {
            osc.dephase_time = cfg.dephase_time.get(q).copied();
        }
        osc.segments = cfg.control_segments[q]
            .iter()
            .map(|seg| {
                let mut basis = segment_to_basis(seg);
                if let ControlBasis::Step(step) = &mut basis {
                    // Step carries no explicit window in the wire format; it
                    // covers the full simulation horizon by default.
                    step.tstart = 0.0;
                    step.tstop = total_time;
                }
                basis
            })
            .collect();
        osc.pi_pulses = cfg
            .apply_pipulse
            .iter()
            .filter(|p| p.oscillator == q)
            .map(|p| PiPulse { tstart: p.tstart, tstop: p.tstop, amp: p.amp, tramp: 0.0 })
            .collect();

        let start = offset;
        offset = osc.assign_skips(start);
        ranges.push(ThetaRange { offset: start, len: offset - start });
        oscillators.push(osc);
    }

    BuiltOscillators { nparams: offset, oscillators, ranges }
}

/// Fills the initial `theta` vector from each oscillator's
/// `control_initialization<q>`.
pub fn build_initial_theta(built: &BuiltOscillators, cfg: &RunConfig) -> Result<DVector<f64>> {
    let mut theta = DVector::<f64>::zeros(built.nparams);
    let mut rng = StdRng::seed_from_u64(cfg.rand_seed);
    for (q, range) in built.ranges.iter().enumerate() {
        let slice = range.offset..range.offset + range.len;
        match &cfg.control_initialization[q] {
            ControlInit::Constant(v) => {
                for k in slice {
                    theta[k] = *v;
                }
            }
            ControlInit::Random(sigma) => {
                let dist = Normal::new(0.0, *sigma).map_err(|e| OptctlError::config(format!("control_initialization{q}"), e.to_string()))?;
                for k in slice {
                    theta[k] = dist.sample(&mut rng);
                }
            }
            ControlInit::File(path) => {
                let values = read_f64_column(path)?;
                if values.len() != range.len {
                    return Err(OptctlError::config(
                        format!("control_initialization{q}"),
                        format!("file '{}' has {} values, oscillator needs {}", path.display(), values.len(), range.len),
                    ));
                }
                for (k, v) in slice.zip(values) {
                    theta[k] = v;
                }
            }
        }
    }
    Ok(theta)
}

fn read_f64_column(path: &std::path::Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().parse::<f64>().map_err(|e| OptctlError::config(path.display().to_string(), e.to_string())))
        .collect()
}

fn read_complex_vector(path: &std::path::Path) -> Result<DVector<Complex64>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.split_whitespace();
        let re: f64 = parts
            .next()
            .ok_or_else(|| OptctlError::config(path.display().to_string(), "expected 'Re Im' per line"))?
            .parse()
            .map_err(|e: std::num::ParseFloatError| OptctlError::config(path.display().to_string(), e.to_string()))?;
        let im: f64 = parts
            .next()
            .unwrap_or("0.0")
            .parse()
            .map_err(|e: std::num::ParseFloatError| OptctlError::config(path.display().to_string(), e.to_string()))?;
        entries.push(Complex64::new(re, im));
    }
    Ok(DVector::from_vec(entries))
}

/// : builds the time-invariant system matrices, applying the
/// `hamiltonian_file` override seam (replaces the oscillator-derived drift
/// with a user-supplied matrix, read as `N` lines of `Re Im Re Im ...`)
/// when present.
pub fn build_system(oscillators: &[Oscillator], cfg: &RunConfig) -> Result<SystemMatrices> {
    let lindblad = cfg.collapse_type.is_lindblad();
    let mut sys = SystemMatrices::build(oscillators, &cfg.crosskerr, &cfg.jkl, lindblad);
    if let Some(path) = &cfg.hamiltonian_file {
        sys.drift_static = read_hamiltonian_matrix(path, sys.n)?;
    }
    Ok(sys)
}

fn read_hamiltonian_matrix(path: &std::path::Path, n: usize) -> Result<nalgebra::DMatrix<Complex64>> {
    let flat = read_complex_vector(path)?;
    if flat.len() != n * n {
        return Err(OptctlError::config(
            "hamiltonian_file",
            format!("expected {} entries (row-major {n}x{n}), got {}", n * n, flat.len()),
        ));
    }
    Ok(nalgebra::DMatrix::from_row_iterator(n, n, flat.iter().copied()))
}

pub fn build_stepper_config(cfg: &RunConfig) -> StepperConfig {
    StepperConfig {
        dt: cfg.dt,
        ntime: cfg.ntime,
        order: match cfg.timestepper {
            TimeStepperKind::Imr => CompositionOrder::Two,
            TimeStepperKind::Imr4 => CompositionOrder::Four,
            TimeStepperKind::Imr8 => CompositionOrder::Eight,
        },
        linsolver: match cfg.linearsolver_type {
            LinSolverKind::Gmres => LinSolverType::Gmres,
            LinSolverKind::Neumann => LinSolverType::Neumann,
        },
        linsolve_maxiter: cfg.linearsolver_maxiter,
        linsolve_tol: LINSOLVE_TOL,
        checkpoint: CheckpointPolicy::Full,
    }
}

pub fn build_essential_map(cfg: &RunConfig) -> EssentialMap {
    EssentialMap::new(&cfg.nlevels, &cfg.nessential)
}

pub fn build_initial_condition_set(cfg: &RunConfig) -> Result<InitialConditionSet> {
    Ok(match &cfg.initialcondition {
        InitialConditionSpec::Basis => InitialConditionSet::Basis,
        InitialConditionSpec::Diagonal => InitialConditionSet::Diagonal,
        InitialConditionSpec::Pure(m) => InitialConditionSet::Pure(*m),
        InitialConditionSpec::FromFile(path) => InitialConditionSet::FromFile(read_complex_vector(path)?),
        InitialConditionSpec::ThreeStates => InitialConditionSet::ThreeStates,
        InitialConditionSpec::NPlusOne => InitialConditionSet::NPlusOne,
        InitialConditionSpec::Ensemble => InitialConditionSet::Ensemble,
        InitialConditionSpec::Performance => InitialConditionSet::Performance,
    })
}

fn gate_for(name: GateName) -> Gate {
    match name {
        GateName::X => Gate::x(),
        GateName::Y => Gate::y(),
        GateName::Z => Gate::z(),
        GateName::Hadamard => Gate::hadamard(),
        GateName::Cnot => Gate::cnot(),
    }
}

pub fn build_target_spec(cfg: &RunConfig) -> Result<TargetSpec> {
    Ok(match &cfg.optim_target {
        OptimTargetSpec::Gate(name) => {
            let gate_rot_freq = if cfg.gate_rot_freq.is_empty() { vec![0.0; cfg.nessential.len()] } else { cfg.gate_rot_freq.clone() };
            let gate = gate_for(*name).rotated(&cfg.nessential, &gate_rot_freq, cfg.total_time());
            TargetSpec::Gate(gate)
        }
        OptimTargetSpec::Pure(m) => TargetSpec::Pure(*m),
        OptimTargetSpec::FromFile(path) => TargetSpec::FromFile(read_complex_vector(path)?),
    })
}

pub fn build_objective_type(cfg: &RunConfig) -> ObjectiveType {
    match cfg.optim_objective {
        optctl_config::ObjectiveKind::Jfrobenius => ObjectiveType::Frobenius,
        optctl_config::ObjectiveKind::Jtrace => ObjectiveType::Trace,
        optctl_config::ObjectiveKind::Jmeasure => ObjectiveType::Measure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optctl_config::parse_str;

    fn two_osc_config() -> RunConfig {
        parse_str(
            "\
nlevels=2,2
ntime=20
dt=0.05
transfreq=4.1,4.2
rotfreq=4.1,4.2
selfkerr=0.0,0.0
carrier_frequency0=0.0
carrier_frequency1=0.0
control_segments0=spline,4,0.0,1.0
control_segments1=spline,4,0.0,1.0
control_initialization0=constant,0.1
control_initialization1=random,0.01
initialcondition=basis
collapse_type=none
runtype=simulation
optim_target=gate,CNOT
rand_seed=7
",
        )
        .unwrap()
    }

    #[test]
    fn oscillators_get_disjoint_theta_ranges() {
        let cfg = two_osc_config();
        let built = build_oscillators(&cfg);
        assert_eq!(built.ranges[0].offset, 0);
        assert_eq!(built.ranges[1].offset, built.ranges[0].len);
        assert_eq!(built.nparams, built.ranges[0].len + built.ranges[1].len);
    }

    #[test]
    fn initial_theta_respects_constant_and_random_init() {
        let cfg = two_osc_config();
        let built = build_oscillators(&cfg);
        let theta = build_initial_theta(&built, &cfg).unwrap();
        let r0 = &built.ranges[0];
        for k in r0.offset..r0.offset + r0.len {
            assert_eq!(theta[k], 0.1);
        }
    }

    #[test]
    fn system_matrices_build_from_two_oscillators() {
        let cfg = two_osc_config();
        let built = build_oscillators(&cfg);
        let sys = build_system(&built.oscillators, &cfg).unwrap();
        assert_eq!(sys.n, 4);
    }

    #[test]
    fn target_spec_resolves_cnot_gate() {
        let cfg = two_osc_config();
        let target = build_target_spec(&cfg).unwrap();
        assert!(matches!(target, TargetSpec::Gate(_)));
    }
}
