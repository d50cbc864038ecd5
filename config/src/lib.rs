//! # optctl-config
//!
//! Parses the line-oriented `key=value` configuration file format into a
//! [`RunConfig`], and (in [`output`]) writes the fixed text output files
//! that format names (`config_log.dat`, `control<q>.dat`,
//! `rho_Re/Im.iinit<i>.dat`, `optim_history.dat`, `params.dat`,
//! `timing.dat`).
//!
//! The wire format is intentionally not TOML/JSON, so parsing is hand-rolled
//! here — but the parsed [`RunConfig`] is an ordinary `serde::Serialize`
//! struct with a `validate()` pass over cross-field constraints, so
//! `config_log.dat` can be rendered from the same struct the engine runs
//! with.

pub mod output;

use optctl_core::error::{OptctlError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// The kind of run a config file selects via `runtype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Simulation,
    Gradient,
    Optimization,
    Evalcontrols,
}

/// The `timestepper` selection. `EE` (explicit Euler) is a recognized name
/// that is not implemented by `optctl-propagator`; requesting it is a
/// `ConfigError`, not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeStepperKind {
    Imr,
    Imr4,
    Imr8,
}

/// The `linearsolver_type` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinSolverKind {
    Gmres,
    Neumann,
}

/// The `optim_objective` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectiveKind {
    Jfrobenius,
    Jtrace,
    Jmeasure,
}

/// The `collapse_type` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollapseType {
    None,
    Decay,
    Dephase,
    Both,
}

impl CollapseType {
    pub fn is_lindblad(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The `UDEmodel` selection. Parsed and validated for consistency with
/// `collapse_type`/`hamiltonian_file` but does not itself change behavior
/// beyond that cross-check — `collapse_type` is what actually selects
/// Lindblad vs. Schrodinger dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UdeModel {
    None,
    Hamiltonian,
    Lindblad,
    Both,
}

/// One entry of `control_segments<q>`: a time-windowed
/// control-basis specification. `Step` carries no explicit window in the
/// wire format (`"step,amp_p,amp_q,ramp"`); it defaults to the full
/// simulation horizon `[0, ntime*dt]` when lowered into an
/// `optctl_control::Oscillator` (this crate only parses the raw fields).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SegmentSpec {
    Spline { nsplines: usize, tstart: f64, tstop: f64 },
    SplineAmplitude { nsplines: usize, scaling: f64, tstart: f64, tstop: f64 },
    Step0 { nsplines: usize, tstart: f64, tstop: f64 },
    Step { amp_p: f64, amp_q: f64, ramp: f64 },
}

/// `control_initialization<q>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControlInit {
    Random(f64),
    Constant(f64),
    File(PathBuf),
}

/// `initialcondition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InitialConditionSpec {
    Basis,
    Diagonal,
    Pure(usize),
    FromFile(PathBuf),
    ThreeStates,
    NPlusOne,
    Ensemble,
    Performance,
}

/// The `optim_target` selection. `Gate` carries one of the closed gate
/// names or a from-file variant (read by the caller; this crate only
/// stores the path).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OptimTargetSpec {
    Gate(GateName),
    Pure(usize),
    FromFile(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateName {
    X,
    Y,
    Z,
    Hadamard,
    Cnot,
}

/// One `apply_pipulse` quadruple: `(oscillator, tstart, tstop, amp)`.
/// `ramp` is not part of the wire quadruple; it defaults to
/// `0.0` (a hard step) when lowered into `optctl_control::oscillator::PiPulse`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PiPulseSpec {
    pub oscillator: usize,
    pub tstart: f64,
    pub tstop: f64,
    pub amp: f64,
}

/// The fully parsed, validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub nlevels: Vec<usize>,
    pub nessential: Vec<usize>,
    pub ntime: usize,
    pub dt: f64,
    pub transfreq: Vec<f64>,
    pub rotfreq: Vec<f64>,
    pub selfkerr: Vec<f64>,
    pub crosskerr: Vec<f64>,
    pub jkl: Vec<f64>,
    pub carrier_frequency: Vec<Vec<f64>>,
    pub control_segments: Vec<Vec<SegmentSpec>>,
    pub control_initialization: Vec<ControlInit>,
    pub initialcondition: InitialConditionSpec,
    pub gate_rot_freq: Vec<f64>,
    pub collapse_type: CollapseType,
    pub decay_time: Vec<f64>,
    pub dephase_time: Vec<f64>,
    pub linearsolver_type: LinSolverKind,
    pub linearsolver_maxiter: usize,
    pub runtype: RunType,
    pub timestepper: TimeStepperKind,
    pub optim_objective: ObjectiveKind,
    pub optim_target: OptimTargetSpec,
    pub optim_regul_coeff: f64,
    pub optim_penalty_coeff: f64,
    pub optim_penalty_dpdm_coeff: f64,
    pub optim_penalty_energy_coeff: f64,
    pub optim_maxiter: usize,
    pub optim_tol_grad: f64,
    pub rand_seed: u64,
    pub apply_pipulse: Vec<PiPulseSpec>,
    pub usematfree: bool,
    pub hamiltonian_file: Option<PathBuf>,
    pub udemodel: UdeModel,
}

impl RunConfig {
    pub fn total_time(&self) -> f64 {
        self.dt * self.ntime as f64
    }

    pub fn n_oscillators(&self) -> usize {
        self.nlevels.len()
    }

    /// Cross-field consistency checks beyond what per-key parsing already
    /// catches.
    pub fn validate(&self) -> Result<()> {
        let q = self.n_oscillators();
        if q == 0 {
            return Err(OptctlError::config("nlevels", "must list at least one oscillator"));
        }
        if self.nessential.len() != q {
            return Err(OptctlError::config(
                "nessential",
                format!("length {} does not match nlevels length {}", self.nessential.len(), q),
            ));
        }
        for (i, (&ness, &nlev)) in self.nessential.iter().zip(self.nlevels.iter()).enumerate() {
            if ness > nlev {
                return Err(OptctlError::config(
                    format!("nessential[{i}]"),
                    format!("{ness} exceeds nlevels[{i}]={nlev}"),
                ));
            }
        }
        if self.transfreq.len() != q || self.rotfreq.len() != q || self.selfkerr.len() != q {
            return Err(OptctlError::config(
                "transfreq/rotfreq/selfkerr",
                format!("each must have length {q} (one entry per oscillator)"),
            ));
        }
        let npairs = q * (q.saturating_sub(1)) / 2;
        if !self.crosskerr.is_empty() && self.crosskerr.len() != npairs {
            return Err(OptctlError::config(
                "crosskerr",
                format!("expected {npairs} upper-triangular pair entries, got {}", self.crosskerr.len()),
            ));
        }
        if !self.jkl.is_empty() && self.jkl.len() != npairs {
            return Err(OptctlError::config(
                "Jkl",
                format!("expected {npairs} upper-triangular pair entries, got {}", self.jkl.len()),
            ));
        }
        if self.carrier_frequency.len() != q {
            return Err(OptctlError::config("carrier_frequency<q>", "must be given for every oscillator 0..Q"));
        }
        if self.control_segments.len() != q {
            return Err(OptctlError::config("control_segments<q>", "must be given for every oscillator 0..Q"));
        }
        if self.collapse_type.is_lindblad() {
            let needs_decay = matches!(self.collapse_type, CollapseType::Decay | CollapseType::Both);
            let needs_dephase = matches!(self.collapse_type, CollapseType::Dephase | CollapseType::Both);
            if needs_decay && self.decay_time.len() != q {
                return Err(OptctlError::config("decay_time", format!("must have length {q} when collapse_type needs decay")));
            }
            if needs_dephase && self.dephase_time.len() != q {
                return Err(OptctlError::config("dephase_time", format!("must have length {q} when collapse_type needs dephase")));
            }
        }
        for pulse in &self.apply_pipulse {
            if pulse.oscillator >= q {
                return Err(OptctlError::config(
                    "apply_pipulse",
                    format!("oscillator index {} out of range (have {q} oscillators)", pulse.oscillator),
                ));
            }
        }
        if matches!(self.runtype, RunType::Gradient | RunType::Optimization) {
            for (q_idx, segs) in self.control_segments.iter().enumerate() {
                for seg in segs {
                    if matches!(seg, SegmentSpec::Step { .. }) {
                        return Err(OptctlError::config(
                            format!("control_segments{q_idx}"),
                            "Step control bases are non-differentiable; runtype=gradient/optimization requires a differentiable basis",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Strips a trailing `# ...` comment and surrounding whitespace.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

fn parse_keyvalues(content: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for (lineno, raw_line) in content.lines().enumerate() {
        let line = strip_comment(raw_line);
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(OptctlError::config(
                format!("line {}", lineno + 1),
                format!("expected 'key=value', got '{line}'"),
            ));
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

fn get<'a>(raw: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    raw.get(key).map(|s| s.as_str())
}

fn require<'a>(raw: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    get(raw, key).ok_or_else(|| OptctlError::config(key, "required key is missing"))
}

fn parse_csv_usize(raw: &HashMap<String, String>, key: &str) -> Result<Vec<usize>> {
    require(raw, key)?
        .split(',')
        .map(|s| s.trim().parse::<usize>().map_err(|e| OptctlError::config(key, e.to_string())))
        .collect()
}

fn parse_csv_f64(raw: &HashMap<String, String>, key: &str) -> Result<Vec<f64>> {
    match get(raw, key) {
        None | Some("") => Ok(Vec::new()),
        Some(v) => v
            .split(',')
            .map(|s| s.trim().parse::<f64>().map_err(|e| OptctlError::config(key, e.to_string())))
            .collect(),
    }
}

fn parse_f64(raw: &HashMap<String, String>, key: &str) -> Result<f64> {
    require(raw, key)?.parse::<f64>().map_err(|e| OptctlError::config(key, e.to_string()))
}

fn parse_usize(raw: &HashMap<String, String>, key: &str) -> Result<usize> {
    require(raw, key)?.parse::<usize>().map_err(|e| OptctlError::config(key, e.to_string()))
}

fn parse_usize_default(raw: &HashMap<String, String>, key: &str, default: usize) -> Result<usize> {
    match get(raw, key) {
        None => Ok(default),
        Some(v) => v.parse::<usize>().map_err(|e| OptctlError::config(key, e.to_string())),
    }
}

fn parse_f64_default(raw: &HashMap<String, String>, key: &str, default: f64) -> Result<f64> {
    match get(raw, key) {
        None => Ok(default),
        Some(v) => v.parse::<f64>().map_err(|e| OptctlError::config(key, e.to_string())),
    }
}

fn parse_bool_default(raw: &HashMap<String, String>, key: &str, default: bool) -> Result<bool> {
    match get(raw, key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(OptctlError::config(key, format!("expected a boolean, got '{other}'"))),
        },
    }
}

fn split_fields(s: &str) -> Vec<&str> {
    s.split(',').map(str::trim).collect()
}

fn parse_one_segment(key: &str, spec: &str) -> Result<SegmentSpec> {
    let fields = split_fields(spec);
    let err = |msg: &str| Err(OptctlError::config(key, msg.to_string()));
    let Some((&kind, rest)) = fields.split_first() else {
        return err("empty control_segments entry");
    };
    let f = |i: usize| -> Result<f64> {
        rest.get(i)
            .ok_or_else(|| OptctlError::config(key, format!("missing field {i} in '{spec}'")))?
            .parse::<f64>()
            .map_err(|e| OptctlError::config(key, e.to_string()))
    };
    let n = |i: usize| -> Result<usize> { Ok(f(i)? as usize) };
    match kind.to_ascii_lowercase().as_str() {
        "spline" => Ok(SegmentSpec::Spline { nsplines: n(0)?, tstart: f(1)?, tstop: f(2)? }),
        "splineamplitude" => Ok(SegmentSpec::SplineAmplitude { nsplines: n(0)?, scaling: f(1)?, tstart: f(2)?, tstop: f(3)? }),
        "spline0" => Ok(SegmentSpec::Step0 { nsplines: n(0)?, tstart: f(1)?, tstop: f(2)? }),
        "step" => Ok(SegmentSpec::Step { amp_p: f(0)?, amp_q: f(1)?, ramp: f(2)? }),
        other => err(&format!("unknown control_segments kind '{other}'")),
    }
}

fn parse_control_segments(key: &str, value: &str) -> Result<Vec<SegmentSpec>> {
    value.split(';').map(|entry| parse_one_segment(key, entry)).collect()
}

fn parse_control_init(key: &str, value: &str) -> Result<ControlInit> {
    let fields = split_fields(value);
    match fields.as_slice() {
        ["random", sigma] => Ok(ControlInit::Random(
            sigma.parse().map_err(|e: std::num::ParseFloatError| OptctlError::config(key, e.to_string()))?,
        )),
        ["constant", v] => Ok(ControlInit::Constant(
            v.parse().map_err(|e: std::num::ParseFloatError| OptctlError::config(key, e.to_string()))?,
        )),
        ["file", path] => Ok(ControlInit::File(PathBuf::from(path))),
        _ => Err(OptctlError::config(key, format!("expected 'random,sigma' | 'constant,v' | 'file,path', got '{value}'"))),
    }
}

fn parse_initialcondition(raw: &HashMap<String, String>) -> Result<InitialConditionSpec> {
    let key = "initialcondition";
    let value = require(raw, key)?;
    let fields = split_fields(value);
    match fields.as_slice() {
        ["basis"] => Ok(InitialConditionSpec::Basis),
        ["diagonal"] => Ok(InitialConditionSpec::Diagonal),
        ["pure", m] => Ok(InitialConditionSpec::Pure(
            m.parse().map_err(|e: std::num::ParseIntError| OptctlError::config(key, e.to_string()))?,
        )),
        ["file", path] => Ok(InitialConditionSpec::FromFile(PathBuf::from(path))),
        ["threestates"] => Ok(InitialConditionSpec::ThreeStates),
        ["nplusone"] => Ok(InitialConditionSpec::NPlusOne),
        ["ensemble"] => Ok(InitialConditionSpec::Ensemble),
        ["performance"] => Ok(InitialConditionSpec::Performance),
        _ => Err(OptctlError::config(key, format!("unrecognised initialcondition '{value}'"))),
    }
}

fn parse_optim_target(raw: &HashMap<String, String>) -> Result<OptimTargetSpec> {
    let key = "optim_target";
    let value = require(raw, key)?;
    let fields = split_fields(value);
    match fields.as_slice() {
        ["gate", name] => {
            let gate = match name.to_ascii_uppercase().as_str() {
                "X" => GateName::X,
                "Y" => GateName::Y,
                "Z" => GateName::Z,
                "H" | "HADAMARD" => GateName::Hadamard,
                "CNOT" => GateName::Cnot,
                other => return Err(OptctlError::config(key, format!("unknown gate '{other}'"))),
            };
            Ok(OptimTargetSpec::Gate(gate))
        }
        ["pure", m] => Ok(OptimTargetSpec::Pure(
            m.parse().map_err(|e: std::num::ParseIntError| OptctlError::config(key, e.to_string()))?,
        )),
        ["file", path] => Ok(OptimTargetSpec::FromFile(PathBuf::from(path))),
        _ => Err(OptctlError::config(key, format!("expected 'gate,NAME' | 'pure,m' | 'file,path', got '{value}'"))),
    }
}

fn parse_collapse_type(raw: &HashMap<String, String>) -> Result<CollapseType> {
    match get(raw, "collapse_type").unwrap_or("none").to_ascii_lowercase().as_str() {
        "none" => Ok(CollapseType::None),
        "decay" => Ok(CollapseType::Decay),
        "dephase" => Ok(CollapseType::Dephase),
        "both" => Ok(CollapseType::Both),
        other => Err(OptctlError::config("collapse_type", format!("unknown collapse_type '{other}'"))),
    }
}

fn parse_linearsolver_type(raw: &HashMap<String, String>) -> Result<LinSolverKind> {
    match get(raw, "linearsolver_type").unwrap_or("gmres").to_ascii_lowercase().as_str() {
        "gmres" => Ok(LinSolverKind::Gmres),
        "neumann" => Ok(LinSolverKind::Neumann),
        other => Err(OptctlError::config("linearsolver_type", format!("unknown linearsolver_type '{other}'"))),
    }
}

fn parse_runtype(raw: &HashMap<String, String>) -> Result<RunType> {
    match require(raw, "runtype")?.to_ascii_lowercase().as_str() {
        "simulation" => Ok(RunType::Simulation),
        "gradient" => Ok(RunType::Gradient),
        "optimization" => Ok(RunType::Optimization),
        "evalcontrols" => Ok(RunType::Evalcontrols),
        other => Err(OptctlError::config("runtype", format!("unknown runtype '{other}'"))),
    }
}

fn parse_timestepper(raw: &HashMap<String, String>) -> Result<TimeStepperKind> {
    match get(raw, "timestepper").unwrap_or("IMR").to_ascii_uppercase().as_str() {
        "IMR" => Ok(TimeStepperKind::Imr),
        "IMR4" => Ok(TimeStepperKind::Imr4),
        "IMR8" => Ok(TimeStepperKind::Imr8),
        "EE" => Err(OptctlError::config(
            "timestepper",
            "explicit Euler (EE) is named in  external interface but not implemented by optctl-propagator; use IMR/IMR4/IMR8",
        )),
        other => Err(OptctlError::config("timestepper", format!("unknown timestepper '{other}'"))),
    }
}

fn parse_objective(raw: &HashMap<String, String>) -> Result<ObjectiveKind> {
    match get(raw, "optim_objective").unwrap_or("Jtrace").to_ascii_lowercase().as_str() {
        "jfrobenius" => Ok(ObjectiveKind::Jfrobenius),
        "jtrace" => Ok(ObjectiveKind::Jtrace),
        "jmeasure" => Ok(ObjectiveKind::Jmeasure),
        other => Err(OptctlError::config("optim_objective", format!("unknown optim_objective '{other}'"))),
    }
}

fn parse_udemodel(raw: &HashMap<String, String>) -> Result<UdeModel> {
    match get(raw, "UDEmodel").unwrap_or("none").to_ascii_lowercase().as_str() {
        "none" => Ok(UdeModel::None),
        "hamiltonian" => Ok(UdeModel::Hamiltonian),
        "lindblad" => Ok(UdeModel::Lindblad),
        "both" => Ok(UdeModel::Both),
        other => Err(OptctlError::config("UDEmodel", format!("unknown UDEmodel '{other}'"))),
    }
}

fn parse_pipulses(raw: &HashMap<String, String>) -> Result<Vec<PiPulseSpec>> {
    let key = "apply_pipulse";
    match get(raw, key) {
        None | Some("") => Ok(Vec::new()),
        Some(value) => value
            .split(';')
            .map(|entry| {
                let fields = split_fields(entry);
                match fields.as_slice() {
                    [osc, tstart, tstop, amp] => Ok(PiPulseSpec {
                        oscillator: osc.parse().map_err(|e: std::num::ParseIntError| OptctlError::config(key, e.to_string()))?,
                        tstart: tstart.parse().map_err(|e: std::num::ParseFloatError| OptctlError::config(key, e.to_string()))?,
                        tstop: tstop.parse().map_err(|e: std::num::ParseFloatError| OptctlError::config(key, e.to_string()))?,
                        amp: amp.parse().map_err(|e: std::num::ParseFloatError| OptctlError::config(key, e.to_string()))?,
                    }),
                    _ => Err(OptctlError::config(key, format!("expected quadruples 'osc,tstart,tstop,amp', got '{entry}'"))),
                }
            })
            .collect(),
    }
}

/// Parses a `key=value` configuration file from its text content.
pub fn parse_str(content: &str) -> Result<RunConfig> {
    let raw = parse_keyvalues(content)?;

    let nlevels = parse_csv_usize(&raw, "nlevels")?;
    let q = nlevels.len();
    let nessential = match get(&raw, "nessential") {
        Some(_) => parse_csv_usize(&raw, "nessential")?,
        None => nlevels.clone(),
    };

    let mut carrier_frequency = Vec::with_capacity(q);
    let mut control_segments = Vec::with_capacity(q);
    let mut control_initialization = Vec::with_capacity(q);
    for osc_id in 0..q {
        let cf_key = format!("carrier_frequency{osc_id}");
        carrier_frequency.push(match get(&raw, &cf_key) {
            Some(v) if !v.is_empty() => v
                .split(',')
                .map(|s| s.trim().parse::<f64>().map_err(|e| OptctlError::config(&cf_key, e.to_string())))
                .collect::<Result<Vec<f64>>>()?,
            _ => vec![0.0],
        });

        let cs_key = format!("control_segments{osc_id}");
        control_segments.push(parse_control_segments(&cs_key, require(&raw, &cs_key)?)?);

        let ci_key = format!("control_initialization{osc_id}");
        control_initialization.push(match get(&raw, &ci_key) {
            Some(v) => parse_control_init(&ci_key, v)?,
            None => ControlInit::Constant(0.0),
        });
    }

    let config = RunConfig {
        transfreq: parse_csv_f64(&raw, "transfreq")?,
        rotfreq: parse_csv_f64(&raw, "rotfreq")?,
        selfkerr: parse_csv_f64(&raw, "selfkerr")?,
        crosskerr: parse_csv_f64(&raw, "crosskerr")?,
        jkl: parse_csv_f64(&raw, "Jkl")?,
        ntime: parse_usize(&raw, "ntime")?,
        dt: parse_f64(&raw, "dt")?,
        carrier_frequency,
        control_segments,
        control_initialization,
        initialcondition: parse_initialcondition(&raw)?,
        gate_rot_freq: parse_csv_f64(&raw, "gate_rot_freq")?,
        collapse_type: parse_collapse_type(&raw)?,
        decay_time: parse_csv_f64(&raw, "decay_time")?,
        dephase_time: parse_csv_f64(&raw, "dephase_time")?,
        linearsolver_type: parse_linearsolver_type(&raw)?,
        linearsolver_maxiter: parse_usize_default(&raw, "linearsolver_maxiter", 50)?,
        runtype: parse_runtype(&raw)?,
        timestepper: parse_timestepper(&raw)?,
        optim_objective: parse_objective(&raw)?,
        optim_target: parse_optim_target(&raw)?,
        optim_regul_coeff: parse_f64_default(&raw, "optim_regul_coeff", 0.0)?,
        optim_penalty_coeff: parse_f64_default(&raw, "optim_penalty_coeff", 0.0)?,
        optim_penalty_dpdm_coeff: parse_f64_default(&raw, "optim_penalty_dpdm_coeff", 0.0)?,
        optim_penalty_energy_coeff: parse_f64_default(&raw, "optim_penalty_energy_coeff", 0.0)?,
        optim_maxiter: parse_usize_default(&raw, "optim_maxiter", 200)?,
        optim_tol_grad: parse_f64_default(&raw, "optim_tol_grad", 1e-5)?,
        rand_seed: parse_usize_default(&raw, "rand_seed", 0)? as u64,
        apply_pipulse: parse_pipulses(&raw)?,
        usematfree: parse_bool_default(&raw, "usematfree", false)?,
        hamiltonian_file: get(&raw, "hamiltonian_file").map(PathBuf::from),
        udemodel: parse_udemodel(&raw)?,
        nlevels,
        nessential,
    };
    config.validate()?;
    Ok(config)
}

/// Parses a `key=value` configuration file from disk.
pub fn parse_file(path: &std::path::Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config_text() -> String {
        "\
nlevels=2
ntime=100
dt=0.01
transfreq=4.1
rotfreq=4.1
selfkerr=0.0
carrier_frequency0=0.0
control_segments0=spline,10,0.0,1.0
initialcondition=basis
collapse_type=none
runtype=simulation
optim_target=gate,X
"
        .to_string()
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = parse_str(&minimal_config_text()).unwrap();
        assert_eq!(cfg.nlevels, vec![2]);
        assert_eq!(cfg.nessential, vec![2]);
        assert_eq!(cfg.ntime, 100);
        assert_eq!(cfg.runtype, RunType::Simulation);
        assert_eq!(cfg.optim_target, OptimTargetSpec::Gate(GateName::X));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let mut text = minimal_config_text();
        text.push_str("\n# a trailing comment\n   \n");
        let cfg = parse_str(&text).unwrap();
        assert_eq!(cfg.ntime, 100);
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        let text = "nlevels=2\n";
        let err = parse_str(text).unwrap_err();
        assert!(matches!(err, OptctlError::Config { .. }));
    }

    #[test]
    fn nessential_cannot_exceed_nlevels() {
        let mut text = minimal_config_text();
        text.push_str("nessential=5\n");
        assert!(parse_str(&text).is_err());
    }

    #[test]
    fn parses_two_oscillator_config_with_crosskerr_and_jkl() {
        let text = "\
nlevels=2,3
nessential=2,2
ntime=50
dt=0.05
transfreq=4.1,5.2
rotfreq=4.1,5.2
selfkerr=0.2,0.3
crosskerr=0.01
Jkl=0.003
carrier_frequency0=0.0
carrier_frequency1=0.0,1.1
control_segments0=spline,8,0.0,2.5
control_segments1=step,1.0,0.5,0.1
initialcondition=diagonal
collapse_type=none
runtype=simulation
optim_target=gate,CNOT
";
        let cfg = parse_str(text).unwrap();
        assert_eq!(cfg.nlevels, vec![2, 3]);
        assert_eq!(cfg.crosskerr, vec![0.01]);
        assert_eq!(cfg.jkl, vec![0.003]);
        assert_eq!(cfg.carrier_frequency[1], vec![0.0, 1.1]);
        assert_eq!(
            cfg.control_segments[0],
            vec![SegmentSpec::Spline { nsplines: 8, tstart: 0.0, tstop: 2.5 }]
        );
        assert_eq!(
            cfg.control_segments[1],
            vec![SegmentSpec::Step { amp_p: 1.0, amp_q: 0.5, ramp: 0.1 }]
        );
    }

    #[test]
    fn step_segment_rejected_under_gradient_runtype() {
        let mut text = minimal_config_text();
        text = text.replace("control_segments0=spline,10,0.0,1.0", "control_segments0=step,1.0,0.0,0.1");
        text = text.replace("runtype=simulation", "runtype=gradient");
        assert!(parse_str(&text).is_err());
    }

    #[test]
    fn apply_pipulse_parses_multiple_quadruples() {
        let mut text = minimal_config_text();
        text.push_str("apply_pipulse=0,0.1,0.2,1.0;0,0.3,0.4,-1.0\n");
        let cfg = parse_str(&text).unwrap();
        assert_eq!(cfg.apply_pipulse.len(), 2);
        assert_eq!(cfg.apply_pipulse[1].amp, -1.0);
    }

    #[test]
    fn collapse_type_requires_matching_decay_times() {
        let mut text = minimal_config_text();
        text = text.replace("collapse_type=none", "collapse_type=decay");
        assert!(parse_str(&text).is_err());
        text.push_str("decay_time=10.0\n");
        assert!(parse_str(&text).is_ok());
    }

    #[test]
    fn timestepper_ee_is_rejected() {
        let mut text = minimal_config_text();
        text.push_str("timestepper=EE\n");
        assert!(parse_str(&text).is_err());
    }

    #[test]
    fn control_initialization_variants_parse() {
        let mut text = minimal_config_text();
        text.push_str("control_initialization0=random,0.01\n");
        let cfg = parse_str(&text).unwrap();
        assert_eq!(cfg.control_initialization[0], ControlInit::Random(0.01));
    }

    #[test]
    fn total_time_matches_dt_times_ntime() {
        let cfg = parse_str(&minimal_config_text()).unwrap();
        assert!((cfg.total_time() - 1.0).abs() < 1e-12);
    }
}
