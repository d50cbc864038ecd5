//! # optctl-objective
//!
//! Initial-condition preparation, target-state rotation, and the terminal
//! cost pipeline; the `evalF`/`evalG` ensemble reduction
//!; and the thin gradient-descent driver that ties them to
//! [`optctl_propagator::TimeStepper`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 optctl-objective                  │
//! │  ┌──────────┐   ┌───────────┐   ┌──────────────┐  │
//! │  │  target  │-->│  problem  │-->│    driver    │  │
//! │  │ (J,dJ/dx)│   │ (evalF/G) │   │ (grad descent│  │
//! │  │          │   │           │   │  + backtrack)│  │
//! │  └──────────┘   └───────────┘   └──────────────┘  │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod problem;
pub mod target;

pub use driver::{run, DriverConfig, OptimizationResult, OptimizationStep};
pub use problem::{EvalResult, OptimProblem, OscillatorSlice, PenaltyWeights};
pub use target::{InitialConditionSet, ObjectiveType, OptimTarget, PreparedTarget, TargetSpec};
