//! # optctl-propagator
//!
//! The implicit-midpoint time integrator: a matrix-free
//! GMRES/Neumann linear solve per step, compositional order-4/order-8
//! wrappers, a checkpointed forward sweep, and the reverse-mode adjoint
//! sweep that accumulates `dJ/dtheta`.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               optctl-propagator               │
//! │  ┌─────────────┐      ┌──────────────────┐  │
//! │  │  linsolve   │<---->│     stepper      │  │
//! │  │ (GMRES/     │      │ (IMR + Suzuki     │  │
//! │  │  Neumann)   │      │  composition)     │  │
//! │  └─────────────┘      └──────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod linsolve;
pub mod stepper;

pub use linsolve::{solve, solve_gmres, solve_neumann, LinSolverType, SolveOutcome};
pub use stepper::{composition_substeps, CheckpointPolicy, CompositionOrder, ForwardResult, StepState, StepperConfig, TimeStepper};
