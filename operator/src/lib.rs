//! # optctl-operator
//!
//! Time-invariant system matrices, the instantaneous
//! generator `M(t,theta)` acting on the real-doubled state in both
//! assembled and matrix-free form, and target unitaries with
//! their action on a vectorized state.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │               optctl-operator               │
//! │  ┌───────────────┐   ┌───────────────────┐ │
//! │  │ SystemMatrices│-->│      MasterEq      │ │
//! │  └───────────────┘   └───────────────────┘ │
//! │  ┌───────────────────────────────────────┐  │
//! │  │                 Gate                  │  │
//! │  └───────────────────────────────────────┘  │
//! └───────────────────────────────────────────┘
//! ```

pub mod gate;
pub mod master_eq;
pub mod system;

pub use gate::Gate;
pub use master_eq::{GeneratorMode, MasterEq};
pub use system::{CollapseKind, CollapseOperator, CouplingTerm, SystemMatrices};
