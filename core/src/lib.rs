//! # optctl-core
//!
//! Foundational types shared across the optctl quantum optimal-control
//! engine: the error taxonomy, the explicit runtime context that replaces
//! global MPI/PETSc state, essential/guard level mapping, and Kronecker
//! utilities for building operators on tensor-product Hilbert spaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                optctl-core                  │
//! │  ┌─────────┐ ┌──────────┐ ┌──────────────┐ │
//! │  │  error  │ │ context  │ │    levels    │ │
//! │  └─────────┘ └──────────┘ └──────────────┘ │
//! │  ┌──────────────────────────────────────┐   │
//! │  │                 kron                 │   │
//! │  └──────────────────────────────────────┘   │
//! └────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod kron;
pub mod levels;
pub mod state;

pub use context::{Diagnostics, RunContext};
pub use error::{OptctlError, Result};
pub use levels::EssentialMap;
pub use state::StateKind;

use num_complex::Complex64;

/// Complex scalar used throughout the engine (matches nalgebra's default).
pub type Complex = Complex64;

/// optctl version, taken from this crate's manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
