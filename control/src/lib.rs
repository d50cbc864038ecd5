//! # optctl-control
//!
//! Finite control parameterisations and the per-oscillator
//! bundle that evaluates carrier-modulated drive envelopes.

pub mod basis;
pub mod oscillator;
pub mod ramp;

pub use basis::{BSpline0, BSpline2nd, BSpline2ndAmplitude, ControlBasis, StepBasis};
pub use oscillator::{apply_pi_pulse_overrides, oscillator_pi_override_active, Oscillator, PiPulse};
