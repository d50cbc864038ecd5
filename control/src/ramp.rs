//! Shared trapezoidal ramp window, used by [`crate::basis::StepBasis`] and
//! by [`crate::oscillator::Oscillator`]'s pi-pulse windows.

/// Returns 0 outside `[t0, t1]`, ramps linearly from 0 to 1 over the first
/// `tramp` of the interval, stays at 1 in the interior, and ramps back down
/// to 0 over the last `tramp`. If `tramp <= 0` this degenerates to a hard
/// step. If `2*tramp` exceeds the interval width the two ramps overlap and
/// the factor simply never reaches 1 (a triangular window).
pub fn ramp_factor(t: f64, t0: f64, t1: f64, tramp: f64) -> f64 {
    if t < t0 || t > t1 {
        return 0.0;
    }
    if tramp <= 0.0 {
        return 1.0;
    }
    let up = ((t - t0) / tramp).clamp(0.0, 1.0);
    let down = ((t1 - t) / tramp).clamp(0.0, 1.0);
    up.min(down)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_outside_window() {
        assert_relative_eq!(ramp_factor(-1.0, 0.0, 10.0, 1.0), 0.0);
        assert_relative_eq!(ramp_factor(11.0, 0.0, 10.0, 1.0), 0.0);
    }

    #[test]
    fn full_amplitude_in_interior() {
        assert_relative_eq!(ramp_factor(5.0, 0.0, 10.0, 1.0), 1.0);
    }

    #[test]
    fn ramps_linearly_at_edges() {
        assert_relative_eq!(ramp_factor(0.5, 0.0, 10.0, 1.0), 0.5);
        assert_relative_eq!(ramp_factor(9.5, 0.0, 10.0, 1.0), 0.5);
    }

    #[test]
    fn zero_tramp_is_a_hard_step() {
        assert_relative_eq!(ramp_factor(0.0, 0.0, 10.0, 0.0), 1.0);
        assert_relative_eq!(ramp_factor(10.0, 0.0, 10.0, 0.0), 1.0);
    }

    #[test]
    fn overlapping_ramps_form_a_triangle() {
        // interval width 2, tramp 2: ramps overlap, peak at the midpoint
        let v = ramp_factor(1.0, 0.0, 2.0, 2.0);
        assert!(v <= 1.0);
        assert_relative_eq!(v, 0.5);
    }
}
