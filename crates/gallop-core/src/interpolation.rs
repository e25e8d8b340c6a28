//! Piecewise-linear interpolation over time-indexed trajectories.
//!
//! Time bases may contain duplicated entries at event times (a pre-event and
//! a post-event node at the same numeric time). Lookups resolve such pairs to
//! the later entry, and queries outside the base clamp to the end values.

use nalgebra::{DMatrix, DVector};

/// Locate the interpolation interval and blending factor for `t`.
///
/// Returns `(i, alpha)` such that the interpolated value is
/// `(1 - alpha) * v[i] + alpha * v[i + 1]`, with `alpha ∈ [0, 1]`.
/// Zero-length intervals (duplicated event times) yield `alpha = 0` on the
/// later entry.
#[must_use]
pub fn interval_alpha(t: f64, times: &[f64]) -> (usize, f64) {
    assert!(!times.is_empty(), "cannot interpolate over an empty time base");
    if times.len() == 1 || t <= times[0] {
        return (0, 0.0);
    }
    let n = times.len();
    if t >= times[n - 1] {
        return (n - 1, 0.0);
    }

    // First index with times[idx] > t; the interval is [idx - 1, idx].
    let idx = times.partition_point(|&ti| ti <= t);
    let lo = idx - 1;
    let span = times[idx] - times[lo];
    if span <= 0.0 {
        return (idx, 0.0);
    }
    (lo, (t - times[lo]) / span)
}

/// Linearly interpolate a vector trajectory at time `t`.
#[must_use]
pub fn interpolate(t: f64, times: &[f64], values: &[DVector<f64>]) -> DVector<f64> {
    debug_assert_eq!(times.len(), values.len());
    let (i, alpha) = interval_alpha(t, times);
    if alpha == 0.0 {
        return values[i].clone();
    }
    &values[i] * (1.0 - alpha) + &values[i + 1] * alpha
}

/// Linearly interpolate a matrix trajectory at time `t`.
#[must_use]
pub fn interpolate_matrix(t: f64, times: &[f64], values: &[DMatrix<f64>]) -> DMatrix<f64> {
    debug_assert_eq!(times.len(), values.len());
    let (i, alpha) = interval_alpha(t, times);
    if alpha == 0.0 {
        return values[i].clone();
    }
    &values[i] * (1.0 - alpha) + &values[i + 1] * alpha
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    fn base() -> (Vec<f64>, Vec<DVector<f64>>) {
        (
            vec![0.0, 1.0, 2.0],
            vec![dvector![0.0], dvector![10.0], dvector![20.0]],
        )
    }

    #[test]
    fn interpolates_midpoint() {
        let (t, v) = base();
        assert_relative_eq!(interpolate(0.5, &t, &v)[0], 5.0);
        assert_relative_eq!(interpolate(1.75, &t, &v)[0], 17.5);
    }

    #[test]
    fn exact_node_times_return_node_values() {
        let (t, v) = base();
        assert_relative_eq!(interpolate(0.0, &t, &v)[0], 0.0);
        assert_relative_eq!(interpolate(1.0, &t, &v)[0], 10.0);
        assert_relative_eq!(interpolate(2.0, &t, &v)[0], 20.0);
    }

    #[test]
    fn clamps_outside_the_base() {
        let (t, v) = base();
        assert_relative_eq!(interpolate(-1.0, &t, &v)[0], 0.0);
        assert_relative_eq!(interpolate(5.0, &t, &v)[0], 20.0);
    }

    #[test]
    fn duplicated_times_resolve_to_later_entry() {
        let times = vec![0.0, 0.5, 0.5, 1.0];
        let values = vec![dvector![0.0], dvector![1.0], dvector![5.0], dvector![6.0]];
        // Just past the pair interpolates from the post-event value.
        assert_relative_eq!(interpolate(0.75, &times, &values)[0], 5.5);
        // Exactly at the pair returns the later entry.
        assert_relative_eq!(interpolate(0.5, &times, &values)[0], 5.0);
        // Just before the pair interpolates toward the pre-event value.
        assert_relative_eq!(interpolate(0.25, &times, &values)[0], 0.5);
    }

    #[test]
    fn single_entry_base() {
        let times = vec![1.0];
        let values = vec![dvector![3.0]];
        assert_relative_eq!(interpolate(0.0, &times, &values)[0], 3.0);
        assert_relative_eq!(interpolate(2.0, &times, &values)[0], 3.0);
    }
}
