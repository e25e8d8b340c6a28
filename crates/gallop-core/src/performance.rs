//! Per-iteration solution quality metrics.

use std::fmt;
use std::ops::{Add, AddAssign};

// ---------------------------------------------------------------------------
// PerformanceIndex
// ---------------------------------------------------------------------------

/// Accumulated cost and constraint-satisfaction metrics of one trajectory.
///
/// Additive across stages and workers; the solver sums per-worker
/// accumulators in worker-id order so totals are reproducible up to
/// floating-point associativity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceIndex {
    /// Integrated stage cost plus terminal cost.
    pub total_cost: f64,
    /// Squared L2 norm of the shooting defects (plus the initial-state gap).
    pub state_eq_ise: f64,
    /// Integrated squared state-input equality constraint violation.
    pub state_input_eq_ise: f64,
    /// Integrated squared inequality constraint violation.
    pub inequality_ise: f64,
    /// Integrated relaxed-barrier penalty on inequality constraints.
    pub inequality_penalty: f64,
    /// Line-search merit: `total_cost + inequality_penalty`.
    pub merit: f64,
}

impl PerformanceIndex {
    /// Recompute the merit from the accumulated cost and penalty.
    pub fn update_merit(&mut self) {
        self.merit = self.total_cost + self.inequality_penalty;
    }

    /// Total constraint violation used by the filter line search:
    /// `sqrt(state_eq_ise + state_input_eq_ise + inequality_ise)`.
    #[must_use]
    pub fn constraint_violation(&self) -> f64 {
        (self.state_eq_ise + self.state_input_eq_ise + self.inequality_ise).sqrt()
    }

    /// True when all accumulated quantities are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.total_cost.is_finite()
            && self.state_eq_ise.is_finite()
            && self.state_input_eq_ise.is_finite()
            && self.inequality_ise.is_finite()
            && self.inequality_penalty.is_finite()
            && self.merit.is_finite()
    }
}

impl AddAssign for PerformanceIndex {
    fn add_assign(&mut self, rhs: Self) {
        self.total_cost += rhs.total_cost;
        self.state_eq_ise += rhs.state_eq_ise;
        self.state_input_eq_ise += rhs.state_input_eq_ise;
        self.inequality_ise += rhs.inequality_ise;
        self.inequality_penalty += rhs.inequality_penalty;
        self.merit += rhs.merit;
    }
}

impl Add for PerformanceIndex {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl fmt::Display for PerformanceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "merit: {:.6e}  cost: {:.6e}  dynamicsISE: {:.3e}  stateInputISE: {:.3e}  \
             inequalityISE: {:.3e}  penalty: {:.3e}",
            self.merit,
            self.total_cost,
            self.state_eq_ise,
            self.state_input_eq_ise,
            self.inequality_ise,
            self.inequality_penalty,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn accumulation_is_fieldwise() {
        let a = PerformanceIndex {
            total_cost: 1.0,
            state_eq_ise: 0.5,
            state_input_eq_ise: 0.25,
            inequality_ise: 0.1,
            inequality_penalty: 0.05,
            merit: 0.0,
        };
        let b = PerformanceIndex {
            total_cost: 2.0,
            state_eq_ise: 1.5,
            ..PerformanceIndex::default()
        };

        let mut sum = a + b;
        sum.update_merit();

        assert_relative_eq!(sum.total_cost, 3.0);
        assert_relative_eq!(sum.state_eq_ise, 2.0);
        assert_relative_eq!(sum.merit, 3.0 + 0.05);
    }

    #[test]
    fn constraint_violation_is_root_of_summed_ise() {
        let p = PerformanceIndex {
            state_eq_ise: 9.0,
            state_input_eq_ise: 16.0,
            ..PerformanceIndex::default()
        };
        assert_relative_eq!(p.constraint_violation(), 5.0);
    }

    #[test]
    fn non_finite_is_detected() {
        let mut p = PerformanceIndex::default();
        assert!(p.is_finite());
        p.total_cost = f64::INFINITY;
        assert!(!p.is_finite());
    }
}
