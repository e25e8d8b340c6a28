//! Time-indexed control policies produced by the solver.

use nalgebra::{DMatrix, DVector};

use crate::interpolation::{interpolate, interpolate_matrix};

// ---------------------------------------------------------------------------
// FeedforwardController
// ---------------------------------------------------------------------------

/// Open-loop policy interpolating the optimal input trajectory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedforwardController {
    /// Time base of the schedule.
    pub times: Vec<f64>,
    /// Input at each node.
    pub inputs: Vec<DVector<f64>>,
}

impl FeedforwardController {
    /// Create a controller over the given schedule.
    ///
    /// # Panics
    /// Panics when `times` and `inputs` lengths differ.
    #[must_use]
    pub fn new(times: Vec<f64>, inputs: Vec<DVector<f64>>) -> Self {
        assert_eq!(times.len(), inputs.len(), "schedule lengths must match");
        Self { times, inputs }
    }

    /// Interpolated input at time `t`; the state is ignored.
    #[must_use]
    pub fn compute_input(&self, t: f64) -> DVector<f64> {
        interpolate(t, &self.times, &self.inputs)
    }
}

// ---------------------------------------------------------------------------
// LinearController
// ---------------------------------------------------------------------------

/// Time-varying affine policy `u(t, x) = uff(t) + K(t)·x`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearController {
    /// Time base of the schedule.
    pub times: Vec<f64>,
    /// Feedforward term at each node.
    pub uff: Vec<DVector<f64>>,
    /// Feedback gain at each node.
    pub gains: Vec<DMatrix<f64>>,
}

impl LinearController {
    /// Create a controller over the given schedule.
    ///
    /// # Panics
    /// Panics when the schedule lengths differ.
    #[must_use]
    pub fn new(times: Vec<f64>, uff: Vec<DVector<f64>>, gains: Vec<DMatrix<f64>>) -> Self {
        assert_eq!(times.len(), uff.len(), "schedule lengths must match");
        assert_eq!(times.len(), gains.len(), "schedule lengths must match");
        Self { times, uff, gains }
    }

    /// Policy evaluation `uff(t) + K(t)·x`.
    #[must_use]
    pub fn compute_input(&self, t: f64, x: &DVector<f64>) -> DVector<f64> {
        let uff = interpolate(t, &self.times, &self.uff);
        let k = interpolate_matrix(t, &self.times, &self.gains);
        uff + k * x
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// A solver-produced control policy.
#[derive(Clone, Debug, PartialEq)]
pub enum Controller {
    /// Open-loop input schedule.
    Feedforward(FeedforwardController),
    /// Affine state-feedback schedule.
    Linear(LinearController),
}

impl Default for Controller {
    fn default() -> Self {
        Self::Feedforward(FeedforwardController::default())
    }
}

impl Controller {
    /// Evaluate the policy at `(t, x)`.
    #[must_use]
    pub fn compute_input(&self, t: f64, x: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Feedforward(c) => c.compute_input(t),
            Self::Linear(c) => c.compute_input(t, x),
        }
    }

    /// True when the controller has no schedule entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Feedforward(c) => c.times.is_empty(),
            Self::Linear(c) => c.times.is_empty(),
        }
    }

    /// Last time covered by the schedule, if any.
    #[must_use]
    pub fn horizon_end(&self) -> Option<f64> {
        match self {
            Self::Feedforward(c) => c.times.last().copied(),
            Self::Linear(c) => c.times.last().copied(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn feedforward_interpolates_inputs() {
        let c = FeedforwardController::new(
            vec![0.0, 1.0],
            vec![dvector![0.0], dvector![2.0]],
        );
        assert_relative_eq!(c.compute_input(0.5)[0], 1.0);
    }

    #[test]
    fn linear_controller_applies_gain() {
        let c = LinearController::new(
            vec![0.0, 1.0],
            vec![dvector![1.0], dvector![1.0]],
            vec![dmatrix![2.0, 0.0], dmatrix![2.0, 0.0]],
        );
        let u = c.compute_input(0.5, &dvector![3.0, -1.0]);
        assert_relative_eq!(u[0], 7.0);
    }

    #[test]
    fn linear_controller_recovers_nominal_input_at_nodes() {
        // uff = u - K x  =>  uff + K x == u at the nominal state.
        let x0 = dvector![1.0, 2.0];
        let u0 = dvector![0.5];
        let k = dmatrix![0.3, -0.7];
        let uff = &u0 - &k * &x0;
        let c = LinearController::new(vec![0.0, 1.0], vec![uff.clone(), uff], vec![k.clone(), k]);
        let u = c.compute_input(0.0, &x0);
        assert_relative_eq!(u[0], u0[0], epsilon = 1e-14);
    }

    #[test]
    fn default_controller_is_empty_feedforward() {
        let c = Controller::default();
        assert!(c.is_empty());
        assert!(c.horizon_end().is_none());
    }
}
