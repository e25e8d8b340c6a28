//! Trajectories exchanged with the solver: mode schedules, tracking
//! references, operating-point seeds and the primal solution.

use nalgebra::DVector;

use crate::controller::Controller;
use crate::error::EvalError;
use crate::interpolation::interpolate;

// ---------------------------------------------------------------------------
// ModeSchedule
// ---------------------------------------------------------------------------

/// Sequence of system modes separated by event times.
///
/// `modes.len() == event_times.len() + 1`; mode `modes[i]` is active on
/// `[event_times[i-1], event_times[i])`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModeSchedule {
    /// Strictly increasing switching times.
    pub event_times: Vec<f64>,
    /// Active mode per inter-event interval.
    pub modes: Vec<usize>,
}

impl Default for ModeSchedule {
    fn default() -> Self {
        Self {
            event_times: Vec::new(),
            modes: vec![0],
        }
    }
}

impl ModeSchedule {
    /// Schedule with the given switching times and modes.
    ///
    /// # Panics
    /// Panics unless `modes.len() == event_times.len() + 1`.
    #[must_use]
    pub fn new(event_times: Vec<f64>, modes: Vec<usize>) -> Self {
        assert_eq!(
            modes.len(),
            event_times.len() + 1,
            "a schedule with k events has k + 1 modes"
        );
        Self { event_times, modes }
    }

    /// Mode active at time `t`.
    #[must_use]
    pub fn mode_at(&self, t: f64) -> usize {
        let idx = self.event_times.partition_point(|&e| e <= t);
        self.modes[idx]
    }
}

// ---------------------------------------------------------------------------
// ReferenceTrajectory
// ---------------------------------------------------------------------------

/// Desired state/input targets the cost providers track.
///
/// An empty reference is valid; cost providers then regulate to the origin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceTrajectory {
    /// Sample times, non-decreasing.
    pub times: Vec<f64>,
    /// Desired state at each sample.
    pub states: Vec<DVector<f64>>,
    /// Desired input at each sample.
    pub inputs: Vec<DVector<f64>>,
}

impl ReferenceTrajectory {
    /// A reference holding a single constant target.
    #[must_use]
    pub fn constant(state: DVector<f64>, input: DVector<f64>) -> Self {
        Self {
            times: vec![0.0],
            states: vec![state],
            inputs: vec![input],
        }
    }

    /// True when no targets are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Interpolated desired state at `t`, or `None` when empty.
    #[must_use]
    pub fn state_at(&self, t: f64) -> Option<DVector<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(interpolate(t, &self.times, &self.states))
    }

    /// Interpolated desired input at `t`, or `None` when empty.
    #[must_use]
    pub fn input_at(&self, t: f64) -> Option<DVector<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(interpolate(t, &self.times, &self.inputs))
    }
}

// ---------------------------------------------------------------------------
// Operating trajectories
// ---------------------------------------------------------------------------

/// A `(times, states, inputs)` seed segment used to initialize inputs at
/// times not covered by a previous solution.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectorySegment {
    pub times: Vec<f64>,
    pub states: Vec<DVector<f64>>,
    pub inputs: Vec<DVector<f64>>,
}

/// Provider of operating-point seed segments.
pub trait OperatingTrajectories: Send {
    /// Produce a seed on `[from, to]` starting near state `x`.
    ///
    /// The returned segment must contain at least one sample.
    ///
    /// # Errors
    /// Returns [`EvalError::OperatingTrajectory`] when no seed can be
    /// produced for the requested window.
    fn segment(
        &mut self,
        x: &DVector<f64>,
        from: f64,
        to: f64,
    ) -> Result<TrajectorySegment, EvalError>;

    /// Deep-copy the provider for a worker.
    fn clone_boxed(&self) -> Box<dyn OperatingTrajectories>;
}

impl Clone for Box<dyn OperatingTrajectories> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// The simplest operating provider: a fixed state/input pair.
#[derive(Clone, Debug)]
pub struct StaticOperatingPoint {
    /// Seed state.
    pub state: DVector<f64>,
    /// Seed input.
    pub input: DVector<f64>,
}

impl StaticOperatingPoint {
    /// Operating point with the given state and input.
    #[must_use]
    pub fn new(state: DVector<f64>, input: DVector<f64>) -> Self {
        Self { state, input }
    }

    /// Zero operating point of the given dimensions.
    #[must_use]
    pub fn zeros(nx: usize, nu: usize) -> Self {
        Self::new(DVector::zeros(nx), DVector::zeros(nu))
    }
}

impl OperatingTrajectories for StaticOperatingPoint {
    fn segment(
        &mut self,
        _x: &DVector<f64>,
        from: f64,
        to: f64,
    ) -> Result<TrajectorySegment, EvalError> {
        Ok(TrajectorySegment {
            times: vec![from, to],
            states: vec![self.state.clone(), self.state.clone()],
            inputs: vec![self.input.clone(), self.input.clone()],
        })
    }

    fn clone_boxed(&self) -> Box<dyn OperatingTrajectories> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// PrimalSolution
// ---------------------------------------------------------------------------

/// The solver's optimized trajectory and policy.
///
/// `time_trajectory`, `state_trajectory` and `input_trajectory` have equal
/// length; event times appear twice (pre- and post-event node), and the input
/// stored at a pre-event node repeats the preceding interval's input so the
/// trajectory is well-defined at identical-time pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimalSolution {
    pub time_trajectory: Vec<f64>,
    pub state_trajectory: Vec<DVector<f64>>,
    pub input_trajectory: Vec<DVector<f64>>,
    pub controller: Controller,
    pub mode_schedule: ModeSchedule,
}

impl PrimalSolution {
    /// True when no solve has produced a trajectory yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_trajectory.is_empty()
    }

    /// Interpolated state at time `t`.
    ///
    /// # Panics
    /// Panics on an empty solution.
    #[must_use]
    pub fn state_at(&self, t: f64) -> DVector<f64> {
        interpolate(t, &self.time_trajectory, &self.state_trajectory)
    }

    /// Interpolated input at time `t`.
    ///
    /// # Panics
    /// Panics on an empty solution.
    #[must_use]
    pub fn input_at(&self, t: f64) -> DVector<f64> {
        interpolate(t, &self.time_trajectory, &self.input_trajectory)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    #[test]
    fn mode_schedule_lookup() {
        let s = ModeSchedule::new(vec![1.0, 2.0], vec![0, 3, 7]);
        assert_eq!(s.mode_at(0.5), 0);
        assert_eq!(s.mode_at(1.0), 3);
        assert_eq!(s.mode_at(1.5), 3);
        assert_eq!(s.mode_at(2.5), 7);
    }

    #[test]
    fn default_mode_schedule_has_single_mode() {
        let s = ModeSchedule::default();
        assert_eq!(s.mode_at(-10.0), 0);
        assert_eq!(s.mode_at(10.0), 0);
    }

    #[test]
    fn reference_trajectory_lookup() {
        let r = ReferenceTrajectory {
            times: vec![0.0, 1.0],
            states: vec![dvector![0.0], dvector![2.0]],
            inputs: vec![dvector![1.0], dvector![1.0]],
        };
        assert_relative_eq!(r.state_at(0.5).unwrap()[0], 1.0);
        assert_relative_eq!(r.input_at(0.5).unwrap()[0], 1.0);
        assert!(ReferenceTrajectory::default().state_at(0.0).is_none());
    }

    #[test]
    fn static_operating_point_returns_constant_segment() {
        let mut op = StaticOperatingPoint::zeros(2, 1);
        let seg = op.segment(&dvector![5.0, 5.0], 0.0, 0.5).unwrap();
        assert_eq!(seg.times, vec![0.0, 0.5]);
        assert_eq!(seg.inputs.len(), 2);
        assert_relative_eq!(seg.inputs[0][0], 0.0);
    }

    #[test]
    fn primal_solution_interpolates() {
        let sol = PrimalSolution {
            time_trajectory: vec![0.0, 1.0],
            state_trajectory: vec![dvector![0.0], dvector![4.0]],
            input_trajectory: vec![dvector![1.0], dvector![3.0]],
            controller: Controller::default(),
            mode_schedule: ModeSchedule::default(),
        };
        assert_relative_eq!(sol.state_at(0.25)[0], 1.0);
        assert_relative_eq!(sol.input_at(0.5)[0], 2.0);
    }
}
