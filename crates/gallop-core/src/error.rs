use thiserror::Error;

/// A provider (dynamics, cost, constraint, operating trajectories) failed
/// during evaluation.
///
/// Provider errors propagate out of the solver's parallel section after all
/// sibling workers have finished their current stage; no partial subproblem
/// is ever solved.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("dynamics evaluation failed at t={time}: {message}")]
    Dynamics { time: f64, message: String },

    #[error("cost evaluation failed at t={time}: {message}")]
    Cost { time: f64, message: String },

    #[error("constraint evaluation failed at t={time}: {message}")]
    Constraint { time: f64, message: String },

    #[error("operating trajectory request failed on [{from}, {to}]: {message}")]
    OperatingTrajectory { from: f64, to: f64, message: String },
}
