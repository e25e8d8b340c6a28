// gallop-core: data model, provider traits and integrators for the gallop
// MPC solver.

pub mod approximation;
pub mod constraint;
pub mod controller;
pub mod cost;
pub mod dynamics;
pub mod error;
pub mod integrator;
pub mod interpolation;
pub mod penalty;
pub mod performance;
pub mod trajectory;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        // Models
        approximation::{LinearModel, QuadraticModel, StageConstraints},
        // Providers
        constraint::Constraint,
        controller::{Controller, FeedforwardController, LinearController},
        cost::{Cost, QuadraticCost, QuadraticTerminalCost, TerminalCost},
        dynamics::{Dynamics, LtiDynamics},
        // Errors
        error::EvalError,
        // Integration
        integrator::{IntegratorType, propagate, propagate_sensitivity},
        // Penalties
        penalty::{RelaxedBarrierPenalty, SoftConstraintPenalty},
        // Metrics
        performance::PerformanceIndex,
        // Trajectories
        trajectory::{
            ModeSchedule, OperatingTrajectories, PrimalSolution, ReferenceTrajectory,
            StaticOperatingPoint, TrajectorySegment,
        },
    };
}
