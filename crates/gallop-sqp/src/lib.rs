//! Multiple-shooting SQP solver for nonlinear model predictive control.
//!
//! The solver computes, over a receding horizon, a locally optimal state and
//! input trajectory together with an optional time-varying linear feedback
//! policy. Each outer iteration:
//!
//! 1. discretizes the horizon (splicing pre-event nodes at mode switches),
//! 2. linearizes dynamics, cost and constraints at every node in parallel,
//!    optionally projecting state-input equalities out of the input,
//! 3. solves the stage-structured QP (`gallop-qp`),
//! 4. selects a step length with a Wächter–Biegler filter line search.
//!
//! ```no_run
//! use gallop_core::prelude::*;
//! use gallop_sqp::{Settings, SqpSolver};
//! use nalgebra::{DMatrix, dvector};
//!
//! let dynamics = LtiDynamics::double_integrator();
//! let cost = QuadraticCost::new(DMatrix::identity(2, 2), DMatrix::identity(1, 1) * 0.1);
//! let operating = StaticOperatingPoint::zeros(2, 1);
//!
//! let mut solver = SqpSolver::new(Settings::default(), &dynamics, &cost, &operating);
//! solver.run(0.0, &dvector![1.0, 0.0], 1.0).expect("solve");
//! let solution = solver.primal_solution();
//! ```

pub mod discretization;
pub mod error;
pub mod pool;
pub mod projection;
pub mod settings;
pub mod solver;
pub mod stats;
pub mod transcription;

pub use discretization::{AnnotatedTime, EventKind, time_discretization};
pub use error::SolverError;
pub use settings::{Settings, SettingsError};
pub use solver::SqpSolver;
pub use stats::{BenchmarkTimer, SolverBenchmarks};
