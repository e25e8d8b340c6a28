//! Shared problem definitions for the solver integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gallop_core::prelude::*;
use gallop_sqp::{Settings, SqpSolver};
use nalgebra::{DMatrix, DVector, dmatrix, dvector};

/// Double integrator with stage cost `½(x₁² + x₂² + 0.1u²)`.
pub fn double_integrator_solver(settings: Settings, terminal_weight: Option<f64>) -> SqpSolver {
    let dynamics = LtiDynamics::double_integrator();
    let cost = QuadraticCost::new(DMatrix::identity(2, 2), DMatrix::identity(1, 1) * 0.1);
    let operating = StaticOperatingPoint::zeros(2, 1);

    let solver = SqpSolver::new(settings, &dynamics, &cost, &operating);
    match terminal_weight {
        Some(w) => {
            let terminal = QuadraticTerminalCost::new(DMatrix::identity(2, 2) * w);
            solver.with_terminal_cost(&terminal)
        }
        None => solver,
    }
}

/// Two-input plant `ẋ = [x₂, u₁ + u₂·0 …]`-style: each input drives one
/// state, so the equality `u₁ + u₂ = 0` leaves one useful direction.
pub fn two_input_solver(settings: Settings) -> SqpSolver {
    let dynamics = LtiDynamics::new(dmatrix![0.0, 1.0; 0.0, 0.0], DMatrix::identity(2, 2));
    let cost = QuadraticCost::new(DMatrix::identity(2, 2), DMatrix::identity(2, 2) * 0.1);
    let operating = StaticOperatingPoint::zeros(2, 2);
    let constraint = InputSumConstraint;
    SqpSolver::new(settings, &dynamics, &cost, &operating).with_constraint(&constraint)
}

/// State-input equality `u₁ + u₂ = 0`.
#[derive(Clone)]
pub struct InputSumConstraint;

impl Constraint for InputSumConstraint {
    fn equality(
        &mut self,
        _t: f64,
        _x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(dvector![u[0] + u[1]])
    }

    fn equality_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel {
            f: dvector![u[0] + u[1]],
            dfdx: DMatrix::zeros(1, x.len()),
            dfdu: dmatrix![1.0, 1.0],
        })
    }

    fn clone_boxed(&self) -> Box<dyn Constraint> {
        Box::new(self.clone())
    }
}

/// Inequality `u₁ ≥ -bound` (feasible when `h = u₁ + bound ≥ 0`).
#[derive(Clone)]
pub struct InputLowerBound {
    pub bound: f64,
}

impl Constraint for InputLowerBound {
    fn inequality(
        &mut self,
        _t: f64,
        _x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(dvector![u[0] + self.bound])
    }

    fn inequality_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        let mut dfdu = DMatrix::zeros(1, u.len());
        dfdu[(0, 0)] = 1.0;
        Ok(LinearModel {
            f: dvector![u[0] + self.bound],
            dfdx: DMatrix::zeros(1, x.len()),
            dfdu,
        })
    }

    fn clone_boxed(&self) -> Box<dyn Constraint> {
        Box::new(self.clone())
    }
}

/// Scalar system `ẋ = −x³ + u`; strongly nonlinear away from the origin.
#[derive(Clone)]
pub struct CubicDecay;

impl Dynamics for CubicDecay {
    fn flow(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(dvector![-x[0].powi(3) + u[0]])
    }

    fn flow_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel {
            f: dvector![-x[0].powi(3) + u[0]],
            dfdx: DMatrix::from_element(1, 1, -3.0 * x[0] * x[0]),
            dfdu: DMatrix::from_element(1, 1, 1.0),
        })
    }

    fn clone_boxed(&self) -> Box<dyn Dynamics> {
        Box::new(self.clone())
    }
}

/// Cost whose quadratic model lies about the input gradient: the reported
/// optimum sits at `u = 10` while the true cost is minimized at `u = 0`.
/// Every Newton step computed from the model increases the true merit, so
/// the line search must reject it at every step length.
///
/// `value_calls` counts true-cost evaluations across all worker clones.
#[derive(Clone)]
pub struct LyingCost {
    pub value_calls: Arc<AtomicUsize>,
}

impl LyingCost {
    pub fn new() -> Self {
        Self {
            value_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Cost for LyingCost {
    fn value(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _reference: &ReferenceTrajectory,
    ) -> Result<f64, EvalError> {
        self.value_calls.fetch_add(1, Ordering::Relaxed);
        Ok(0.5 * (x.norm_squared() + u.norm_squared()))
    }

    fn quadratic_approximation(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _reference: &ReferenceTrajectory,
    ) -> Result<QuadraticModel, EvalError> {
        Ok(QuadraticModel {
            f: 0.5 * (x.norm_squared() + u.norm_squared()),
            dfdx: x.clone(),
            dfdu: u.add_scalar(-10.0),
            dfdxx: DMatrix::identity(x.len(), x.len()),
            dfduu: DMatrix::identity(u.len(), u.len()),
            dfdux: DMatrix::zeros(u.len(), x.len()),
        })
    }

    fn clone_boxed(&self) -> Box<dyn Cost> {
        Box::new(self.clone())
    }
}

/// Pairwise filter consistency of an iteration log: every accepted step
/// improved the merit or the constraint violation.
pub fn assert_filter_monotone(log: &[PerformanceIndex]) {
    for pair in log.windows(2) {
        let merit_improved = pair[1].merit < pair[0].merit + 1e-12;
        let violation_improved =
            pair[1].constraint_violation() < pair[0].constraint_violation() + 1e-12;
        assert!(
            merit_improved || violation_improved,
            "iterate worsened both merit ({} -> {}) and violation ({} -> {})",
            pair[0].merit,
            pair[1].merit,
            pair[0].constraint_violation(),
            pair[1].constraint_violation(),
        );
    }
}
