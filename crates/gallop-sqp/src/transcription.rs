//! Per-node transcription of the optimal control problem into LQ data.
//!
//! Three node kinds exist on the grid. Intermediate nodes integrate the
//! dynamics and sensitivities over their interval and close the shooting gap
//! through the stored defect; event nodes transcribe the jump map with no
//! decision input; the terminal node contributes cost and state-only
//! constraints. Each setup function has a value-only twin used by the line
//! search, which re-evaluates the same quantities without linearization.
//!
//! All functions are pure over the per-worker provider state passed in, so
//! any worker may transcribe any stage.

use nalgebra::DVector;

use gallop_core::approximation::{LinearModel, QuadraticModel, StageConstraints};
use gallop_core::constraint::Constraint;
use gallop_core::cost::{Cost, TerminalCost};
use gallop_core::dynamics::Dynamics;
use gallop_core::error::EvalError;
use gallop_core::integrator::{IntegratorType, propagate, propagate_sensitivity};
use gallop_core::penalty::SoftConstraintPenalty;
use gallop_core::performance::PerformanceIndex;
use gallop_core::trajectory::ReferenceTrajectory;

use crate::projection::{project_equality, substitute_input_linear, substitute_input_quadratic};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// LQ data of one intermediate stage.
#[derive(Clone, Debug)]
pub struct Transcription {
    /// Discretized dynamics with `f = φ − x_{i+1}` (the negated defect), so
    /// the QP equality `A δxᵢ + B δuᵢ − δxᵢ₊₁ + f = 0` closes the shooting
    /// gap in one step.
    pub dynamics: LinearModel,
    /// Integrated stage cost, including any soft inequality penalty.
    pub cost: QuadraticModel,
    /// Constraints enforced in the QP at this stage.
    pub constraints: StageConstraints,
    /// Input-space projection, zero-row when not applied.
    pub projection: LinearModel,
    /// Stage contribution to the performance index.
    pub performance: PerformanceIndex,
}

/// LQ data of one event stage; inputs are absent and no projection applies.
#[derive(Clone, Debug)]
pub struct EventTranscription {
    /// Linearized jump map with `f = g(t, x) − x_{i+1}` and an empty input
    /// Jacobian.
    pub dynamics: LinearModel,
    /// Event cost (zero when no provider is supplied).
    pub cost: QuadraticModel,
    /// State-only constraints at the event time.
    pub constraints: StageConstraints,
    /// Stage contribution to the performance index.
    pub performance: PerformanceIndex,
}

/// LQ data of the terminal node.
#[derive(Clone, Debug)]
pub struct TerminalTranscription {
    /// Terminal cost (zero when no provider is supplied).
    pub cost: QuadraticModel,
    /// State-only constraints at the final time.
    pub constraints: StageConstraints,
    /// Stage contribution to the performance index.
    pub performance: PerformanceIndex,
}

// ---------------------------------------------------------------------------
// Intermediate nodes
// ---------------------------------------------------------------------------

/// Linearize dynamics, cost and constraints of one shooting interval.
///
/// With `project_equalities` set and state-input equalities present, the
/// equalities are eliminated from the QP: the returned `projection` maps the
/// reduced step back to the full input, and dynamics, cost and any remaining
/// inequality rows are rewritten in the reduced input.
///
/// # Errors
/// Propagates provider failures and projection rank deficiencies.
#[allow(clippy::too_many_arguments)]
pub fn setup_intermediate_node(
    dynamics: &mut dyn Dynamics,
    integrator: IntegratorType,
    cost: &mut dyn Cost,
    constraint: Option<&mut dyn Constraint>,
    penalty: Option<&SoftConstraintPenalty>,
    project_equalities: bool,
    reference: &ReferenceTrajectory,
    t: f64,
    dt: f64,
    x: &DVector<f64>,
    x_next: &DVector<f64>,
    u: &DVector<f64>,
) -> Result<Transcription, EvalError> {
    let mut performance = PerformanceIndex::default();

    let mut lin = propagate_sensitivity(dynamics, integrator, t, x, u, dt)?;
    performance.state_eq_ise += (x_next - &lin.f).norm_squared();
    lin.f -= x_next;

    let mut cost_model = cost.quadratic_approximation(t, x, u, reference)?;
    cost_model *= dt;
    performance.total_cost += cost_model.f;

    let mut constraints = StageConstraints::empty(x.len());
    let mut projection = LinearModel::absent(x.len());

    if let Some(con) = constraint {
        let eq = con.equality_linearization(t, x, u)?;
        performance.state_input_eq_ise += dt * eq.f.norm_squared();

        let ineq = con.inequality_linearization(t, x, u)?;
        performance.inequality_ise +=
            dt * ineq.f.iter().map(|h| h.min(0.0).powi(2)).sum::<f64>();

        let mut passthrough = LinearModel::absent(x.len());
        if !ineq.is_empty() {
            if let Some(pen) = penalty {
                performance.inequality_penalty += dt * pen.total(ineq.f.iter());
                let mut pen_model = pen.quadratic_approximation(&ineq);
                pen_model *= dt;
                cost_model += &pen_model;
            } else {
                passthrough = ineq;
            }
        }

        if project_equalities && !eq.is_empty() {
            projection = project_equality(t, &eq)?;
            substitute_input_linear(&mut lin, &projection);
            substitute_input_quadratic(&mut cost_model, &projection);
            if !passthrough.is_empty() {
                substitute_input_linear(&mut passthrough, &projection);
            }
        } else {
            constraints.equality = eq;
        }
        constraints.inequality = passthrough;
    }

    Ok(Transcription {
        dynamics: lin,
        cost: cost_model,
        constraints,
        projection,
        performance,
    })
}

/// Value-only twin of [`setup_intermediate_node`].
///
/// # Errors
/// Propagates provider failures.
#[allow(clippy::too_many_arguments)]
pub fn intermediate_performance(
    dynamics: &mut dyn Dynamics,
    integrator: IntegratorType,
    cost: &mut dyn Cost,
    constraint: Option<&mut dyn Constraint>,
    penalty: Option<&SoftConstraintPenalty>,
    reference: &ReferenceTrajectory,
    t: f64,
    dt: f64,
    x: &DVector<f64>,
    x_next: &DVector<f64>,
    u: &DVector<f64>,
) -> Result<PerformanceIndex, EvalError> {
    let mut performance = PerformanceIndex::default();

    let phi = propagate(dynamics, integrator, t, x, u, dt)?;
    performance.state_eq_ise += (x_next - phi).norm_squared();
    performance.total_cost += dt * cost.value(t, x, u, reference)?;

    if let Some(con) = constraint {
        let g = con.equality(t, x, u)?;
        performance.state_input_eq_ise += dt * g.norm_squared();

        let h = con.inequality(t, x, u)?;
        performance.inequality_ise += dt * h.iter().map(|hi| hi.min(0.0).powi(2)).sum::<f64>();
        if let Some(pen) = penalty {
            performance.inequality_penalty += dt * pen.total(h.iter());
        }
    }
    Ok(performance)
}

// ---------------------------------------------------------------------------
// Event nodes
// ---------------------------------------------------------------------------

/// Linearize the jump map (and optional state-only cost and constraints) at
/// an event.
///
/// # Errors
/// Propagates provider failures.
pub fn setup_event_node(
    dynamics: &mut dyn Dynamics,
    cost: Option<&mut dyn TerminalCost>,
    constraint: Option<&mut dyn Constraint>,
    reference: &ReferenceTrajectory,
    t: f64,
    x: &DVector<f64>,
    x_next: &DVector<f64>,
) -> Result<EventTranscription, EvalError> {
    let mut performance = PerformanceIndex::default();

    let mut jump = dynamics.jump_linearization(t, x)?;
    debug_assert_eq!(jump.dfdu.ncols(), 0, "events carry no decision input");
    performance.state_eq_ise += (x_next - &jump.f).norm_squared();
    jump.f -= x_next;

    let cost_model = match cost {
        Some(c) => {
            let model = c.quadratic_approximation(t, x, reference)?;
            performance.total_cost += model.f;
            model
        }
        None => QuadraticModel::zeros(x.len(), 0),
    };

    let mut constraints = StageConstraints::empty(x.len());
    if let Some(con) = constraint {
        let eq = con.state_equality_linearization(t, x)?;
        performance.state_input_eq_ise += eq.f.norm_squared();
        constraints.equality = eq;
    }

    Ok(EventTranscription {
        dynamics: jump,
        cost: cost_model,
        constraints,
        performance,
    })
}

/// Value-only twin of [`setup_event_node`].
///
/// # Errors
/// Propagates provider failures.
pub fn event_performance(
    dynamics: &mut dyn Dynamics,
    cost: Option<&mut dyn TerminalCost>,
    constraint: Option<&mut dyn Constraint>,
    reference: &ReferenceTrajectory,
    t: f64,
    x: &DVector<f64>,
    x_next: &DVector<f64>,
) -> Result<PerformanceIndex, EvalError> {
    let mut performance = PerformanceIndex::default();

    let mapped = dynamics.jump(t, x)?;
    performance.state_eq_ise += (x_next - mapped).norm_squared();
    if let Some(c) = cost {
        performance.total_cost += c.value(t, x, reference)?;
    }
    if let Some(con) = constraint {
        performance.state_input_eq_ise += con.state_equality(t, x)?.norm_squared();
    }
    Ok(performance)
}

// ---------------------------------------------------------------------------
// Terminal node
// ---------------------------------------------------------------------------

/// Quadratize the terminal cost and evaluate state-only constraints.
///
/// # Errors
/// Propagates provider failures.
pub fn setup_terminal_node(
    cost: Option<&mut dyn TerminalCost>,
    constraint: Option<&mut dyn Constraint>,
    reference: &ReferenceTrajectory,
    t: f64,
    x: &DVector<f64>,
) -> Result<TerminalTranscription, EvalError> {
    let mut performance = PerformanceIndex::default();

    let cost_model = match cost {
        Some(c) => {
            let model = c.quadratic_approximation(t, x, reference)?;
            performance.total_cost += model.f;
            model
        }
        None => QuadraticModel::zeros(x.len(), 0),
    };

    let mut constraints = StageConstraints::empty(x.len());
    if let Some(con) = constraint {
        let eq = con.state_equality_linearization(t, x)?;
        performance.state_input_eq_ise += eq.f.norm_squared();
        constraints.equality = eq;
    }

    Ok(TerminalTranscription {
        cost: cost_model,
        constraints,
        performance,
    })
}

/// Value-only twin of [`setup_terminal_node`].
///
/// # Errors
/// Propagates provider failures.
pub fn terminal_performance(
    cost: Option<&mut dyn TerminalCost>,
    constraint: Option<&mut dyn Constraint>,
    reference: &ReferenceTrajectory,
    t: f64,
    x: &DVector<f64>,
) -> Result<PerformanceIndex, EvalError> {
    let mut performance = PerformanceIndex::default();
    if let Some(c) = cost {
        performance.total_cost += c.value(t, x, reference)?;
    }
    if let Some(con) = constraint {
        performance.state_input_eq_ise += con.state_equality(t, x)?.norm_squared();
    }
    Ok(performance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
