//! Constraint providers.
//!
//! All hooks default to "no rows", so an implementation overrides only the
//! constraint kinds it actually has. Inequalities use the `h(t, x, u) ≥ 0`
//! feasibility convention.

use nalgebra::DVector;

use crate::approximation::LinearModel;
use crate::error::EvalError;

// ---------------------------------------------------------------------------
// Constraint
// ---------------------------------------------------------------------------

/// Stacked state-input constraints with state-only variants for event and
/// terminal nodes.
pub trait Constraint: Send {
    /// State-input equality residual `g(t, x, u)` (feasible at zero).
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn equality(
        &mut self,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(DVector::zeros(0))
    }

    /// Linearized state-input equality.
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn equality_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel::zeros(0, x.len(), u.len()))
    }

    /// State-input inequality residual `h(t, x, u)` (feasible when `≥ 0`).
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn inequality(
        &mut self,
        _t: f64,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(DVector::zeros(0))
    }

    /// Linearized state-input inequality.
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn inequality_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel::zeros(0, x.len(), u.len()))
    }

    /// State-only equality residual, enforced at event and terminal nodes.
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn state_equality(&mut self, _t: f64, _x: &DVector<f64>) -> Result<DVector<f64>, EvalError> {
        Ok(DVector::zeros(0))
    }

    /// Linearized state-only equality; the input Jacobian is empty.
    ///
    /// # Errors
    /// Returns [`EvalError::Constraint`] on evaluation failure.
    fn state_equality_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel::zeros(0, x.len(), 0))
    }

    /// Deep-copy the provider for a worker.
    fn clone_boxed(&self) -> Box<dyn Constraint>;
}

impl Clone for Box<dyn Constraint> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
