//! Stage and terminal cost providers.

use nalgebra::{DMatrix, DVector};

use crate::approximation::QuadraticModel;
use crate::error::EvalError;
use crate::trajectory::ReferenceTrajectory;

// ---------------------------------------------------------------------------
// Cost traits
// ---------------------------------------------------------------------------

/// Intermediate (running) cost `L(t, x, u)`.
///
/// The reference trajectory passed into every call outlives the call only;
/// providers must not retain it.
pub trait Cost: Send {
    /// Cost value at `(t, x, u)`.
    ///
    /// # Errors
    /// Returns [`EvalError::Cost`] when the cost cannot be evaluated.
    fn value(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<f64, EvalError>;

    /// Second-order expansion around `(t, x, u)`.
    ///
    /// # Errors
    /// Returns [`EvalError::Cost`] when the expansion cannot be evaluated.
    fn quadratic_approximation(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<QuadraticModel, EvalError>;

    /// Deep-copy the provider for a worker.
    fn clone_boxed(&self) -> Box<dyn Cost>;
}

impl Clone for Box<dyn Cost> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// State-only cost `Φ(t, x)` evaluated at the terminal node (and, when
/// supplied to the transcriber, at event nodes).
pub trait TerminalCost: Send {
    /// Cost value at `(t, x)`.
    ///
    /// # Errors
    /// Returns [`EvalError::Cost`] when the cost cannot be evaluated.
    fn value(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<f64, EvalError>;

    /// Second-order expansion around `(t, x)`; the input blocks are empty.
    ///
    /// # Errors
    /// Returns [`EvalError::Cost`] when the expansion cannot be evaluated.
    fn quadratic_approximation(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<QuadraticModel, EvalError>;

    /// Deep-copy the provider for a worker.
    fn clone_boxed(&self) -> Box<dyn TerminalCost>;
}

impl Clone for Box<dyn TerminalCost> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

// ---------------------------------------------------------------------------
// QuadraticCost
// ---------------------------------------------------------------------------

/// Tracking cost `½(x − x_d)ᵀQ(x − x_d) + ½(u − u_d)ᵀR(u − u_d)`.
///
/// The targets `(x_d, u_d)` come from the reference trajectory; with an
/// empty reference the cost regulates to the origin.
#[derive(Clone, Debug)]
pub struct QuadraticCost {
    /// State weight, symmetric positive semidefinite.
    pub q: DMatrix<f64>,
    /// Input weight, symmetric positive definite.
    pub r: DMatrix<f64>,
}

impl QuadraticCost {
    /// Cost with the given weights.
    ///
    /// # Panics
    /// Panics unless both weights are square.
    #[must_use]
    pub fn new(q: DMatrix<f64>, r: DMatrix<f64>) -> Self {
        assert_eq!(q.nrows(), q.ncols(), "state weight must be square");
        assert_eq!(r.nrows(), r.ncols(), "input weight must be square");
        Self { q, r }
    }

    fn deviations(
        &self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> (DVector<f64>, DVector<f64>) {
        let dx = reference.state_at(t).map_or_else(|| x.clone(), |xd| x - xd);
        let du = reference.input_at(t).map_or_else(|| u.clone(), |ud| u - ud);
        (dx, du)
    }
}

impl Cost for QuadraticCost {
    fn value(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<f64, EvalError> {
        let (dx, du) = self.deviations(t, x, u, reference);
        Ok(0.5 * dx.dot(&(&self.q * &dx)) + 0.5 * du.dot(&(&self.r * &du)))
    }

    fn quadratic_approximation(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<QuadraticModel, EvalError> {
        let (dx, du) = self.deviations(t, x, u, reference);
        Ok(QuadraticModel {
            f: 0.5 * dx.dot(&(&self.q * &dx)) + 0.5 * du.dot(&(&self.r * &du)),
            dfdx: &self.q * &dx,
            dfdu: &self.r * &du,
            dfdxx: self.q.clone(),
            dfduu: self.r.clone(),
            dfdux: DMatrix::zeros(self.r.nrows(), self.q.nrows()),
        })
    }

    fn clone_boxed(&self) -> Box<dyn Cost> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// QuadraticTerminalCost
// ---------------------------------------------------------------------------

/// Terminal tracking cost `½(x − x_d)ᵀQ_f(x − x_d)`.
#[derive(Clone, Debug)]
pub struct QuadraticTerminalCost {
    /// Terminal state weight, symmetric positive semidefinite.
    pub q: DMatrix<f64>,
}

impl QuadraticTerminalCost {
    /// Terminal cost with the given weight.
    ///
    /// # Panics
    /// Panics unless the weight is square.
    #[must_use]
    pub fn new(q: DMatrix<f64>) -> Self {
        assert_eq!(q.nrows(), q.ncols(), "terminal weight must be square");
        Self { q }
    }
}

impl TerminalCost for QuadraticTerminalCost {
    fn value(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<f64, EvalError> {
        let dx = reference.state_at(t).map_or_else(|| x.clone(), |xd| x - xd);
        Ok(0.5 * dx.dot(&(&self.q * &dx)))
    }

    fn quadratic_approximation(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        reference: &ReferenceTrajectory,
    ) -> Result<QuadraticModel, EvalError> {
        let dx = reference.state_at(t).map_or_else(|| x.clone(), |xd| x - xd);
        let nx = x.len();
        Ok(QuadraticModel {
            f: 0.5 * dx.dot(&(&self.q * &dx)),
            dfdx: &self.q * &dx,
            dfdu: DVector::zeros(0),
            dfdxx: self.q.clone(),
            dfduu: DMatrix::zeros(0, 0),
            dfdux: DMatrix::zeros(0, nx),
        })
    }

    fn clone_boxed(&self) -> Box<dyn TerminalCost> {
        Box::new(self.clone())
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

    fn unit_cost() -> QuadraticCost {
        QuadraticCost::new(DMatrix::identity(2, 2), DMatrix::identity(1, 1) * 0.1)
    }

    #[test]
    fn value_regulates_to_origin_without_reference() {
        let mut cost = unit_cost();
        let v = cost
            .value(0.0, &dvector![1.0, 0.0], &dvector![2.0], &ReferenceTrajectory::default())
            .unwrap();
        assert_relative_eq!(v, 0.5 + 0.5 * 0.1 * 4.0);
    }

    #[test]
    fn value_tracks_reference() {
        let mut cost = unit_cost();
        let reference =
            ReferenceTrajectory::constant(dvector![1.0, 0.0], dvector![0.0]);
        let v = cost
            .value(0.3, &dvector![1.0, 0.0], &dvector![0.0], &reference)
            .unwrap();
        assert_relative_eq!(v, 0.0);
    }

    #[test]
    fn expansion_is_consistent_with_value() {
        let mut cost = unit_cost();
        let reference = ReferenceTrajectory::default();
        let x = dvector![0.7, -0.3];
        let u = dvector![1.5];
        let m = cost.quadratic_approximation(0.0, &x, &u, &reference).unwrap();
        let v = cost.value(0.0, &x, &u, &reference).unwrap();
        assert_relative_eq!(m.f, v, epsilon = 1e-14);

        // Gradient check by finite differences in one coordinate.
        let eps = 1e-6;
        let v_plus = cost
            .value(0.0, &dvector![0.7 + eps, -0.3], &u, &reference)
            .unwrap();
        assert_relative_eq!(m.dfdx[0], (v_plus - v) / eps, epsilon = 1e-5);
    }

    #[test]
    fn terminal_expansion_has_empty_input_blocks() {
        let mut cost = QuadraticTerminalCost::new(DMatrix::identity(2, 2) * 10.0);
        let m = cost
            .quadratic_approximation(1.0, &dvector![1.0, 2.0], &ReferenceTrajectory::default())
            .unwrap();
        assert_eq!(m.nu(), 0);
        assert_eq!(m.dfdux.nrows(), 0);
        assert_relative_eq!(m.f, 25.0);
    }
}
