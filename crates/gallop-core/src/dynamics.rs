//! Continuous-time system dynamics providers.

use nalgebra::{DMatrix, DVector};

use crate::approximation::LinearModel;
use crate::error::EvalError;

// ---------------------------------------------------------------------------
// Dynamics
// ---------------------------------------------------------------------------

/// Continuous-time dynamics `ẋ = f(t, x, u)` with an optional jump map
/// `x⁺ = g(t, x)` applied at mode-switch events.
///
/// Providers take `&mut self` so implementations may keep worker-local
/// caches; the solver clones one provider per worker and never shares a
/// clone across threads.
pub trait Dynamics: Send {
    /// Flow value `f(t, x, u)`.
    ///
    /// # Errors
    /// Returns [`EvalError::Dynamics`] when the flow cannot be evaluated.
    fn flow(&mut self, t: f64, x: &DVector<f64>, u: &DVector<f64>)
    -> Result<DVector<f64>, EvalError>;

    /// Flow value together with the Jacobians `A = ∂f/∂x`, `B = ∂f/∂u`.
    ///
    /// # Errors
    /// Returns [`EvalError::Dynamics`] when the linearization cannot be
    /// evaluated.
    fn flow_linearization(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError>;

    /// Jump map `g(t, x)` applied at an event. Defaults to the identity.
    ///
    /// # Errors
    /// Returns [`EvalError::Dynamics`] when the jump cannot be evaluated.
    fn jump(&mut self, _t: f64, x: &DVector<f64>) -> Result<DVector<f64>, EvalError> {
        Ok(x.clone())
    }

    /// Jump map with its state Jacobian; the input Jacobian is empty since
    /// events carry no decision input. Defaults to the identity map.
    ///
    /// # Errors
    /// Returns [`EvalError::Dynamics`] when the linearization cannot be
    /// evaluated.
    fn jump_linearization(&mut self, _t: f64, x: &DVector<f64>) -> Result<LinearModel, EvalError> {
        let nx = x.len();
        Ok(LinearModel {
            f: x.clone(),
            dfdx: DMatrix::identity(nx, nx),
            dfdu: DMatrix::zeros(nx, 0),
        })
    }

    /// Deep-copy the provider for a worker.
    fn clone_boxed(&self) -> Box<dyn Dynamics>;
}

impl Clone for Box<dyn Dynamics> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

// ---------------------------------------------------------------------------
// LtiDynamics
// ---------------------------------------------------------------------------

/// Linear time-invariant dynamics `ẋ = A·x + B·u`.
#[derive(Clone, Debug)]
pub struct LtiDynamics {
    /// Continuous-time state matrix.
    pub a: DMatrix<f64>,
    /// Continuous-time input matrix.
    pub b: DMatrix<f64>,
}

impl LtiDynamics {
    /// LTI system with the given matrices.
    ///
    /// # Panics
    /// Panics unless `a` is square with as many rows as `b`.
    #[must_use]
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> Self {
        assert_eq!(a.nrows(), a.ncols(), "state matrix must be square");
        assert_eq!(a.nrows(), b.nrows(), "state and input matrix rows must match");
        Self { a, b }
    }

    /// A double integrator `ẋ₁ = x₂`, `ẋ₂ = u`.
    #[must_use]
    pub fn double_integrator() -> Self {
        let mut a = DMatrix::zeros(2, 2);
        a[(0, 1)] = 1.0;
        let mut b = DMatrix::zeros(2, 1);
        b[(1, 0)] = 1.0;
        Self::new(a, b)
    }
}

impl Dynamics for LtiDynamics {
    fn flow(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        Ok(&self.a * x + &self.b * u)
    }

    fn flow_linearization(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        Ok(LinearModel {
            f: &self.a * x + &self.b * u,
            dfdx: self.a.clone(),
            dfdu: self.b.clone(),
        })
    }

    fn clone_boxed(&self) -> Box<dyn Dynamics> {
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

    #[test]
    fn double_integrator_flow() {
        let mut sys = LtiDynamics::double_integrator();
        let f = sys.flow(0.0, &dvector![1.0, 2.0], &dvector![3.0]).unwrap();
        assert_relative_eq!(f[0], 2.0);
        assert_relative_eq!(f[1], 3.0);
    }

    #[test]
    fn linearization_matches_flow() {
        let mut sys = LtiDynamics::double_integrator();
        let x = dvector![0.5, -1.0];
        let u = dvector![2.0];
        let lin = sys.flow_linearization(0.0, &x, &u).unwrap();
        let f = sys.flow(0.0, &x, &u).unwrap();
        assert_relative_eq!((lin.f - f).norm(), 0.0);
        assert_eq!(lin.dfdx.nrows(), 2);
        assert_eq!(lin.dfdu.ncols(), 1);
    }

    #[test]
    fn default_jump_is_identity_with_empty_input_jacobian() {
        let mut sys = LtiDynamics::double_integrator();
        let x = dvector![1.0, -2.0];
        let jump = sys.jump(0.5, &x).unwrap();
        assert_relative_eq!((jump - &x).norm(), 0.0);

        let lin = sys.jump_linearization(0.5, &x).unwrap();
        assert_eq!(lin.dfdu.ncols(), 0);
        assert_relative_eq!((lin.dfdx - DMatrix::identity(2, 2)).norm(), 0.0);
    }

    #[test]
    fn boxed_clone_preserves_behavior() {
        let sys: Box<dyn Dynamics> = Box::new(LtiDynamics::double_integrator());
        let mut copy = sys.clone();
        let f = copy.flow(0.0, &dvector![0.0, 1.0], &dvector![0.0]).unwrap();
        assert_relative_eq!(f[0], 1.0);
    }
}
