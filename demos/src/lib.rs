//! Shared problem definitions for the gallop demos and integration tests.

use gallop_core::prelude::*;
use nalgebra::{DMatrix, DVector, dvector};

// ---------------------------------------------------------------------------
// CartPole
// ---------------------------------------------------------------------------

/// Cart-pole dynamics with the pole angle measured from upright.
///
/// State `[p, θ, v, ω]`, input `[F]` (horizontal force on the cart).
/// Jacobians come from central finite differences of the flow; for a demo
/// problem the O(ε²) accuracy is plenty.
#[derive(Clone, Debug)]
pub struct CartPole {
    /// Cart mass in kg.
    pub cart_mass: f64,
    /// Pole mass in kg.
    pub pole_mass: f64,
    /// Pole half-length in m.
    pub half_length: f64,
    /// Gravitational acceleration in m/s².
    pub gravity: f64,
}

impl Default for CartPole {
    fn default() -> Self {
        Self {
            cart_mass: 1.0,
            pole_mass: 0.1,
            half_length: 0.5,
            gravity: 9.81,
        }
    }
}

impl CartPole {
    fn accelerations(&self, theta: f64, omega: f64, force: f64) -> (f64, f64) {
        let total = self.cart_mass + self.pole_mass;
        let (sin, cos) = theta.sin_cos();
        let temp =
            (force + self.pole_mass * self.half_length * omega * omega * sin) / total;
        let theta_acc = (self.gravity * sin - cos * temp)
            / (self.half_length
                * (4.0 / 3.0 - self.pole_mass * cos * cos / total));
        let lin_acc =
            temp - self.pole_mass * self.half_length * theta_acc * cos / total;
        (lin_acc, theta_acc)
    }
}

impl Dynamics for CartPole {
    fn flow(
        &mut self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<DVector<f64>, EvalError> {
        let (lin_acc, theta_acc) = self.accelerations(x[1], x[3], u[0]);
        Ok(dvector![x[2], x[3], lin_acc, theta_acc])
    }

    fn flow_linearization(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
    ) -> Result<LinearModel, EvalError> {
        let f = self.flow(t, x, u)?;
        let eps = 1e-6;

        let mut dfdx = DMatrix::zeros(4, 4);
        for j in 0..4 {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[j] += eps;
            minus[j] -= eps;
            let df = (self.flow(t, &plus, u)? - self.flow(t, &minus, u)?) / (2.0 * eps);
            dfdx.set_column(j, &df);
        }

        let mut dfdu = DMatrix::zeros(4, 1);
        let df = (self.flow(t, x, &dvector![u[0] + eps])?
            - self.flow(t, x, &dvector![u[0] - eps])?)
            / (2.0 * eps);
        dfdu.set_column(0, &df);

        Ok(LinearModel { f, dfdx, dfdu })
    }

    fn clone_boxed(&self) -> Box<dyn Dynamics> {
        Box::new(self.clone())
    }
}

/// Balance-task cost for the cart pole: keep the pole upright and the cart
/// centered.
#[must_use]
pub fn cartpole_cost() -> QuadraticCost {
    let mut q = DMatrix::zeros(4, 4);
    q[(0, 0)] = 1.0;
    q[(1, 1)] = 10.0;
    q[(2, 2)] = 0.1;
    q[(3, 3)] = 0.1;
    QuadraticCost::new(q, DMatrix::identity(1, 1) * 0.01)
}

/// Terminal weight pinning the upright equilibrium.
#[must_use]
pub fn cartpole_terminal_cost() -> QuadraticTerminalCost {
    let mut q = DMatrix::zeros(4, 4);
    q[(0, 0)] = 10.0;
    q[(1, 1)] = 100.0;
    q[(2, 2)] = 1.0;
    q[(3, 3)] = 1.0;
    QuadraticTerminalCost::new(q)
}

// ---------------------------------------------------------------------------
// Plant simulation
// ---------------------------------------------------------------------------

/// Advance a plant one control period with the input held constant,
/// sub-stepping the integrator for accuracy.
///
/// # Panics
/// Panics when the dynamics provider fails (demo-grade plants do not).
#[must_use]
pub fn simulate_plant(
    dynamics: &mut dyn Dynamics,
    t: f64,
    x: &DVector<f64>,
    u: &DVector<f64>,
    period: f64,
    substeps: usize,
) -> DVector<f64> {
    let h = period / substeps.max(1) as f64;
    let mut state = x.clone();
    for k in 0..substeps.max(1) {
        #[allow(clippy::cast_precision_loss)]
        let tk = t + k as f64 * h;
        state = propagate(dynamics, IntegratorType::Rk4, tk, &state, u, h)
            .expect("plant integration failed");
    }
    state
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
