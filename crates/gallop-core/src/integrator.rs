//! Explicit Runge–Kutta discretization of dynamics and sensitivities.
//!
//! Two entry points share one integrator selection: [`propagate`] advances
//! the state only (used by the line search), while [`propagate_sensitivity`]
//! additionally chain-rules the flow Jacobians through the Runge–Kutta
//! stages, producing the discrete-time `A`, `B` pair consumed by the QP.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::approximation::LinearModel;
use crate::dynamics::Dynamics;
use crate::error::EvalError;

// ---------------------------------------------------------------------------
// IntegratorType
// ---------------------------------------------------------------------------

/// Explicit integration scheme used to discretize the flow over one interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// Forward Euler, first order.
    Euler,
    /// Explicit midpoint, second order.
    #[default]
    Rk2,
    /// Classic Runge–Kutta, fourth order.
    Rk4,
}

// ---------------------------------------------------------------------------
// Value propagation
// ---------------------------------------------------------------------------

/// Advance the state over `[t, t + dt]` with the input held constant.
///
/// # Errors
/// Propagates any [`EvalError`] from the dynamics provider.
pub fn propagate(
    dynamics: &mut dyn Dynamics,
    kind: IntegratorType,
    t: f64,
    x: &DVector<f64>,
    u: &DVector<f64>,
    dt: f64,
) -> Result<DVector<f64>, EvalError> {
    match kind {
        IntegratorType::Euler => {
            let k1 = dynamics.flow(t, x, u)?;
            Ok(x + dt * k1)
        }
        IntegratorType::Rk2 => {
            let k1 = dynamics.flow(t, x, u)?;
            let k2 = dynamics.flow(t + 0.5 * dt, &(x + 0.5 * dt * k1), u)?;
            Ok(x + dt * k2)
        }
        IntegratorType::Rk4 => {
            let k1 = dynamics.flow(t, x, u)?;
            let k2 = dynamics.flow(t + 0.5 * dt, &(x + 0.5 * dt * &k1), u)?;
            let k3 = dynamics.flow(t + 0.5 * dt, &(x + 0.5 * dt * &k2), u)?;
            let k4 = dynamics.flow(t + dt, &(x + dt * &k3), u)?;
            Ok(x + (dt / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4))
        }
    }
}

// ---------------------------------------------------------------------------
// Sensitivity propagation
// ---------------------------------------------------------------------------

/// Advance the state and its sensitivities over `[t, t + dt]`.
///
/// Returns `{ f: x⁺, dfdx: ∂x⁺/∂x, dfdu: ∂x⁺/∂u }`.
///
/// # Errors
/// Propagates any [`EvalError`] from the dynamics provider.
pub fn propagate_sensitivity(
    dynamics: &mut dyn Dynamics,
    kind: IntegratorType,
    t: f64,
    x: &DVector<f64>,
    u: &DVector<f64>,
    dt: f64,
) -> Result<LinearModel, EvalError> {
    let nx = x.len();
    let eye = DMatrix::<f64>::identity(nx, nx);

    match kind {
        IntegratorType::Euler => {
            let l1 = dynamics.flow_linearization(t, x, u)?;
            Ok(LinearModel {
                f: x + dt * &l1.f,
                dfdx: &eye + dt * &l1.dfdx,
                dfdu: dt * &l1.dfdu,
            })
        }
        IntegratorType::Rk2 => {
            let h = dt;
            let l1 = dynamics.flow_linearization(t, x, u)?;
            let x2 = x + 0.5 * h * &l1.f;
            let l2 = dynamics.flow_linearization(t + 0.5 * h, &x2, u)?;

            let dk2dx = &l2.dfdx * (&eye + 0.5 * h * &l1.dfdx);
            let dk2du = &l2.dfdu + 0.5 * h * &l2.dfdx * &l1.dfdu;

            Ok(LinearModel {
                f: x + h * &l2.f,
                dfdx: &eye + h * dk2dx,
                dfdu: h * dk2du,
            })
        }
        IntegratorType::Rk4 => {
            let h = dt;
            let l1 = dynamics.flow_linearization(t, x, u)?;
            let l2 = dynamics.flow_linearization(t + 0.5 * h, &(x + 0.5 * h * &l1.f), u)?;
            let l3 = dynamics.flow_linearization(t + 0.5 * h, &(x + 0.5 * h * &l2.f), u)?;
            let l4 = dynamics.flow_linearization(t + h, &(x + h * &l3.f), u)?;

            let dk1dx = l1.dfdx.clone();
            let dk1du = l1.dfdu.clone();
            let dk2dx = &l2.dfdx * (&eye + 0.5 * h * &dk1dx);
            let dk2du = &l2.dfdu + 0.5 * h * &l2.dfdx * &dk1du;
            let dk3dx = &l3.dfdx * (&eye + 0.5 * h * &dk2dx);
            let dk3du = &l3.dfdu + 0.5 * h * &l3.dfdx * &dk2du;
            let dk4dx = &l4.dfdx * (&eye + h * &dk3dx);
            let dk4du = &l4.dfdu + h * &l4.dfdx * &dk3du;

            Ok(LinearModel {
                f: x + (h / 6.0) * (&l1.f + 2.0 * &l2.f + 2.0 * &l3.f + &l4.f),
                dfdx: &eye + (h / 6.0) * (dk1dx + 2.0 * dk2dx + 2.0 * dk3dx + dk4dx),
                dfdu: (h / 6.0) * (dk1du + 2.0 * dk2du + 2.0 * dk3du + dk4du),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::LtiDynamics;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    /// Scalar nonlinear system ẋ = -x³ + u with analytic Jacobians.
    #[derive(Clone)]
    struct Cubic;

    impl Dynamics for Cubic {
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

    #[test]
    fn sensitivity_value_matches_propagate() {
        let mut sys = Cubic;
        let x = dvector![1.2];
        let u = dvector![0.3];
        for kind in [IntegratorType::Euler, IntegratorType::Rk2, IntegratorType::Rk4] {
            let value = propagate(&mut sys, kind, 0.0, &x, &u, 0.05).unwrap();
            let sens = propagate_sensitivity(&mut sys, kind, 0.0, &x, &u, 0.05).unwrap();
            assert_relative_eq!((value - sens.f).norm(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn sensitivities_match_finite_differences() {
        let mut sys = Cubic;
        let x = dvector![0.8];
        let u = dvector![-0.2];
        let dt = 0.1;
        let eps = 1e-6;

        for kind in [IntegratorType::Euler, IntegratorType::Rk2, IntegratorType::Rk4] {
            let sens = propagate_sensitivity(&mut sys, kind, 0.0, &x, &u, dt).unwrap();

            let xp = propagate(&mut sys, kind, 0.0, &dvector![0.8 + eps], &u, dt).unwrap();
            let xm = propagate(&mut sys, kind, 0.0, &dvector![0.8 - eps], &u, dt).unwrap();
            assert_relative_eq!(sens.dfdx[(0, 0)], (xp[0] - xm[0]) / (2.0 * eps), epsilon = 1e-7);

            let up = propagate(&mut sys, kind, 0.0, &x, &dvector![-0.2 + eps], dt).unwrap();
            let um = propagate(&mut sys, kind, 0.0, &x, &dvector![-0.2 - eps], dt).unwrap();
            assert_relative_eq!(sens.dfdu[(0, 0)], (up[0] - um[0]) / (2.0 * eps), epsilon = 1e-7);
        }
    }

    #[test]
    fn rk2_is_exact_for_the_double_integrator() {
        // A² = 0, so the second-order series is the exact matrix exponential.
        let mut sys = LtiDynamics::double_integrator();
        let h = 0.1;
        let sens = propagate_sensitivity(
            &mut sys,
            IntegratorType::Rk2,
            0.0,
            &dvector![1.0, 0.0],
            &dvector![0.0],
            h,
        )
        .unwrap();
        assert_relative_eq!(sens.dfdx[(0, 1)], h, epsilon = 1e-15);
        assert_relative_eq!(sens.dfdu[(0, 0)], 0.5 * h * h, epsilon = 1e-15);
        assert_relative_eq!(sens.dfdu[(1, 0)], h, epsilon = 1e-15);
    }

    #[test]
    fn rk4_converges_at_fourth_order() {
        // One step of ẋ = -x³ from x = 1: compare against a finely resolved
        // reference; halving dt must shrink the error by roughly 2⁴.
        let mut sys = Cubic;
        let x = dvector![1.0];
        let u = dvector![0.0];

        let reference = {
            let mut xr = x.clone();
            let steps = 10_000;
            let h = 0.4 / f64::from(steps);
            for i in 0..steps {
                xr = propagate(&mut sys, IntegratorType::Rk4, f64::from(i) * h, &xr, &u, h)
                    .unwrap();
            }
            xr[0]
        };

        let coarse = propagate(&mut sys, IntegratorType::Rk4, 0.0, &x, &u, 0.4).unwrap()[0];
        let halved = {
            let mid = propagate(&mut sys, IntegratorType::Rk4, 0.0, &x, &u, 0.2).unwrap();
            propagate(&mut sys, IntegratorType::Rk4, 0.2, &mid, &u, 0.2).unwrap()[0]
        };

        let err_coarse = (coarse - reference).abs();
        let err_halved = (halved - reference).abs();
        assert!(
            err_halved < err_coarse / 8.0,
            "expected ≥ 8x error reduction, got {err_coarse:.3e} -> {err_halved:.3e}"
        );
    }
}
