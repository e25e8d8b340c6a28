//! First- and second-order Taylor models of vector and scalar functions.
//!
//! [`LinearModel`] is the affine model `f + dfdx·δx + dfdu·δu` used for
//! discretized dynamics, constraints and input projections. [`QuadraticModel`]
//! is the second-order expansion of a scalar cost. Both use a zero-row
//! convention: an empty `f` means "absent", which keeps the per-stage arrays
//! free of options at the price of storing tiny empties.

use std::ops::{AddAssign, MulAssign};

use nalgebra::{DMatrix, DVector};

// ---------------------------------------------------------------------------
// LinearModel
// ---------------------------------------------------------------------------

/// Affine model of a vector-valued function: `f + dfdx·δx + dfdu·δu`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearModel {
    /// Value at the expansion point.
    pub f: DVector<f64>,
    /// Jacobian with respect to the state.
    pub dfdx: DMatrix<f64>,
    /// Jacobian with respect to the input.
    pub dfdu: DMatrix<f64>,
}

impl LinearModel {
    /// All-zero model of the given dimensions.
    #[must_use]
    pub fn zeros(nv: usize, nx: usize, nu: usize) -> Self {
        Self {
            f: DVector::zeros(nv),
            dfdx: DMatrix::zeros(nv, nx),
            dfdu: DMatrix::zeros(nv, nu),
        }
    }

    /// The zero-row "absent" model over the given state dimension.
    #[must_use]
    pub fn absent(nx: usize) -> Self {
        Self::zeros(0, nx, 0)
    }

    /// Number of rows (constrained/derived quantities).
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.f.len()
    }

    /// True when the model carries no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.f.is_empty()
    }

    /// True when every entry is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.f.iter().all(|v| v.is_finite())
            && self.dfdx.iter().all(|v| v.is_finite())
            && self.dfdu.iter().all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// QuadraticModel
// ---------------------------------------------------------------------------

/// Second-order model of a scalar function:
///
/// ```text
/// f + dfdx·δx + dfdu·δu + ½ δxᵀ dfdxx δx + ½ δuᵀ dfduu δu + δuᵀ dfdux δx
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticModel {
    /// Value at the expansion point.
    pub f: f64,
    /// Gradient with respect to the state.
    pub dfdx: DVector<f64>,
    /// Gradient with respect to the input.
    pub dfdu: DVector<f64>,
    /// State Hessian.
    pub dfdxx: DMatrix<f64>,
    /// Input Hessian.
    pub dfduu: DMatrix<f64>,
    /// Mixed input-state Hessian (`nu × nx`).
    pub dfdux: DMatrix<f64>,
}

impl QuadraticModel {
    /// All-zero model of the given dimensions.
    #[must_use]
    pub fn zeros(nx: usize, nu: usize) -> Self {
        Self {
            f: 0.0,
            dfdx: DVector::zeros(nx),
            dfdu: DVector::zeros(nu),
            dfdxx: DMatrix::zeros(nx, nx),
            dfduu: DMatrix::zeros(nu, nu),
            dfdux: DMatrix::zeros(nu, nx),
        }
    }

    /// State dimension of the expansion.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.dfdx.len()
    }

    /// Input dimension of the expansion (zero for state-only costs).
    #[must_use]
    pub fn nu(&self) -> usize {
        self.dfdu.len()
    }

    /// Evaluate the model at a deviation `(δx, δu)`.
    #[must_use]
    pub fn evaluate(&self, dx: &DVector<f64>, du: &DVector<f64>) -> f64 {
        self.f
            + self.dfdx.dot(dx)
            + self.dfdu.dot(du)
            + 0.5 * dx.dot(&(&self.dfdxx * dx))
            + 0.5 * du.dot(&(&self.dfduu * du))
            + du.dot(&(&self.dfdux * dx))
    }

    /// True when every entry is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.f.is_finite()
            && self.dfdx.iter().all(|v| v.is_finite())
            && self.dfdu.iter().all(|v| v.is_finite())
            && self.dfdxx.iter().all(|v| v.is_finite())
            && self.dfduu.iter().all(|v| v.is_finite())
            && self.dfdux.iter().all(|v| v.is_finite())
    }
}

impl AddAssign<&QuadraticModel> for QuadraticModel {
    fn add_assign(&mut self, rhs: &QuadraticModel) {
        self.f += rhs.f;
        self.dfdx += &rhs.dfdx;
        self.dfdu += &rhs.dfdu;
        self.dfdxx += &rhs.dfdxx;
        self.dfduu += &rhs.dfduu;
        self.dfdux += &rhs.dfdux;
    }
}

impl MulAssign<f64> for QuadraticModel {
    fn mul_assign(&mut self, rhs: f64) {
        self.f *= rhs;
        self.dfdx *= rhs;
        self.dfdu *= rhs;
        self.dfdxx *= rhs;
        self.dfduu *= rhs;
        self.dfdux *= rhs;
    }
}

// ---------------------------------------------------------------------------
// StageConstraints
// ---------------------------------------------------------------------------

/// The stacked constraint set enforced in the QP at one stage.
///
/// Equality rows satisfy `f + dfdx·δx + dfdu·δu = 0`; inequality rows use the
/// `h ≥ 0` feasibility convention, i.e. `f + dfdx·δx + dfdu·δu ≥ 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct StageConstraints {
    /// State-input (or state-only) equality constraints.
    pub equality: LinearModel,
    /// Inequality constraints, feasible when nonnegative.
    pub inequality: LinearModel,
}

impl StageConstraints {
    /// Constraint set with no rows.
    #[must_use]
    pub fn empty(nx: usize) -> Self {
        Self {
            equality: LinearModel::absent(nx),
            inequality: LinearModel::absent(nx),
        }
    }

    /// True when neither equalities nor inequalities are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equality.is_empty() && self.inequality.is_empty()
    }

    /// Total number of constraint rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.equality.nrows() + self.inequality.nrows()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn linear_model_zero_row_convention() {
        let absent = LinearModel::absent(3);
        assert!(absent.is_empty());
        assert_eq!(absent.nrows(), 0);
        assert_eq!(absent.dfdx.ncols(), 3);

        let present = LinearModel::zeros(2, 3, 1);
        assert!(!present.is_empty());
        assert_eq!(present.nrows(), 2);
    }

    #[test]
    fn linear_model_detects_non_finite() {
        let mut m = LinearModel::zeros(2, 2, 1);
        assert!(m.is_finite());
        m.dfdx[(1, 0)] = f64::NAN;
        assert!(!m.is_finite());
    }

    #[test]
    fn quadratic_model_evaluates_expansion() {
        let m = QuadraticModel {
            f: 1.0,
            dfdx: dvector![1.0, 0.0],
            dfdu: dvector![2.0],
            dfdxx: dmatrix![2.0, 0.0; 0.0, 2.0],
            dfduu: dmatrix![4.0],
            dfdux: dmatrix![1.0, 0.0],
        };
        let dx = dvector![1.0, -1.0];
        let du = dvector![0.5];
        // 1 + 1 + 1 + 0.5*(2+2) + 0.5*4*0.25 + 0.5*1
        assert_relative_eq!(m.evaluate(&dx, &du), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn quadratic_model_add_and_scale() {
        let mut a = QuadraticModel::zeros(2, 1);
        a.f = 1.0;
        a.dfdx = dvector![1.0, 2.0];
        let mut b = QuadraticModel::zeros(2, 1);
        b.f = 2.0;
        b.dfdx = dvector![0.5, 0.5];

        a += &b;
        a *= 2.0;

        assert_relative_eq!(a.f, 6.0);
        assert_relative_eq!(a.dfdx[0], 3.0);
        assert_relative_eq!(a.dfdx[1], 5.0);
    }

    #[test]
    fn stage_constraints_emptiness() {
        let empty = StageConstraints::empty(4);
        assert!(empty.is_empty());
        assert_eq!(empty.nrows(), 0);

        let with_eq = StageConstraints {
            equality: LinearModel::zeros(2, 4, 2),
            inequality: LinearModel::absent(4),
        };
        assert!(!with_eq.is_empty());
        assert_eq!(with_eq.nrows(), 2);
    }
}
