//! Relaxed-barrier soft penalties for inequality constraints.

use nalgebra::DMatrix;

use crate::approximation::{LinearModel, QuadraticModel};

// ---------------------------------------------------------------------------
// RelaxedBarrierPenalty
// ---------------------------------------------------------------------------

/// Relaxed log-barrier on a scalar inequality `h ≥ 0`.
///
/// Equals `-mu·ln(h)` for `h > delta` and switches to the quadratic
/// extrapolation `mu·(-ln(delta) + ½((h − 2δ)/δ)² − ½)` below, which keeps
/// the penalty twice differentiable everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelaxedBarrierPenalty {
    /// Barrier weight, `> 0`.
    pub mu: f64,
    /// Relaxation threshold, `> 0`.
    pub delta: f64,
}

impl RelaxedBarrierPenalty {
    /// Penalty with the given weight and relaxation threshold.
    ///
    /// # Panics
    /// Panics unless both parameters are positive.
    #[must_use]
    pub fn new(mu: f64, delta: f64) -> Self {
        assert!(mu > 0.0, "barrier weight must be positive");
        assert!(delta > 0.0, "relaxation threshold must be positive");
        Self { mu, delta }
    }

    /// Penalty value at `h`.
    #[must_use]
    pub fn value(&self, h: f64) -> f64 {
        if h > self.delta {
            -self.mu * h.ln()
        } else {
            let r = (h - 2.0 * self.delta) / self.delta;
            self.mu * (-self.delta.ln() + 0.5 * r * r - 0.5)
        }
    }

    /// First derivative at `h`.
    #[must_use]
    pub fn derivative(&self, h: f64) -> f64 {
        if h > self.delta {
            -self.mu / h
        } else {
            self.mu * (h - 2.0 * self.delta) / (self.delta * self.delta)
        }
    }

    /// Second derivative at `h`.
    #[must_use]
    pub fn second_derivative(&self, h: f64) -> f64 {
        if h > self.delta {
            self.mu / (h * h)
        } else {
            self.mu / (self.delta * self.delta)
        }
    }
}

// ---------------------------------------------------------------------------
// SoftConstraintPenalty
// ---------------------------------------------------------------------------

/// Sum of a scalar penalty over stacked inequality rows, with its
/// Gauss–Newton quadratic expansion through the constraint linearization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoftConstraintPenalty {
    penalty: RelaxedBarrierPenalty,
}

impl SoftConstraintPenalty {
    /// Soft penalty built on the given barrier.
    #[must_use]
    pub fn new(penalty: RelaxedBarrierPenalty) -> Self {
        Self { penalty }
    }

    /// Total penalty `Σᵢ p(hᵢ)` over the residual vector.
    #[must_use]
    pub fn total<'a>(&self, h: impl IntoIterator<Item = &'a f64>) -> f64 {
        h.into_iter().map(|&hi| self.penalty.value(hi)).sum()
    }

    /// Quadratic expansion of the total penalty around the linearization
    /// point of `h`. Constraint curvature is not available and is dropped
    /// (Gauss–Newton).
    #[must_use]
    pub fn quadratic_approximation(&self, h: &LinearModel) -> QuadraticModel {
        let nx = h.dfdx.ncols();
        let nu = h.dfdu.ncols();
        let mut model = QuadraticModel::zeros(nx, nu);

        // Weighted Jacobians: w = p'(h), v = p''(h).
        let mut weighted_dhdx = DMatrix::zeros(h.nrows(), nx);
        let mut weighted_dhdu = DMatrix::zeros(h.nrows(), nu);
        for (row, &hi) in h.f.iter().enumerate() {
            let w = self.penalty.derivative(hi);
            let v = self.penalty.second_derivative(hi);
            model.f += self.penalty.value(hi);
            model.dfdx += w * h.dfdx.row(row).transpose();
            model.dfdu += w * h.dfdu.row(row).transpose();
            weighted_dhdx.row_mut(row).copy_from(&(v * h.dfdx.row(row)));
            weighted_dhdu.row_mut(row).copy_from(&(v * h.dfdu.row(row)));
        }
        model.dfdxx = h.dfdx.transpose() * &weighted_dhdx;
        model.dfduu = h.dfdu.transpose() * &weighted_dhdu;
        model.dfdux = h.dfdu.transpose() * &weighted_dhdx;
        model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
