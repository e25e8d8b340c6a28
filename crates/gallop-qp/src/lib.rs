//! Stage-structured QP back-end for the gallop MPC solver.
//!
//! The subproblem assembled by the SQP transcription is
//!
//! ```text
//! min  Σᵢ ½ [δxᵢ; δuᵢ]ᵀ Hᵢ [δxᵢ; δuᵢ] + hᵢᵀ [δxᵢ; δuᵢ]   + terminal
//! s.t. δx₀ = δx₀ⁱⁿⁱᵗ
//!      δxᵢ₊₁ = Aᵢ δxᵢ + Bᵢ δuᵢ + fᵢ
//!      Cᵢ δxᵢ + Dᵢ δuᵢ + eᵢ  {= 0 | ≥ 0}
//! ```
//!
//! [`StageQpSolver`] dispatches on the presence of stage constraints: the
//! unconstrained problem goes through a banded Riccati recursion that also
//! yields per-stage feedback gains, while the constrained problem is stacked
//! into a sparse conic program and solved with Clarabel (no gains on that
//! path).

pub mod conic;
pub mod dims;
pub mod riccati;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use gallop_core::approximation::{LinearModel, QuadraticModel, StageConstraints};

pub use crate::dims::{StageDims, extract_dims};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the QP back-end. All are fatal for the surrounding SQP
/// iteration; there are no silent retries.
#[derive(Debug, Clone, Error)]
pub enum QpError {
    #[error("stage {stage} input Hessian is not positive definite")]
    NotPositiveDefinite { stage: usize },

    #[error("conic solver terminated with status {status}")]
    Conic { status: String },

    #[error("non-finite entries in stage {stage} subproblem data")]
    NonFinite { stage: usize },
}

// ---------------------------------------------------------------------------
// QpSolution
// ---------------------------------------------------------------------------

/// Primal step returned by a successful solve.
#[derive(Clone, Debug)]
pub struct QpSolution {
    /// State deviations `δx₀..δx_N`.
    pub delta_x: Vec<DVector<f64>>,
    /// Input deviations `δu₀..δu_{N-1}`; empty at event stages.
    pub delta_u: Vec<DVector<f64>>,
}

// ---------------------------------------------------------------------------
// StageQpSolver
// ---------------------------------------------------------------------------

/// Facade over the two solve paths, retaining stage sizes and the feedback
/// gains of the most recent unconstrained solve.
#[derive(Debug, Default)]
pub struct StageQpSolver {
    dims: Vec<StageDims>,
    gains: Option<Vec<DMatrix<f64>>>,
}

impl StageQpSolver {
    /// New back-end with no sizing information.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the per-stage sizes of the upcoming problem.
    pub fn resize(&mut self, dims: Vec<StageDims>) {
        if dims != self.dims {
            self.dims = dims;
            self.gains = None;
        }
    }

    /// Stage sizes from the last [`resize`](Self::resize) or solve.
    #[must_use]
    pub fn dims(&self) -> &[StageDims] {
        &self.dims
    }

    /// Solve the subproblem.
    ///
    /// Pass `None` (or all-empty stage constraints) when no constraints are
    /// enforced, either because the problem has none or because projection
    /// has eliminated the state-input equalities; that selects the Riccati
    /// path and makes feedback gains available.
    ///
    /// # Errors
    /// Any [`QpError`] is fatal for the current SQP iteration.
    pub fn solve(
        &mut self,
        dx0: &DVector<f64>,
        dynamics: &[LinearModel],
        cost: &[QuadraticModel],
        constraints: Option<&[StageConstraints]>,
    ) -> Result<QpSolution, QpError> {
        validate_finite(dx0, dynamics, cost)?;
        self.resize(extract_dims(dynamics, cost, constraints));

        let constrained = constraints.is_some_and(|c| c.iter().any(|s| !s.is_empty()));
        if constrained {
            self.gains = None;
            let constraints = constraints.expect("constrained path requires constraints");
            conic::solve(dx0, dynamics, cost, constraints, &self.dims)
        } else {
            let outcome = riccati::solve(dx0, dynamics, cost)?;
            self.gains = Some(outcome.gains);
            Ok(QpSolution {
                delta_x: outcome.delta_x,
                delta_u: outcome.delta_u,
            })
        }
    }

    /// Feedback gains of the linearized closed loop, available after an
    /// unconstrained (Riccati) solve; `None` after a conic solve.
    #[must_use]
    pub fn riccati_feedback(&self) -> Option<&[DMatrix<f64>]> {
        self.gains.as_deref()
    }
}

fn validate_finite(
    dx0: &DVector<f64>,
    dynamics: &[LinearModel],
    cost: &[QuadraticModel],
) -> Result<(), QpError> {
    if !dx0.iter().all(|v| v.is_finite()) {
        return Err(QpError::NonFinite { stage: 0 });
    }
    for (i, d) in dynamics.iter().enumerate() {
        if !d.is_finite() {
            return Err(QpError::NonFinite { stage: i });
        }
    }
    for (i, c) in cost.iter().enumerate() {
        if !c.is_finite() {
            return Err(QpError::NonFinite { stage: i });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn simple_problem() -> (Vec<LinearModel>, Vec<QuadraticModel>) {
        let dynamics = vec![
            LinearModel {
                f: dvector![0.0],
                dfdx: dmatrix![1.0],
                dfdu: dmatrix![0.5],
            };
            3
        ];
        let mut cost: Vec<QuadraticModel> = (0..3)
            .map(|_| {
                let mut c = QuadraticModel::zeros(1, 1);
                c.dfdxx = dmatrix![1.0];
                c.dfduu = dmatrix![0.1];
                c
            })
            .collect();
        let mut terminal = QuadraticModel::zeros(1, 0);
        terminal.dfdxx = dmatrix![2.0];
        cost.push(terminal);
        (dynamics, cost)
    }

    #[test]
    fn unconstrained_solve_exposes_gains() {
        let (dynamics, cost) = simple_problem();
        let mut qp = StageQpSolver::new();
        let sol = qp.solve(&dvector![1.0], &dynamics, &cost, None).unwrap();

        assert_eq!(sol.delta_x.len(), 4);
        assert_eq!(sol.delta_u.len(), 3);
        let gains = qp.riccati_feedback().expect("gains after Riccati solve");
        assert_eq!(gains.len(), 3);
        assert_eq!(gains[0].shape(), (1, 1));
    }

    #[test]
    fn empty_constraints_take_the_riccati_path() {
        let (dynamics, cost) = simple_problem();
        let constraints = vec![StageConstraints::empty(1); 4];
        let mut qp = StageQpSolver::new();
        let with_empty = qp
            .solve(&dvector![1.0], &dynamics, &cost, Some(&constraints))
            .unwrap();
        assert!(qp.riccati_feedback().is_some());

        let without = qp.solve(&dvector![1.0], &dynamics, &cost, None).unwrap();
        for (a, b) in with_empty.delta_u.iter().zip(&without.delta_u) {
            assert_relative_eq!((a - b).norm(), 0.0);
        }
    }

    #[test]
    fn constrained_solve_clears_gains() {
        let (dynamics, cost) = simple_problem();
        let mut qp = StageQpSolver::new();
        qp.solve(&dvector![1.0], &dynamics, &cost, None).unwrap();
        assert!(qp.riccati_feedback().is_some());

        let mut constraints = vec![StageConstraints::empty(1); 4];
        constraints[0].equality = LinearModel {
            f: dvector![0.0],
            dfdx: DMatrix::zeros(1, 1),
            dfdu: dmatrix![1.0],
        };
        qp.solve(&dvector![1.0], &dynamics, &cost, Some(&constraints))
            .unwrap();
        assert!(qp.riccati_feedback().is_none());
    }

    #[test]
    fn non_finite_data_is_rejected() {
        let (mut dynamics, cost) = simple_problem();
        dynamics[1].f[0] = f64::NAN;
        let mut qp = StageQpSolver::new();
        let err = qp
            .solve(&dvector![1.0], &dynamics, &cost, None)
            .unwrap_err();
        assert!(matches!(err, QpError::NonFinite { stage: 1 }));
    }

    #[test]
    fn resize_records_dims() {
        let (dynamics, cost) = simple_problem();
        let mut qp = StageQpSolver::new();
        qp.solve(&dvector![1.0], &dynamics, &cost, None).unwrap();
        assert_eq!(qp.dims().len(), 4);
        assert_eq!(qp.dims()[0].nu, 1);
        assert_eq!(qp.dims()[3].nu, 0);
    }
}
