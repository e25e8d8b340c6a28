//! Backward Riccati recursion for the unconstrained LQ subproblem.
//!
//! Solves
//!
//! ```text
//! min  Σᵢ ½ [δxᵢ; δuᵢ]ᵀ Hᵢ [δxᵢ; δuᵢ] + hᵢᵀ [δxᵢ; δuᵢ]  +  terminal
//! s.t. δx₀ given,  δxᵢ₊₁ = Aᵢ δxᵢ + Bᵢ δuᵢ + fᵢ
//! ```
//!
//! by a backward sweep over the quadratic cost-to-go `½ δxᵀS δx + sᵀδx`
//! followed by a forward rollout. Stages without an input (events) propagate
//! the cost-to-go through the jump map only. The per-stage feedback gains of
//! the backward sweep are retained for controller synthesis.

use nalgebra::{DMatrix, DVector};

use gallop_core::approximation::{LinearModel, QuadraticModel};

use crate::QpError;

/// Result of the Riccati sweep: the primal step and the feedback gains.
#[derive(Clone, Debug)]
pub struct RiccatiOutcome {
    /// State deviations `δx₀..δx_N`.
    pub delta_x: Vec<DVector<f64>>,
    /// Input deviations `δu₀..δu_{N-1}`; empty vectors at event stages.
    pub delta_u: Vec<DVector<f64>>,
    /// Stage feedback gains `Kᵢ` (`nuᵢ × nxᵢ`; zero-row at event stages).
    pub gains: Vec<DMatrix<f64>>,
}

/// Solve the unconstrained LQ problem.
///
/// # Errors
/// Returns [`QpError::NotPositiveDefinite`] when a stage input Hessian fails
/// its Cholesky factorization.
pub fn solve(
    dx0: &DVector<f64>,
    dynamics: &[LinearModel],
    cost: &[QuadraticModel],
) -> Result<RiccatiOutcome, QpError> {
    let n = dynamics.len();
    debug_assert_eq!(cost.len(), n + 1);

    // Terminal cost-to-go.
    let mut s_mat = cost[n].dfdxx.clone();
    let mut s_vec = cost[n].dfdx.clone();

    let mut gains: Vec<DMatrix<f64>> = vec![DMatrix::zeros(0, 0); n];
    let mut feedforward: Vec<DVector<f64>> = vec![DVector::zeros(0); n];

    for i in (0..n).rev() {
        let a = &dynamics[i].dfdx;
        let b = &dynamics[i].dfdu;
        let f = &dynamics[i].f;
        let c = &cost[i];
        let nu = b.ncols();

        // Cost-to-go pulled through the affine dynamics.
        let sf = &s_vec + &s_mat * f;
        let hx = &c.dfdx + a.transpose() * &sf;
        let hxx = &c.dfdxx + a.transpose() * &s_mat * a;

        if nu == 0 {
            // Event stage: no decision variable, pure propagation.
            gains[i] = DMatrix::zeros(0, a.ncols());
            s_mat = symmetrized(hxx);
            s_vec = hx;
            continue;
        }

        let hu = &c.dfdu + b.transpose() * &sf;
        let huu = symmetrized(&c.dfduu + b.transpose() * &s_mat * b);
        let hux = &c.dfdux + b.transpose() * &s_mat * a;

        let chol = huu
            .cholesky()
            .ok_or(QpError::NotPositiveDefinite { stage: i })?;
        let k = -chol.solve(&hux);
        let kff = -chol.solve(&hu);

        // S = Hxx + Huxᵀ K,  s = hx + Huxᵀ kff  (the Hu + Huu·kff term
        // vanishes by construction of kff).
        s_mat = symmetrized(hxx + hux.transpose() * &k);
        s_vec = hx + hux.transpose() * &kff;

        gains[i] = k;
        feedforward[i] = kff;
    }

    // Forward rollout.
    let mut delta_x = Vec::with_capacity(n + 1);
    let mut delta_u = Vec::with_capacity(n);
    delta_x.push(dx0.clone());
    for i in 0..n {
        let dx = &delta_x[i];
        let du = if dynamics[i].dfdu.ncols() == 0 {
            DVector::zeros(0)
        } else {
            &feedforward[i] + &gains[i] * dx
        };
        let next = &dynamics[i].dfdx * dx + &dynamics[i].dfdu * &du + &dynamics[i].f;
        delta_u.push(du);
        delta_x.push(next);
    }

    Ok(RiccatiOutcome {
        delta_x,
        delta_u,
        gains,
    })
}

fn symmetrized(m: DMatrix<f64>) -> DMatrix<f64> {
    let t = m.transpose();
    (m + t) * 0.5
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
