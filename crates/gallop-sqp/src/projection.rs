//! Elimination of state-input equality constraints by orthogonal projection.
//!
//! Given the linearized equality `e + D·δx + C·δu = 0` with full-row-rank
//! `C` (`m × nu`, `m ≤ nu`), every feasible input deviation can be written
//!
//! ```text
//! δu = Pf + Pdx·δx + Pdu·δũ,   Pf = −C⁺e,  Pdx = −C⁺D,  Pdu = null basis
//! ```
//!
//! with `C⁺ = Cᵀ(CCᵀ)⁻¹` and `Pdu` an orthonormal basis of `null(C)`. The
//! reduced step `δũ` has dimension `nu − m`. Substituting the map into the
//! stage dynamics and cost removes the equality from the QP entirely.

use nalgebra::{DMatrix, DVector};

use gallop_core::approximation::{LinearModel, QuadraticModel};
use gallop_core::error::EvalError;

/// Columns of the null-space projector below this norm are discarded during
/// orthonormalization.
const NULL_BASIS_TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Compute the input-space projection eliminating `equality`.
///
/// Returns `{ f: Pf, dfdx: Pdx, dfdu: Pdu }` with `Pdu` of size
/// `nu × (nu − m)`.
///
/// # Errors
/// Returns [`EvalError::Constraint`] when the constraint rows are rank
/// deficient (then `CCᵀ` has no Cholesky factor) or when the null basis is
/// incomplete.
pub fn project_equality(t: f64, equality: &LinearModel) -> Result<LinearModel, EvalError> {
    let c = &equality.dfdu;
    let m = c.nrows();
    let nu = c.ncols();
    debug_assert!(m > 0, "projection of an empty constraint");

    let rank_err = || EvalError::Constraint {
        time: t,
        message: format!("state-input equality rows are rank deficient ({m} rows, {nu} inputs)"),
    };

    if m > nu {
        return Err(rank_err());
    }

    // Right pseudo-inverse through the Cholesky factor of CCᵀ.
    let gram = c * c.transpose();
    let chol = gram.cholesky().ok_or_else(rank_err)?;
    let c_pinv = c.transpose() * chol.inverse();
    if !c_pinv.iter().all(|v| v.is_finite()) {
        return Err(rank_err());
    }

    // Orthonormal null basis from the projector I − C⁺C.
    let projector = DMatrix::identity(nu, nu) - &c_pinv * c;
    let basis = orthonormal_columns(&projector, nu - m).ok_or_else(rank_err)?;

    Ok(LinearModel {
        f: -(&c_pinv * &equality.f),
        dfdx: -(&c_pinv * &equality.dfdx),
        dfdu: basis,
    })
}

/// Modified Gram–Schmidt over the columns of `m`, keeping the first `count`
/// independent directions.
fn orthonormal_columns(m: &DMatrix<f64>, count: usize) -> Option<DMatrix<f64>> {
    let mut basis = DMatrix::zeros(m.nrows(), count);
    let mut kept = 0;
    for j in 0..m.ncols() {
        if kept == count {
            break;
        }
        let mut v = m.column(j).clone_owned();
        for k in 0..kept {
            let proj = basis.column(k).dot(&v);
            v -= proj * basis.column(k).clone_owned();
        }
        let norm = v.norm();
        if norm > NULL_BASIS_TOL {
            basis.column_mut(kept).copy_from(&(v / norm));
            kept += 1;
        }
    }
    (kept == count).then_some(basis)
}

// ---------------------------------------------------------------------------
// Change of input variables
// ---------------------------------------------------------------------------

/// Substitute `δu = Pf + Pdx·δx + Pdu·δũ` into an affine model of the stage
/// dynamics (or any linear constraint in `δu`).
pub fn substitute_input_linear(model: &mut LinearModel, projection: &LinearModel) {
    let b = model.dfdu.clone();
    model.f += &b * &projection.f;
    model.dfdx += &b * &projection.dfdx;
    model.dfdu = &b * &projection.dfdu;
}

/// Substitute `δu = Pf + Pdx·δx + Pdu·δũ` into a quadratic cost expansion.
pub fn substitute_input_quadratic(model: &mut QuadraticModel, projection: &LinearModel) {
    let u0 = &projection.f;
    let px = &projection.dfdx;
    let pu = &projection.dfdu;

    // Gradient of the original expansion along the shifted input.
    let dfdu_shifted: DVector<f64> = &model.dfdu + &model.dfduu * u0;

    let f = model.f + model.dfdu.dot(u0) + 0.5 * u0.dot(&(&model.dfduu * u0));
    let dfdx =
        &model.dfdx + px.transpose() * &dfdu_shifted + model.dfdux.transpose() * u0;
    let dfdu = pu.transpose() * &dfdu_shifted;

    let mixed = &model.dfdux + &model.dfduu * px; // ∂²/∂ũ-free mixed block
    let dfdxx = &model.dfdxx
        + px.transpose() * &model.dfdux
        + model.dfdux.transpose() * px
        + px.transpose() * &model.dfduu * px;
    let dfduu = pu.transpose() * &model.dfduu * pu;
    let dfdux = pu.transpose() * &mixed;

    model.f = f;
    model.dfdx = dfdx;
    model.dfdu = dfdu;
    model.dfdxx = dfdxx;
    model.dfduu = dfduu;
    model.dfdux = dfdux;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
