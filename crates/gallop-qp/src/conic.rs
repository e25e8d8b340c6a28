//! Conic interior-point bridge for the constrained subproblem.
//!
//! Stacks the stage-structured QP into one sparse problem over
//! `z = [δx₀..δx_N, δu₀..δu_{N-1}]` and hands it to Clarabel. Equality rows
//! (initial state, shooting defects, constraint equalities) go to the zero
//! cone; inequality rows go to the nonnegative cone. Feedback gains are not
//! available on this path.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};

use gallop_core::approximation::{LinearModel, QuadraticModel, StageConstraints};

use crate::dims::StageDims;
use crate::{QpError, QpSolution};

/// Solve the constrained subproblem.
///
/// # Errors
/// Returns [`QpError::Conic`] when the interior-point solver fails to reach
/// an (almost) optimal point.
pub fn solve(
    dx0: &DVector<f64>,
    dynamics: &[LinearModel],
    cost: &[QuadraticModel],
    constraints: &[StageConstraints],
    dims: &[StageDims],
) -> Result<QpSolution, QpError> {
    let n = dynamics.len();

    // Variable offsets: states first, then inputs.
    let mut x_off = Vec::with_capacity(n + 1);
    let mut offset = 0;
    for d in dims {
        x_off.push(offset);
        offset += d.nx;
    }
    let mut u_off = Vec::with_capacity(n);
    for d in dims.iter().take(n) {
        u_off.push(offset);
        offset += d.nu;
    }
    let n_z = offset;

    // Row counts: equalities (initial state + dynamics + constraint
    // equalities) precede inequalities.
    let n_eq = dims[0].nx
        + dims.iter().skip(1).map(|d| d.nx).sum::<usize>()
        + dims.iter().map(|d| d.neq).sum::<usize>();
    let n_ineq = dims.iter().map(|d| d.nineq).sum::<usize>();

    let (p_mat, q_vec) = build_cost(cost, dims, &x_off, &u_off, n_z);
    let (a_all, b_all) = build_constraints(
        dx0,
        dynamics,
        constraints,
        dims,
        &x_off,
        &u_off,
        n_z,
        n_eq,
        n_ineq,
    );

    let p_csc = dmatrix_to_csc_upper_tri(&p_mat);
    let a_csc = dmatrix_to_csc(&a_all);
    let mut cones = Vec::with_capacity(2);
    if n_eq > 0 {
        cones.push(ZeroConeT(n_eq));
    }
    if n_ineq > 0 {
        cones.push(NonnegativeConeT(n_ineq));
    }

    let settings = DefaultSettingsBuilder::default()
        .verbose(false)
        .tol_gap_abs(1e-9)
        .tol_gap_rel(1e-9)
        .tol_feas(1e-9)
        .build()
        .expect("valid solver settings");

    let q_slice: Vec<f64> = q_vec.iter().copied().collect();
    let b_slice: Vec<f64> = b_all.iter().copied().collect();

    let mut solver = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, settings)
        .map_err(|e| QpError::Conic {
            status: format!("setup failed: {e:?}"),
        })?;
    solver.solve();

    let status = solver.solution.status;
    if !matches!(status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
        return Err(QpError::Conic {
            status: format!("{status:?}"),
        });
    }

    // Unstack the primal point.
    let z = &solver.solution.x;
    let delta_x = dims
        .iter()
        .zip(&x_off)
        .map(|(d, &off)| DVector::from_iterator(d.nx, z[off..off + d.nx].iter().copied()))
        .collect();
    let delta_u = dims
        .iter()
        .take(n)
        .zip(&u_off)
        .map(|(d, &off)| DVector::from_iterator(d.nu, z[off..off + d.nu].iter().copied()))
        .collect();

    Ok(QpSolution { delta_x, delta_u })
}

/// Assemble the cost Hessian (full, symmetrized later to upper triangular)
/// and gradient.
fn build_cost(
    cost: &[QuadraticModel],
    dims: &[StageDims],
    x_off: &[usize],
    u_off: &[usize],
    n_z: usize,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut p = DMatrix::zeros(n_z, n_z);
    let mut q = DVector::zeros(n_z);

    for (i, c) in cost.iter().enumerate() {
        let d = dims[i];
        let xo = x_off[i];
        p.view_mut((xo, xo), (d.nx, d.nx)).copy_from(&c.dfdxx);
        q.rows_mut(xo, d.nx).copy_from(&c.dfdx);

        if d.nu > 0 {
            let uo = u_off[i];
            p.view_mut((uo, uo), (d.nu, d.nu)).copy_from(&c.dfduu);
            p.view_mut((uo, xo), (d.nu, d.nx)).copy_from(&c.dfdux);
            p.view_mut((xo, uo), (d.nx, d.nu))
                .copy_from(&c.dfdux.transpose());
            q.rows_mut(uo, d.nu).copy_from(&c.dfdu);
        }
    }
    (p, q)
}

/// Assemble the stacked constraint matrix with equalities on top.
#[allow(clippy::too_many_arguments)]
fn build_constraints(
    dx0: &DVector<f64>,
    dynamics: &[LinearModel],
    constraints: &[StageConstraints],
    dims: &[StageDims],
    x_off: &[usize],
    u_off: &[usize],
    n_z: usize,
    n_eq: usize,
    n_ineq: usize,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut a = DMatrix::zeros(n_eq + n_ineq, n_z);
    let mut b = DVector::zeros(n_eq + n_ineq);
    let mut row = 0;

    // Initial state: δx₀ = dx0.
    for j in 0..dims[0].nx {
        a[(row + j, x_off[0] + j)] = 1.0;
        b[row + j] = dx0[j];
    }
    row += dims[0].nx;

    // Shooting equalities: δxᵢ₊₁ − Aᵢ δxᵢ − Bᵢ δuᵢ = fᵢ.
    for (i, dyn_i) in dynamics.iter().enumerate() {
        let nx_next = dims[i + 1].nx;
        for j in 0..nx_next {
            a[(row + j, x_off[i + 1] + j)] = 1.0;
            b[row + j] = dyn_i.f[j];
        }
        a.view_mut((row, x_off[i]), (nx_next, dims[i].nx))
            .copy_from(&(-&dyn_i.dfdx));
        if dims[i].nu > 0 {
            a.view_mut((row, u_off[i]), (nx_next, dims[i].nu))
                .copy_from(&(-&dyn_i.dfdu));
        }
        row += nx_next;
    }

    // Constraint equalities: dfdx δx + dfdu δu = −f.
    for (i, con) in constraints.iter().enumerate() {
        let eq = &con.equality;
        if eq.is_empty() {
            continue;
        }
        let m = eq.nrows();
        a.view_mut((row, x_off[i]), (m, dims[i].nx)).copy_from(&eq.dfdx);
        if dims[i].nu > 0 && eq.dfdu.ncols() > 0 {
            a.view_mut((row, u_off[i]), (m, dims[i].nu)).copy_from(&eq.dfdu);
        }
        b.rows_mut(row, m).copy_from(&(-&eq.f));
        row += m;
    }
    debug_assert_eq!(row, n_eq, "equality row count mismatch");

    // Inequalities: h = f + dfdx δx + dfdu δu ≥ 0  ⇔  −dfdx δx − dfdu δu ≤ f.
    for (i, con) in constraints.iter().enumerate() {
        let ineq = &con.inequality;
        if ineq.is_empty() {
            continue;
        }
        let m = ineq.nrows();
        a.view_mut((row, x_off[i]), (m, dims[i].nx))
            .copy_from(&(-&ineq.dfdx));
        if dims[i].nu > 0 && ineq.dfdu.ncols() > 0 {
            a.view_mut((row, u_off[i]), (m, dims[i].nu))
                .copy_from(&(-&ineq.dfdu));
        }
        b.rows_mut(row, m).copy_from(&ineq.f);
        row += m;
    }
    debug_assert_eq!(row, n_eq + n_ineq, "total row count mismatch");

    (a, b)
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>`.
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0_usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Convert a symmetric `DMatrix<f64>` to upper-triangular `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0_usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows.saturating_sub(1)) {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::extract_dims;
    use crate::riccati;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    fn lq_problem(n: usize) -> (Vec<LinearModel>, Vec<QuadraticModel>) {
        let a = dmatrix![1.0, 0.1; 0.0, 1.0];
        let b = dmatrix![0.005; 0.1];
        let dynamics: Vec<LinearModel> = (0..n)
            .map(|_| LinearModel {
                f: dvector![0.0, 0.0],
                dfdx: a.clone(),
                dfdu: b.clone(),
            })
            .collect();
        let mut cost: Vec<QuadraticModel> = (0..n)
            .map(|_| {
                let mut c = QuadraticModel::zeros(2, 1);
                c.dfdxx = DMatrix::identity(2, 2);
                c.dfduu = dmatrix![0.1];
                c
            })
            .collect();
        let mut terminal = QuadraticModel::zeros(2, 0);
        terminal.dfdxx = DMatrix::identity(2, 2) * 5.0;
        cost.push(terminal);
        (dynamics, cost)
    }

    #[test]
    fn unconstrained_conic_matches_riccati() {
        let (dynamics, cost) = lq_problem(4);
        let constraints = vec![StageConstraints::empty(2); 5];
        let dims = extract_dims(&dynamics, &cost, Some(&constraints));
        let dx0 = dvector![1.0, -0.5];

        let conic = solve(&dx0, &dynamics, &cost, &constraints, &dims).unwrap();
        let ricc = riccati::solve(&dx0, &dynamics, &cost).unwrap();

        for (a, b) in conic.delta_x.iter().zip(&ricc.delta_x) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-6);
        }
        for (a, b) in conic.delta_u.iter().zip(&ricc.delta_u) {
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn equality_constraints_are_enforced() {
        // Two inputs per stage constrained to sum to zero.
        let n = 3;
        let a = DMatrix::identity(2, 2);
        let b = dmatrix![0.1, 0.0; 0.0, 0.1];
        let dynamics: Vec<LinearModel> = (0..n)
            .map(|_| LinearModel {
                f: dvector![0.1, -0.2],
                dfdx: a.clone(),
                dfdu: b.clone(),
            })
            .collect();
        let mut cost: Vec<QuadraticModel> = (0..n)
            .map(|_| {
                let mut c = QuadraticModel::zeros(2, 2);
                c.dfdxx = DMatrix::identity(2, 2);
                c.dfduu = DMatrix::identity(2, 2) * 0.1;
                c.dfdu = dvector![0.3, -0.1];
                c
            })
            .collect();
        cost.push(QuadraticModel::zeros(2, 0));

        let mut constraints = vec![StageConstraints::empty(2); n + 1];
        for con in constraints.iter_mut().take(n) {
            con.equality = LinearModel {
                f: dvector![0.05],
                dfdx: DMatrix::zeros(1, 2),
                dfdu: dmatrix![1.0, 1.0],
            };
        }

        let dims = extract_dims(&dynamics, &cost, Some(&constraints));
        let out = solve(&dvector![0.5, 0.5], &dynamics, &cost, &constraints, &dims).unwrap();

        for du in &out.delta_u {
            assert_relative_eq!(0.05 + du[0] + du[1], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn inequality_constraints_are_respected() {
        // Scalar input bounded above: h = 1 - u ≥ 0, cost pulls u upward.
        let dynamics = vec![LinearModel {
            f: dvector![0.0],
            dfdx: dmatrix![1.0],
            dfdu: dmatrix![1.0],
        }];
        let mut stage = QuadraticModel::zeros(1, 1);
        stage.dfdxx = dmatrix![1e-6];
        stage.dfduu = dmatrix![1.0];
        stage.dfdu = dvector![-10.0]; // unconstrained optimum at u = 10
        let cost = vec![stage, QuadraticModel::zeros(1, 0)];

        let mut con = StageConstraints::empty(1);
        con.inequality = LinearModel {
            f: dvector![1.0],
            dfdx: DMatrix::zeros(1, 1),
            dfdu: dmatrix![-1.0],
        };
        let constraints = vec![con, StageConstraints::empty(1)];

        let dims = extract_dims(&dynamics, &cost, Some(&constraints));
        let out = solve(&dvector![0.0], &dynamics, &cost, &constraints, &dims).unwrap();

        assert!(out.delta_u[0][0] <= 1.0 + 1e-6);
        assert_relative_eq!(out.delta_u[0][0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn csc_conversion_round_trips_shape() {
        let m = dmatrix![1.0, 0.0; 2.0, 3.0];
        let csc = dmatrix_to_csc(&m);
        assert_eq!(csc.m, 2);
        assert_eq!(csc.n, 2);
        assert_eq!(csc.nzval.len(), 3);

        let upper = dmatrix_to_csc_upper_tri(&m);
        assert_eq!(upper.nzval.len(), 2); // (0,0) and (1,1)
    }
}
