//! Per-stage problem dimensions.

use gallop_core::approximation::{LinearModel, QuadraticModel, StageConstraints};

// ---------------------------------------------------------------------------
// StageDims
// ---------------------------------------------------------------------------

/// Dimensions of one stage of the structured QP.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageDims {
    /// State dimension at this node.
    pub nx: usize,
    /// Input dimension over the following interval (zero at event and
    /// terminal nodes).
    pub nu: usize,
    /// Number of equality constraint rows.
    pub neq: usize,
    /// Number of inequality constraint rows.
    pub nineq: usize,
}

/// Extract per-stage dimensions from an assembled subproblem.
///
/// `dynamics` has `N` entries, `cost` has `N + 1`; the returned vector has
/// `N + 1` entries where the last stage has no input.
///
/// # Panics
/// Panics when the array lengths are inconsistent.
#[must_use]
pub fn extract_dims(
    dynamics: &[LinearModel],
    cost: &[QuadraticModel],
    constraints: Option<&[StageConstraints]>,
) -> Vec<StageDims> {
    let n = dynamics.len();
    assert_eq!(cost.len(), n + 1, "cost must cover every node plus the terminal");
    if let Some(c) = constraints {
        assert_eq!(c.len(), n + 1, "constraints must cover every node plus the terminal");
    }

    let mut dims = Vec::with_capacity(n + 1);
    for (i, dyn_i) in dynamics.iter().enumerate() {
        let (neq, nineq) = constraints.map_or((0, 0), |c| {
            (c[i].equality.nrows(), c[i].inequality.nrows())
        });
        dims.push(StageDims {
            nx: dyn_i.dfdx.ncols(),
            nu: dyn_i.dfdu.ncols(),
            neq,
            nineq,
        });
    }

    // Terminal node: state size comes from the last propagated state.
    let terminal_nx = dynamics
        .last()
        .map_or_else(|| cost[0].nx(), |d| d.f.len());
    let (neq, nineq) = constraints.map_or((0, 0), |c| {
        (c[n].equality.nrows(), c[n].inequality.nrows())
    });
    dims.push(StageDims {
        nx: terminal_nx,
        nu: 0,
        neq,
        nineq,
    });
    dims
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_varying_input_dimensions() {
        let dynamics = vec![
            LinearModel::zeros(2, 2, 1),
            LinearModel::zeros(2, 2, 0), // event stage: no input
        ];
        let cost = vec![
            QuadraticModel::zeros(2, 1),
            QuadraticModel::zeros(2, 0),
            QuadraticModel::zeros(2, 0),
        ];
        let dims = extract_dims(&dynamics, &cost, None);

        assert_eq!(dims.len(), 3);
        assert_eq!(dims[0], StageDims { nx: 2, nu: 1, neq: 0, nineq: 0 });
        assert_eq!(dims[1].nu, 0);
        assert_eq!(dims[2], StageDims { nx: 2, nu: 0, neq: 0, nineq: 0 });
    }

    #[test]
    fn constraint_rows_are_counted() {
        let dynamics = vec![LinearModel::zeros(2, 2, 1)];
        let cost = vec![QuadraticModel::zeros(2, 1), QuadraticModel::zeros(2, 0)];
        let constraints = vec![
            StageConstraints {
                equality: LinearModel::zeros(1, 2, 1),
                inequality: LinearModel::zeros(3, 2, 1),
            },
            StageConstraints::empty(2),
        ];
        let dims = extract_dims(&dynamics, &cost, Some(&constraints));
        assert_eq!(dims[0].neq, 1);
        assert_eq!(dims[0].nineq, 3);
        assert_eq!(dims[1].neq, 0);
    }
}
