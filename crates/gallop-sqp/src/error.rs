use thiserror::Error;

use gallop_core::error::EvalError;
use gallop_qp::QpError;

/// Failures of a solver run. Recovery (relaxed settings, a fresh warm
/// start, abandoning the horizon) is the caller's responsibility; the core
/// never retries.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The QP back-end reported a non-success status; the primal solution
    /// is left untouched.
    #[error("failed to solve the stagewise QP: {0}")]
    Qp(#[from] QpError),

    /// A cloned provider failed during evaluation.
    #[error(transparent)]
    Provider(#[from] EvalError),

    /// The iteration log was queried before any solve.
    #[error("no iterations have been logged; run the solver first")]
    EmptyIterationLog,

    /// `run` was called with a degenerate horizon.
    #[error("invalid horizon: initial time {t0} must precede final time {tf}")]
    InvalidHorizon { t0: f64, tf: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qp_errors_wrap_transparently() {
        let err: SolverError = QpError::NotPositiveDefinite { stage: 3 }.into();
        assert!(err.to_string().contains("stage 3"));
    }

    #[test]
    fn provider_errors_keep_their_message() {
        let err: SolverError = EvalError::Cost {
            time: 0.25,
            message: "nan in weights".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "cost evaluation failed at t=0.25: nan in weights"
        );
    }
}
