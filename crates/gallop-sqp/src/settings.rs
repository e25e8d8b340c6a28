//! Solver configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gallop_core::integrator::IntegratorType;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_n_threads() -> usize {
    4
}
const fn default_dt() -> f64 {
    0.01
}
const fn default_sqp_iteration() -> usize {
    10
}
const fn default_inequality_delta() -> f64 {
    1e-6
}
const fn default_alpha_decay() -> f64 {
    0.5
}
const fn default_alpha_min() -> f64 {
    1e-4
}
const fn default_gamma_c() -> f64 {
    1e-6
}
const fn default_g_max() -> f64 {
    1e6
}
const fn default_g_min() -> f64 {
    1e-6
}
const fn default_cost_tol() -> f64 {
    1e-4
}
const fn default_delta_tol() -> f64 {
    1e-6
}
const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// SQP solver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Worker count including the calling thread. Values below 1 are
    /// treated as 1.
    #[serde(default = "default_n_threads")]
    pub n_threads: usize,

    /// OS priority hint for pool threads. Advisory; ignored on platforms
    /// without the concept.
    #[serde(default)]
    pub thread_priority: Option<i32>,

    /// Nominal time-grid spacing in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Outer-loop iteration cap.
    #[serde(default = "default_sqp_iteration")]
    pub sqp_iteration: usize,

    /// Integration scheme for dynamics and sensitivities.
    #[serde(default)]
    pub integrator_type: IntegratorType,

    /// Eliminate state-input equality constraints by projection. Forced off
    /// when no constraint provider is installed.
    #[serde(default = "default_true")]
    pub project_state_input_equality_constraints: bool,

    /// Relaxed-barrier weight; the penalty is built only when a constraint
    /// provider exists and this is positive.
    #[serde(default)]
    pub inequality_constraint_mu: f64,

    /// Relaxed-barrier relaxation threshold.
    #[serde(default = "default_inequality_delta")]
    pub inequality_constraint_delta: f64,

    /// Emit a linear feedback controller instead of feedforward only.
    #[serde(default)]
    pub use_feedback_policy: bool,

    /// Line-search step shrink factor, in `(0, 1)`.
    #[serde(default = "default_alpha_decay")]
    pub alpha_decay: f64,

    /// Smallest step length tried before declaring no descent.
    #[serde(default = "default_alpha_min")]
    pub alpha_min: f64,

    /// Filter mixing constant, in `(0, 1)`.
    #[serde(default = "default_gamma_c")]
    pub gamma_c: f64,

    /// Constraint violations above this are rejected unconditionally.
    #[serde(default = "default_g_max")]
    pub g_max: f64,

    /// Violations below this count as feasible for the filter.
    #[serde(default = "default_g_min")]
    pub g_min: f64,

    /// Merit-improvement convergence tolerance.
    #[serde(default = "default_cost_tol")]
    pub cost_tol: f64,

    /// Step-norm convergence tolerance.
    #[serde(default = "default_delta_tol")]
    pub delta_tol: f64,

    /// Log per-iteration solver status.
    #[serde(default)]
    pub print_solver_status: bool,

    /// Log every line-search trial.
    #[serde(default)]
    pub print_linesearch: bool,

    /// Log the benchmark summary at the end of each run.
    #[serde(default)]
    pub print_solver_statistics: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            n_threads: default_n_threads(),
            thread_priority: None,
            dt: default_dt(),
            sqp_iteration: default_sqp_iteration(),
            integrator_type: IntegratorType::default(),
            project_state_input_equality_constraints: true,
            inequality_constraint_mu: 0.0,
            inequality_constraint_delta: default_inequality_delta(),
            use_feedback_policy: false,
            alpha_decay: default_alpha_decay(),
            alpha_min: default_alpha_min(),
            gamma_c: default_gamma_c(),
            g_max: default_g_max(),
            g_min: default_g_min(),
            cost_tol: default_cost_tol(),
            delta_tol: default_delta_tol(),
            print_solver_status: false,
            print_linesearch: false,
            print_solver_statistics: false,
        }
    }
}

impl Settings {
    /// Parse settings from a TOML string.
    ///
    /// # Errors
    /// Returns [`SettingsError`] on parse or validation failure.
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    /// Returns [`SettingsError`] on IO, parse or validation failure.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Validate parameter ranges.
    ///
    /// # Errors
    /// Returns [`SettingsError::InvalidValue`] on out-of-range parameters.
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn check(ok: bool, field: &'static str, message: &'static str) -> Result<(), SettingsError> {
            if ok {
                Ok(())
            } else {
                Err(SettingsError::InvalidValue { field, message })
            }
        }

        check(self.dt > 0.0, "dt", "must be positive")?;
        check(self.sqp_iteration >= 1, "sqp_iteration", "must be at least 1")?;
        check(
            self.alpha_decay > 0.0 && self.alpha_decay < 1.0,
            "alpha_decay",
            "must lie in (0, 1)",
        )?;
        check(self.alpha_min > 0.0, "alpha_min", "must be positive")?;
        check(
            self.gamma_c > 0.0 && self.gamma_c < 1.0,
            "gamma_c",
            "must lie in (0, 1)",
        )?;
        check(self.g_min > 0.0, "g_min", "must be positive")?;
        check(self.g_max > self.g_min, "g_max", "must exceed g_min")?;
        check(self.cost_tol > 0.0, "cost_tol", "must be positive")?;
        check(self.delta_tol > 0.0, "delta_tol", "must be positive")?;
        check(
            self.inequality_constraint_mu >= 0.0,
            "inequality_constraint_mu",
            "must be nonnegative",
        )?;
        check(
            self.inequality_constraint_delta > 0.0,
            "inequality_constraint_delta",
            "must be positive",
        )?;
        Ok(())
    }

    /// Effective worker count: `n_threads` clamped to at least 1.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.n_threads.max(1)
    }
}

// ---------------------------------------------------------------------------
// SettingsError
// ---------------------------------------------------------------------------

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let s = Settings::from_toml_str(
            r#"
            n_threads = 2
            dt = 0.05
            sqp_iteration = 3
            integrator_type = "rk4"
            use_feedback_policy = true
            "#,
        )
        .unwrap();
        assert_eq!(s.n_threads, 2);
        assert_eq!(s.sqp_iteration, 3);
        assert_eq!(s.integrator_type, IntegratorType::Rk4);
        assert!(s.use_feedback_policy);
        // Unspecified keys fall back to defaults.
        assert_eq!(s.alpha_decay, default_alpha_decay());
    }

    #[test]
    fn rejects_bad_values() {
        let err = Settings {
            dt: -1.0,
            ..Settings::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { field: "dt", .. }));

        let err = Settings {
            g_max: 1e-9,
            ..Settings::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { field: "g_max", .. }));
    }

    #[test]
    fn zero_threads_clamp_to_one() {
        let s = Settings {
            n_threads: 0,
            ..Settings::default()
        };
        assert_eq!(s.worker_count(), 1);
    }
}
