//! Wall-clock benchmarking of the solver phases.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// BenchmarkTimer
// ---------------------------------------------------------------------------

/// Accumulates wall-clock time over repeated measurements of one phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct BenchmarkTimer {
    total: Duration,
    count: u64,
}

impl BenchmarkTimer {
    /// Run `f`, adding its wall-clock duration to the total.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add(start.elapsed());
        out
    }

    /// Record one externally measured duration.
    pub fn add(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.count += 1;
    }

    /// Total measured time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1e3
    }

    /// Average time per measurement in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_ms() / self.count as f64
    }

    /// Number of measurements taken.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Clear all measurements.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// SolverBenchmarks
// ---------------------------------------------------------------------------

/// Timers for the four phases of one SQP iteration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolverBenchmarks {
    /// Parallel linear-quadratic approximation.
    pub lq_approximation: BenchmarkTimer,
    /// Structured QP solve.
    pub solve_qp: BenchmarkTimer,
    /// Filter line search (including performance re-evaluation).
    pub line_search: BenchmarkTimer,
    /// Primal-solution and controller synthesis.
    pub compute_controller: BenchmarkTimer,
}

impl SolverBenchmarks {
    /// Clear all phase timers.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Human-readable per-phase summary over `iterations` SQP iterations.
    #[must_use]
    pub fn summary(&self, iterations: usize) -> String {
        let total = self.lq_approximation.total_ms()
            + self.solve_qp.total_ms()
            + self.line_search.total_ms()
            + self.compute_controller.total_ms();
        let share = |t: &BenchmarkTimer| {
            if total > 0.0 {
                100.0 * t.total_ms() / total
            } else {
                0.0
            }
        };

        let mut out = String::new();
        let _ = writeln!(out, "SQP benchmark over {iterations} iterations:");
        let _ = writeln!(
            out,
            "  LQ approximation   : {:8.3} ms avg  ({:5.1}%)",
            self.lq_approximation.average_ms(),
            share(&self.lq_approximation)
        );
        let _ = writeln!(
            out,
            "  solve QP           : {:8.3} ms avg  ({:5.1}%)",
            self.solve_qp.average_ms(),
            share(&self.solve_qp)
        );
        let _ = writeln!(
            out,
            "  line search        : {:8.3} ms avg  ({:5.1}%)",
            self.line_search.average_ms(),
            share(&self.line_search)
        );
        let _ = write!(
            out,
            "  compute controller : {:8.3} ms avg  ({:5.1}%)",
            self.compute_controller.average_ms(),
            share(&self.compute_controller)
        );
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_accumulates_and_counts() {
        let mut timer = BenchmarkTimer::default();
        let value = timer.measure(|| 42);
        assert_eq!(value, 42);
        timer.measure(|| ());
        assert_eq!(timer.count(), 2);
        assert!(timer.total_ms() >= 0.0);
    }

    #[test]
    fn average_of_empty_timer_is_zero() {
        let timer = BenchmarkTimer::default();
        assert_eq!(timer.average_ms(), 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut bench = SolverBenchmarks::default();
        bench.solve_qp.measure(|| std::thread::sleep(Duration::from_millis(1)));
        assert!(bench.solve_qp.total_ms() > 0.0);
        bench.reset();
        assert_eq!(bench.solve_qp.count(), 0);
    }

    #[test]
    fn summary_mentions_every_phase() {
        let mut bench = SolverBenchmarks::default();
        bench.lq_approximation.measure(|| ());
        let summary = bench.summary(3);
        for phase in ["LQ approximation", "solve QP", "line search", "compute controller"] {
            assert!(summary.contains(phase), "missing {phase} in summary");
        }
        assert!(summary.contains("3 iterations"));
    }
}
