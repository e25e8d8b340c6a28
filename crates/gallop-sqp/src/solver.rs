//! The multiple-shooting SQP solver.
//!
//! Each `run` discretizes the horizon, then iterates transcribe → solve QP →
//! filter line search until convergence or the iteration cap, and finally
//! synthesizes the primal solution with an optional Riccati feedback
//! controller. The transcription and the line-search performance evaluation
//! fan out over a worker pool; everything else runs on the caller thread.

use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, warn};

use gallop_core::approximation::{LinearModel, QuadraticModel, StageConstraints};
use gallop_core::constraint::Constraint;
use gallop_core::controller::{Controller, FeedforwardController, LinearController};
use gallop_core::cost::{Cost, TerminalCost};
use gallop_core::dynamics::Dynamics;
use gallop_core::error::EvalError;
use gallop_core::interpolation::interpolate;
use gallop_core::penalty::{RelaxedBarrierPenalty, SoftConstraintPenalty};
use gallop_core::performance::PerformanceIndex;
use gallop_core::trajectory::{
    ModeSchedule, OperatingTrajectories, PrimalSolution, ReferenceTrajectory,
};
use gallop_qp::StageQpSolver;

use crate::discretization::{AnnotatedTime, EventKind, interpolation_time, time_discretization};
use crate::error::SolverError;
use crate::pool::{StageCounter, run_parallel};
use crate::settings::Settings;
use crate::stats::SolverBenchmarks;
use crate::transcription::{
    EventTranscription, TerminalTranscription, Transcription, event_performance,
    intermediate_performance, setup_event_node, setup_intermediate_node, setup_terminal_node,
    terminal_performance,
};

// ---------------------------------------------------------------------------
// Assembled subproblem
// ---------------------------------------------------------------------------

/// Per-stage LQ data of the most recent transcription.
///
/// Array lengths for an `N`-interval grid: `dynamics`, `projections` hold
/// `N` entries; `cost`, `constraints` hold `N + 1`.
#[derive(Debug, Default)]
struct Subproblem {
    dynamics: Vec<LinearModel>,
    cost: Vec<QuadraticModel>,
    constraints: Vec<StageConstraints>,
    projections: Vec<LinearModel>,
}

/// Transcription output of a single claimed stage.
enum StageData {
    Intermediate(Transcription),
    Event(EventTranscription),
    Terminal(TerminalTranscription),
}

/// Provider clones handed to one worker.
struct WorkerProviders<'a> {
    dynamics: &'a mut Box<dyn Dynamics>,
    cost: &'a mut Box<dyn Cost>,
    constraint: Option<&'a mut Box<dyn Constraint>>,
    terminal_cost: Option<&'a mut Box<dyn TerminalCost>>,
}

/// Reborrow a worker's constraint provider for a single stage evaluation.
fn reborrow_constraint<'a>(
    constraint: &'a mut Option<&mut Box<dyn Constraint>>,
) -> Option<&'a mut dyn Constraint> {
    match constraint {
        Some(c) => Some(&mut ***c),
        None => None,
    }
}

/// Reborrow a worker's terminal-cost provider for a single stage evaluation.
fn reborrow_terminal_cost<'a>(
    terminal_cost: &'a mut Option<&mut Box<dyn TerminalCost>>,
) -> Option<&'a mut dyn TerminalCost> {
    match terminal_cost {
        Some(c) => Some(&mut ***c),
        None => None,
    }
}

fn worker_contexts<'a>(
    dynamics: &'a mut [Box<dyn Dynamics>],
    cost: &'a mut [Box<dyn Cost>],
    constraints: Option<&'a mut Vec<Box<dyn Constraint>>>,
    terminal_cost: Option<&'a mut Vec<Box<dyn TerminalCost>>>,
) -> Vec<WorkerProviders<'a>> {
    let workers = dynamics.len();
    let constraint_refs: Vec<Option<&'a mut Box<dyn Constraint>>> = match constraints {
        Some(v) => v.iter_mut().map(Some).collect(),
        None => (0..workers).map(|_| None).collect(),
    };
    let terminal_refs: Vec<Option<&'a mut Box<dyn TerminalCost>>> = match terminal_cost {
        Some(v) => v.iter_mut().map(Some).collect(),
        None => (0..workers).map(|_| None).collect(),
    };

    dynamics
        .iter_mut()
        .zip(cost.iter_mut())
        .zip(constraint_refs)
        .zip(terminal_refs)
        .map(|(((dynamics, cost), constraint), terminal_cost)| WorkerProviders {
            dynamics,
            cost,
            constraint,
            terminal_cost,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SqpSolver
// ---------------------------------------------------------------------------

/// Nonlinear MPC solver based on multiple-shooting SQP.
///
/// The solver owns one clone of every provider per worker (evaluations never
/// contend on provider state), the operating-trajectories provider, and the
/// structured QP back-end. Providers passed in are cloned; the originals
/// stay with the caller.
pub struct SqpSolver {
    settings: Settings,
    dynamics: Vec<Box<dyn Dynamics>>,
    cost: Vec<Box<dyn Cost>>,
    constraints: Option<Vec<Box<dyn Constraint>>>,
    terminal_cost: Option<Vec<Box<dyn TerminalCost>>>,
    operating_trajectories: Box<dyn OperatingTrajectories>,
    penalty: Option<SoftConstraintPenalty>,
    qp: StageQpSolver,
    reference: ReferenceTrajectory,
    mode_schedule: ModeSchedule,
    subproblem: Subproblem,
    primal_solution: PrimalSolution,
    performance_log: Vec<PerformanceIndex>,
    total_iterations: usize,
    benchmarks: SolverBenchmarks,
}

impl SqpSolver {
    /// Create a solver from the mandatory providers.
    ///
    /// Constraint and terminal-cost providers are optional; install them
    /// with [`with_constraint`](Self::with_constraint) and
    /// [`with_terminal_cost`](Self::with_terminal_cost).
    #[must_use]
    pub fn new(
        settings: Settings,
        dynamics: &dyn Dynamics,
        cost: &dyn Cost,
        operating_trajectories: &dyn OperatingTrajectories,
    ) -> Self {
        let workers = settings.worker_count();
        Self {
            dynamics: (0..workers).map(|_| dynamics.clone_boxed()).collect(),
            cost: (0..workers).map(|_| cost.clone_boxed()).collect(),
            constraints: None,
            terminal_cost: None,
            operating_trajectories: operating_trajectories.clone_boxed(),
            penalty: None,
            qp: StageQpSolver::new(),
            reference: ReferenceTrajectory::default(),
            mode_schedule: ModeSchedule::default(),
            subproblem: Subproblem::default(),
            primal_solution: PrimalSolution::default(),
            performance_log: Vec::new(),
            total_iterations: 0,
            benchmarks: SolverBenchmarks::default(),
            settings,
        }
    }

    /// Install a constraint provider. Also builds the relaxed-barrier
    /// penalty when `inequality_constraint_mu > 0`.
    #[must_use]
    pub fn with_constraint(mut self, constraint: &dyn Constraint) -> Self {
        let workers = self.settings.worker_count();
        self.constraints = Some((0..workers).map(|_| constraint.clone_boxed()).collect());
        if self.settings.inequality_constraint_mu > 0.0 {
            self.penalty = Some(SoftConstraintPenalty::new(RelaxedBarrierPenalty::new(
                self.settings.inequality_constraint_mu,
                self.settings.inequality_constraint_delta,
            )));
        }
        self
    }

    /// Install a terminal-cost provider.
    #[must_use]
    pub fn with_terminal_cost(mut self, terminal_cost: &dyn TerminalCost) -> Self {
        let workers = self.settings.worker_count();
        self.terminal_cost = Some((0..workers).map(|_| terminal_cost.clone_boxed()).collect());
        self
    }

    /// Solver settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the cost tracking targets used by every cost evaluation.
    pub fn set_reference_trajectory(&mut self, reference: ReferenceTrajectory) {
        self.reference = reference;
    }

    /// Replace the mode schedule; its event times shape the next grid. The
    /// schedule is snapshotted once per [`run`](Self::run).
    pub fn set_mode_schedule(&mut self, schedule: ModeSchedule) {
        self.mode_schedule = schedule;
    }

    /// The most recent primal solution.
    #[must_use]
    pub fn primal_solution(&self) -> &PrimalSolution {
        &self.primal_solution
    }

    /// Per-iteration performance history of the most recent run.
    ///
    /// # Errors
    /// Returns [`SolverError::EmptyIterationLog`] before the first solve.
    pub fn iterations_log(&self) -> Result<&[PerformanceIndex], SolverError> {
        if self.performance_log.is_empty() {
            return Err(SolverError::EmptyIterationLog);
        }
        Ok(&self.performance_log)
    }

    /// Outer iterations taken since construction or [`reset`](Self::reset).
    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    /// Per-phase timing summary.
    #[must_use]
    pub fn benchmark_summary(&self) -> String {
        self.benchmarks.summary(self.total_iterations)
    }

    /// Drop the solution, iteration log and timers; the next run cold
    /// starts.
    pub fn reset(&mut self) {
        self.primal_solution = PrimalSolution::default();
        self.performance_log.clear();
        self.total_iterations = 0;
        self.benchmarks.reset();
    }

    // -----------------------------------------------------------------------
    // Outer loop
    // -----------------------------------------------------------------------

    /// Solve the horizon `[t0, tf]` from the measured state `x0`.
    ///
    /// Blocks the caller for the whole SQP loop. On success the primal
    /// solution and iteration log are updated; on failure the previous
    /// primal solution is left untouched.
    ///
    /// # Errors
    /// See [`SolverError`].
    pub fn run(&mut self, t0: f64, x0: &DVector<f64>, tf: f64) -> Result<(), SolverError> {
        if !(tf > t0) {
            return Err(SolverError::InvalidHorizon { t0, tf });
        }
        let announce = self.settings.print_solver_status || self.settings.print_linesearch;
        if announce {
            info!(t0, tf, "SQP solver starting");
        }

        // One schedule snapshot per run.
        let schedule = self.mode_schedule.clone();
        let grid = time_discretization(t0, tf, self.settings.dt, &schedule.event_times);

        let mut x = self.initialize_state_trajectory(x0, &grid);
        let mut u = self.initialize_input_trajectory(&grid, &x)?;

        self.performance_log.clear();
        let mut converged = false;
        for iteration in 0..self.settings.sqp_iteration {
            if self.settings.print_solver_status {
                info!(iteration, "SQP iteration");
            }

            let started = Instant::now();
            let baseline = self.setup_quadratic_subproblem(&grid, x0, &x, &u)?;
            self.benchmarks.lq_approximation.add(started.elapsed());
            self.performance_log.push(baseline);

            let started = Instant::now();
            let dx0 = x0 - &x[0];
            let (dx, du) = self.solve_subproblem(&dx0)?;
            self.benchmarks.solve_qp.add(started.elapsed());

            let started = Instant::now();
            converged = self.take_step(baseline, &grid, x0, &dx, &du, &mut x, &mut u)?;
            self.benchmarks.line_search.add(started.elapsed());

            self.total_iterations += 1;
            if converged {
                break;
            }
        }

        let started = Instant::now();
        self.set_primal_solution(&grid, x, u, schedule);
        self.benchmarks.compute_controller.add(started.elapsed());

        if announce {
            info!(converged, iterations = self.performance_log.len(), "SQP solver terminated");
        }
        if self.settings.print_solver_statistics {
            info!("{}", self.benchmark_summary());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// First call: hold the measured state. Warm starts: pin the first node
    /// to the measured state and interpolate the previous solution
    /// elsewhere.
    fn initialize_state_trajectory(
        &self,
        x0: &DVector<f64>,
        grid: &[AnnotatedTime],
    ) -> Vec<DVector<f64>> {
        if self.total_iterations == 0 {
            return vec![x0.clone(); grid.len()];
        }
        let previous = &self.primal_solution;
        let mut x = Vec::with_capacity(grid.len());
        // Force the linearization of the first node around the measured
        // state.
        x.push(x0.clone());
        for node in &grid[1..] {
            x.push(interpolate(
                interpolation_time(node),
                &previous.time_trajectory,
                &previous.state_trajectory,
            ));
        }
        x
    }

    /// Inputs come from the previous controller where it covers the grid,
    /// and from the operating-trajectories provider beyond it.
    fn initialize_input_trajectory(
        &mut self,
        grid: &[AnnotatedTime],
        x: &[DVector<f64>],
    ) -> Result<Vec<DVector<f64>>, SolverError> {
        let n = grid.len() - 1;
        let covered_until = if self.total_iterations > 0 {
            *self
                .primal_solution
                .time_trajectory
                .last()
                .expect("warm start implies a previous solution")
        } else {
            grid[0].time
        };

        let mut u = Vec::with_capacity(n);
        for i in 0..n {
            let ti = interpolation_time(&grid[i]);
            if ti < covered_until {
                u.push(self.primal_solution.controller.compute_input(ti, &x[i]));
            } else {
                let t_next = grid[i + 1].time;
                let segment = self.operating_trajectories.segment(&x[i], ti, t_next)?;
                let first = segment.inputs.first().cloned().ok_or_else(|| {
                    EvalError::OperatingTrajectory {
                        from: ti,
                        to: t_next,
                        message: "provider returned an empty segment".into(),
                    }
                })?;
                u.push(first);
            }
        }
        Ok(u)
    }

    // -----------------------------------------------------------------------
    // Transcription (parallel)
    // -----------------------------------------------------------------------

    /// Assemble the LQ subproblem around `(x, u)` and return its
    /// performance index.
    fn setup_quadratic_subproblem(
        &mut self,
        grid: &[AnnotatedTime],
        initial_state: &DVector<f64>,
        x: &[DVector<f64>],
        u: &[DVector<f64>],
    ) -> Result<PerformanceIndex, SolverError> {
        let n = grid.len() - 1;
        let Self {
            settings,
            dynamics,
            cost,
            constraints,
            terminal_cost,
            penalty,
            reference,
            subproblem,
            ..
        } = self;
        let project =
            settings.project_state_input_equality_constraints && constraints.is_some();
        let integrator = settings.integrator_type;
        let penalty = penalty.as_ref();
        let reference: &ReferenceTrajectory = reference;

        let slots: Vec<OnceLock<StageData>> = (0..=n).map(|_| OnceLock::new()).collect();
        let counter = StageCounter::new(n);
        let failed = AtomicBool::new(false);
        let failure: Mutex<Option<EvalError>> = Mutex::new(None);

        let contexts = worker_contexts(
            dynamics,
            cost,
            constraints.as_mut(),
            terminal_cost.as_mut(),
        );

        let worker_performance = run_parallel(contexts, |_, mut ctx| {
            let mut local = PerformanceIndex::default();
            while !failed.load(Ordering::Relaxed) {
                let Some(i) = counter.claim() else { break };
                let constraint = reborrow_constraint(&mut ctx.constraint);
                let outcome: Result<(), EvalError> = (|| {
                    if i == n {
                        let terminal = reborrow_terminal_cost(&mut ctx.terminal_cost);
                        let data = setup_terminal_node(
                            terminal,
                            constraint,
                            reference,
                            grid[n].time,
                            &x[n],
                        )?;
                        local += data.performance;
                        let _ = slots[n].set(StageData::Terminal(data));
                    } else if grid[i].event == EventKind::PreEvent {
                        let data = setup_event_node(
                            &mut **ctx.dynamics,
                            None,
                            constraint,
                            reference,
                            grid[i].time,
                            &x[i],
                            &x[i + 1],
                        )?;
                        local += data.performance;
                        let _ = slots[i].set(StageData::Event(data));
                    } else {
                        let ti = grid[i].time;
                        let dt = grid[i + 1].time - ti;
                        let data = setup_intermediate_node(
                            &mut **ctx.dynamics,
                            integrator,
                            &mut **ctx.cost,
                            constraint,
                            penalty,
                            project,
                            reference,
                            ti,
                            dt,
                            &x[i],
                            &x[i + 1],
                            &u[i],
                        )?;
                        local += data.performance;
                        let _ = slots[i].set(StageData::Intermediate(data));
                    }
                    Ok(())
                })();
                if let Err(e) = outcome {
                    let mut slot = failure.lock().expect("failure slot poisoned");
                    slot.get_or_insert(e);
                    failed.store(true, Ordering::Relaxed);
                    break;
                }
            }
            local
        });

        if let Some(error) = failure.into_inner().expect("failure slot poisoned") {
            return Err(error.into());
        }

        // Repack the slots into the per-stage arrays.
        subproblem.dynamics.clear();
        subproblem.cost.clear();
        subproblem.constraints.clear();
        subproblem.projections.clear();
        for (i, slot) in slots.into_iter().enumerate() {
            match slot.into_inner().expect("stage transcribed exactly once") {
                StageData::Intermediate(data) => {
                    subproblem.dynamics.push(data.dynamics);
                    subproblem.cost.push(data.cost);
                    subproblem.constraints.push(data.constraints);
                    subproblem.projections.push(data.projection);
                }
                StageData::Event(data) => {
                    subproblem.dynamics.push(data.dynamics);
                    subproblem.cost.push(data.cost);
                    subproblem.constraints.push(data.constraints);
                    subproblem.projections.push(LinearModel::absent(x[i].len()));
                }
                StageData::Terminal(data) => {
                    subproblem.cost.push(data.cost);
                    subproblem.constraints.push(data.constraints);
                }
            }
        }

        // Deterministic left-fold over worker id, then the initial-state gap.
        let mut total = PerformanceIndex::default();
        for local in worker_performance {
            total += local;
        }
        total.state_eq_ise += (initial_state - &x[0]).norm_squared();
        total.update_merit();
        Ok(total)
    }

    /// Evaluation-only twin of the assembly loop, used by the line search.
    fn compute_performance(
        &mut self,
        grid: &[AnnotatedTime],
        initial_state: &DVector<f64>,
        x: &[DVector<f64>],
        u: &[DVector<f64>],
    ) -> Result<PerformanceIndex, SolverError> {
        let n = grid.len() - 1;
        let Self {
            settings,
            dynamics,
            cost,
            constraints,
            terminal_cost,
            penalty,
            reference,
            ..
        } = self;
        let integrator = settings.integrator_type;
        let penalty = penalty.as_ref();
        let reference: &ReferenceTrajectory = reference;

        let counter = StageCounter::new(n);
        let failed = AtomicBool::new(false);
        let failure: Mutex<Option<EvalError>> = Mutex::new(None);

        let contexts = worker_contexts(
            dynamics,
            cost,
            constraints.as_mut(),
            terminal_cost.as_mut(),
        );

        let worker_performance = run_parallel(contexts, |_, mut ctx| {
            let mut local = PerformanceIndex::default();
            while !failed.load(Ordering::Relaxed) {
                let Some(i) = counter.claim() else { break };
                let constraint = reborrow_constraint(&mut ctx.constraint);
                let outcome: Result<PerformanceIndex, EvalError> = if i == n {
                    let terminal = reborrow_terminal_cost(&mut ctx.terminal_cost);
                    terminal_performance(terminal, constraint, reference, grid[n].time, &x[n])
                } else if grid[i].event == EventKind::PreEvent {
                    event_performance(
                        &mut **ctx.dynamics,
                        None,
                        constraint,
                        reference,
                        grid[i].time,
                        &x[i],
                        &x[i + 1],
                    )
                } else {
                    let ti = grid[i].time;
                    intermediate_performance(
                        &mut **ctx.dynamics,
                        integrator,
                        &mut **ctx.cost,
                        constraint,
                        penalty,
                        reference,
                        ti,
                        grid[i + 1].time - ti,
                        &x[i],
                        &x[i + 1],
                        &u[i],
                    )
                };
                match outcome {
                    Ok(stage) => local += stage,
                    Err(e) => {
                        let mut slot = failure.lock().expect("failure slot poisoned");
                        slot.get_or_insert(e);
                        failed.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
            local
        });

        if let Some(error) = failure.into_inner().expect("failure slot poisoned") {
            return Err(error.into());
        }

        let mut total = PerformanceIndex::default();
        for local in worker_performance {
            total += local;
        }
        total.state_eq_ise += (initial_state - &x[0]).norm_squared();
        total.update_merit();
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // QP solve
    // -----------------------------------------------------------------------

    /// Solve the assembled subproblem and re-map reduced inputs to full
    /// inputs through the stored projections.
    #[allow(clippy::type_complexity)]
    fn solve_subproblem(
        &mut self,
        dx0: &DVector<f64>,
    ) -> Result<(Vec<DVector<f64>>, Vec<DVector<f64>>), SolverError> {
        let sub = &self.subproblem;
        let has_constraints = sub.constraints.iter().any(|c| !c.is_empty());
        let constraints = has_constraints.then_some(sub.constraints.as_slice());

        let solution = self.qp.solve(dx0, &sub.dynamics, &sub.cost, constraints)?;
        let (dx, mut du) = (solution.delta_x, solution.delta_u);

        for (i, projection) in sub.projections.iter().enumerate() {
            if !projection.is_empty() {
                du[i] = &projection.f + &projection.dfdx * &dx[i] + &projection.dfdu * &du[i];
            }
        }
        Ok((dx, du))
    }

    // -----------------------------------------------------------------------
    // Filter line search
    // -----------------------------------------------------------------------

    /// Try step lengths `1, α_decay, α_decay², …` against the filter rule.
    /// Returns whether the outer loop should stop.
    #[allow(clippy::too_many_arguments)]
    fn take_step(
        &mut self,
        baseline: PerformanceIndex,
        grid: &[AnnotatedTime],
        initial_state: &DVector<f64>,
        dx: &[DVector<f64>],
        du: &[DVector<f64>],
        x: &mut Vec<DVector<f64>>,
        u: &mut Vec<DVector<f64>>,
    ) -> Result<bool, SolverError> {
        let alpha_decay = self.settings.alpha_decay;
        let alpha_min = self.settings.alpha_min;
        let gamma_c = self.settings.gamma_c;
        let g_max = self.settings.g_max;
        let g_min = self.settings.g_min;
        let cost_tol = self.settings.cost_tol;
        let delta_tol = self.settings.delta_tol;
        let print_linesearch = self.settings.print_linesearch;

        let baseline_violation = baseline.constraint_violation();
        let dx_norm = trajectory_norm(dx);
        let du_norm = trajectory_norm(du);
        if print_linesearch {
            debug!(baseline = %baseline, "line search");
        }

        let mut alpha: f64 = 1.0;
        loop {
            // Candidate trajectories; event stages keep their input.
            let x_new: Vec<DVector<f64>> = x
                .iter()
                .zip(dx)
                .map(|(xi, step)| xi + alpha * step)
                .collect();
            let u_new: Vec<DVector<f64>> = u
                .iter()
                .zip(du)
                .map(|(ui, step)| {
                    if step.is_empty() {
                        ui.clone()
                    } else {
                        ui + alpha * step
                    }
                })
                .collect();

            let candidate = self.compute_performance(grid, initial_state, &x_new, &u_new)?;
            let violation = candidate.constraint_violation();

            // A non-finite candidate is an unconditional rejection.
            let accepted = candidate.is_finite()
                && if violation > g_max {
                    false
                } else if violation < g_min {
                    // Low violation: pure merit descent.
                    candidate.merit < baseline.merit
                } else {
                    // Medium violation: either merit or constraints improve.
                    candidate.merit < baseline.merit - gamma_c * baseline_violation
                        || violation < (1.0 - gamma_c) * baseline_violation
                };

            if print_linesearch {
                debug!(
                    alpha,
                    accepted,
                    step_x = alpha * dx_norm,
                    step_u = alpha * du_norm,
                    candidate = %candidate,
                    "line search trial"
                );
            }

            let step_below_tol =
                alpha * du_norm < delta_tol && alpha * dx_norm < delta_tol;

            if accepted {
                *x = x_new;
                *u = u_new;
                let improvement_below_tol =
                    (baseline.merit - candidate.merit).abs() < cost_tol && violation < g_min;
                return Ok(step_below_tol || improvement_below_tol);
            }
            if step_below_tol {
                // Steps too small to matter without being acceptable.
                if print_linesearch {
                    debug!("step size below tolerance, declaring convergence");
                }
                return Ok(true);
            }

            alpha *= alpha_decay;
            if alpha < alpha_min {
                // No descent direction found.
                return Ok(true);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Solution builder
    // -----------------------------------------------------------------------

    /// Finalize the trajectory and synthesize the controller.
    fn set_primal_solution(
        &mut self,
        grid: &[AnnotatedTime],
        x: Vec<DVector<f64>>,
        mut u: Vec<DVector<f64>>,
        schedule: ModeSchedule,
    ) {
        let n = grid.len() - 1;
        let times: Vec<f64> = grid.iter().map(|node| node.time).collect();

        // Feedback synthesis must read u and x before they move.
        let gains = if self.settings.use_feedback_policy {
            let gains = self.qp.riccati_feedback();
            if gains.is_none() {
                warn!(
                    "feedback policy requested but the QP back-end exposes no Riccati gains; \
                     emitting a feedforward controller"
                );
            }
            gains
        } else {
            None
        };

        let linear = gains.map(|gains| {
            let mut uff: Vec<DVector<f64>> = Vec::with_capacity(n + 1);
            let mut schedule_gains: Vec<DMatrix<f64>> = Vec::with_capacity(n + 1);
            for i in 0..n {
                if grid[i].event == EventKind::PreEvent && !uff.is_empty() {
                    // Inputs are undefined across events; repeat the
                    // previous stage's policy.
                    uff.push(uff[uff.len() - 1].clone());
                    schedule_gains.push(schedule_gains[schedule_gains.len() - 1].clone());
                } else {
                    let projection = &self.subproblem.projections[i];
                    let full_gain = if projection.is_empty() {
                        gains[i].clone()
                    } else {
                        &projection.dfdx + &projection.dfdu * &gains[i]
                    };
                    // u = uff + K·x must recover the nominal input at the
                    // nominal state.
                    let mut ff = u[i].clone();
                    ff -= &full_gain * &x[i];
                    uff.push(ff);
                    schedule_gains.push(full_gain);
                }
            }
            // Duplicate the last entry to match the time base.
            uff.push(uff[uff.len() - 1].clone());
            schedule_gains.push(schedule_gains[schedule_gains.len() - 1].clone());
            LinearController::new(times.clone(), uff, schedule_gains)
        });

        // Equal-length trajectories; inputs at pre-event nodes repeat the
        // preceding interval.
        u.push(u[u.len() - 1].clone());
        for i in 1..=n {
            if grid[i].event == EventKind::PreEvent {
                u[i] = u[i - 1].clone();
            }
        }

        let controller = match linear {
            Some(linear) => Controller::Linear(linear),
            None => Controller::Feedforward(FeedforwardController::new(times.clone(), u.clone())),
        };

        self.primal_solution = PrimalSolution {
            time_trajectory: times,
            state_trajectory: x,
            input_trajectory: u,
            controller,
            mode_schedule: schedule,
        };
    }
}

fn trajectory_norm(v: &[DVector<f64>]) -> f64 {
    v.iter().map(|vi| vi.norm_squared()).sum::<f64>().sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
