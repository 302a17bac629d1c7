//! Backward Euler time stepping with adaptive step size.
//!
//! # Algorithm
//!
//! Each step solves `F(u) = 0` for the state at `t + dt` with damped Newton
//! iteration, starting from the last accepted state. Time-dependent
//! parameters are re-evaluated for every attempt over its window.
//!
//! A failed attempt (Newton divergence, iteration exhaustion, a linear
//! solver breakdown, an observer abort, or a negative solution when that
//! check is enabled) discards the trial state, shrinks `dt` by
//! `dt_decrease_factor` and retries. A step fails with
//! [`ConvergenceFailure`] once restarts are disabled or exhausted, or `dt`
//! would drop below `min_dt` or one tick of the time grid.
//!
//! After an accepted step `dt` grows by `dt_increase_factor`, bounded by
//! `max_dt`. Prescribed `adjust_dt` entries override `dt` once `t` reaches
//! them, and the final step is clipped to land on `final_t` exactly.

use ndarray::Array1;
use reacdiff_core::{Observer, SolverConfig, Ticks};
use reacdiff_solvers::{CsrMatrix, NonlinearProblem, SparseError, newton};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    Error,
    assembly::{AssemblyBackend, Inputs, System},
    model::Runtime,
    parameters::{ParameterTable, StepWindow},
};

/// Lifecycle of a model.
///
/// `Stepping`, `Converged` and `Diverged` are held only while a step runs;
/// between steps a model is `Ready` or, once `final_t` is reached, `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Stepping,
    Converged,
    Diverged,
    Finished,
}

/// Event emitted after every Newton iteration of a step attempt.
#[derive(Debug, Clone, Copy)]
pub struct StepEvent<'a> {
    /// Index of the step being attempted, starting at 1.
    pub step: usize,
    /// Attempt number within the step, starting at 1.
    pub attempt: usize,
    /// Time at the end of the attempt.
    pub t: f64,
    pub dt: f64,
    pub newton: newton::Event<'a>,
}

/// Summary of an accepted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub index: usize,
    /// Time after the step.
    pub t: f64,
    /// Length of the accepted step.
    pub dt: f64,
    pub newton_iters: usize,
    pub linear_iters: usize,
    /// Attempts needed, including the accepted one.
    pub attempts: usize,
    pub residual_norm: f64,
}

/// Why a step attempt was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("Newton iteration ended as {0:?}")]
    NotConverged(newton::Status),

    #[error("linear solve failed: {0}")]
    Linear(String),

    #[error("solution reached {min:e}, below the negative tolerance")]
    Negative { min: f64 },
}

/// A rejected attempt, kept in the model's failure log.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAttempt {
    pub step: usize,
    pub attempt: usize,
    /// Time at the start of the attempt.
    pub t: f64,
    pub dt: f64,
    pub residual_norm: f64,
    pub reason: FailureReason,
}

/// A step that could not be completed.
///
/// The model is left at its last accepted state.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("step {step} at t = {t} failed after {attempts} attempt(s), last dt = {dt}: {reason}")]
pub struct ConvergenceFailure {
    pub step: usize,
    /// Time of the last accepted state.
    pub t: f64,
    pub dt: f64,
    pub attempts: usize,
    pub residual_norm: f64,
    pub reason: FailureReason,
}

/// The implicit system of one step attempt.
pub(crate) struct StepProblem<'a> {
    pub system: &'a System,
    pub backend: &'a dyn AssemblyBackend,
    pub previous: &'a Array1<f64>,
    pub params: &'a ParameterTable,
    pub window: StepWindow,
}

impl StepProblem<'_> {
    fn inputs<'b>(&'b self, u: &'b Array1<f64>) -> Inputs<'b> {
        Inputs {
            u,
            previous: self.previous,
            params: self.params,
            window: self.window,
        }
    }
}

impl NonlinearProblem for StepProblem<'_> {
    type Error = SparseError;

    fn size(&self) -> usize {
        self.system.layout().size()
    }

    fn residual(&self, u: &Array1<f64>) -> Result<Array1<f64>, SparseError> {
        self.system.residual(self.backend, &self.inputs(u))
    }

    fn jacobian(&self, u: &Array1<f64>) -> Result<CsrMatrix, SparseError> {
        self.system.jacobian(self.backend, &self.inputs(u))
    }
}

/// Advances `runtime` by one accepted step.
pub(crate) fn advance<Obs>(
    runtime: &mut Runtime,
    solver: &SolverConfig,
    backend: &dyn AssemblyBackend,
    observer: &mut Obs,
) -> Result<StepReport, Error>
where
    Obs: for<'a> Observer<StepEvent<'a>, newton::Action>,
{
    let grid = runtime.grid;
    let final_t = grid.to_ticks(solver.final_t.unwrap_or(0.0));
    apply_schedule(runtime, solver);

    let index = runtime.step + 1;
    let floor = solver.min_dt.map_or(1, |min| grid.to_ticks(min).max(1));
    let mut dt = runtime.dt;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let length = dt.min(final_t - runtime.t).max(1);
        let window = StepWindow::new(grid.to_time(runtime.t), grid.to_time(runtime.t + length));
        runtime.params.update(window)?;

        let outcome = attempt(runtime, solver, backend, window, (index, attempts), observer)?;
        let (residual_norm, reason) = match outcome {
            Attempt::Accepted(solution) => {
                runtime.u = solution.x;
                runtime.t += length;
                runtime.step = index;
                runtime.dt = grow(dt, solver, &grid);
                let report = StepReport {
                    index,
                    t: grid.to_time(runtime.t),
                    dt: window.dt(),
                    newton_iters: solution.iters,
                    linear_iters: solution.linear_iters,
                    attempts,
                    residual_norm: solution.residual_norm,
                };
                info!(
                    step = index,
                    t = report.t,
                    dt = report.dt,
                    newton_iters = report.newton_iters,
                    attempts,
                    "accepted step"
                );
                return Ok(report);
            }
            Attempt::Rejected {
                residual_norm,
                reason,
            } => (residual_norm, reason),
        };

        runtime.failures.push(FailedAttempt {
            step: index,
            attempt: attempts,
            t: window.start,
            dt: window.dt(),
            residual_norm,
            reason: reason.clone(),
        });
        // Shrink the window that failed, which is shorter than `dt` when
        // clipped at `final_t`.
        #[allow(clippy::cast_possible_truncation)]
        let reduced = (length as f64 * solver.dt_decrease_factor).round() as Ticks;
        let exhausted = !solver.attempt_timestep_restart_on_divergence
            || attempts > solver.max_restart_attempts
            || reduced < floor
            || reduced >= length;
        if exhausted {
            warn!(step = index, attempts, %reason, "giving up on step");
            return Err(ConvergenceFailure {
                step: index,
                t: grid.to_time(runtime.t),
                dt: window.dt(),
                attempts,
                residual_norm,
                reason,
            }
            .into());
        }
        warn!(
            step = index,
            attempt = attempts,
            dt = grid.to_time(reduced),
            %reason,
            "retrying step with a smaller dt"
        );
        dt = reduced;
    }
}

enum Attempt {
    Accepted(newton::Solution),
    Rejected {
        residual_norm: f64,
        reason: FailureReason,
    },
}

fn attempt<Obs>(
    runtime: &Runtime,
    solver: &SolverConfig,
    backend: &dyn AssemblyBackend,
    window: StepWindow,
    (step, attempt): (usize, usize),
    observer: &mut Obs,
) -> Result<Attempt, Error>
where
    Obs: for<'a> Observer<StepEvent<'a>, newton::Action>,
{
    let problem = StepProblem {
        system: &runtime.system,
        backend,
        previous: &runtime.u,
        params: &runtime.params,
        window,
    };
    let observe = |event: &newton::Event<'_>| {
        observer.observe(&StepEvent {
            step,
            attempt,
            t: window.end,
            dt: window.dt(),
            newton: *event,
        })
    };
    let solution = match newton::solve(&problem, runtime.u.clone(), &runtime.newton, observe) {
        Ok(solution) => solution,
        Err(e @ (newton::Error::Linear { .. } | newton::Error::Preconditioner { .. })) => {
            return Ok(Attempt::Rejected {
                residual_norm: f64::NAN,
                reason: FailureReason::Linear(e.to_string()),
            });
        }
        Err(e) => return Err(Error::Solver(e)),
    };
    if !solution.status.is_converged() {
        return Ok(Attempt::Rejected {
            residual_norm: solution.residual_norm,
            reason: FailureReason::NotConverged(solution.status),
        });
    }

    let mut solution = solution;
    if solver.reset_timestep_for_negative_solution {
        let min = solution.x.iter().copied().fold(f64::INFINITY, f64::min);
        if min < -solver.negative_tolerance {
            return Ok(Attempt::Rejected {
                residual_norm: solution.residual_norm,
                reason: FailureReason::Negative { min },
            });
        }
        solution.x.mapv_inplace(|v| v.max(0.0));
    }
    debug!(
        step,
        attempt,
        iters = solution.iters,
        residual = solution.residual_norm,
        "Newton converged"
    );
    Ok(Attempt::Accepted(solution))
}

/// Applies every prescribed `(t, dt)` entry that `t` has reached.
fn apply_schedule(runtime: &mut Runtime, solver: &SolverConfig) {
    let grid = runtime.grid;
    while let Some(&(at, dt)) = solver.adjust_dt.get(runtime.next_adjust) {
        if grid.to_ticks(at) > runtime.t {
            break;
        }
        runtime.dt = grid.to_ticks(dt).max(1);
        runtime.next_adjust += 1;
        info!(t = grid.to_time(runtime.t), dt, "applied prescribed dt");
    }
}

fn grow(dt: Ticks, solver: &SolverConfig, grid: &reacdiff_core::TimeGrid) -> Ticks {
    #[allow(clippy::cast_possible_truncation)]
    let grown = (dt as f64 * solver.dt_increase_factor).round() as Ticks;
    match solver.max_dt {
        Some(max) => grown.min(grid.to_ticks(max)).max(1),
        None => grown.max(1),
    }
}
