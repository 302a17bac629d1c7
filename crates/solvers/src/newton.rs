//! Damped Newton iteration for sparse nonlinear systems.
//!
//! # Algorithm
//!
//! Each iteration evaluates the Jacobian at the current iterate, solves
//! `J δ = -F(u)` with preconditioned BiCGSTAB, and updates `u += λ δ`. With
//! line search enabled, `λ` starts at one and is halved until the residual
//! norm decreases sufficiently (Armijo condition), down to a floor of 1/64.
//!
//! # Termination
//!
//! - [`Status::Converged`] once `|F(u)| <= max(abs_tol, rel_tol * |F(u0)|)`
//! - [`Status::Diverged`] if the residual becomes non-finite or exceeds
//!   `divergence_factor * max(|F(u0)|, abs_tol)`
//! - [`Status::MaxIters`] when the iteration budget runs out
//! - [`Status::Aborted`] when the observer returns [`Action::Abort`]
//!
//! Unconverged outcomes are returned as `Ok` so callers can decide whether
//! to retry; `Err` is reserved for failures to evaluate or solve.

mod action;
mod config;
mod error;
mod event;
mod solution;

pub use action::Action;
pub use config::{Config, ConfigError};
pub use error::Error;
pub use event::Event;
pub use solution::{Solution, Status};

use ndarray::Array1;
use reacdiff_core::Observer;
use tracing::debug;

use crate::{
    NonlinearProblem,
    linear::{Preconditioner, bicgstab},
};

const ARMIJO: f64 = 1e-4;
const MIN_DAMPING: f64 = 1.0 / 64.0;

/// Solves `F(u) = 0` from `initial` with damped Newton iteration.
///
/// The observer receives an [`Event`] after every iteration and may return
/// [`Action::Abort`] to stop.
///
/// # Errors
///
/// Returns an error if the problem fails to evaluate, the preconditioner
/// cannot be built, or the linear solver breaks down.
pub fn solve<P, Obs>(
    problem: &P,
    initial: Array1<f64>,
    config: &Config,
    mut observer: Obs,
) -> Result<Solution, Error>
where
    P: NonlinearProblem,
    Obs: for<'a> Observer<Event<'a>, Action>,
{
    if initial.len() != problem.size() {
        return Err(Error::DimensionMismatch {
            expected: problem.size(),
            found: initial.len(),
        });
    }

    let mut u = initial;
    let mut r = problem.residual(&u).map_err(Error::problem)?;
    let initial_norm = bicgstab::norm(&r);
    let mut norm = initial_norm;
    let tol = config.abs_tol().max(config.rel_tol() * initial_norm);
    let divergence = config.divergence_factor() * initial_norm.max(config.abs_tol());
    let mut linear_total = 0;

    let finish = |status, x, residual_norm, iters, linear_iters| Solution {
        status,
        x,
        residual_norm,
        iters,
        linear_iters,
    };

    if !norm.is_finite() {
        return Ok(finish(Status::Diverged, u, norm, 0, 0));
    }
    if norm <= tol {
        return Ok(finish(Status::Converged, u, norm, 0, 0));
    }

    for iter in 1..=config.max_iters() {
        let jacobian = problem.jacobian(&u).map_err(Error::problem)?;
        let preconditioner = Preconditioner::new(config.preconditioner(), &jacobian)
            .map_err(|source| Error::Preconditioner { iter, source })?;
        let correction = bicgstab::solve(&jacobian, &-&r, &preconditioner, config.linear())
            .map_err(|source| Error::Linear { iter, source })?;
        if correction.status == bicgstab::Status::MaxIters {
            debug!(
                iter,
                residual = correction.residual_norm,
                "linear solve hit its iteration limit; using the inexact correction"
            );
        }
        linear_total += correction.iters;

        let (damping, next, next_r, next_norm) =
            line_search(problem, &u, &correction.x, norm, config.line_search())?;
        let step_norm = damping * bicgstab::norm(&correction.x);
        u = next;
        r = next_r;
        norm = next_norm;

        debug!(iter, residual = norm, damping, linear_iters = correction.iters, "newton iteration");

        let event = Event {
            iter,
            residual_norm: norm,
            initial_norm,
            step_norm,
            damping,
            linear_iters: correction.iters,
            state: &u,
        };
        if let Some(Action::Abort) = observer.observe(&event) {
            return Ok(finish(Status::Aborted, u, norm, iter, linear_total));
        }

        if !norm.is_finite() || norm > divergence {
            return Ok(finish(Status::Diverged, u, norm, iter, linear_total));
        }
        if norm <= tol {
            return Ok(finish(Status::Converged, u, norm, iter, linear_total));
        }
    }

    Ok(finish(Status::MaxIters, u, norm, config.max_iters(), linear_total))
}

/// Solves `F(u) = 0` without observer support.
///
/// This is a convenience wrapper around [`solve`] that uses a no-op observer.
///
/// # Errors
///
/// See [`solve`].
pub fn solve_unobserved<P: NonlinearProblem>(
    problem: &P,
    initial: Array1<f64>,
    config: &Config,
) -> Result<Solution, Error> {
    solve(problem, initial, config, ())
}

/// Backtracks along `delta` until the residual norm decreases enough.
///
/// Without line search, or if no damping satisfies the Armijo condition,
/// the last trial is taken as is.
fn line_search<P: NonlinearProblem>(
    problem: &P,
    u: &Array1<f64>,
    delta: &Array1<f64>,
    norm: f64,
    enabled: bool,
) -> Result<(f64, Array1<f64>, Array1<f64>, f64), Error> {
    let mut damping = 1.0;
    loop {
        let trial = u + &(delta * damping);
        let r = problem.residual(&trial).map_err(Error::problem)?;
        let trial_norm = bicgstab::norm(&r);
        let sufficient = trial_norm <= (1.0 - ARMIJO * damping) * norm;
        if !enabled || sufficient || damping <= MIN_DAMPING {
            return Ok((damping, trial, r, trial_norm));
        }
        damping *= 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::CsrMatrix;

    /// `u_i^2 - c_i = 0`, solved from a positive guess.
    struct SquareRoots {
        targets: Array1<f64>,
    }

    impl NonlinearProblem for SquareRoots {
        type Error = Infallible;

        fn size(&self) -> usize {
            self.targets.len()
        }

        fn residual(&self, u: &Array1<f64>) -> Result<Array1<f64>, Infallible> {
            Ok(u * u - &self.targets)
        }

        fn jacobian(&self, u: &Array1<f64>) -> Result<CsrMatrix, Infallible> {
            let triplets: Vec<_> = u.iter().enumerate().map(|(i, &x)| (i, i, 2.0 * x)).collect();
            Ok(CsrMatrix::from_triplets(u.len(), u.len(), &triplets))
        }
    }

    /// A coupled pair: `u0 + u1 = 3`, `u0 * u1 = 2`.
    struct Coupled;

    impl NonlinearProblem for Coupled {
        type Error = Infallible;

        fn size(&self) -> usize {
            2
        }

        fn residual(&self, u: &Array1<f64>) -> Result<Array1<f64>, Infallible> {
            Ok(array![u[0] + u[1] - 3.0, u[0] * u[1] - 2.0])
        }

        fn jacobian(&self, u: &Array1<f64>) -> Result<CsrMatrix, Infallible> {
            Ok(CsrMatrix::from_triplets(
                2,
                2,
                &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, u[1]), (1, 1, u[0])],
            ))
        }
    }

    #[test]
    fn finds_square_roots() {
        let problem = SquareRoots {
            targets: array![4.0, 9.0, 2.0],
        };
        let solution = solve_unobserved(&problem, array![1.0, 1.0, 1.0], &Config::default()).unwrap();

        assert_eq!(solution.status, Status::Converged);
        assert_relative_eq!(solution.x[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(solution.x[1], 3.0, epsilon = 1e-8);
        assert_relative_eq!(solution.x[2], 2f64.sqrt(), epsilon = 1e-8);
        assert!(solution.iters > 1);
    }

    #[test]
    fn solves_coupled_system() {
        let solution = solve_unobserved(&Coupled, array![0.5, 3.0], &Config::default()).unwrap();
        assert_eq!(solution.status, Status::Converged);
        assert_relative_eq!(solution.x[0] * solution.x[1], 2.0, epsilon = 1e-7);
        assert_relative_eq!(solution.x[0] + solution.x[1], 3.0, epsilon = 1e-7);
    }

    #[test]
    fn converged_initial_guess_takes_no_iterations() {
        let problem = SquareRoots {
            targets: array![4.0],
        };
        let solution = solve_unobserved(&problem, array![2.0], &Config::default()).unwrap();
        assert_eq!(solution.status, Status::Converged);
        assert_eq!(solution.iters, 0);
    }

    #[test]
    fn observer_can_abort() {
        let problem = SquareRoots {
            targets: array![4.0, 9.0],
        };
        let mut seen = Vec::new();
        let solution = solve(
            &problem,
            array![1.0, 1.0],
            &Config::default(),
            |event: &Event<'_>| {
                seen.push(event.residual_norm);
                (event.iter == 2).then_some(Action::Abort)
            },
        )
        .unwrap();

        assert_eq!(solution.status, Status::Aborted);
        assert_eq!(solution.iters, 2);
        assert_eq!(seen.len(), 2);
        assert!(seen[1] < seen[0]);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let problem = SquareRoots {
            targets: array![1e6],
        };
        let config = Config::new(2, 1e-12, 0.0).unwrap();
        let solution = solve_unobserved(&problem, array![1.0], &config).unwrap();
        assert_eq!(solution.status, Status::MaxIters);
    }

    #[test]
    fn config_rejects_bad_values() {
        assert_eq!(Config::new(0, 1e-8, 1e-8), Err(ConfigError::MaxIters));
        assert_eq!(Config::new(5, -1.0, 1e-8), Err(ConfigError::AbsTol));
        assert_eq!(
            Config::default().with_divergence_factor(0.5),
            Err(ConfigError::DivergenceFactor)
        );
    }

    #[test]
    fn wrong_initial_length_is_an_error() {
        let problem = SquareRoots {
            targets: array![1.0, 2.0],
        };
        assert!(matches!(
            solve_unobserved(&problem, array![1.0], &Config::default()),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }
}
