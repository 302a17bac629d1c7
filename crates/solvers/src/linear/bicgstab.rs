//! Right-preconditioned BiCGSTAB for nonsymmetric sparse systems.
//!
//! Reaction terms make the Newton Jacobian nonsymmetric, so conjugate
//! gradients does not apply. BiCGSTAB needs two matrix-vector products and
//! two preconditioner applications per iteration and no restarts.

mod config;
mod error;
mod solution;

pub use config::{Config, ConfigError};
pub use error::Error;
pub use solution::{Solution, Status};

use ndarray::Array1;

use crate::{CsrMatrix, SparseError, linear::Preconditioner};

/// Solves `A x = b` starting from `x = 0`.
///
/// # Errors
///
/// Returns an [`Error`] on a dimension mismatch, a breakdown of the
/// recurrence, or a non-finite residual.
pub fn solve(
    matrix: &CsrMatrix,
    rhs: &Array1<f64>,
    preconditioner: &Preconditioner,
    config: &Config,
) -> Result<Solution, Error> {
    let n = matrix.nrows();
    if rhs.len() != n || matrix.ncols() != n {
        return Err(SparseError::DimensionMismatch {
            expected: n,
            found: rhs.len(),
        }
        .into());
    }

    let b_norm = norm(rhs);
    let tol = (config.rel_tol() * b_norm).max(config.abs_tol());
    let mut x = Array1::<f64>::zeros(n);
    if b_norm <= tol {
        return Ok(Solution {
            status: Status::Converged,
            x,
            residual_norm: b_norm,
            iters: 0,
        });
    }

    let mut r = rhs.clone();
    let r_hat = r.clone();
    let mut p = Array1::<f64>::zeros(n);
    let mut v = Array1::<f64>::zeros(n);
    let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
    let mut r_norm = b_norm;

    for iter in 1..=config.max_iters() {
        let rho_next = r_hat.dot(&r);
        if rho_next == 0.0 {
            return Err(Error::Breakdown { iter, quantity: "rho" });
        }
        if iter == 1 {
            p.assign(&r);
        } else {
            let beta = (rho_next / rho) * (alpha / omega);
            p = &r + &((&p - &(&v * omega)) * beta);
        }
        rho = rho_next;

        let p_hat = preconditioner.apply(&p);
        v = matrix.mul_vec(p_hat.view())?;
        let denominator = r_hat.dot(&v);
        if denominator == 0.0 {
            return Err(Error::Breakdown { iter, quantity: "r_hat·v" });
        }
        alpha = rho / denominator;

        let s = &r - &(&v * alpha);
        let s_norm = norm(&s);
        if s_norm <= tol {
            x.scaled_add(alpha, &p_hat);
            return Ok(Solution {
                status: Status::Converged,
                x,
                residual_norm: s_norm,
                iters: iter,
            });
        }

        let s_hat = preconditioner.apply(&s);
        let t = matrix.mul_vec(s_hat.view())?;
        let tt = t.dot(&t);
        if tt == 0.0 {
            return Err(Error::Breakdown { iter, quantity: "t·t" });
        }
        omega = t.dot(&s) / tt;

        x.scaled_add(alpha, &p_hat);
        x.scaled_add(omega, &s_hat);
        r = &s - &(&t * omega);
        r_norm = norm(&r);

        if !r_norm.is_finite() {
            return Err(Error::NonFinite { iter });
        }
        if r_norm <= tol {
            return Ok(Solution {
                status: Status::Converged,
                x,
                residual_norm: r_norm,
                iters: iter,
            });
        }
        if omega == 0.0 {
            return Err(Error::Breakdown { iter, quantity: "omega" });
        }
    }

    Ok(Solution {
        status: Status::MaxIters,
        x,
        residual_norm: r_norm,
        iters: config.max_iters(),
    })
}

/// Euclidean norm.
pub(crate) fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}
