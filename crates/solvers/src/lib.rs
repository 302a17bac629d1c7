//! Numerical solvers for the discrete reaction-diffusion system.
//!
//! - [`sparse`] — compressed sparse row matrices with a fixed pattern
//! - [`linear`] — preconditioned BiCGSTAB for the Newton corrections
//! - [`newton`] — damped Newton iteration over a [`NonlinearProblem`]

pub mod linear;
pub mod newton;
pub mod sparse;

mod problem;

pub use problem::NonlinearProblem;
pub use sparse::{CsrMatrix, SparseError};
