//! Linear solvers for sparse systems.
//!
//! Newton corrections are computed with [`bicgstab`], right-preconditioned
//! by a [`Preconditioner`] rebuilt from each Jacobian.

pub mod bicgstab;

mod preconditioner;

pub use preconditioner::{Preconditioner, PreconditionerError};
