use thiserror::Error;

use crate::SparseError;

/// Errors that can occur during a BiCGSTAB solve.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Sparse(#[from] SparseError),

    #[error("breakdown at iteration {iter}: {quantity} vanished")]
    Breakdown { iter: usize, quantity: &'static str },

    #[error("non-finite residual at iteration {iter}")]
    NonFinite { iter: usize },
}
