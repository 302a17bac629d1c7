use std::error::Error as StdError;

use crate::linear::{PreconditionerError, bicgstab};

/// Errors that can occur during Newton iteration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("problem error: {0}")]
    Problem(#[source] Box<dyn StdError + Send + Sync>),

    #[error("linear solve failed at iteration {iter}: {source}")]
    Linear {
        iter: usize,
        #[source]
        source: bicgstab::Error,
    },

    #[error("preconditioner failed at iteration {iter}: {source}")]
    Preconditioner {
        iter: usize,
        #[source]
        source: PreconditionerError,
    },

    #[error("initial state has length {found}, problem has {expected} unknowns")]
    DimensionMismatch { expected: usize, found: usize },
}

impl Error {
    pub(crate) fn problem<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Problem(Box::new(err))
    }
}
