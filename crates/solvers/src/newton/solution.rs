use ndarray::Array1;

/// Indicates how the Newton iteration terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The residual norm met the absolute or relative tolerance.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// The residual became non-finite or grew past the divergence bound.
    Diverged,

    /// Stopped by an observer [`Action::Abort`](super::Action::Abort).
    Aborted,
}

impl Status {
    #[must_use]
    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

/// The result of a Newton solve.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: Status,

    /// Final iterate.
    pub x: Array1<f64>,

    /// Residual norm at `x`.
    pub residual_norm: f64,

    /// Newton iterations performed.
    pub iters: usize,

    /// Total linear solver iterations.
    pub linear_iters: usize,
}
