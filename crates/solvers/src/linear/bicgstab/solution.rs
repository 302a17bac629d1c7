use ndarray::Array1;

/// Indicates whether the solver converged or hit the iteration limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The residual norm fell below the tolerance.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,
}

/// The result of a BiCGSTAB solve.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: Status,

    /// Approximate solution.
    pub x: Array1<f64>,

    /// Norm of the (recursively updated) residual at exit.
    pub residual_norm: f64,

    pub iters: usize,
}
