use ndarray::Array1;

/// Event emitted by the Newton solver after each iteration.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Iteration number, starting at 1.
    pub iter: usize,

    /// Residual norm at the new iterate.
    pub residual_norm: f64,

    /// Residual norm at the initial guess.
    pub initial_norm: f64,

    /// Norm of the applied (damped) correction.
    pub step_norm: f64,

    /// Line-search damping factor applied to the correction.
    pub damping: f64,

    /// Linear solver iterations spent on this correction.
    pub linear_iters: usize,

    /// The new iterate.
    pub state: &'a Array1<f64>,
}
