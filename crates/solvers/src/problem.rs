use std::error::Error as StdError;

use ndarray::Array1;

use crate::CsrMatrix;

/// A square nonlinear system `F(u) = 0` with a sparse Jacobian.
///
/// Implementors evaluate the residual and its Jacobian at trial states;
/// the Newton solver owns the state vector while it iterates.
pub trait NonlinearProblem {
    type Error: StdError + Send + Sync + 'static;

    /// Number of unknowns.
    fn size(&self) -> usize;

    /// Evaluates the residual `F(u)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the residual cannot be evaluated at `u`.
    fn residual(&self, u: &Array1<f64>) -> Result<Array1<f64>, Self::Error>;

    /// Evaluates the Jacobian `∂F/∂u`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Jacobian cannot be evaluated at `u`.
    fn jacobian(&self, u: &Array1<f64>) -> Result<CsrMatrix, Self::Error>;
}
