use thiserror::Error;

/// Configuration for the BiCGSTAB solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    rel_tol: f64,
    abs_tol: f64,
}

/// Errors that can occur when validating a BiCGSTAB config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be at least 1")]
    MaxIters,

    #[error("rel_tol must be finite and non-negative")]
    RelTol,

    #[error("abs_tol must be finite and non-negative")]
    AbsTol,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(2000, 1e-12, 1e-16).unwrap()
    }
}

impl Config {
    /// Creates a new config with validated tolerances.
    ///
    /// The solver stops once the residual norm falls below
    /// `max(rel_tol * |b|, abs_tol)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero or a tolerance is negative or
    /// non-finite.
    pub fn new(max_iters: usize, rel_tol: f64, abs_tol: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if !rel_tol.is_finite() || rel_tol < 0.0 {
            return Err(ConfigError::RelTol);
        }
        if !abs_tol.is_finite() || abs_tol < 0.0 {
            return Err(ConfigError::AbsTol);
        }
        Ok(Self {
            max_iters,
            rel_tol,
            abs_tol,
        })
    }

    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }
}
