use reacdiff_core::{LinearSettings, NewtonSettings, Preconditioner};
use thiserror::Error;

use crate::linear::bicgstab;

/// Configuration for the Newton solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    abs_tol: f64,
    rel_tol: f64,
    divergence_factor: f64,
    line_search: bool,
    linear: bicgstab::Config,
    preconditioner: Preconditioner,
}

/// Errors that can occur when validating a Newton solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be at least 1")]
    MaxIters,

    #[error("abs_tol must be finite and non-negative")]
    AbsTol,

    #[error("rel_tol must be finite and non-negative")]
    RelTol,

    #[error("divergence_factor must be greater than 1")]
    DivergenceFactor,

    #[error("linear solver: {0}")]
    Linear(#[from] bicgstab::ConfigError),
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(50, 1e-10, 1e-9).unwrap()
    }
}

impl Config {
    /// Creates a new config with validated tolerances.
    ///
    /// Iteration stops once the residual norm falls below
    /// `max(abs_tol, rel_tol * |F(u0)|)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero or a tolerance is negative or
    /// non-finite.
    pub fn new(max_iters: usize, abs_tol: f64, rel_tol: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if !abs_tol.is_finite() || abs_tol < 0.0 {
            return Err(ConfigError::AbsTol);
        }
        if !rel_tol.is_finite() || rel_tol < 0.0 {
            return Err(ConfigError::RelTol);
        }
        Ok(Self {
            max_iters,
            abs_tol,
            rel_tol,
            divergence_factor: 1e8,
            line_search: true,
            linear: bicgstab::Config::default(),
            preconditioner: Preconditioner::Ilu0,
        })
    }

    /// Builds a config from the model's solver settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any setting is out of range.
    pub fn from_settings(
        newton: &NewtonSettings,
        linear: &LinearSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(newton.max_iters, newton.abs_tol, newton.rel_tol)?
            .with_divergence_factor(newton.divergence_factor)?
            .with_line_search(newton.line_search)
            .with_linear(
                bicgstab::Config::new(linear.max_iters, linear.rel_tol, linear.abs_tol)?,
                linear.preconditioner,
            ))
    }

    /// Sets the residual growth, relative to the initial residual, that
    /// counts as divergence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DivergenceFactor`] unless `factor > 1`.
    pub fn with_divergence_factor(mut self, factor: f64) -> Result<Self, ConfigError> {
        if !(factor > 1.0) {
            return Err(ConfigError::DivergenceFactor);
        }
        self.divergence_factor = factor;
        Ok(self)
    }

    #[must_use]
    pub fn with_line_search(mut self, enabled: bool) -> Self {
        self.line_search = enabled;
        self
    }

    #[must_use]
    pub fn with_linear(mut self, linear: bicgstab::Config, preconditioner: Preconditioner) -> Self {
        self.linear = linear;
        self.preconditioner = preconditioner;
        self
    }

    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    #[must_use]
    pub fn divergence_factor(&self) -> f64 {
        self.divergence_factor
    }

    #[must_use]
    pub fn line_search(&self) -> bool {
        self.line_search
    }

    #[must_use]
    pub fn linear(&self) -> &bicgstab::Config {
        &self.linear
    }

    #[must_use]
    pub fn preconditioner(&self) -> Preconditioner {
        self.preconditioner
    }
}
