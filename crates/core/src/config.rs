//! Simulation configuration.
//!
//! Every field has a default, so a TOML document only needs the values it
//! changes. `final_t` and `initial_dt` have no sensible default and must be
//! provided before a model can be initialized.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    ConfigurationError,
    time::{MAX_PRECISION, Ticks},
};

/// Top-level configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub solver: SolverConfig,
    pub flags: Flags,
    /// Rate-law templates addressable by [`crate::RateLaw::Database`].
    #[serde(deserialize_with = "with_default_reactions")]
    pub reaction_database: BTreeMap<String, String>,
}

/// Time stepping and solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub final_t: Option<f64>,
    pub initial_dt: Option<f64>,
    /// Decimal digits kept in every time value.
    pub time_precision: u32,
    pub attempt_timestep_restart_on_divergence: bool,
    pub max_restart_attempts: usize,
    /// Factor applied to `dt` after a failed step.
    pub dt_decrease_factor: f64,
    /// Factor applied to `dt` after an accepted step.
    pub dt_increase_factor: f64,
    pub max_dt: Option<f64>,
    pub min_dt: Option<f64>,
    /// Prescribed `(t, dt)` pairs: once `t` is reached, `dt` is used.
    pub adjust_dt: Vec<(f64, f64)>,
    pub reset_timestep_for_negative_solution: bool,
    pub negative_tolerance: f64,
    pub newton: NewtonSettings,
    pub linear: LinearSettings,
}

/// Nonlinear iteration options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewtonSettings {
    pub max_iters: usize,
    pub abs_tol: f64,
    pub rel_tol: f64,
    /// Residual growth relative to the initial residual treated as divergence.
    pub divergence_factor: f64,
    pub line_search: bool,
}

/// Preconditioner for the linear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preconditioner {
    None,
    Jacobi,
    Ilu0,
}

/// Linear solver options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearSettings {
    pub max_iters: usize,
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub preconditioner: Preconditioner,
}

/// Feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Flags {
    /// Drop parameters, species and compartments no reaction uses, and
    /// tolerate mesh markers no compartment claims.
    pub allow_unused_components: bool,
    /// Weight every integral by the radial coordinate `x`.
    pub axisymmetric_model: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            flags: Flags::default(),
            reaction_database: default_reaction_database(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            final_t: None,
            initial_dt: None,
            time_precision: 6,
            attempt_timestep_restart_on_divergence: true,
            max_restart_attempts: 10,
            dt_decrease_factor: 0.5,
            dt_increase_factor: 1.0,
            max_dt: None,
            min_dt: None,
            adjust_dt: Vec::new(),
            reset_timestep_for_negative_solution: false,
            negative_tolerance: 1e-6,
            newton: NewtonSettings::default(),
            linear: LinearSettings::default(),
        }
    }
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iters: 50,
            abs_tol: 1e-10,
            rel_tol: 1e-9,
            divergence_factor: 1e8,
            line_search: true,
        }
    }
}

impl Default for LinearSettings {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            rel_tol: 1e-12,
            abs_tol: 1e-16,
            preconditioner: Preconditioner::Ilu0,
        }
    }
}

fn default_reaction_database() -> BTreeMap<String, String> {
    [
        ("prescribed", "k"),
        ("prescribed_linear", "k*u"),
        ("prescribed_leak", "k*(1-u/umax)"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

/// User-supplied templates extend the built-in ones.
fn with_default_reactions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let mut database = default_reaction_database();
    database.extend(BTreeMap::<String, String>::deserialize(deserializer)?);
    Ok(database)
}

impl Config {
    /// Creates a default configuration with the required times set.
    #[must_use]
    pub fn new(final_t: f64, initial_dt: f64) -> Self {
        let mut config = Self::default();
        config.solver.final_t = Some(final_t);
        config.solver.initial_dt = Some(initial_dt);
        config
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidConfig`] if the document is
    /// malformed, has unknown keys, or fails [`Config::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            toml::from_str(input).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        toml::to_string(self).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))
    }

    /// Checks required and positive values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidConfig`] naming the first
    /// offending option.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let s = &self.solver;
        let fail = |msg: String| -> Result<(), ConfigurationError> {
            Err(ConfigurationError::InvalidConfig(msg))
        };
        let positive = |v: f64| v.is_finite() && v > 0.0;

        let Some(final_t) = s.final_t else {
            return fail("solver.final_t is required".into());
        };
        let Some(initial_dt) = s.initial_dt else {
            return fail("solver.initial_dt is required".into());
        };
        if !final_t.is_finite() || final_t < 0.0 {
            return fail(format!("solver.final_t must be non-negative, got {final_t}"));
        }
        if !positive(initial_dt) {
            return fail(format!("solver.initial_dt must be positive, got {initial_dt}"));
        }
        if !(1..=MAX_PRECISION).contains(&s.time_precision) {
            return fail(format!(
                "solver.time_precision must be in 1..={MAX_PRECISION}, got {}",
                s.time_precision
            ));
        }
        let tick = 10f64.powi(-i32::try_from(s.time_precision).unwrap_or(15));
        if initial_dt < tick {
            return fail(format!(
                "solver.initial_dt {initial_dt} is below the time resolution {tick}"
            ));
        }
        #[allow(clippy::cast_precision_loss)]
        let horizon = Ticks::MAX as f64 * tick;
        if final_t >= horizon {
            return fail(format!(
                "solver.final_t {final_t} exceeds the representable time {horizon:e} at \
                 precision {}",
                s.time_precision
            ));
        }
        if !(s.dt_decrease_factor > 0.0 && s.dt_decrease_factor < 1.0) {
            return fail(format!(
                "solver.dt_decrease_factor must be in (0, 1), got {}",
                s.dt_decrease_factor
            ));
        }
        if !(s.dt_increase_factor.is_finite() && s.dt_increase_factor >= 1.0) {
            return fail(format!(
                "solver.dt_increase_factor must be at least 1, got {}",
                s.dt_increase_factor
            ));
        }
        for (name, value) in [("max_dt", s.max_dt), ("min_dt", s.min_dt)] {
            if let Some(v) = value
                && !positive(v)
            {
                return fail(format!("solver.{name} must be positive, got {v}"));
            }
        }
        if let (Some(min), Some(max)) = (s.min_dt, s.max_dt)
            && min > max
        {
            return fail(format!("solver.min_dt {min} exceeds solver.max_dt {max}"));
        }
        if s.adjust_dt.windows(2).any(|w| w[1].0 <= w[0].0) {
            return fail("solver.adjust_dt times must be strictly increasing".into());
        }
        if let Some((t, dt)) = s.adjust_dt.iter().find(|(t, dt)| !t.is_finite() || !positive(*dt)) {
            return fail(format!("solver.adjust_dt entry ({t}, {dt}) is invalid"));
        }
        if !(s.negative_tolerance.is_finite() && s.negative_tolerance >= 0.0) {
            return fail("solver.negative_tolerance must be non-negative".into());
        }

        let n = &s.newton;
        if n.max_iters == 0 {
            return fail("solver.newton.max_iters must be at least 1".into());
        }
        if !(n.abs_tol.is_finite() && n.abs_tol >= 0.0 && n.rel_tol.is_finite() && n.rel_tol >= 0.0)
        {
            return fail("solver.newton tolerances must be finite and non-negative".into());
        }
        if !(n.divergence_factor > 1.0) {
            return fail("solver.newton.divergence_factor must exceed 1".into());
        }

        let l = &s.linear;
        if l.max_iters == 0 {
            return fail("solver.linear.max_iters must be at least 1".into());
        }
        if !(l.abs_tol.is_finite() && l.abs_tol >= 0.0 && l.rel_tol.is_finite() && l.rel_tol >= 0.0)
        {
            return fail("solver.linear tolerances must be finite and non-negative".into());
        }
        Ok(())
    }
}
