//! Model parameters: constants, closed-form time courses and sampled data.

mod load;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, Named, expr::Expr, units::Unit};

/// Names an expression-valued parameter may depend on.
pub const COORDINATE_NAMES: [&str; 4] = ["x", "y", "z", "t"];

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterSource {
    /// A fixed value, stored in [`Parameter::value`].
    Constant,

    /// A closed-form expression in `t` and optionally `x`, `y`, `z`.
    ///
    /// `antiderivative`, when present, is a time antiderivative of `expr`
    /// used for preintegration.
    Expression {
        expr: String,
        antiderivative: Option<String>,
    },

    /// A `(time, value)` table, interpolated linearly and never extrapolated.
    Sampled { samples: Vec<(f64, f64)> },

    /// A spatial field sampled on parent mesh vertices at discrete times,
    /// restricted to one compartment.
    Field {
        compartment: String,
        times: Vec<f64>,
        frames: Vec<Vec<f64>>,
    },
}

/// A named model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Current value; for time-dependent scalar parameters, the value at `t = 0`.
    pub value: f64,
    pub unit: Unit,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub notes: String,
    pub is_time_dependent: bool,
    pub is_space_dependent: bool,
    pub use_preintegration: bool,
    pub source: ParameterSource,
}

impl Named for Parameter {
    const KIND: &'static str = "parameter";

    fn name(&self) -> &str {
        &self.name
    }
}

impl Parameter {
    /// Creates a constant parameter.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if `unit` cannot be parsed or `value`
    /// is not finite.
    pub fn new(name: impl Into<String>, value: f64, unit: &str) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let unit = parse_unit(&name, unit)?;
        if !value.is_finite() {
            return Err(invalid(&name, format!("value {value} is not finite")));
        }
        Ok(Self {
            name,
            value,
            unit,
            group: String::new(),
            notes: String::new(),
            is_time_dependent: false,
            is_space_dependent: false,
            use_preintegration: false,
            source: ParameterSource::Constant,
        })
    }

    /// Creates a parameter from a closed-form expression in `t`, `x`, `y`, `z`.
    ///
    /// With `use_preintegration`, each step sees the average of the
    /// expression over `[t_n, t_n+1]`. The average is exact when an
    /// `antiderivative` is supplied and computed by adaptive quadrature
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if an expression fails to parse,
    /// references names other than coordinates and time, or if
    /// preintegration is requested for an expression independent of time.
    pub fn from_expression(
        name: impl Into<String>,
        expr: &str,
        unit: &str,
        antiderivative: Option<&str>,
        use_preintegration: bool,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let unit = parse_unit(&name, unit)?;
        let parsed = parse_coordinate_expr(&name, expr)?;
        if let Some(anti) = antiderivative {
            parse_coordinate_expr(&name, anti)?;
        }

        let vars = parsed.variables();
        let is_time_dependent = vars.contains("t");
        let is_space_dependent = ["x", "y", "z"].iter().any(|c| vars.contains(*c));
        if use_preintegration && !is_time_dependent {
            return Err(invalid(
                &name,
                "preintegration requires a time-dependent expression".into(),
            ));
        }

        // Scalar initial value; spatially varying parameters are evaluated per point.
        let value = parsed.eval(&|_: &String| 0.0);

        Ok(Self {
            name,
            value,
            unit,
            group: String::new(),
            notes: String::new(),
            is_time_dependent,
            is_space_dependent,
            use_preintegration,
            source: ParameterSource::Expression {
                expr: expr.to_owned(),
                antiderivative: antiderivative.map(str::to_owned),
            },
        })
    }

    /// Creates a time-dependent parameter from a `(time, value)` table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if there are fewer than two samples,
    /// times are not strictly increasing, or any entry is not finite.
    pub fn from_samples(
        name: impl Into<String>,
        samples: Vec<(f64, f64)>,
        unit: &str,
        use_preintegration: bool,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let unit = parse_unit(&name, unit)?;
        validate_samples(&name, &samples)?;
        let value = samples[0].1;
        Ok(Self {
            name,
            value,
            unit,
            group: String::new(),
            notes: String::new(),
            is_time_dependent: true,
            is_space_dependent: false,
            use_preintegration,
            source: ParameterSource::Sampled { samples },
        })
    }

    /// Reads a two-column time/value table from a delimited text file.
    ///
    /// Commas, tabs or runs of spaces separate columns. Lines starting with
    /// `#` and a non-numeric header row are skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read, a row
    /// does not hold two numbers, or the table is invalid as in
    /// [`Parameter::from_samples`].
    pub fn from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        unit: &str,
        use_preintegration: bool,
    ) -> Result<Self, ConfigurationError> {
        let samples = load::read_table(path.as_ref())?;
        Self::from_samples(name, samples, unit, use_preintegration)
    }

    /// Reads a spatial time series from a JSON file.
    ///
    /// The file holds `{"frames": [{"time": t, "values": [...]}, ...]}`,
    /// with one value per parent mesh vertex in each frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read or parsed,
    /// has no frames, frames differ in length, or times are not increasing.
    pub fn from_field_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        unit: &str,
        compartment: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let unit = parse_unit(&name, unit)?;
        let (times, frames) = load::read_field(path.as_ref())?;
        validate_field(&name, &times, &frames)?;
        Ok(Self {
            name,
            value: 0.0,
            unit,
            group: String::new(),
            notes: String::new(),
            is_time_dependent: times.len() > 1,
            is_space_dependent: true,
            use_preintegration: false,
            source: ParameterSource::Field {
                compartment: compartment.into(),
                times,
                frames,
            },
        })
    }

    /// Sets the group label used for reporting.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets free-form notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Returns the parsed expression for expression-valued parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the stored string no longer parses.
    pub fn expression(&self) -> Result<Option<(Expr, Option<Expr>)>, ConfigurationError> {
        let ParameterSource::Expression {
            expr,
            antiderivative,
        } = &self.source
        else {
            return Ok(None);
        };
        let expr = parse_coordinate_expr(&self.name, expr)?;
        let anti = antiderivative
            .as_deref()
            .map(|a| parse_coordinate_expr(&self.name, a))
            .transpose()?;
        Ok(Some((expr, anti)))
    }

    /// Checks invariants that hold for every source kind.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match &self.source {
            ParameterSource::Constant => {
                if !self.value.is_finite() {
                    return Err(invalid(&self.name, "value is not finite".into()));
                }
            }
            ParameterSource::Expression { .. } => {
                self.expression()?;
            }
            ParameterSource::Sampled { samples } => validate_samples(&self.name, samples)?,
            ParameterSource::Field { times, frames, .. } => {
                validate_field(&self.name, times, frames)?;
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: String) -> ConfigurationError {
    ConfigurationError::InvalidEntity {
        kind: Parameter::KIND,
        name: name.to_owned(),
        reason,
    }
}

fn parse_unit(name: &str, unit: &str) -> Result<Unit, ConfigurationError> {
    Unit::parse(unit).map_err(|source| ConfigurationError::Unit {
        context: format!("parameter `{name}`"),
        source,
    })
}

fn parse_coordinate_expr(name: &str, input: &str) -> Result<Expr, ConfigurationError> {
    let expr = Expr::parse(input).map_err(|source| ConfigurationError::Expression {
        context: format!("parameter `{name}`"),
        source,
    })?;
    if let Some(other) = expr
        .variables()
        .into_iter()
        .find(|v| !COORDINATE_NAMES.contains(&v.as_str()))
    {
        return Err(invalid(
            name,
            format!("expression `{input}` depends on `{other}`; only x, y, z and t are allowed"),
        ));
    }
    Ok(expr)
}

fn validate_samples(name: &str, samples: &[(f64, f64)]) -> Result<(), ConfigurationError> {
    if samples.len() < 2 {
        return Err(invalid(name, "a sample table needs at least two rows".into()));
    }
    if samples.iter().any(|(t, v)| !t.is_finite() || !v.is_finite()) {
        return Err(invalid(name, "sample table contains non-finite values".into()));
    }
    if samples.windows(2).any(|w| w[1].0 <= w[0].0) {
        return Err(invalid(name, "sample times must be strictly increasing".into()));
    }
    Ok(())
}

fn validate_field(name: &str, times: &[f64], frames: &[Vec<f64>]) -> Result<(), ConfigurationError> {
    if times.is_empty() || times.len() != frames.len() {
        return Err(invalid(
            name,
            format!("{} times but {} frames", times.len(), frames.len()),
        ));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(invalid(name, "frame times must be strictly increasing".into()));
    }
    let len = frames[0].len();
    if frames.iter().any(|f| f.len() != len) {
        return Err(invalid(name, "frames have different lengths".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn constant_parameter() {
        let p = Parameter::new("kf", 2.5, "1/(uM*s)").unwrap();
        assert!(!p.is_time_dependent);
        assert_eq!(p.source, ParameterSource::Constant);
        assert_relative_eq!(p.value, 2.5);
    }

    #[test]
    fn expression_dependencies_are_detected() {
        let p = Parameter::from_expression("j", "exp(-t)*x", "uM/s", None, false).unwrap();
        assert!(p.is_time_dependent);
        assert!(p.is_space_dependent);

        let err = Parameter::from_expression("j", "k*t", "uM/s", None, false).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEntity { .. }));
    }

    #[test]
    fn preintegration_needs_time_dependence() {
        let err = Parameter::from_expression("j", "2*x", "uM/s", None, true).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEntity { .. }));
    }

    #[test]
    fn sample_tables_are_validated() {
        assert!(Parameter::from_samples("p", vec![(0.0, 1.0)], "uM", false).is_err());
        assert!(Parameter::from_samples("p", vec![(0.0, 1.0), (0.0, 2.0)], "uM", false).is_err());
        let p = Parameter::from_samples("p", vec![(0.0, 1.0), (1.0, 2.0)], "uM", false).unwrap();
        assert!(p.is_time_dependent);
        assert_relative_eq!(p.value, 1.0);
    }

    #[test]
    fn bad_unit_is_a_configuration_error() {
        let err = Parameter::new("k", 1.0, "parsec").unwrap_err();
        assert!(matches!(err, ConfigurationError::Unit { .. }));
    }
}
