use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, Named, expr::Expr, parameter::COORDINATE_NAMES, units::Unit};

/// Initial concentration of a species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialCondition {
    Constant(f64),
    /// An expression in `x`, `y` and `z`.
    Expression(String),
}

/// Restricts a species to the part of its compartment where an extra marker
/// function takes a given value; the initial condition is zero elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdomainRestriction {
    pub marker: String,
    pub value: i64,
}

/// A chemical species living on exactly one compartment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub initial_condition: InitialCondition,
    pub concentration_unit: Unit,
    pub diffusion_coefficient: f64,
    pub diffusion_unit: Unit,
    pub compartment: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub subdomain_restriction: Option<SubdomainRestriction>,
}

impl Named for Species {
    const KIND: &'static str = "species";

    fn name(&self) -> &str {
        &self.name
    }
}

impl Species {
    /// Creates a species with a constant initial condition.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a unit cannot be parsed, the
    /// diffusion coefficient is negative or not finite, or the units have
    /// the wrong dimensions.
    pub fn new(
        name: impl Into<String>,
        initial_condition: f64,
        concentration_unit: &str,
        diffusion_coefficient: f64,
        diffusion_unit: &str,
        compartment: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let species = Self {
            concentration_unit: parse_unit(&name, concentration_unit)?,
            diffusion_unit: parse_unit(&name, diffusion_unit)?,
            name,
            initial_condition: InitialCondition::Constant(initial_condition),
            diffusion_coefficient,
            compartment: compartment.into(),
            group: String::new(),
            subdomain_restriction: None,
        };
        species.validate()?;
        Ok(species)
    }

    /// Replaces the initial condition with an expression in `x`, `y`, `z`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the expression does not parse or
    /// depends on anything other than the spatial coordinates.
    pub fn with_initial_expression(mut self, expr: &str) -> Result<Self, ConfigurationError> {
        self.initial_condition = InitialCondition::Expression(expr.to_owned());
        self.initial_expression()?;
        Ok(self)
    }

    /// Restricts the species to where extra marker `marker` equals `value`.
    #[must_use]
    pub fn restricted_to(mut self, marker: impl Into<String>, value: i64) -> Self {
        self.subdomain_restriction = Some(SubdomainRestriction {
            marker: marker.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// The initial condition as an expression in `x`, `y`, `z`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the stored expression is invalid.
    pub fn initial_expression(&self) -> Result<Expr, ConfigurationError> {
        match &self.initial_condition {
            InitialCondition::Constant(c) => Ok(Expr::Const(*c)),
            InitialCondition::Expression(s) => {
                let expr = Expr::parse(s).map_err(|source| ConfigurationError::Expression {
                    context: format!("initial condition of species `{}`", self.name),
                    source,
                })?;
                if let Some(other) = expr
                    .variables()
                    .into_iter()
                    .find(|v| !COORDINATE_NAMES[..3].contains(&v.as_str()))
                {
                    return Err(self.invalid(format!(
                        "initial condition `{s}` depends on `{other}`; only x, y and z are allowed"
                    )));
                }
                Ok(expr)
            }
        }
    }

    /// Checks the species invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.diffusion_coefficient.is_finite() || self.diffusion_coefficient < 0.0 {
            return Err(self.invalid(format!(
                "diffusion coefficient must be finite and non-negative, got {}",
                self.diffusion_coefficient
            )));
        }
        let length = crate::units::Dimension::LENGTH;
        let time = crate::units::Dimension::TIME;
        if self.diffusion_unit.dimension() != length.powi(2) / time {
            return Err(self.invalid(format!(
                "diffusion unit `{}` is not an area per time",
                self.diffusion_unit
            )));
        }
        if let InitialCondition::Constant(c) = self.initial_condition
            && !c.is_finite()
        {
            return Err(self.invalid("initial condition is not finite".into()));
        }
        self.initial_expression()?;
        Ok(())
    }

    fn invalid(&self, reason: String) -> ConfigurationError {
        ConfigurationError::InvalidEntity {
            kind: Self::KIND,
            name: self.name.clone(),
            reason,
        }
    }
}

fn parse_unit(name: &str, unit: &str) -> Result<Unit, ConfigurationError> {
    Unit::parse(unit).map_err(|source| ConfigurationError::Unit {
        context: format!("species `{name}`"),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_diffusion_is_rejected() {
        let err = Species::new("A", 1.0, "uM", -1.0, "um^2/s", "cyto").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEntity { .. }));
    }

    #[test]
    fn diffusion_unit_must_be_area_per_time() {
        let err = Species::new("A", 1.0, "uM", 1.0, "um/s", "cyto").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidEntity { .. }));
    }

    #[test]
    fn initial_expression_uses_coordinates_only() {
        let species = Species::new("A", 0.0, "uM", 1.0, "um^2/s", "cyto").unwrap();
        assert!(species.clone().with_initial_expression("1 + x*y").is_ok());
        assert!(species.with_initial_expression("t*x").is_err());
    }
}
