//! Runtime units attached to parameters, species and compartments.
//!
//! Units are stored as their source strings and resolved into a scale factor
//! relative to SI base units plus a [`Dimension`]. Scale factors for the atoms
//! come from `uom` quantities so that, e.g., `uM` and `molecule/um^3` agree
//! with the conversions used elsewhere in the workspace.

mod dimension;
mod error;
mod parse;

use std::{
    fmt,
    ops::{Div, Mul},
};

use serde::{Deserialize, Serialize};

pub use dimension::Dimension;
pub use error::UnitError;
pub use parse::AVOGADRO;

/// A physical unit: a scale relative to SI base units and a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Unit {
    symbol: String,
    scale: f64,
    dimension: Dimension,
}

impl Unit {
    /// Parses a unit string such as `uM`, `um^2/s` or `1/(uM*s)`.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] if the string is malformed or uses an
    /// unknown unit symbol.
    pub fn parse(symbol: &str) -> Result<Self, UnitError> {
        let (scale, dimension) = parse::parse(symbol)?;
        Ok(Self {
            symbol: symbol.trim().to_owned(),
            scale,
            dimension,
        })
    }

    /// The unit of a pure number.
    #[must_use]
    pub fn dimensionless() -> Self {
        Self {
            symbol: "dimensionless".to_owned(),
            scale: 1.0,
            dimension: Dimension::NONE,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Scale factor relative to the SI base units of the same dimension.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.dimension == other.dimension
    }

    /// Raises the unit to an integer power.
    #[must_use]
    pub fn powi(&self, n: i32) -> Self {
        Self {
            symbol: format!("({})^{n}", self.symbol),
            scale: self.scale.powi(n),
            dimension: self.dimension.powi(n),
        }
    }

    /// Returns the factor that converts a value in `self` into a value in `to`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Incompatible`] if the dimensions differ.
    pub fn conversion_factor(&self, to: &Self) -> Result<f64, UnitError> {
        if !self.is_compatible(to) {
            return Err(UnitError::Incompatible {
                left: self.symbol.clone(),
                right: to.symbol.clone(),
                left_dim: self.dimension,
                right_dim: to.dimension,
            });
        }
        Ok(self.scale / to.scale)
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self::dimensionless()
    }
}

impl Mul for &Unit {
    type Output = Unit;

    fn mul(self, rhs: Self) -> Unit {
        Unit {
            symbol: format!("({})*({})", self.symbol, rhs.symbol),
            scale: self.scale * rhs.scale,
            dimension: self.dimension * rhs.dimension,
        }
    }
}

impl Div for &Unit {
    type Output = Unit;

    fn div(self, rhs: Self) -> Unit {
        Unit {
            symbol: format!("({})/({})", self.symbol, rhs.symbol),
            scale: self.scale / rhs.scale,
            dimension: self.dimension / rhs.dimension,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

impl TryFrom<String> for Unit {
    type Error = UnitError;

    fn try_from(symbol: String) -> Result<Self, Self::Error> {
        Self::parse(&symbol)
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.symbol
    }
}

impl std::str::FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn molecules_per_cubic_micron_to_micromolar() {
        let from = Unit::parse("molecule/um^3").unwrap();
        let to = Unit::parse("uM").unwrap();
        let factor = from.conversion_factor(&to).unwrap();
        // One molecule per cubic micron is about 1.66 nM.
        assert_relative_eq!(factor, 1.660_539e-3, max_relative = 1e-5);
    }

    #[test]
    fn incompatible_conversion_is_an_error() {
        let from = Unit::parse("um^2/s").unwrap();
        let to = Unit::parse("uM").unwrap();
        assert!(matches!(
            from.conversion_factor(&to),
            Err(UnitError::Incompatible { .. })
        ));
    }

    #[test]
    fn combined_units_reparse_to_the_same_value() {
        let conc = Unit::parse("uM").unwrap();
        let length = Unit::parse("um").unwrap();
        let product = &conc * &length;
        let reparsed = Unit::parse(product.symbol()).unwrap();
        assert_eq!(product.dimension(), reparsed.dimension());
        assert_relative_eq!(product.scale(), reparsed.scale(), max_relative = 1e-12);
    }

    #[test]
    fn serializes_as_its_symbol() {
        let unit = Unit::parse("um^2/s").unwrap();
        let json = serde_json::to_string(&unit).unwrap();
        assert_eq!(json, "\"um^2/s\"");
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit);
    }
}
