use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, Named, units::Unit};

/// Marker value(s) that tag a compartment's cells in the parent mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Marker {
    Single(i64),
    Many(Vec<i64>),
}

impl Marker {
    /// All marker values, in declaration order.
    #[must_use]
    pub fn values(&self) -> Vec<i64> {
        match self {
            Self::Single(v) => vec![*v],
            Self::Many(vs) => vs.clone(),
        }
    }
}

impl From<i64> for Marker {
    fn from(value: i64) -> Self {
        Self::Single(value)
    }
}

impl From<i32> for Marker {
    fn from(value: i32) -> Self {
        Self::Single(i64::from(value))
    }
}

impl From<Vec<i64>> for Marker {
    fn from(values: Vec<i64>) -> Self {
        Self::Many(values)
    }
}

/// A volume or a lower-dimensional manifold of the parent mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    pub name: String,
    pub dimensionality: usize,
    pub length_unit: Unit,
    pub marker: Marker,
    /// Compartments declared to share no interface with this one.
    #[serde(default)]
    pub nonadjacent_compartments: BTreeSet<String>,
}

impl Named for Compartment {
    const KIND: &'static str = "compartment";

    fn name(&self) -> &str {
        &self.name
    }
}

impl Compartment {
    /// Creates a compartment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the dimensionality is outside
    /// `1..=3`, the length unit is not a length, or a marker is zero.
    pub fn new(
        name: impl Into<String>,
        dimensionality: usize,
        length_unit: &str,
        marker: impl Into<Marker>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let length_unit = Unit::parse(length_unit).map_err(|source| ConfigurationError::Unit {
            context: format!("compartment `{name}`"),
            source,
        })?;
        let compartment = Self {
            name,
            dimensionality,
            length_unit,
            marker: marker.into(),
            nonadjacent_compartments: BTreeSet::new(),
        };
        compartment.validate()?;
        Ok(compartment)
    }

    /// Declares compartments that never share an interface with this one.
    #[must_use]
    pub fn with_nonadjacent<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nonadjacent_compartments
            .extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn marker_values(&self) -> Vec<i64> {
        self.marker.values()
    }

    /// Checks the compartment invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=3).contains(&self.dimensionality) {
            return Err(ConfigurationError::InvalidDimension {
                compartment: self.name.clone(),
                dim: self.dimensionality,
                reason: "dimensionality must be 1, 2 or 3".into(),
            });
        }
        if self.length_unit.dimension() != crate::units::Dimension::LENGTH {
            return Err(ConfigurationError::InvalidEntity {
                kind: Self::KIND,
                name: self.name.clone(),
                reason: format!("length unit `{}` is not a length", self.length_unit),
            });
        }
        let values = self.marker_values();
        if values.is_empty() {
            return Err(ConfigurationError::InvalidEntity {
                kind: Self::KIND,
                name: self.name.clone(),
                reason: "at least one marker value is required".into(),
            });
        }
        if values.contains(&0) {
            return Err(ConfigurationError::ZeroMarker {
                compartment: self.name.clone(),
            });
        }
        if self.nonadjacent_compartments.contains(&self.name) {
            return Err(ConfigurationError::InvalidEntity {
                kind: Self::KIND,
                name: self.name.clone(),
                reason: "a compartment cannot be nonadjacent to itself".into(),
            });
        }
        Ok(())
    }
}
