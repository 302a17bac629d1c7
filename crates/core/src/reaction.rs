use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{AssemblyError, ConfigurationError, Named, expr::Expr, species::SubdomainRestriction};

/// How a reaction's rate is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLaw {
    /// `on * Π reactants - off * Π products`, using `param_map["on"/"off"]`.
    MassAction,
    /// `on * Π reactants`.
    MassActionForward,
    /// A rate-law template from the configured reaction database.
    Database { key: String },
    /// Explicit forward and reverse rates in the reaction's local names.
    Custom {
        forward: Option<String>,
        reverse: Option<String>,
    },
}

/// A reaction between species, possibly across compartments.
///
/// Reactant and product lists repeat a species once per unit of
/// stoichiometry. Names in the lists and in the rate law are local names,
/// mapped to model species and parameters through `species_map` and
/// `param_map`; unmapped names refer to model entities directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub rate_law: RateLaw,
    #[serde(default)]
    pub species_map: BTreeMap<String, String>,
    #[serde(default)]
    pub param_map: BTreeMap<String, String>,
    /// The compartment whose measure the reaction is integrated over.
    #[serde(default)]
    pub explicit_restriction_to_domain: Option<String>,
    /// Limits the reaction to the part of its domain tagged by an extra marker.
    #[serde(default)]
    pub subdomain_restriction: Option<SubdomainRestriction>,
    /// Per-species factors applied to the flux delivered to that species.
    #[serde(default)]
    pub flux_scaling: BTreeMap<String, f64>,
    #[serde(default)]
    pub group: String,
}

impl Named for Reaction {
    const KIND: &'static str = "reaction";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Unsigned forward and reverse rate expressions in model names.
#[derive(Debug, Clone, PartialEq)]
pub struct RateExpressions {
    pub forward: Option<Expr>,
    pub reverse: Option<Expr>,
}

impl RateExpressions {
    /// The net rate `forward - reverse`.
    #[must_use]
    pub fn net(&self) -> Expr {
        match (&self.forward, &self.reverse) {
            (Some(f), Some(r)) => f.clone() - r.clone(),
            (Some(f), None) => f.clone(),
            (None, Some(r)) => -r.clone(),
            (None, None) => Expr::Const(0.0),
        }
    }
}

impl Reaction {
    /// Creates a mass-action reaction `reactants <-> products`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if both sides are empty.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        reactants: impl IntoIterator<Item = S>,
        products: impl IntoIterator<Item = S>,
    ) -> Result<Self, ConfigurationError> {
        let reaction = Self {
            name: name.into(),
            reactants: reactants.into_iter().map(Into::into).collect(),
            products: products.into_iter().map(Into::into).collect(),
            rate_law: RateLaw::MassAction,
            species_map: BTreeMap::new(),
            param_map: BTreeMap::new(),
            explicit_restriction_to_domain: None,
            subdomain_restriction: None,
            flux_scaling: BTreeMap::new(),
            group: String::new(),
        };
        if reaction.reactants.is_empty() && reaction.products.is_empty() {
            return Err(ConfigurationError::InvalidEntity {
                kind: Self::KIND,
                name: reaction.name,
                reason: "a reaction needs at least one reactant or product".into(),
            });
        }
        Ok(reaction)
    }

    /// Maps local parameter names (e.g. `on`, `off`, `k`) to model parameters.
    #[must_use]
    pub fn with_params<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.param_map
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Maps local species names to model species.
    #[must_use]
    pub fn with_species<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.species_map
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Uses only the forward mass-action rate.
    #[must_use]
    pub fn forward_only(mut self) -> Self {
        self.rate_law = RateLaw::MassActionForward;
        self
    }

    /// Uses explicit rate expressions in local names.
    #[must_use]
    pub fn with_rates(mut self, forward: Option<&str>, reverse: Option<&str>) -> Self {
        self.rate_law = RateLaw::Custom {
            forward: forward.map(str::to_owned),
            reverse: reverse.map(str::to_owned),
        };
        self
    }

    /// Uses a template from the reaction database.
    #[must_use]
    pub fn with_database_rate(mut self, key: impl Into<String>) -> Self {
        self.rate_law = RateLaw::Database { key: key.into() };
        self
    }

    /// Integrates the reaction over the named compartment.
    #[must_use]
    pub fn restricted_to_domain(mut self, compartment: impl Into<String>) -> Self {
        self.explicit_restriction_to_domain = Some(compartment.into());
        self
    }

    /// Limits the reaction to where extra marker `marker` equals `value`.
    #[must_use]
    pub fn restricted_to_subdomain(mut self, marker: impl Into<String>, value: i64) -> Self {
        self.subdomain_restriction = Some(SubdomainRestriction {
            marker: marker.into(),
            value,
        });
        self
    }

    /// Scales the flux delivered to `species` without changing the rate.
    #[must_use]
    pub fn with_flux_scaling(mut self, species: impl Into<String>, factor: f64) -> Self {
        self.flux_scaling.insert(species.into(), factor);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Resolves a local species name to a model species name.
    #[must_use]
    pub fn species_name<'a>(&'a self, local: &'a str) -> &'a str {
        self.species_map.get(local).map_or(local, String::as_str)
    }

    /// Resolves a local parameter name to a model parameter name.
    #[must_use]
    pub fn parameter_name<'a>(&'a self, local: &'a str) -> &'a str {
        self.param_map.get(local).map_or(local, String::as_str)
    }

    /// Net stoichiometry per model species: negative for reactants.
    ///
    /// Species appearing only through `species_map` (e.g. in a custom rate
    /// law) get a zero entry so that they still join the reaction.
    #[must_use]
    pub fn stoichiometry(&self) -> BTreeMap<String, i32> {
        let mut stoich = BTreeMap::new();
        for local in &self.reactants {
            *stoich.entry(self.species_name(local).to_owned()).or_insert(0) -= 1;
        }
        for local in &self.products {
            *stoich.entry(self.species_name(local).to_owned()).or_insert(0) += 1;
        }
        for global in self.species_map.values() {
            stoich.entry(global.clone()).or_insert(0);
        }
        stoich
    }

    /// Builds the unsigned forward and reverse rates in model names.
    ///
    /// # Errors
    ///
    /// Returns an [`AssemblyError`] if a mass-action parameter is not mapped,
    /// a database key is unknown, a rate string fails to parse, or no rate
    /// is given at all.
    pub fn rate_expressions(
        &self,
        database: &BTreeMap<String, String>,
    ) -> Result<RateExpressions, AssemblyError> {
        let mass_action = |param: &str, side: &[String]| -> Result<Expr, AssemblyError> {
            let Some(global) = self.param_map.get(param) else {
                return Err(AssemblyError::UndeclaredParameter {
                    reaction: self.name.clone(),
                    name: param.to_owned(),
                });
            };
            Ok(side.iter().fold(Expr::var(global.clone()), |acc, local| {
                acc * Expr::var(self.species_name(local))
            }))
        };

        let rates = match &self.rate_law {
            RateLaw::MassAction => RateExpressions {
                forward: Some(mass_action("on", &self.reactants)?),
                reverse: Some(mass_action("off", &self.products)?),
            },
            RateLaw::MassActionForward => RateExpressions {
                forward: Some(mass_action("on", &self.reactants)?),
                reverse: None,
            },
            RateLaw::Database { key } => {
                let template =
                    database
                        .get(key)
                        .ok_or_else(|| AssemblyError::UnknownReactionType {
                            reaction: self.name.clone(),
                            key: key.clone(),
                        })?;
                RateExpressions {
                    forward: Some(self.parse_local(template)?),
                    reverse: None,
                }
            }
            RateLaw::Custom { forward, reverse } => {
                if forward.is_none() && reverse.is_none() {
                    return Err(AssemblyError::UnsupportedTopology {
                        reaction: self.name.clone(),
                        reason: "no rate law was given".into(),
                    });
                }
                RateExpressions {
                    forward: forward.as_deref().map(|s| self.parse_local(s)).transpose()?,
                    reverse: reverse.as_deref().map(|s| self.parse_local(s)).transpose()?,
                }
            }
        };
        Ok(rates)
    }

    /// Parses a rate string and renames local names to model names.
    fn parse_local(&self, input: &str) -> Result<Expr, AssemblyError> {
        let expr = Expr::parse(input).map_err(|source| AssemblyError::Parse {
            reaction: self.name.clone(),
            source,
        })?;
        let renames: HashMap<String, String> = self
            .species_map
            .iter()
            .chain(self.param_map.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(expr.rename(&renames))
    }
}
