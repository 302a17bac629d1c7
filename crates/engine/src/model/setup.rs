//! Validation of a model declaration before any mesh work.
//!
//! The checks run in a fixed order so that the first error reported is the
//! most fundamental one: configuration values, individual entities, the
//! shared namespace, cross references, rate laws, unused components, and
//! finally unit conversion of the diffusion coefficients.

use std::collections::BTreeSet;

use reacdiff_core::{
    AssemblyError, COORDINATE_NAMES, Compartment, Config, ConfigurationError, Container, Expr,
    Named, PROTECTED_NAMES, Parameter, ParameterSource, Reaction, Species, Unit,
};
use tracing::{debug, info};

use crate::Error;

/// A reaction with its net rate in model names.
#[derive(Debug, Clone)]
pub(crate) struct PreparedReaction {
    pub reaction: Reaction,
    pub rate: Expr,
    /// Every model species the reaction touches, in name order.
    pub species: BTreeSet<String>,
}

/// The components that take part in the simulation.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub parameters: Container<Parameter>,
    pub species: Container<Species>,
    pub compartments: Container<Compartment>,
    pub reactions: Vec<PreparedReaction>,
    /// Diffusion coefficients in squared length units of their compartment per second.
    pub diffusion: Vec<f64>,
}

pub(crate) fn prepare(
    parameters: &Container<Parameter>,
    species: &Container<Species>,
    compartments: &Container<Compartment>,
    reactions: &Container<Reaction>,
    config: &Config,
) -> Result<Prepared, Error> {
    config.validate()?;
    for p in parameters {
        p.validate()?;
    }
    for s in species {
        s.validate()?;
    }
    for c in compartments {
        c.validate()?;
    }
    check_namespace(parameters, species, compartments, reactions)?;
    check_references(parameters, species, compartments, reactions)?;

    let prepared: Vec<PreparedReaction> = reactions
        .iter()
        .map(|r| prepare_reaction(r, parameters, species, config))
        .collect::<Result<_, _>>()?;
    debug!(reactions = prepared.len(), "compiled rate laws");

    let allow = config.flags.allow_unused_components;
    let used_species: BTreeSet<&str> = prepared
        .iter()
        .flat_map(|r| r.species.iter().map(String::as_str))
        .collect();
    let used_parameters: BTreeSet<String> = prepared
        .iter()
        .flat_map(|r| r.rate.variables())
        .filter(|name| parameters.contains(name))
        .collect();

    let species = retain(species, |s| used_species.contains(s.name.as_str()), allow)?;
    let parameters = retain(parameters, |p| used_parameters.contains(&p.name), allow)?;
    let used_compartments: BTreeSet<&str> = species
        .iter()
        .map(|s| s.compartment.as_str())
        .chain(
            prepared
                .iter()
                .filter_map(|r| r.reaction.explicit_restriction_to_domain.as_deref()),
        )
        .collect();
    let compartments = retain(
        compartments,
        |c| used_compartments.contains(c.name.as_str()),
        allow,
    )?;

    check_length_units(&compartments)?;
    let diffusion = species
        .iter()
        .map(|s| convert_diffusion(s, &compartments))
        .collect::<Result<_, _>>()?;

    Ok(Prepared {
        parameters,
        species,
        compartments,
        reactions: prepared,
        diffusion,
    })
}

fn check_namespace(
    parameters: &Container<Parameter>,
    species: &Container<Species>,
    compartments: &Container<Compartment>,
    reactions: &Container<Reaction>,
) -> Result<(), ConfigurationError> {
    let names = parameters
        .names()
        .map(|n| (Parameter::KIND, n))
        .chain(species.names().map(|n| (Species::KIND, n)))
        .chain(compartments.names().map(|n| (Compartment::KIND, n)))
        .chain(reactions.names().map(|n| (Reaction::KIND, n)));

    let mut seen = BTreeSet::new();
    for (kind, name) in names {
        if PROTECTED_NAMES.contains(&name) {
            return Err(ConfigurationError::ProtectedName {
                kind,
                name: name.to_owned(),
            });
        }
        if !seen.insert(name) {
            return Err(ConfigurationError::DuplicateName {
                kind,
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}

fn check_references(
    parameters: &Container<Parameter>,
    species: &Container<Species>,
    compartments: &Container<Compartment>,
    reactions: &Container<Reaction>,
) -> Result<(), ConfigurationError> {
    let unknown = |kind, name: &str, target: &str| ConfigurationError::UnknownReference {
        kind,
        name: name.to_owned(),
        target_kind: Compartment::KIND,
        target: target.to_owned(),
    };
    for s in species {
        if !compartments.contains(&s.compartment) {
            return Err(unknown(Species::KIND, &s.name, &s.compartment));
        }
    }
    for r in reactions {
        if let Some(domain) = &r.explicit_restriction_to_domain
            && !compartments.contains(domain)
        {
            return Err(unknown(Reaction::KIND, &r.name, domain));
        }
    }
    for p in parameters {
        if let ParameterSource::Field { compartment, .. } = &p.source
            && !compartments.contains(compartment)
        {
            return Err(unknown(Parameter::KIND, &p.name, compartment));
        }
    }
    Ok(())
}

fn prepare_reaction(
    reaction: &Reaction,
    parameters: &Container<Parameter>,
    species: &Container<Species>,
    config: &Config,
) -> Result<PreparedReaction, AssemblyError> {
    let undeclared_species = |name: &str| AssemblyError::UndeclaredSpecies {
        reaction: reaction.name.clone(),
        name: name.to_owned(),
    };

    let mut participants: BTreeSet<String> = BTreeSet::new();
    for name in reaction.stoichiometry().keys() {
        if !species.contains(name) {
            return Err(undeclared_species(name));
        }
        participants.insert(name.clone());
    }
    for global in reaction.param_map.values() {
        if !parameters.contains(global) {
            return Err(AssemblyError::UndeclaredParameter {
                reaction: reaction.name.clone(),
                name: global.clone(),
            });
        }
    }
    for local in reaction.flux_scaling.keys() {
        let global = reaction.species_name(local);
        if !participants.contains(global) {
            return Err(undeclared_species(global));
        }
    }

    let rate = reaction.rate_expressions(&config.reaction_database)?.net();
    for name in rate.variables() {
        if species.contains(&name) {
            participants.insert(name);
        } else if !parameters.contains(&name) && !COORDINATE_NAMES.contains(&name.as_str()) {
            return Err(AssemblyError::UnresolvedName {
                context: format!("reaction `{}`", reaction.name),
                name,
            });
        }
    }
    if participants.is_empty() {
        return Err(AssemblyError::NoSpecies {
            reaction: reaction.name.clone(),
        });
    }

    Ok(PreparedReaction {
        reaction: reaction.clone(),
        rate,
        species: participants,
    })
}

/// Keeps the items `used` accepts, dropping the rest if `allow` is set.
fn retain<T: Named + Clone>(
    items: &Container<T>,
    used: impl Fn(&T) -> bool,
    allow: bool,
) -> Result<Container<T>, ConfigurationError> {
    let mut kept = Container::new();
    for item in items {
        if used(item) {
            kept.add(item.clone())?;
        } else if allow {
            info!(kind = T::KIND, name = item.name(), "dropping unused component");
        } else {
            return Err(ConfigurationError::UnusedComponent {
                kind: T::KIND,
                name: item.name().to_owned(),
            });
        }
    }
    Ok(kept)
}

/// Mesh coordinates are shared, so every compartment must measure length
/// in the same unit.
fn check_length_units(compartments: &Container<Compartment>) -> Result<(), ConfigurationError> {
    let Some(first) = compartments.iter().next() else {
        return Ok(());
    };
    for c in compartments.iter().skip(1) {
        let same = c
            .length_unit
            .conversion_factor(&first.length_unit)
            .is_ok_and(|f| (f - 1.0).abs() <= 1e-12);
        if !same {
            return Err(ConfigurationError::InvalidEntity {
                kind: Compartment::KIND,
                name: c.name.clone(),
                reason: format!(
                    "length unit `{}` differs from `{}` used by `{}`",
                    c.length_unit, first.length_unit, first.name
                ),
            });
        }
    }
    Ok(())
}

fn convert_diffusion(
    species: &Species,
    compartments: &Container<Compartment>,
) -> Result<f64, ConfigurationError> {
    let Some(compartment) = compartments.get(&species.compartment) else {
        return Err(ConfigurationError::UnknownReference {
            kind: Species::KIND,
            name: species.name.clone(),
            target_kind: Compartment::KIND,
            target: species.compartment.clone(),
        });
    };
    let target = &compartment.length_unit.powi(2) / &seconds();
    let factor = species
        .diffusion_unit
        .conversion_factor(&target)
        .map_err(|source| ConfigurationError::Unit {
            context: format!("diffusion coefficient of species `{}`", species.name),
            source,
        })?;
    Ok(species.diffusion_coefficient * factor)
}

pub(crate) fn seconds() -> Unit {
    // Known-good symbol, unwrap is safe
    Unit::parse("s").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn entities() -> (
        Container<Parameter>,
        Container<Species>,
        Container<Compartment>,
        Container<Reaction>,
    ) {
        let parameters = Container::from_items([
            Parameter::new("kf", 1.0, "1/s").unwrap(),
            Parameter::new("kr", 0.5, "1/s").unwrap(),
        ])
        .unwrap();
        let species = Container::from_items([
            Species::new("A", 1.0, "uM", 10.0, "um^2/s", "cyto").unwrap(),
            Species::new("B", 0.0, "uM", 1e-12, "m^2/s", "cyto").unwrap(),
        ])
        .unwrap();
        let compartments =
            Container::from_items([Compartment::new("cyto", 2, "um", 1).unwrap()]).unwrap();
        let reactions = Container::from_items([Reaction::new("r1", ["A"], ["B"])
            .unwrap()
            .with_params([("on", "kf"), ("off", "kr")])])
        .unwrap();
        (parameters, species, compartments, reactions)
    }

    #[test]
    fn diffusion_is_converted_to_compartment_units() {
        let (p, s, c, r) = entities();
        let prepared = prepare(&p, &s, &c, &r, &Config::new(1.0, 0.1)).unwrap();
        assert_relative_eq!(prepared.diffusion[0], 10.0);
        assert_relative_eq!(prepared.diffusion[1], 1.0, max_relative = 1e-12);
        assert_eq!(prepared.reactions[0].species.len(), 2);
    }

    #[test]
    fn names_are_shared_across_kinds() {
        let (mut p, s, c, r) = entities();
        p.add(Parameter::new("A", 1.0, "uM").unwrap()).unwrap();
        let err = prepare(&p, &s, &c, &r, &Config::new(1.0, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn unused_components_are_rejected_or_dropped() {
        let (mut p, s, c, r) = entities();
        p.add(Parameter::new("spare", 1.0, "1/s").unwrap()).unwrap();
        let mut config = Config::new(1.0, 0.1);
        let err = prepare(&p, &s, &c, &r, &config).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::UnusedComponent { name, .. }) if name == "spare"
        ));

        config.flags.allow_unused_components = true;
        let prepared = prepare(&p, &s, &c, &r, &config).unwrap();
        assert!(!prepared.parameters.contains("spare"));
        assert_eq!(prepared.parameters.len(), 2);
    }

    #[test]
    fn unresolved_rate_names_are_assembly_errors() {
        let (p, s, c, _) = entities();
        let r = Container::from_items([Reaction::new("r1", ["A"], ["B"])
            .unwrap()
            .with_rates(Some("kf*A*mystery"), None)])
        .unwrap();
        let err = prepare(&p, &s, &c, &r, &Config::new(1.0, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Assembly(AssemblyError::UnresolvedName { name, .. }) if name == "mystery"
        ));

        let r = Container::from_items([Reaction::new("r1", ["A"], ["Z"])
            .unwrap()
            .with_params([("on", "kf"), ("off", "kr")])])
        .unwrap();
        let err = prepare(&p, &s, &c, &r, &Config::new(1.0, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Assembly(AssemblyError::UndeclaredSpecies { name, .. }) if name == "Z"
        ));
    }

    #[test]
    fn protected_names_are_rejected() {
        let (p, mut s, c, r) = entities();
        s.add(Species::new("t", 0.0, "uM", 1.0, "um^2/s", "cyto").unwrap())
            .unwrap();
        let err = prepare(&p, &s, &c, &r, &Config::new(1.0, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::ProtectedName { .. })
        ));
    }
}
