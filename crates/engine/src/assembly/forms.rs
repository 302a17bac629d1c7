//! Compilation of reactions and species into element-level forms.
//!
//! A reaction is integrated over one compartment, its domain. Species living
//! on a compartment one dimension higher contribute through the traces of
//! their basis functions on the shared facets, so a boundary reaction on a
//! membrane reads cytosolic concentrations at the membrane vertices and
//! delivers its flux there.

use std::collections::{BTreeMap, BTreeSet};

use reacdiff_core::{
    AssemblyError, Compartment, ConfigurationError, Container, Expr, Parameter, ParameterSource,
    Species, Unit,
};
use reacdiff_mesh::MeshHierarchy;
use tracing::{debug, warn};

use crate::{
    Error,
    assembly::layout::DofLayout,
    model::setup::{PreparedReaction, seconds},
};

/// A value an expression can read at a quadrature point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Slot {
    /// Position in [`ReactionForm::species`].
    Species(usize),
    /// Model parameter index.
    Parameter(usize),
    /// Position in [`ReactionForm::fields`].
    Field(usize),
    Coordinate(usize),
    /// End of the current step.
    Time,
    StepStart,
    StepLength,
}

/// The degrees of freedom one reaction cell touches.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormCell {
    pub cell: usize,
    /// Global dofs of each form species, one per basis function.
    pub dofs: Vec<Vec<usize>>,
    /// Field-compartment vertices of each form field, one per basis function.
    pub fields: Vec<Vec<usize>>,
}

/// A compiled reaction.
#[derive(Debug, Clone)]
pub(crate) struct ReactionForm {
    pub reaction: String,
    /// Index of the domain compartment.
    pub compartment: usize,
    /// Model species indices.
    pub species: Vec<usize>,
    /// Model parameter indices of the field parameters read by the rate.
    pub fields: Vec<usize>,
    pub rate: Expr<Slot>,
    /// `(form species, ∂rate/∂species)`, zero derivatives omitted.
    pub derivatives: Vec<(usize, Expr<Slot>)>,
    /// `(form species, coefficient)`: stoichiometry times flux scaling
    /// times the unit conversion into that species' balance.
    pub destinations: Vec<(usize, f64)>,
    pub cells: Vec<FormCell>,
}

/// Mass and diffusion of one species.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transport {
    pub species: usize,
    pub compartment: usize,
    pub diffusion: f64,
    /// Global dofs of every cell of the compartment.
    pub dofs: Vec<Vec<usize>>,
    /// Cells the species lives on.
    pub cells: Vec<usize>,
    /// Global dofs outside every active cell, held at zero.
    pub pinned: Vec<usize>,
}

/// Model data the compiler reads.
pub(crate) struct Context<'a> {
    pub parameters: &'a Container<Parameter>,
    pub species: &'a Container<Species>,
    pub compartments: &'a Container<Compartment>,
    pub hierarchy: &'a MeshHierarchy,
    pub layout: &'a DofLayout,
}

impl Context<'_> {
    fn compartment(&self, name: &str) -> Result<(usize, &Compartment), ConfigurationError> {
        self.compartments
            .position(name)
            .zip(self.compartments.get(name))
            .ok_or_else(|| ConfigurationError::InvalidConfig(format!("unknown compartment `{name}`")))
    }
}

/// Builds the transport term of every species.
pub(crate) fn compile_transports(
    ctx: &Context<'_>,
    diffusion: &[f64],
) -> Result<Vec<Transport>, Error> {
    let mut transports = Vec::with_capacity(ctx.species.len());
    for (index, species) in ctx.species.iter().enumerate() {
        let (compartment, _) = ctx.compartment(&species.compartment)?;
        let Some(child) = ctx.hierarchy.child(&species.compartment) else {
            return Err(Error::Unknown {
                kind: "compartment",
                name: species.compartment.clone(),
            });
        };
        let cells: Vec<usize> = match &species.subdomain_restriction {
            None => (0..child.num_cells()).collect(),
            Some(restriction) => {
                let values = child.extra_values(&restriction.marker).ok_or_else(|| {
                    ConfigurationError::MissingExtraMarker {
                        name: restriction.marker.clone(),
                    }
                })?;
                (0..child.num_cells())
                    .filter(|&c| values[c] == restriction.value)
                    .collect()
            }
        };

        let mut active = vec![false; child.num_vertices()];
        for &c in &cells {
            for &v in &child.cells()[c] {
                active[v] = true;
            }
        }
        let pinned: Vec<usize> = active
            .iter()
            .enumerate()
            .filter(|(_, on)| !**on)
            .map(|(v, _)| ctx.layout.dof(index, v))
            .collect();
        if !pinned.is_empty() {
            debug!(
                species = %species.name,
                pinned = pinned.len(),
                "species is restricted to part of its compartment"
            );
        }

        let dofs = child
            .cells()
            .iter()
            .map(|cell| cell.iter().map(|&v| ctx.layout.dof(index, v)).collect())
            .collect();
        transports.push(Transport {
            species: index,
            compartment,
            diffusion: diffusion[index],
            dofs,
            cells,
            pinned,
        });
    }
    Ok(transports)
}

/// Compiles one reaction into its form.
pub(crate) fn compile_reaction(
    ctx: &Context<'_>,
    prepared: &PreparedReaction,
) -> Result<ReactionForm, Error> {
    let reaction = &prepared.reaction;
    let name = reaction.name.clone();

    let species: Vec<usize> = prepared
        .species
        .iter()
        .filter_map(|s| ctx.species.position(s))
        .collect();
    let involved: BTreeSet<&str> = species
        .iter()
        .map(|&s| species_at(ctx, s).compartment.as_str())
        .collect();
    let domain_name = choose_domain(ctx, &name, &involved, reaction.explicit_restriction_to_domain.as_deref())?;
    let (domain, domain_compartment) = ctx.compartment(domain_name)?;
    check_coupling(ctx, &name, domain_compartment, &involved)?;

    let (scaled, unit) = units_of(ctx, &name, &prepared.rate, domain_compartment)?;

    let stoichiometry = reaction.stoichiometry();
    let scaling: BTreeMap<&str, f64> = reaction
        .flux_scaling
        .iter()
        .map(|(local, factor)| (reaction.species_name(local), *factor))
        .collect();
    let mut destinations = Vec::new();
    for (position, &s) in species.iter().enumerate() {
        let target = species_at(ctx, s);
        let stoich = stoichiometry.get(&target.name).copied().unwrap_or(0);
        if stoich == 0 {
            continue;
        }
        let expected = expected_unit(ctx, target, domain_compartment)?;
        let factor = unit
            .conversion_factor(&expected)
            .map_err(|_| AssemblyError::UnitMismatch {
                reaction: name.clone(),
                species: target.name.clone(),
                compartment: target.compartment.clone(),
                expected: expected.to_string(),
                found: unit.to_string(),
            })?;
        let flux = scaling.get(target.name.as_str()).copied().unwrap_or(1.0);
        destinations.push((position, f64::from(stoich) * flux * factor));
    }

    let mut fields = Vec::new();
    let rate = to_slots(ctx, &scaled, &species, &mut fields)?;
    let rate = inline_spatial(ctx, &rate)?.simplify();
    let derivatives: Vec<(usize, Expr<Slot>)> = (0..species.len())
        .map(|p| (p, rate.derivative(&Slot::Species(p))))
        .filter(|(_, d)| d.as_const() != Some(0.0))
        .collect();

    let cells = compile_cells(ctx, &name, reaction, domain_name, &species, &fields)?;
    if cells.is_empty() {
        warn!(reaction = %name, domain = domain_name, "reaction has no cells to act on");
    }
    debug!(
        reaction = %name,
        domain = domain_name,
        cells = cells.len(),
        rate = %prepared.rate,
        "compiled reaction"
    );

    Ok(ReactionForm {
        reaction: name,
        compartment: domain,
        species,
        fields,
        rate,
        derivatives,
        destinations,
        cells,
    })
}

fn species_at<'a>(ctx: &Context<'a>, index: usize) -> &'a Species {
    &ctx.species.as_slice()[index]
}

/// Picks the compartment a reaction is integrated over.
///
/// Without an explicit choice, a reaction on one compartment lives there and
/// a reaction spanning a surface and the volumes on either side of it lives
/// on the surface.
fn choose_domain<'a>(
    ctx: &Context<'_>,
    reaction: &str,
    involved: &BTreeSet<&'a str>,
    explicit: Option<&'a str>,
) -> Result<&'a str, Error> {
    if let Some(domain) = explicit {
        return Ok(domain);
    }
    let dims: Vec<(&str, usize)> = involved
        .iter()
        .map(|&c| Ok((c, ctx.compartment(c)?.1.dimensionality)))
        .collect::<Result<_, ConfigurationError>>()?;
    let unsupported = |reason: String| {
        Error::Assembly(AssemblyError::UnsupportedTopology {
            reaction: reaction.to_owned(),
            reason,
        })
    };

    let Some(min) = dims.iter().map(|d| d.1).min() else {
        return Err(AssemblyError::NoSpecies {
            reaction: reaction.to_owned(),
        }
        .into());
    };
    let lows: Vec<&str> = dims.iter().filter(|d| d.1 == min).map(|d| d.0).collect();
    match (dims.len(), lows.len()) {
        (1, _) => Ok(dims[0].0),
        (_, 1) if dims.len() <= 3 => Ok(lows[0]),
        (_, n) if n == dims.len() && min == ctx.hierarchy.max_dim() => {
            Err(AssemblyError::AmbiguousDomain {
                reaction: reaction.to_owned(),
                compartments: lows.iter().map(|&c| c.to_owned()).collect(),
            }
            .into())
        }
        (_, n) if n == dims.len() => Err(unsupported(format!(
            "{n} compartments of dimension {min} cannot be coupled directly"
        ))),
        _ => Err(unsupported(format!(
            "compartments {:?} do not form a surface between at most two volumes",
            dims.iter().map(|d| d.0).collect::<Vec<_>>()
        ))),
    }
}

/// Every non-domain compartment must be a volume bounded by the domain.
fn check_coupling(
    ctx: &Context<'_>,
    reaction: &str,
    domain: &Compartment,
    involved: &BTreeSet<&str>,
) -> Result<(), Error> {
    for &other in involved.iter().filter(|&&c| c != domain.name) {
        let (_, compartment) = ctx.compartment(other)?;
        if compartment.dimensionality != domain.dimensionality + 1 {
            return Err(AssemblyError::UnsupportedTopology {
                reaction: reaction.to_owned(),
                reason: format!(
                    "`{other}` has dimension {} but the domain `{}` has dimension {}",
                    compartment.dimensionality, domain.name, domain.dimensionality
                ),
            }
            .into());
        }
        let declared = domain.nonadjacent_compartments.contains(other)
            || compartment.nonadjacent_compartments.contains(&domain.name);
        let coupled = ctx
            .hierarchy
            .surface_volume(&domain.name, other)
            .is_some_and(|sv| !sv.cells.is_empty());
        if declared || !coupled {
            return Err(AssemblyError::NotAdjacent {
                reaction: reaction.to_owned(),
                first: domain.name.clone(),
                second: other.to_owned(),
            }
            .into());
        }
    }
    Ok(())
}

/// Rewrites the rate so that it evaluates in one consistent unit, and
/// returns that unit.
fn units_of(
    ctx: &Context<'_>,
    reaction: &str,
    rate: &Expr,
    domain: &Compartment,
) -> Result<(Expr, Unit), AssemblyError> {
    let lookup = |name: &String| -> Option<Unit> {
        if let Some(s) = ctx.species.get(name) {
            return Some(s.concentration_unit.clone());
        }
        if let Some(p) = ctx.parameters.get(name) {
            return Some(p.unit.clone());
        }
        match name.as_str() {
            "x" | "y" | "z" => Some(domain.length_unit.clone()),
            "t" => Some(seconds()),
            _ => None,
        }
    };
    rate.with_units(&lookup)
        .map_err(|source| AssemblyError::InconsistentUnits {
            reaction: reaction.to_owned(),
            expression: rate.to_string(),
            source,
        })
}

/// The unit a rate must have to enter the balance of `species`: a
/// concentration rate on the domain itself, a flux density elsewhere.
fn expected_unit(
    ctx: &Context<'_>,
    species: &Species,
    domain: &Compartment,
) -> Result<Unit, ConfigurationError> {
    let per_second = &species.concentration_unit / &seconds();
    if species.compartment == domain.name {
        return Ok(per_second);
    }
    let (_, volume) = ctx.compartment(&species.compartment)?;
    Ok(&per_second * &volume.length_unit)
}

fn to_slots(
    ctx: &Context<'_>,
    rate: &Expr,
    species: &[usize],
    fields: &mut Vec<usize>,
) -> Result<Expr<Slot>, ConfigurationError> {
    rate.map_vars(&mut |name: &String| {
        if let Some(s) = ctx.species.position(name)
            && let Some(p) = species.iter().position(|&x| x == s)
        {
            return Ok(Slot::Species(p));
        }
        if let Some(i) = ctx.parameters.position(name) {
            let parameter = &ctx.parameters.as_slice()[i];
            if matches!(parameter.source, ParameterSource::Field { .. }) {
                let existing = fields.iter().position(|&f| f == i);
                let k = existing.unwrap_or_else(|| {
                    fields.push(i);
                    fields.len() - 1
                });
                return Ok(Slot::Field(k));
            }
            return Ok(Slot::Parameter(i));
        }
        coordinate_slot(name, Slot::Time).ok_or_else(|| {
            ConfigurationError::InvalidConfig(format!("`{name}` has no value in the forms"))
        })
    })
}

fn coordinate_slot(name: &str, time: Slot) -> Option<Slot> {
    match name {
        "x" => Some(Slot::Coordinate(0)),
        "y" => Some(Slot::Coordinate(1)),
        "z" => Some(Slot::Coordinate(2)),
        "t" => Some(time),
        _ => None,
    }
}

/// Replaces space-dependent expression parameters by their definitions.
///
/// Preintegrated ones become the step average of their antiderivative.
fn inline_spatial(ctx: &Context<'_>, rate: &Expr<Slot>) -> Result<Expr<Slot>, ConfigurationError> {
    let mut definitions: BTreeMap<usize, Expr<Slot>> = BTreeMap::new();
    for slot in rate.variables() {
        let Slot::Parameter(i) = slot else {
            continue;
        };
        let parameter = &ctx.parameters.as_slice()[i];
        if !parameter.is_space_dependent {
            continue;
        }
        let Some((expr, antiderivative)) = parameter.expression()? else {
            continue;
        };
        let at = |e: &Expr, time: Slot| {
            e.map_vars(&mut |name: &String| {
                coordinate_slot(name, time).ok_or_else(|| {
                    ConfigurationError::InvalidConfig(format!(
                        "parameter `{}` depends on `{name}`",
                        parameter.name
                    ))
                })
            })
        };
        let definition = match (parameter.use_preintegration, antiderivative) {
            (true, Some(anti)) => {
                (at(&anti, Slot::Time)? - at(&anti, Slot::StepStart)?) / Expr::Var(Slot::StepLength)
            }
            (true, None) => {
                return Err(ConfigurationError::InvalidEntity {
                    kind: "parameter",
                    name: parameter.name.clone(),
                    reason: "preintegrating a space-dependent expression requires an antiderivative"
                        .into(),
                });
            }
            (false, _) => at(&expr, Slot::Time)?,
        };
        definitions.insert(i, definition);
    }
    Ok(rate.substitute(&|slot: &Slot| match slot {
        Slot::Parameter(i) => definitions.get(i).cloned(),
        _ => None,
    }))
}

fn compile_cells(
    ctx: &Context<'_>,
    reaction_name: &str,
    reaction: &reacdiff_core::Reaction,
    domain: &str,
    species: &[usize],
    fields: &[usize],
) -> Result<Vec<FormCell>, Error> {
    let Some(child) = ctx.hierarchy.child(domain) else {
        return Err(Error::Unknown {
            kind: "compartment",
            name: domain.to_owned(),
        });
    };
    let restriction = match &reaction.subdomain_restriction {
        None => None,
        Some(r) => {
            let values = child.extra_values(&r.marker).ok_or_else(|| {
                ConfigurationError::MissingExtraMarker {
                    name: r.marker.clone(),
                }
            })?;
            Some((values, r.value))
        }
    };

    // Maps a domain cell into the vertices of another compartment.
    let vertices_on = |compartment: &str, cell: &[usize]| -> Option<Vec<usize>> {
        if compartment == domain {
            Some(cell.to_vec())
        } else {
            ctx.hierarchy.surface_volume(domain, compartment)?.map_cell(cell)
        }
    };
    let field_compartments: Vec<&str> = fields
        .iter()
        .map(|&i| match &ctx.parameters.as_slice()[i].source {
            ParameterSource::Field { compartment, .. } => compartment.as_str(),
            _ => domain,
        })
        .collect();
    for (&i, &compartment) in fields.iter().zip(&field_compartments) {
        if compartment != domain && ctx.hierarchy.surface_volume(domain, compartment).is_none() {
            return Err(AssemblyError::UnsupportedTopology {
                reaction: reaction_name.to_owned(),
                reason: format!(
                    "field parameter `{}` lives on `{compartment}`, which does not bound `{domain}`",
                    ctx.parameters.as_slice()[i].name
                ),
            }
            .into());
        }
    }

    let mut cells = Vec::new();
    'cells: for (c, cell) in child.cells().iter().enumerate() {
        if let Some((values, value)) = restriction
            && values[c] != value
        {
            continue;
        }
        let mut dofs = Vec::with_capacity(species.len());
        for &s in species {
            let target = species_at(ctx, s);
            let Some(vertices) = vertices_on(&target.compartment, cell) else {
                continue 'cells;
            };
            dofs.push(vertices.iter().map(|&v| ctx.layout.dof(s, v)).collect());
        }
        let mut field_vertices = Vec::with_capacity(fields.len());
        for &compartment in &field_compartments {
            let Some(vertices) = vertices_on(compartment, cell) else {
                continue 'cells;
            };
            field_vertices.push(vertices);
        }
        cells.push(FormCell {
            cell: c,
            dofs,
            fields: field_vertices,
        });
    }
    Ok(cells)
}
