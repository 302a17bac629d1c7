use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{expr::ParseError, units::UnitError};

/// Problems with the model declaration, detected before any solve begins.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("duplicate {kind} name `{name}`")]
    DuplicateName { kind: &'static str, name: String },

    #[error("`{name}` is reserved and cannot name a {kind}")]
    ProtectedName { kind: &'static str, name: String },

    #[error("compartment `{compartment}` uses marker value 0, which means untagged")]
    ZeroMarker { compartment: String },

    #[error("marker value {marker} is claimed by both `{first}` and `{second}`")]
    DuplicateMarker {
        marker: i64,
        first: String,
        second: String,
    },

    #[error("marker value {marker} of compartment `{compartment}` does not occur in the mesh at dimension {dim}")]
    MissingMarker {
        compartment: String,
        marker: i64,
        dim: usize,
    },

    #[error("marker value {marker} at dimension {dim} is not claimed by any compartment")]
    UnusedMarker { marker: i64, dim: usize },

    #[error("extra marker function `{name}` is not defined by the mesh")]
    MissingExtraMarker { name: String },

    #[error("compartments `{first}` and `{second}` are declared nonadjacent but share {shared} facets")]
    NonadjacencyContradiction {
        first: String,
        second: String,
        shared: usize,
    },

    #[error("compartment `{compartment}` has dimension {dim}: {reason}")]
    InvalidDimension {
        compartment: String,
        dim: usize,
        reason: String,
    },

    #[error("compartment dimensions span {min}..={max}, but may differ by at most one")]
    DimensionSpan { min: usize, max: usize },

    #[error("{kind} `{name}` is not used by any reaction")]
    UnusedComponent { kind: &'static str, name: String },

    #[error("{kind} `{name}` references unknown {target_kind} `{target}`")]
    UnknownReference {
        kind: &'static str,
        name: String,
        target_kind: &'static str,
        target: String,
    },

    #[error("invalid {kind} `{name}`: {reason}")]
    InvalidEntity {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("expression for {context} is invalid: {source}")]
    Expression {
        context: String,
        #[source]
        source: ParseError,
    },

    #[error("unit of {context} is invalid: {source}")]
    Unit {
        context: String,
        #[source]
        source: UnitError,
    },

    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed data in `{source_name}`: {reason}")]
    Data { source_name: String, reason: String },
}

/// Problems found while compiling reactions and species into the discrete
/// system.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("reaction `{reaction}` references undeclared species `{name}`")]
    UndeclaredSpecies { reaction: String, name: String },

    #[error("reaction `{reaction}` references undeclared parameter `{name}`")]
    UndeclaredParameter { reaction: String, name: String },

    #[error("`{name}` in {context} is neither a species, a parameter nor a coordinate")]
    UnresolvedName { context: String, name: String },

    #[error(
        "reaction `{reaction}` spans compartments {compartments:?}; set `explicit_restriction_to_domain` to choose one"
    )]
    AmbiguousDomain {
        reaction: String,
        compartments: Vec<String>,
    },

    #[error("reaction `{reaction}` has an unsupported topology: {reason}")]
    UnsupportedTopology { reaction: String, reason: String },

    #[error("reaction `{reaction}` couples compartments `{first}` and `{second}`, which share no interface")]
    NotAdjacent {
        reaction: String,
        first: String,
        second: String,
    },

    #[error(
        "reaction `{reaction}` gives species `{species}` on `{compartment}` a rate in {found}, expected a unit compatible with {expected}"
    )]
    UnitMismatch {
        reaction: String,
        species: String,
        compartment: String,
        expected: String,
        found: String,
    },

    #[error("units of `{expression}` in reaction `{reaction}` do not combine: {source}")]
    InconsistentUnits {
        reaction: String,
        expression: String,
        #[source]
        source: UnitError,
    },

    #[error("rate law of reaction `{reaction}` cannot be parsed: {source}")]
    Parse {
        reaction: String,
        #[source]
        source: ParseError,
    },

    #[error("reaction `{reaction}` uses unknown reaction type `{key}`")]
    UnknownReactionType { reaction: String, key: String },

    #[error("reaction `{reaction}` has no species to act on")]
    NoSpecies { reaction: String },
}
