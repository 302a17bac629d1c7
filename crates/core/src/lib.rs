//! Core types for compartmental reaction-diffusion models.
//!
//! This crate holds everything that describes a model independently of its
//! discretization:
//!
//! - [`units`] — runtime units and dimensional analysis
//! - [`expr`] — typed expression trees for rate laws and time courses
//! - [`Parameter`], [`Species`], [`Compartment`], [`Reaction`] and the
//!   name-unique [`Container`] that owns them
//! - [`Config`] — solver and feature options, loadable from TOML
//! - [`TimeGrid`] — fixed-precision simulation time
//! - [`Observer`] — the hook solvers use to report events
//! - [`ConfigurationError`], [`AssemblyError`] — the shared error taxonomy

pub mod config;
pub mod expr;
pub mod time;
pub mod units;

mod compartment;
mod container;
mod error;
mod observer;
mod parameter;
mod reaction;
mod species;

pub use compartment::{Compartment, Marker};
pub use config::{Config, Flags, LinearSettings, NewtonSettings, Preconditioner, SolverConfig};
pub use container::{Container, Named};
pub use error::{AssemblyError, ConfigurationError};
pub use expr::{Expr, Func};
pub use observer::Observer;
pub use parameter::{COORDINATE_NAMES, Parameter, ParameterSource};
pub use reaction::{RateExpressions, RateLaw, Reaction};
pub use species::{InitialCondition, Species, SubdomainRestriction};
pub use time::{TimeGrid, Ticks};
pub use units::{Dimension, Unit, UnitError};

/// Names that entities may not use: the spatial coordinates and time.
pub const PROTECTED_NAMES: [&str; 4] = ["x", "y", "z", "t"];

pub type ParameterContainer = Container<Parameter>;
pub type SpeciesContainer = Container<Species>;
pub type CompartmentContainer = Container<Compartment>;
pub type ReactionContainer = Container<Reaction>;
