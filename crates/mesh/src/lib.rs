//! Mesh hierarchy for compartmental reaction-diffusion models.
//!
//! A tagged parent mesh ([`MeshData`]) is decomposed into one [`ChildMesh`]
//! per compartment. Compartments that touch are recorded in a static
//! [`Adjacency`] and coupled through [`Interface`]s; pairs declared
//! nonadjacent are checked against the geometry and skipped.
//!
//! The [`element`] module provides the P1 simplex geometry and quadrature
//! the assembler builds its forms from.

mod adjacency;
mod child;
mod data;
pub mod element;
mod hierarchy;
mod interface;

pub use adjacency::Adjacency;
pub use child::ChildMesh;
pub use data::{ExtraMarker, MeshData, MeshSource, TaggedEntity};
pub use element::{ElementError, ElementGeometry};
pub use hierarchy::{BuildOptions, MeshHierarchy};
pub use interface::{Interface, SharedFacet, SurfaceVolume, VolumeVolume};
