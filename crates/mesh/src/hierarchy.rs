use std::collections::{BTreeSet, HashMap};

use reacdiff_core::{Compartment, ConfigurationError, Container};
use tracing::{debug, info};

use crate::{
    adjacency::Adjacency,
    child::ChildMesh,
    data::MeshData,
    interface::{Interface, SurfaceVolume, VolumeVolume},
};

/// Options controlling how strictly markers are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Tolerate marker values in the mesh that no compartment claims.
    pub allow_unused_markers: bool,
}

/// A parent mesh decomposed into per-compartment child meshes, with the
/// static adjacency between compartments and the interfaces that couple them.
#[derive(Debug, Clone)]
pub struct MeshHierarchy {
    tdim: usize,
    num_parent_vertices: usize,
    children: Vec<ChildMesh>,
    index: HashMap<String, usize>,
    adjacency: Adjacency,
    interfaces: Vec<Interface>,
    pruned: Vec<(String, String)>,
    extra_names: BTreeSet<String>,
}

impl MeshHierarchy {
    /// Builds the hierarchy for `compartments` on `mesh`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the mesh is malformed, a
    /// compartment dimension is invalid, a marker is missing, duplicated or
    /// (without `allow_unused_markers`) unused, or a declared nonadjacency
    /// contradicts the geometry.
    pub fn build(
        mesh: &MeshData,
        compartments: &Container<Compartment>,
        options: BuildOptions,
    ) -> Result<Self, ConfigurationError> {
        mesh.validate()?;
        if compartments.is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "a model needs at least one compartment".into(),
            ));
        }
        let tdim = mesh.tdim();
        check_dimensions(compartments, tdim)?;
        check_markers(mesh, compartments, options)?;

        let children: Vec<ChildMesh> = compartments
            .iter()
            .map(|c| ChildMesh::extract(mesh, &c.name, c.dimensionality, &c.marker_values()))
            .collect();
        for child in &children {
            debug!(
                compartment = child.compartment(),
                dim = child.dim(),
                cells = child.num_cells(),
                vertices = child.num_vertices(),
                "extracted child mesh"
            );
        }
        let index = children
            .iter()
            .enumerate()
            .map(|(i, c)| (c.compartment().to_owned(), i))
            .collect();

        let cell_keys: Vec<_> = children.iter().map(ChildMesh::cell_keys).collect();
        let facet_keys: Vec<_> = children.iter().map(ChildMesh::facet_keys).collect();

        let declared = declared_nonadjacent(compartments)?;
        let mut adjacency = Adjacency::default();
        for i in 0..children.len() {
            for j in (i + 1)..children.len() {
                let shared = |limit: usize| match (children[i].dim(), children[j].dim()) {
                    (da, db) if da == db => count_shared(&facet_keys[i], &facet_keys[j], limit),
                    (da, db) if da + 1 == db => count_shared(&cell_keys[i], &facet_keys[j], limit),
                    (da, db) if db + 1 == da => count_shared(&cell_keys[j], &facet_keys[i], limit),
                    _ => 0,
                };
                let (a, b) = (children[i].compartment(), children[j].compartment());
                if declared.contains(&pair_key(a, b)) {
                    // A declared pair only needs a witness, not a count.
                    if shared(1) > 0 {
                        return Err(ConfigurationError::NonadjacencyContradiction {
                            first: a.to_owned(),
                            second: b.to_owned(),
                            shared: shared(usize::MAX),
                        });
                    }
                    continue;
                }
                adjacency.record(a, b, shared(usize::MAX));
            }
        }
        if !declared.is_empty() {
            debug!(pairs = declared.len(), "pruned nonadjacent compartment pairs");
        }

        let mut interfaces = Vec::new();
        for i in 0..children.len() {
            for j in (i + 1)..children.len() {
                let (a, b) = (&children[i], &children[j]);
                if !adjacency.are_adjacent(a.compartment(), b.compartment()) {
                    continue;
                }
                let interface = match (a.dim(), b.dim()) {
                    (da, db) if da == db => Interface::VolumeVolume(VolumeVolume::build(
                        a,
                        b,
                        &facet_keys[i],
                        &facet_keys[j],
                    )),
                    (da, db) if da < db => {
                        Interface::SurfaceVolume(SurfaceVolume::build(a, b, &facet_keys[j]))
                    }
                    _ => Interface::SurfaceVolume(SurfaceVolume::build(b, a, &facet_keys[i])),
                };
                let (first, second) = interface.compartments();
                debug!(first, second, coupled = interface.len(), "built interface");
                interfaces.push(interface);
            }
        }

        Ok(Self {
            tdim,
            num_parent_vertices: mesh.vertices.len(),
            children,
            index,
            adjacency,
            interfaces,
            pruned: declared.into_iter().collect(),
            extra_names: mesh.extra.keys().cloned().collect(),
        })
    }

    /// Topological dimension of the parent mesh.
    #[must_use]
    pub fn tdim(&self) -> usize {
        self.tdim
    }

    #[must_use]
    pub fn num_parent_vertices(&self) -> usize {
        self.num_parent_vertices
    }

    /// Largest compartment dimension; compartments of this dimension are volumes.
    #[must_use]
    pub fn max_dim(&self) -> usize {
        self.children.iter().map(ChildMesh::dim).max().unwrap_or(0)
    }

    #[must_use]
    pub fn child(&self, compartment: &str) -> Option<&ChildMesh> {
        self.index.get(compartment).map(|&i| &self.children[i])
    }

    pub fn children(&self) -> impl Iterator<Item = &ChildMesh> {
        self.children.iter()
    }

    #[must_use]
    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Pairs declared nonadjacent, for which no interface was built.
    #[must_use]
    pub fn pruned_pairs(&self) -> &[(String, String)] {
        &self.pruned
    }

    /// The interface between a surface and a volume it bounds.
    #[must_use]
    pub fn surface_volume(&self, surface: &str, volume: &str) -> Option<&SurfaceVolume> {
        self.interfaces.iter().find_map(|i| match i {
            Interface::SurfaceVolume(sv) if sv.surface == surface && sv.volume == volume => Some(sv),
            _ => None,
        })
    }

    /// The interface between two compartments of equal dimension.
    #[must_use]
    pub fn volume_volume(&self, a: &str, b: &str) -> Option<&VolumeVolume> {
        self.interfaces.iter().find_map(|i| match i {
            Interface::VolumeVolume(vv)
                if (vv.first == a && vv.second == b) || (vv.first == b && vv.second == a) =>
            {
                Some(vv)
            }
            _ => None,
        })
    }

    #[must_use]
    pub fn has_extra_marker(&self, name: &str) -> bool {
        self.extra_names.contains(name)
    }
}

fn check_dimensions(
    compartments: &Container<Compartment>,
    tdim: usize,
) -> Result<(), ConfigurationError> {
    for c in compartments {
        c.validate()?;
        if c.dimensionality > tdim {
            return Err(ConfigurationError::InvalidDimension {
                compartment: c.name.clone(),
                dim: c.dimensionality,
                reason: format!("the parent mesh has dimension {tdim}"),
            });
        }
    }
    let dims = compartments.iter().map(|c| c.dimensionality);
    let (min, max) = dims.fold((usize::MAX, 0), |(lo, hi), d| (lo.min(d), hi.max(d)));
    if max - min > 1 {
        return Err(ConfigurationError::DimensionSpan { min, max });
    }
    Ok(())
}

fn check_markers(
    mesh: &MeshData,
    compartments: &Container<Compartment>,
    options: BuildOptions,
) -> Result<(), ConfigurationError> {
    let mut owners: HashMap<i64, &str> = HashMap::new();
    for c in compartments {
        for value in c.marker_values() {
            if let Some(first) = owners.insert(value, &c.name) {
                return Err(ConfigurationError::DuplicateMarker {
                    marker: value,
                    first: first.to_owned(),
                    second: c.name.clone(),
                });
            }
        }
    }

    let dims: BTreeSet<usize> = compartments.iter().map(|c| c.dimensionality).collect();
    for dim in dims {
        let present = mesh.marker_values(dim);
        let mut claimed = BTreeSet::new();
        for c in compartments.iter().filter(|c| c.dimensionality == dim) {
            for value in c.marker_values() {
                if !present.contains(&value) {
                    return Err(ConfigurationError::MissingMarker {
                        compartment: c.name.clone(),
                        marker: value,
                        dim,
                    });
                }
                claimed.insert(value);
            }
        }
        for &value in present.iter().filter(|v| !claimed.contains(*v)) {
            if options.allow_unused_markers {
                info!(marker = value, dim, "ignoring mesh marker claimed by no compartment");
            } else {
                return Err(ConfigurationError::UnusedMarker { marker: value, dim });
            }
        }
    }
    Ok(())
}

/// Counts keys of `lower` that are facets in `higher`, up to `limit`.
fn count_shared<V>(
    lower: &HashMap<Vec<usize>, V>,
    higher: &HashMap<Vec<usize>, Vec<usize>>,
    limit: usize,
) -> usize {
    lower
        .keys()
        .filter(|k| higher.contains_key(*k))
        .take(limit)
        .count()
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

/// Pairs declared nonadjacent by either side.
fn declared_nonadjacent(
    compartments: &Container<Compartment>,
) -> Result<BTreeSet<(String, String)>, ConfigurationError> {
    let mut declared = BTreeSet::new();
    for c in compartments {
        for other in &c.nonadjacent_compartments {
            if !compartments.contains(other) {
                return Err(ConfigurationError::UnknownReference {
                    kind: "compartment",
                    name: c.name.clone(),
                    target_kind: "compartment",
                    target: other.clone(),
                });
            }
            declared.insert(pair_key(&c.name, other));
        }
    }
    Ok(declared)
}
