use std::collections::{BTreeMap, HashMap};

use crate::child::ChildMesh;

/// Coupling between a compartment and one of dimension one lower lying on
/// its boundary (or inside it).
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceVolume {
    pub surface: String,
    pub volume: String,
    /// `(surface cell, volume cell)` pairs where the surface cell is a facet
    /// of the volume cell.
    pub cells: Vec<(usize, usize)>,
    /// Surface-local vertex to volume-local vertex, for vertices of coupled cells.
    pub vertex_map: HashMap<usize, usize>,
}

impl SurfaceVolume {
    pub(crate) fn build(surface: &ChildMesh, volume: &ChildMesh, volume_facets: &HashMap<Vec<usize>, Vec<usize>>) -> Self {
        let mut cells = Vec::new();
        let mut vertex_map = HashMap::new();
        for (s, cell) in surface.cells().iter().enumerate() {
            let Some(&v) = volume_facets.get(&surface.parent_key(cell)).and_then(|c| c.first()) else {
                continue;
            };
            cells.push((s, v));
            for &local in cell {
                let parent = surface.local_to_parent()[local];
                if let Some(target) = volume.local_vertex(parent) {
                    vertex_map.insert(local, target);
                }
            }
        }
        Self {
            surface: surface.compartment().to_owned(),
            volume: volume.compartment().to_owned(),
            cells,
            vertex_map,
        }
    }

    /// Maps the local vertices of a surface cell into the volume, if the
    /// cell is coupled.
    #[must_use]
    pub fn map_cell(&self, cell: &[usize]) -> Option<Vec<usize>> {
        cell.iter().map(|v| self.vertex_map.get(v).copied()).collect()
    }
}

/// A facet shared by cells of two same-dimension compartments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFacet {
    /// Parent vertex indices, sorted.
    pub vertices: Vec<usize>,
    pub first_cell: usize,
    pub second_cell: usize,
}

/// Coupling between two compartments of equal dimension that meet at facets.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeVolume {
    pub first: String,
    pub second: String,
    pub facets: Vec<SharedFacet>,
}

impl VolumeVolume {
    pub(crate) fn build(
        first: &ChildMesh,
        second: &ChildMesh,
        first_facets: &HashMap<Vec<usize>, Vec<usize>>,
        second_facets: &HashMap<Vec<usize>, Vec<usize>>,
    ) -> Self {
        // Sorted for a deterministic facet order.
        let ordered: BTreeMap<&Vec<usize>, &Vec<usize>> = first_facets.iter().collect();
        let facets = ordered
            .into_iter()
            .filter_map(|(key, a)| {
                let b = second_facets.get(key)?;
                Some(SharedFacet {
                    vertices: key.clone(),
                    first_cell: *a.first()?,
                    second_cell: *b.first()?,
                })
            })
            .collect();
        Self {
            first: first.compartment().to_owned(),
            second: second.compartment().to_owned(),
            facets,
        }
    }
}

/// A coupling structure between two adjacent compartments.
#[derive(Debug, Clone, PartialEq)]
pub enum Interface {
    SurfaceVolume(SurfaceVolume),
    VolumeVolume(VolumeVolume),
}

impl Interface {
    /// The two compartment names, lower-dimensional first where applicable.
    #[must_use]
    pub fn compartments(&self) -> (&str, &str) {
        match self {
            Self::SurfaceVolume(i) => (&i.surface, &i.volume),
            Self::VolumeVolume(i) => (&i.first, &i.second),
        }
    }

    /// Number of coupled cells or facets.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::SurfaceVolume(i) => i.cells.len(),
            Self::VolumeVolume(i) => i.facets.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
