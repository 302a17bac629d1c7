use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    data::{self, MeshData},
    element::{ElementError, ElementGeometry},
};

/// The sub-mesh of one compartment.
///
/// Vertices are numbered locally in order of first appearance; P1 degrees of
/// freedom coincide with vertices, so the vertex maps are also the dof maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildMesh {
    compartment: String,
    dim: usize,
    cells: Vec<Vec<usize>>,
    cell_markers: Vec<i64>,
    local_to_parent: Vec<usize>,
    parent_to_local: HashMap<usize, usize>,
    coordinates: Vec<[f64; 3]>,
    extra: BTreeMap<String, Vec<i64>>,
}

impl ChildMesh {
    /// Extracts the entities of dimension `dim` tagged with any of `markers`.
    pub(crate) fn extract(
        parent: &MeshData,
        compartment: &str,
        dim: usize,
        markers: &[i64],
    ) -> Self {
        let mut local_to_parent = Vec::new();
        let mut parent_to_local = HashMap::new();
        let mut cells = Vec::new();
        let mut cell_markers = Vec::new();
        let mut seen = HashSet::new();

        for entity in parent.markers.get(&dim).into_iter().flatten() {
            if !markers.contains(&entity.value) || !seen.insert(data::sorted(&entity.vertices)) {
                continue;
            }
            let cell: Vec<usize> = entity
                .vertices
                .iter()
                .map(|&p| {
                    *parent_to_local.entry(p).or_insert_with(|| {
                        local_to_parent.push(p);
                        local_to_parent.len() - 1
                    })
                })
                .collect();
            cells.push(cell);
            cell_markers.push(entity.value);
        }

        let coordinates = local_to_parent.iter().map(|&p| parent.vertices[p]).collect();

        let mut child = Self {
            compartment: compartment.to_owned(),
            dim,
            cells,
            cell_markers,
            local_to_parent,
            parent_to_local,
            coordinates,
            extra: BTreeMap::new(),
        };

        for (name, extra) in parent.extra.iter().filter(|(_, e)| e.dim == dim) {
            let lookup: HashMap<Vec<usize>, i64> = extra
                .entities
                .iter()
                .map(|e| (data::sorted(&e.vertices), e.value))
                .collect();
            let values: Vec<i64> = child
                .cells
                .iter()
                .map(|c| lookup.get(&child.parent_key(c)).copied().unwrap_or(0))
                .collect();
            child.extra.insert(name.clone(), values);
        }
        child
    }

    #[must_use]
    pub fn compartment(&self) -> &str {
        &self.compartment
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.local_to_parent.len()
    }

    /// Cells as local vertex indices.
    #[must_use]
    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    /// Marker value each cell was tagged with.
    #[must_use]
    pub fn cell_markers(&self) -> &[i64] {
        &self.cell_markers
    }

    #[must_use]
    pub fn coordinates(&self) -> &[[f64; 3]] {
        &self.coordinates
    }

    #[must_use]
    pub fn local_to_parent(&self) -> &[usize] {
        &self.local_to_parent
    }

    #[must_use]
    pub fn parent_vertex(&self, local: usize) -> Option<usize> {
        self.local_to_parent.get(local).copied()
    }

    #[must_use]
    pub fn local_vertex(&self, parent: usize) -> Option<usize> {
        self.parent_to_local.get(&parent).copied()
    }

    /// Per-cell values of an extra marker function of this mesh's dimension.
    #[must_use]
    pub fn extra_values(&self, name: &str) -> Option<&[i64]> {
        self.extra.get(name).map(Vec::as_slice)
    }

    /// Names of the extra marker functions defined on this mesh.
    pub fn extra_names(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }

    /// Vertex coordinates of one cell.
    #[must_use]
    pub fn cell_points(&self, cell: usize) -> Vec<[f64; 3]> {
        self.cells[cell].iter().map(|&v| self.coordinates[v]).collect()
    }

    /// Geometry of every cell.
    ///
    /// # Errors
    ///
    /// Returns the first [`ElementError`] with the offending cell index.
    pub fn geometry(&self, axisymmetric: bool) -> Result<Vec<ElementGeometry>, (usize, ElementError)> {
        (0..self.num_cells())
            .map(|c| ElementGeometry::new(&self.cell_points(c), axisymmetric).map_err(|e| (c, e)))
            .collect()
    }

    /// Orientation-free key of a local cell in parent vertex indices.
    pub(crate) fn parent_key(&self, cell: &[usize]) -> Vec<usize> {
        let parent: Vec<usize> = cell.iter().map(|&v| self.local_to_parent[v]).collect();
        data::sorted(&parent)
    }

    /// Keys of the cells, mapped to the cell index.
    pub(crate) fn cell_keys(&self) -> HashMap<Vec<usize>, usize> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, c)| (self.parent_key(c), i))
            .collect()
    }

    /// Keys of all cell facets, each mapped to the cells that contain it.
    pub(crate) fn facet_keys(&self) -> HashMap<Vec<usize>, Vec<usize>> {
        let mut facets: HashMap<Vec<usize>, Vec<usize>> = HashMap::new();
        for (i, cell) in self.cells.iter().enumerate() {
            let parent: Vec<usize> = cell.iter().map(|&v| self.local_to_parent[v]).collect();
            for facet in data::facets(&parent) {
                facets.entry(facet).or_default().push(i);
            }
        }
        facets
    }
}
