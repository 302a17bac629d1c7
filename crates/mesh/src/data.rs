use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use reacdiff_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A simplex of the parent mesh tagged with an integer value.
///
/// Entities are addressed by their parent vertex indices, in any order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedEntity {
    pub vertices: Vec<usize>,
    pub value: i64,
}

/// A named auxiliary marker function over entities of one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraMarker {
    pub dim: usize,
    pub entities: Vec<TaggedEntity>,
}

/// A tagged simplicial parent mesh.
///
/// `markers` maps a topological dimension to the tagged entities of that
/// dimension. Marker value 0 means untagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<[f64; 3]>,
    pub cells: Vec<Vec<usize>>,
    #[serde(default)]
    pub markers: BTreeMap<usize, Vec<TaggedEntity>>,
    #[serde(default)]
    pub extra: BTreeMap<String, ExtraMarker>,
}

/// Where a model's parent mesh comes from.
///
/// Only the reference is persisted with a model, never the mesh itself
/// unless it was given inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshSource {
    File { path: PathBuf },
    Inline { mesh: MeshData },
}

impl MeshSource {
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Loads the mesh.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Io`] or [`ConfigurationError::Data`] if
    /// a mesh file cannot be read or parsed.
    pub fn load(&self) -> Result<MeshData, ConfigurationError> {
        match self {
            Self::File { path } => MeshData::from_file(path),
            Self::Inline { mesh } => Ok(mesh.clone()),
        }
    }
}

impl From<MeshData> for MeshSource {
    fn from(mesh: MeshData) -> Self {
        Self::Inline { mesh }
    }
}

impl MeshData {
    /// Reads a mesh from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Io`] if the file cannot be read and
    /// [`ConfigurationError::Data`] if it is not a valid mesh document.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mesh: Self = serde_json::from_str(&content).map_err(|e| ConfigurationError::Data {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(
            path = %path.display(),
            vertices = mesh.vertices.len(),
            cells = mesh.cells.len(),
            "loaded parent mesh"
        );
        Ok(mesh)
    }

    /// Topological dimension of the cells.
    #[must_use]
    pub fn tdim(&self) -> usize {
        self.cells.first().map_or(0, |c| c.len().saturating_sub(1))
    }

    /// Marker values present at dimension `dim`, excluding zero.
    #[must_use]
    pub fn marker_values(&self, dim: usize) -> Vec<i64> {
        let mut values: Vec<i64> = self
            .markers
            .get(&dim)
            .into_iter()
            .flatten()
            .map(|e| e.value)
            .filter(|&v| v != 0)
            .collect();
        values.sort_unstable();
        values.dedup();
        values
    }

    /// Checks index ranges, simplex sizes and coordinate finiteness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Data`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fail = |reason: String| ConfigurationError::Data {
            source_name: "parent mesh".into(),
            reason,
        };

        if self.vertices.is_empty() || self.cells.is_empty() {
            return Err(fail("mesh has no vertices or no cells".into()));
        }
        if let Some(i) = self.vertices.iter().position(|v| v.iter().any(|c| !c.is_finite())) {
            return Err(fail(format!("vertex {i} has a non-finite coordinate")));
        }
        let tdim = self.tdim();
        if !(1..=3).contains(&tdim) {
            return Err(fail(format!("cells of dimension {tdim} are not supported")));
        }

        let n = self.vertices.len();
        let check_simplex = |vertices: &[usize], dim: usize, what: &str| {
            if vertices.len() != dim + 1 {
                return Err(fail(format!(
                    "{what} has {} vertices, expected {}",
                    vertices.len(),
                    dim + 1
                )));
            }
            if let Some(&v) = vertices.iter().find(|&&v| v >= n) {
                return Err(fail(format!("{what} references vertex {v}, mesh has {n}")));
            }
            if sorted(vertices).windows(2).any(|w| w[0] == w[1]) {
                return Err(fail(format!("{what} repeats a vertex")));
            }
            Ok(())
        };

        for (i, cell) in self.cells.iter().enumerate() {
            check_simplex(cell, tdim, &format!("cell {i}"))?;
        }

        let cell_keys: HashSet<Vec<usize>> = self.cells.iter().map(|c| sorted(c)).collect();
        let facet_keys: HashSet<Vec<usize>> = self.cells.iter().flat_map(|c| facets(c)).collect();

        for (&dim, entities) in &self.markers {
            if dim > tdim {
                return Err(fail(format!(
                    "markers at dimension {dim} exceed the cell dimension {tdim}"
                )));
            }
            for (i, entity) in entities.iter().enumerate() {
                let what = format!("marker entity {i} at dimension {dim}");
                check_simplex(&entity.vertices, dim, &what)?;
                let key = sorted(&entity.vertices);
                let known = match tdim - dim {
                    0 => cell_keys.contains(&key),
                    1 => facet_keys.contains(&key),
                    _ => true,
                };
                if !known {
                    return Err(fail(format!("{what} is not an entity of the mesh")));
                }
            }
        }
        for (name, extra) in &self.extra {
            if extra.dim > tdim {
                return Err(fail(format!(
                    "extra marker `{name}` has dimension {} above the cell dimension {tdim}",
                    extra.dim
                )));
            }
            for (i, entity) in extra.entities.iter().enumerate() {
                check_simplex(&entity.vertices, extra.dim, &format!("entity {i} of `{name}`"))?;
            }
        }
        Ok(())
    }
}

/// Vertex indices in ascending order, used as an orientation-free key.
pub(crate) fn sorted(vertices: &[usize]) -> Vec<usize> {
    let mut key = vertices.to_vec();
    key.sort_unstable();
    key
}

/// Sorted keys of the facets of a simplex.
pub(crate) fn facets(vertices: &[usize]) -> impl Iterator<Item = Vec<usize>> + '_ {
    (0..vertices.len()).map(move |skip| {
        let mut facet: Vec<usize> = vertices
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != skip)
            .map(|(_, &v)| v)
            .collect();
        facet.sort_unstable();
        facet
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> MeshData {
        MeshData {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            cells: vec![vec![0, 1, 2], vec![0, 2, 3]],
            markers: BTreeMap::from([(
                2,
                vec![
                    TaggedEntity { vertices: vec![0, 1, 2], value: 1 },
                    TaggedEntity { vertices: vec![3, 2, 0], value: 2 },
                ],
            )]),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_mesh_passes() {
        let mesh = two_triangles();
        assert_eq!(mesh.tdim(), 2);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.marker_values(2), vec![1, 2]);
        assert!(mesh.marker_values(1).is_empty());
    }

    #[test]
    fn out_of_range_vertex_is_rejected() {
        let mut mesh = two_triangles();
        mesh.cells[1][2] = 9;
        assert!(matches!(
            mesh.validate(),
            Err(ConfigurationError::Data { reason, .. }) if reason.contains("vertex 9")
        ));
    }

    #[test]
    fn facet_markers_must_be_facets() {
        let mut mesh = two_triangles();
        mesh.markers.insert(
            1,
            vec![TaggedEntity { vertices: vec![1, 3], value: 5 }],
        );
        assert!(mesh.validate().is_err());

        mesh.markers.insert(
            1,
            vec![TaggedEntity { vertices: vec![2, 0], value: 5 }],
        );
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn parses_json_with_integer_marker_keys() {
        let json = r#"{
            "vertices": [[0,0,0],[1,0,0]],
            "cells": [[0,1]],
            "markers": {"1": [{"vertices": [0,1], "value": 4}]}
        }"#;
        let mesh: MeshData = serde_json::from_str(json).unwrap();
        assert_eq!(mesh.tdim(), 1);
        assert_eq!(mesh.marker_values(1), vec![4]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn inline_sources_round_trip_through_json() {
        let source = MeshSource::from(two_triangles());
        let json = serde_json::to_string(&source).unwrap();
        let back: MeshSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);

        let file: MeshSource = serde_json::from_str(r#"{"file": {"path": "cell.json"}}"#).unwrap();
        assert_eq!(file, MeshSource::file("cell.json"));
    }
}
