use std::collections::{BTreeMap, BTreeSet};

use reacdiff_mesh::{ExtraMarker, MeshData, TaggedEntity};

/// A structured triangulation of the unit square with `n × n` squares.
///
/// `cell_marker` and `edge_marker` receive entity midpoints; a marker of 0
/// leaves the entity untagged.
pub fn square(
    n: usize,
    cell_marker: impl Fn([f64; 3]) -> i64,
    edge_marker: impl Fn([f64; 3]) -> i64,
) -> MeshData {
    let id = |i: usize, j: usize| j * (n + 1) + i;
    let h = 1.0 / n as f64;
    let mut vertices = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            vertices.push([i as f64 * h, j as f64 * h, 0.0]);
        }
    }
    let mut cells = Vec::new();
    for j in 0..n {
        for i in 0..n {
            cells.push(vec![id(i, j), id(i + 1, j), id(i + 1, j + 1)]);
            cells.push(vec![id(i, j), id(i + 1, j + 1), id(i, j + 1)]);
        }
    }

    let midpoint = |vs: &[usize]| -> [f64; 3] {
        let k = vs.len() as f64;
        std::array::from_fn(|c| vs.iter().map(|&v| vertices[v][c]).sum::<f64>() / k)
    };
    let tagged_cells = cells
        .iter()
        .map(|c| TaggedEntity { vertices: c.clone(), value: cell_marker(midpoint(c)) })
        .filter(|e| e.value != 0)
        .collect();
    let edges: BTreeSet<Vec<usize>> = cells
        .iter()
        .flat_map(|c| {
            [(c[0], c[1]), (c[1], c[2]), (c[0], c[2])]
                .map(|(a, b)| vec![a.min(b), a.max(b)])
        })
        .collect();
    let tagged_edges = edges
        .into_iter()
        .map(|e| TaggedEntity { value: edge_marker(midpoint(&e)), vertices: e })
        .filter(|e| e.value != 0)
        .collect();

    MeshData {
        vertices,
        cells,
        markers: BTreeMap::from([(2, tagged_cells), (1, tagged_edges)]),
        extra: BTreeMap::new(),
    }
}

/// Tags every edge on the boundary of the unit square.
pub fn on_boundary(p: [f64; 3]) -> bool {
    let eps = 1e-9;
    p[0] < eps || p[1] < eps || p[0] > 1.0 - eps || p[1] > 1.0 - eps
}

/// Adds an extra marker function over cells.
pub fn with_cell_extra(mut mesh: MeshData, name: &str, marker: impl Fn([f64; 3]) -> i64) -> MeshData {
    let entities = mesh
        .cells
        .iter()
        .map(|c| {
            let centroid: [f64; 3] = std::array::from_fn(|k| {
                c.iter().map(|&v| mesh.vertices[v][k]).sum::<f64>() / 3.0
            });
            TaggedEntity { vertices: c.clone(), value: marker(centroid) }
        })
        .collect();
    mesh.extra.insert(name.to_owned(), ExtraMarker { dim: 2, entities });
    mesh
}
