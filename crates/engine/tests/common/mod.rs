#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use reacdiff::Model;
use reacdiff_core::{Compartment, Config, Container, Named, Parameter, Reaction, Species};
use reacdiff_mesh::{ExtraMarker, MeshData, TaggedEntity};

/// A structured triangulation of `[0, width] × [0, 1]` with `nx × ny`
/// rectangles.
///
/// `cell_marker` and `edge_marker` receive entity midpoints; a marker of 0
/// leaves the entity untagged.
pub fn rectangle(
    nx: usize,
    ny: usize,
    width: f64,
    cell_marker: impl Fn([f64; 3]) -> i64,
    edge_marker: impl Fn([f64; 3]) -> i64,
) -> MeshData {
    let id = |i: usize, j: usize| j * (nx + 1) + i;
    let mut vertices = Vec::new();
    for j in 0..=ny {
        for i in 0..=nx {
            vertices.push([width * i as f64 / nx as f64, j as f64 / ny as f64, 0.0]);
        }
    }
    let mut cells = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            cells.push(vec![id(i, j), id(i + 1, j), id(i + 1, j + 1)]);
            cells.push(vec![id(i, j), id(i + 1, j + 1), id(i, j + 1)]);
        }
    }
    tag(vertices, cells, cell_marker, edge_marker)
}

/// The unit square split into `n × n` squares.
pub fn square(
    n: usize,
    cell_marker: impl Fn([f64; 3]) -> i64,
    edge_marker: impl Fn([f64; 3]) -> i64,
) -> MeshData {
    rectangle(n, n, 1.0, cell_marker, edge_marker)
}

/// The right half of a disc of `radius` centred at the origin, the
/// meridian section of a sphere in axisymmetric models.
///
/// Cells are tagged 1 and the arc edges 2.
pub fn half_disc(radius: f64, rings: usize, sectors: usize) -> MeshData {
    let id = |i: usize, j: usize| 1 + (i - 1) * (sectors + 1) + j;
    let mut vertices = vec![[0.0; 3]];
    for i in 1..=rings {
        let r = radius * i as f64 / rings as f64;
        for j in 0..=sectors {
            let theta = -PI / 2.0 + PI * j as f64 / sectors as f64;
            vertices.push([r * theta.cos().max(0.0), r * theta.sin(), 0.0]);
        }
    }
    let mut cells = Vec::new();
    for j in 0..sectors {
        cells.push(vec![0, id(1, j), id(1, j + 1)]);
    }
    for i in 1..rings {
        for j in 0..sectors {
            cells.push(vec![id(i, j), id(i + 1, j), id(i + 1, j + 1)]);
            cells.push(vec![id(i, j), id(i + 1, j + 1), id(i, j + 1)]);
        }
    }
    let arc: Vec<TaggedEntity> = (0..sectors)
        .map(|j| TaggedEntity {
            vertices: vec![id(rings, j), id(rings, j + 1)],
            value: 2,
        })
        .collect();
    let tagged_cells = cells
        .iter()
        .map(|c| TaggedEntity {
            vertices: c.clone(),
            value: 1,
        })
        .collect();
    MeshData {
        vertices,
        cells,
        markers: BTreeMap::from([(2, tagged_cells), (1, arc)]),
        extra: BTreeMap::new(),
    }
}

fn tag(
    vertices: Vec<[f64; 3]>,
    cells: Vec<Vec<usize>>,
    cell_marker: impl Fn([f64; 3]) -> i64,
    edge_marker: impl Fn([f64; 3]) -> i64,
) -> MeshData {
    let midpoint = |vs: &[usize]| -> [f64; 3] {
        let k = vs.len() as f64;
        std::array::from_fn(|c| vs.iter().map(|&v| vertices[v][c]).sum::<f64>() / k)
    };
    let tagged_cells = cells
        .iter()
        .map(|c| TaggedEntity {
            vertices: c.clone(),
            value: cell_marker(midpoint(c)),
        })
        .filter(|e| e.value != 0)
        .collect();
    let edges: BTreeSet<Vec<usize>> = cells
        .iter()
        .flat_map(|c| {
            [(c[0], c[1]), (c[1], c[2]), (c[0], c[2])].map(|(a, b)| vec![a.min(b), a.max(b)])
        })
        .collect();
    let tagged_edges = edges
        .into_iter()
        .map(|e| TaggedEntity {
            value: edge_marker(midpoint(&e)),
            vertices: e,
        })
        .filter(|e| e.value != 0)
        .collect();
    MeshData {
        vertices,
        cells,
        markers: BTreeMap::from([(2, tagged_cells), (1, tagged_edges)]),
        extra: BTreeMap::new(),
    }
}

/// Adds an extra marker function over cells, evaluated at cell centroids.
pub fn with_cell_extra(
    mut mesh: MeshData,
    name: &str,
    marker: impl Fn([f64; 3]) -> i64,
) -> MeshData {
    let entities = mesh
        .cells
        .iter()
        .map(|c| {
            let centroid: [f64; 3] = std::array::from_fn(|k| {
                c.iter().map(|&v| mesh.vertices[v][k]).sum::<f64>() / c.len() as f64
            });
            TaggedEntity {
                vertices: c.clone(),
                value: marker(centroid),
            }
        })
        .collect();
    mesh.extra
        .insert(name.to_owned(), ExtraMarker { dim: 2, entities });
    mesh
}

/// Whether a point lies on the boundary of the unit square.
pub fn on_boundary(p: [f64; 3]) -> bool {
    let eps = 1e-9;
    p[0] < eps || p[1] < eps || p[0] > 1.0 - eps || p[1] > 1.0 - eps
}

pub fn container<T: Named>(items: Vec<T>) -> Container<T> {
    Container::from_items(items).unwrap()
}

/// A cytosol bounded by a membrane on the unit square, with `A` in the
/// cytosol binding reversibly to `B` on the membrane.
pub fn binding_model(n: usize, config: Config) -> Model {
    let mesh = square(n, |_| 1, |p| if on_boundary(p) { 10 } else { 0 });
    let compartments = container(vec![
        Compartment::new("Cyto", 2, "um", 1).unwrap(),
        Compartment::new("PM", 1, "um", 10).unwrap(),
    ]);
    let species = container(vec![
        Species::new("A", 1.0, "uM", 1.0, "um^2/s", "Cyto")
            .unwrap()
            .with_initial_expression("1 + x*y")
            .unwrap(),
        Species::new("B", 0.0, "uM*um", 0.5, "um^2/s", "PM").unwrap(),
    ]);
    let parameters = container(vec![
        Parameter::new("kf", 0.8, "um/s").unwrap(),
        Parameter::new("kr", 0.3, "1/s").unwrap(),
    ]);
    let reactions = container(vec![
        Reaction::new("bind", ["A"], ["B"])
            .unwrap()
            .with_params([("on", "kf"), ("off", "kr")]),
    ]);
    Model::new(parameters, species, compartments, reactions, config, mesh)
}

/// Total amount of `A` and `B` in the binding model.
pub fn total_mass(model: &Model) -> f64 {
    model.integrate("A").unwrap() + model.integrate("B").unwrap()
}
