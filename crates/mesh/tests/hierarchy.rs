mod common;

use reacdiff_core::{Compartment, ConfigurationError, Container};
use reacdiff_mesh::{BuildOptions, Interface, MeshHierarchy};

use common::{on_boundary, square, with_cell_extra};

fn compartments(items: Vec<Compartment>) -> Container<Compartment> {
    Container::from_items(items).unwrap()
}

#[test]
fn builds_children_and_surface_interface() {
    let mesh = square(4, |_| 1, |p| if on_boundary(p) { 10 } else { 0 });
    let comps = compartments(vec![
        Compartment::new("Cyto", 2, "um", 1).unwrap(),
        Compartment::new("PM", 1, "um", 10).unwrap(),
    ]);

    let hierarchy = MeshHierarchy::build(&mesh, &comps, BuildOptions::default()).unwrap();

    let cyto = hierarchy.child("Cyto").unwrap();
    let pm = hierarchy.child("PM").unwrap();
    assert_eq!(cyto.num_cells(), 32);
    assert_eq!(cyto.num_vertices(), 25);
    assert_eq!(pm.num_cells(), 16);
    assert_eq!(pm.num_vertices(), 16);
    assert_eq!(hierarchy.max_dim(), 2);

    for local in 0..pm.num_vertices() {
        let parent = pm.parent_vertex(local).unwrap();
        assert_eq!(pm.local_vertex(parent), Some(local));
        assert_eq!(pm.coordinates()[local], mesh.vertices[parent]);
    }

    let interface = hierarchy.surface_volume("PM", "Cyto").unwrap();
    assert_eq!(interface.cells.len(), 16);
    assert_eq!(interface.vertex_map.len(), 16);
    for (&s, &v) in &interface.vertex_map {
        assert_eq!(pm.parent_vertex(s), cyto.parent_vertex(v));
    }
    assert_eq!(hierarchy.adjacency().shared("Cyto", "PM"), 16);
}

#[test]
fn volumes_sharing_facets_get_an_interface() {
    let mesh = square(
        4,
        |c| if c[0] < 0.5 { 1 } else { 2 },
        |p| if p[0] < 1e-9 { 11 } else { 0 },
    );
    let comps = compartments(vec![
        Compartment::new("Left", 2, "um", 1).unwrap(),
        Compartment::new("Right", 2, "um", 2).unwrap(),
        Compartment::new("LeftPM", 1, "um", 11)
            .unwrap()
            .with_nonadjacent(["Right"]),
    ]);

    let hierarchy = MeshHierarchy::build(&mesh, &comps, BuildOptions::default()).unwrap();

    let shared = hierarchy.volume_volume("Right", "Left").unwrap();
    assert_eq!(shared.facets.len(), 4);
    assert!(hierarchy.adjacency().are_adjacent("Left", "LeftPM"));
    assert!(!hierarchy.adjacency().are_adjacent("Right", "LeftPM"));
    assert_eq!(
        hierarchy.pruned_pairs(),
        &[("LeftPM".to_owned(), "Right".to_owned())]
    );
    assert_eq!(hierarchy.interfaces().len(), 2);
    assert!(hierarchy.interfaces().iter().all(|i| !matches!(
        i,
        Interface::SurfaceVolume(sv) if sv.volume == "Right"
    )));
}

#[test]
fn contradicting_nonadjacency_is_rejected() {
    let mesh = square(4, |c| if c[0] < 0.5 { 1 } else { 2 }, |_| 0);
    let comps = compartments(vec![
        Compartment::new("Left", 2, "um", 1)
            .unwrap()
            .with_nonadjacent(["Right"]),
        Compartment::new("Right", 2, "um", 2).unwrap(),
    ]);

    let err = MeshHierarchy::build(&mesh, &comps, BuildOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::NonadjacencyContradiction { shared: 4, .. }
    ));
}

#[test]
fn missing_and_unused_markers() {
    let mesh = square(2, |c| if c[0] < 0.5 { 1 } else { 2 }, |_| 0);

    let missing = compartments(vec![Compartment::new("Cyto", 2, "um", 7).unwrap()]);
    assert!(matches!(
        MeshHierarchy::build(&mesh, &missing, BuildOptions::default()),
        Err(ConfigurationError::MissingMarker { marker: 7, dim: 2, .. })
    ));

    let partial = compartments(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]);
    assert!(matches!(
        MeshHierarchy::build(&mesh, &partial, BuildOptions::default()),
        Err(ConfigurationError::UnusedMarker { marker: 2, dim: 2 })
    ));

    let options = BuildOptions {
        allow_unused_markers: true,
    };
    let hierarchy = MeshHierarchy::build(&mesh, &partial, options).unwrap();
    assert_eq!(hierarchy.child("Cyto").unwrap().num_cells(), 4);
}

#[test]
fn duplicate_markers_and_dimensions_are_checked() {
    let mesh = square(2, |_| 1, |p| if on_boundary(p) { 10 } else { 0 });

    let duplicate = compartments(vec![
        Compartment::new("A", 2, "um", 1).unwrap(),
        Compartment::new("B", 2, "um", vec![3_i64, 1]).unwrap(),
    ]);
    assert!(matches!(
        MeshHierarchy::build(&mesh, &duplicate, BuildOptions::default()),
        Err(ConfigurationError::DuplicateMarker { marker: 1, .. })
    ));

    let too_high = compartments(vec![Compartment::new("Cyto", 3, "um", 1).unwrap()]);
    assert!(matches!(
        MeshHierarchy::build(&mesh, &too_high, BuildOptions::default()),
        Err(ConfigurationError::InvalidDimension { dim: 3, .. })
    ));
}

#[test]
fn extra_markers_are_mapped_per_cell() {
    let mesh = with_cell_extra(square(4, |_| 1, |_| 0), "inner", |c| {
        if c[0] < 0.5 { 5 } else { 0 }
    });
    let comps = compartments(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]);

    let hierarchy = MeshHierarchy::build(&mesh, &comps, BuildOptions::default()).unwrap();
    let cyto = hierarchy.child("Cyto").unwrap();

    assert!(hierarchy.has_extra_marker("inner"));
    let values = cyto.extra_values("inner").unwrap();
    assert_eq!(values.len(), 32);
    assert_eq!(values.iter().filter(|&&v| v == 5).count(), 16);
    assert!(cyto.extra_values("outer").is_none());
}

#[test]
fn child_geometry_covers_the_compartment() {
    let mesh = square(3, |_| 1, |p| if on_boundary(p) { 10 } else { 0 });
    let comps = compartments(vec![
        Compartment::new("Cyto", 2, "um", 1).unwrap(),
        Compartment::new("PM", 1, "um", 10).unwrap(),
    ]);
    let hierarchy = MeshHierarchy::build(&mesh, &comps, BuildOptions::default()).unwrap();

    let area: f64 = hierarchy
        .child("Cyto")
        .unwrap()
        .geometry(false)
        .unwrap()
        .iter()
        .map(|g| g.measure)
        .sum();
    let perimeter: f64 = hierarchy
        .child("PM")
        .unwrap()
        .geometry(false)
        .unwrap()
        .iter()
        .map(|g| g.measure)
        .sum();
    approx::assert_relative_eq!(area, 1.0, epsilon = 1e-12);
    approx::assert_relative_eq!(perimeter, 4.0, epsilon = 1e-12);
}
