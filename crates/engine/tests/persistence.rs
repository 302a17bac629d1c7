mod common;

use std::fs;

use approx::assert_relative_eq;
use reacdiff::{
    Phase,
    persistence::{self, ModelRecord},
};
use reacdiff_core::Config;
use reacdiff_mesh::MeshSource;

use common::{binding_model, on_boundary, square};

#[test]
fn restored_models_reproduce_the_original_run() {
    let dir = std::env::temp_dir().join(format!("reacdiff-persistence-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let mesh_path = dir.join("square.json");
    let mesh = square(4, |_| 1, |p| if on_boundary(p) { 10 } else { 0 });
    fs::write(&mesh_path, serde_json::to_vec(&mesh).unwrap()).unwrap();

    let mut original = binding_model(4, Config::new(0.4, 0.1));
    let record = ModelRecord {
        mesh: MeshSource::file(&mesh_path),
        ..ModelRecord::of(&original)
    };
    original = record.into_model();
    original.initialize().unwrap();
    original.step().unwrap();

    let model_path = dir.join("model.json");
    persistence::save(&original, &model_path).unwrap();
    let mut restored = persistence::load(&model_path).unwrap();

    // Declarations survive, simulation state does not.
    assert_eq!(ModelRecord::of(&restored), ModelRecord::of(&original));
    assert_eq!(restored.phase(), Phase::Uninitialized);
    assert_eq!(restored.species().names().collect::<Vec<_>>(), vec!["A", "B"]);

    let mut fresh = persistence::deserialize(&persistence::serialize(&original).unwrap()).unwrap();
    for model in [&mut restored, &mut fresh] {
        model.initialize().unwrap();
        while model.phase() == Phase::Ready {
            model.step().unwrap();
        }
    }
    assert_relative_eq!(restored.t(), 0.4, epsilon = 1e-12);
    for (a, b) in restored
        .species_values("B")
        .unwrap()
        .iter()
        .zip(fresh.species_values("B").unwrap().iter())
    {
        assert_relative_eq!(*a, *b);
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn unreadable_files_are_reported_with_their_path() {
    let path = std::env::temp_dir().join("reacdiff-does-not-exist.json");
    let err = persistence::load(&path).unwrap_err();
    assert!(matches!(err, persistence::PersistenceError::Io { path: p, .. } if p == path));
}
