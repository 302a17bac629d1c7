//! Saving and restoring model declarations.
//!
//! A record holds the four containers, the configuration and the mesh
//! reference. Simulation state is never persisted; a restored model is
//! [`Phase::Uninitialized`](crate::Phase::Uninitialized) and must be
//! initialized again before stepping.

use std::{fs, io, path::Path, path::PathBuf};

use reacdiff_core::{Compartment, Config, Container, Parameter, Reaction, Species};
use reacdiff_mesh::MeshSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Model;

/// Format version written by this crate.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid model record")]
    Json(#[from] serde_json::Error),

    #[error("cannot access `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("model record version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// The persisted form of a [`Model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub version: u32,
    pub parameters: Container<Parameter>,
    pub species: Container<Species>,
    pub compartments: Container<Compartment>,
    pub reactions: Container<Reaction>,
    pub config: Config,
    pub mesh: MeshSource,
}

impl ModelRecord {
    #[must_use]
    pub fn of(model: &Model) -> Self {
        Self {
            version: RECORD_VERSION,
            parameters: model.parameters().clone(),
            species: model.species().clone(),
            compartments: model.compartments().clone(),
            reactions: model.reactions().clone(),
            config: model.config().clone(),
            mesh: model.mesh().clone(),
        }
    }

    /// An uninitialized model with this record's declarations.
    #[must_use]
    pub fn into_model(self) -> Model {
        Model::new(
            self.parameters,
            self.species,
            self.compartments,
            self.reactions,
            self.config,
            self.mesh,
        )
    }
}

/// Encodes a model's declarations.
///
/// # Errors
///
/// Returns [`PersistenceError::Json`] if encoding fails.
pub fn serialize(model: &Model) -> Result<Vec<u8>, PersistenceError> {
    Ok(serde_json::to_vec_pretty(&ModelRecord::of(model))?)
}

/// Decodes a model from bytes written by [`serialize`].
///
/// # Errors
///
/// Returns an error if the bytes are not a record or its version differs.
pub fn deserialize(bytes: &[u8]) -> Result<Model, PersistenceError> {
    let record: ModelRecord = serde_json::from_slice(bytes)?;
    if record.version != RECORD_VERSION {
        return Err(PersistenceError::Version {
            found: record.version,
            expected: RECORD_VERSION,
        });
    }
    Ok(record.into_model())
}

/// Writes [`serialize`]d bytes to `path`.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn save(model: &Model, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    fs::write(path, serialize(model)?).map_err(|source| PersistenceError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Reads a model written by [`save`].
///
/// # Errors
///
/// Returns an error if reading or decoding fails.
pub fn load(path: impl AsRef<Path>) -> Result<Model, PersistenceError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| PersistenceError::Io {
        path: path.to_owned(),
        source,
    })?;
    deserialize(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use reacdiff_mesh::{MeshData, TaggedEntity};

    fn model() -> Model {
        let mut config = Config::new(1.0, 0.1);
        config.flags.allow_unused_components = true;
        let compartments =
            Container::from_items([Compartment::new("Cyto", 2, "um", 1).unwrap()]).unwrap();
        let species = Container::from_items([
            Species::new("A", 1.0, "uM", 0.5, "um^2/s", "Cyto").unwrap()
        ])
        .unwrap();
        Model::new(
            Container::from_items([Parameter::new("k", 2.0, "1/s").unwrap()]).unwrap(),
            species,
            compartments,
            Container::new(),
            config,
            MeshSource::file("cell.json"),
        )
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut record = ModelRecord::of(&model());
        record.version = RECORD_VERSION + 1;
        let bytes = serde_json::to_vec(&record).unwrap();
        assert!(matches!(
            deserialize(&bytes),
            Err(PersistenceError::Version { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn round_trip_preserves_declarations() {
        let original = model();
        let restored = deserialize(&serialize(&original).unwrap()).unwrap();
        assert_eq!(ModelRecord::of(&restored), ModelRecord::of(&original));
        assert_eq!(restored.phase(), crate::Phase::Uninitialized);
    }

    #[test]
    fn inline_meshes_are_kept() {
        let mesh = MeshData {
            vertices: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            cells: vec![vec![0, 1, 2]],
            markers: [(2, vec![TaggedEntity { vertices: vec![0, 1, 2], value: 1 }])].into(),
            extra: BTreeMap::new(),
        };
        let original = ModelRecord {
            mesh: mesh.clone().into(),
            ..ModelRecord::of(&model())
        }
        .into_model();
        let restored = deserialize(&serialize(&original).unwrap()).unwrap();
        assert_eq!(restored.mesh(), &MeshSource::Inline { mesh });
    }
}
