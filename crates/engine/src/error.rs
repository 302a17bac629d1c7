use reacdiff_core::{AssemblyError, ConfigurationError};
use reacdiff_mesh::ElementError;
use reacdiff_solvers::{SparseError, newton};
use thiserror::Error;

use crate::{
    integrator::{ConvergenceFailure, Phase},
    output::OutputError,
    parameters::ParameterError,
    persistence::PersistenceError,
};

/// Errors raised while building or running a model.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceFailure),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("element {cell} of compartment `{compartment}`: {source}")]
    Element {
        compartment: String,
        cell: usize,
        #[source]
        source: ElementError,
    },

    #[error("nonlinear solver failed: {0}")]
    Solver(#[source] newton::Error),

    #[error("assembly failed: {0}")]
    Sparse(#[from] SparseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("cannot {operation} while the model is {phase:?}")]
    Phase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("unknown {kind} `{name}`")]
    Unknown { kind: &'static str, name: String },
}
