//! Monolithic simulation of compartmental reaction-diffusion models.
//!
//! A [`Model`] couples species living on volumes, surfaces and curves of a
//! mixed-dimensional mesh into one nonlinear system per time step:
//!
//! - [`assembly`] — the degree-of-freedom layout, compiled reaction fluxes
//!   and serial or partitioned residual and Jacobian assembly
//! - [`integrator`] — backward Euler with Newton iteration and adaptive
//!   step size
//! - [`persistence`] — saving and restoring model declarations
//! - [`output`] — per-species field frames written after each step
//!
//! ```no_run
//! use reacdiff::{Model, output::MemorySink};
//! # fn declare() -> Model { unimplemented!() }
//! let mut model = declare();
//! model.initialize()?;
//! let mut sink = MemorySink::new();
//! let reports = model.run(&mut sink)?;
//! println!("{} steps, final t = {}", reports.len(), model.t());
//! # Ok::<(), reacdiff::Error>(())
//! ```

pub mod assembly;
pub mod integrator;
pub mod output;
pub mod persistence;

mod error;
mod model;
mod parameters;

pub use error::Error;
pub use integrator::{
    ConvergenceFailure, FailedAttempt, FailureReason, Phase, StepEvent, StepReport,
};
pub use model::Model;
pub use parameters::{ParameterError, StepWindow};
