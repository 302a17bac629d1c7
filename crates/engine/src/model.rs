//! The model: declared entities, configuration, mesh, and simulation state.

pub(crate) mod setup;

use ndarray::{Array1, ArrayView1, s};
use reacdiff_core::{
    Compartment, Config, ConfigurationError, Container, Observer, Parameter, Reaction, Species,
    Ticks, TimeGrid,
};
use reacdiff_mesh::{BuildOptions, MeshHierarchy, MeshSource};
use reacdiff_solvers::newton;
use tracing::{debug, info};

use crate::{
    Error,
    assembly::{AssemblyBackend, DofLayout, Inputs, Serial, System},
    integrator::{self, FailedAttempt, Phase, StepEvent, StepReport},
    output::{FieldFrame, FieldSink, FieldStats},
    parameters::{ParameterTable, StepWindow},
};
use setup::Prepared;

/// Everything built by [`Model::initialize`].
#[derive(Debug)]
pub(crate) struct Runtime {
    pub prepared: Prepared,
    pub hierarchy: MeshHierarchy,
    pub system: System,
    pub params: ParameterTable,
    pub grid: TimeGrid,
    /// Last accepted state.
    pub u: Array1<f64>,
    pub t: Ticks,
    pub dt: Ticks,
    /// Accepted steps so far.
    pub step: usize,
    /// Next unapplied `adjust_dt` entry.
    pub next_adjust: usize,
    pub newton: newton::Config,
    pub failures: Vec<FailedAttempt>,
}

/// A compartmental reaction-diffusion model.
///
/// A model starts [`Phase::Uninitialized`]. [`Model::initialize`] validates
/// the declaration, builds the mesh hierarchy and the discrete system, and
/// sets the initial condition; [`Model::step`] then advances one accepted
/// time step at a time until `final_t`. Changing any entity or the
/// configuration discards the simulation state.
#[derive(Debug)]
pub struct Model {
    parameters: Container<Parameter>,
    species: Container<Species>,
    compartments: Container<Compartment>,
    reactions: Container<Reaction>,
    config: Config,
    mesh: MeshSource,
    backend: Box<dyn AssemblyBackend>,
    phase: Phase,
    runtime: Option<Runtime>,
}

impl Model {
    #[must_use]
    pub fn new(
        parameters: Container<Parameter>,
        species: Container<Species>,
        compartments: Container<Compartment>,
        reactions: Container<Reaction>,
        config: Config,
        mesh: impl Into<MeshSource>,
    ) -> Self {
        Self {
            parameters,
            species,
            compartments,
            reactions,
            config,
            mesh: mesh.into(),
            backend: Box::new(Serial),
            phase: Phase::Uninitialized,
            runtime: None,
        }
    }

    /// Uses `backend` for all subsequent assembly.
    #[must_use]
    pub fn with_backend(mut self, backend: impl AssemblyBackend + 'static) -> Self {
        self.set_backend(backend);
        self
    }

    pub fn set_backend(&mut self, backend: impl AssemblyBackend + 'static) {
        self.backend = Box::new(backend);
    }

    #[must_use]
    pub fn backend(&self) -> &dyn AssemblyBackend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn parameters(&self) -> &Container<Parameter> {
        &self.parameters
    }

    #[must_use]
    pub fn species(&self) -> &Container<Species> {
        &self.species
    }

    #[must_use]
    pub fn compartments(&self) -> &Container<Compartment> {
        &self.compartments
    }

    #[must_use]
    pub fn reactions(&self) -> &Container<Reaction> {
        &self.reactions
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn mesh(&self) -> &MeshSource {
        &self.mesh
    }

    /// Mutable access to the parameters; discards the simulation state.
    pub fn parameters_mut(&mut self) -> &mut Container<Parameter> {
        self.invalidate();
        &mut self.parameters
    }

    /// Mutable access to the species; discards the simulation state.
    pub fn species_mut(&mut self) -> &mut Container<Species> {
        self.invalidate();
        &mut self.species
    }

    /// Mutable access to the compartments; discards the simulation state.
    pub fn compartments_mut(&mut self) -> &mut Container<Compartment> {
        self.invalidate();
        &mut self.compartments
    }

    /// Mutable access to the reactions; discards the simulation state.
    pub fn reactions_mut(&mut self) -> &mut Container<Reaction> {
        self.invalidate();
        &mut self.reactions
    }

    /// Mutable access to the configuration; discards the simulation state.
    pub fn config_mut(&mut self) -> &mut Config {
        self.invalidate();
        &mut self.config
    }

    fn invalidate(&mut self) {
        if self.runtime.take().is_some() {
            debug!("model changed, discarding simulation state");
        }
        self.phase = Phase::Uninitialized;
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current simulation time; zero before initialization.
    #[must_use]
    pub fn t(&self) -> f64 {
        self.runtime.as_ref().map_or(0.0, |rt| rt.grid.to_time(rt.t))
    }

    /// The step size the next step will try first.
    #[must_use]
    pub fn dt(&self) -> Option<f64> {
        self.runtime.as_ref().map(|rt| rt.grid.to_time(rt.dt))
    }

    /// Number of accepted steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| rt.step)
    }

    /// Rejected step attempts since initialization.
    #[must_use]
    pub fn failures(&self) -> &[FailedAttempt] {
        self.runtime.as_ref().map_or(&[], |rt| &rt.failures)
    }

    /// Validates the model, builds the discrete system and sets the initial
    /// condition.
    ///
    /// Re-initializing an initialized model starts over from `t = 0`.
    ///
    /// # Errors
    ///
    /// Returns a configuration, assembly, parameter or element error from
    /// the first failing check; the model stays uninitialized.
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.invalidate();
        let config = &self.config;
        let prepared = setup::prepare(
            &self.parameters,
            &self.species,
            &self.compartments,
            &self.reactions,
            config,
        )?;
        debug!(
            parameters = prepared.parameters.len(),
            species = prepared.species.len(),
            compartments = prepared.compartments.len(),
            "validated model"
        );

        let mesh = self.mesh.load()?;
        let hierarchy = MeshHierarchy::build(
            &mesh,
            &prepared.compartments,
            BuildOptions {
                allow_unused_markers: config.flags.allow_unused_components,
            },
        )?;
        debug!(vertices = hierarchy.num_parent_vertices(), "built mesh hierarchy");

        let system = System::build(&prepared, &hierarchy, config.flags.axisymmetric_model)?;
        let mut params = ParameterTable::new(&prepared.parameters, &hierarchy)?;
        params.update(StepWindow::at(0.0))?;
        let u = initial_state(&prepared, &hierarchy, &system)?;

        let solver = &config.solver;
        let newton = newton::Config::from_settings(&solver.newton, &solver.linear)
            .map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        let grid = TimeGrid::new(solver.time_precision);
        let dt = grid.to_ticks(solver.initial_dt.unwrap_or(0.0)).max(1);
        let finished = grid.to_ticks(solver.final_t.unwrap_or(0.0)) <= 0;

        info!(
            unknowns = system.layout().size(),
            reactions = prepared.reactions.len(),
            "model initialized"
        );
        self.runtime = Some(Runtime {
            prepared,
            hierarchy,
            system,
            params,
            grid,
            u,
            t: 0,
            dt,
            step: 0,
            next_adjust: 0,
            newton,
            failures: Vec::new(),
        });
        self.transition(if finished { Phase::Finished } else { Phase::Ready });
        Ok(())
    }

    fn transition(&mut self, to: Phase) {
        debug!(from = ?self.phase, to = ?to, "phase transition");
        self.phase = to;
    }

    fn runtime(&self, operation: &'static str) -> Result<&Runtime, Error> {
        self.runtime.as_ref().ok_or(Error::Phase {
            operation,
            phase: self.phase,
        })
    }

    /// Advances one accepted time step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Phase`] unless the model is ready, and
    /// [`Error::Convergence`] if the step cannot be completed; the model
    /// then stays at its last accepted state.
    pub fn step(&mut self) -> Result<StepReport, Error> {
        self.step_observed(())
    }

    /// Advances one accepted time step, reporting every Newton iteration to
    /// `observer`.
    ///
    /// Returning [`newton::Action::Abort`] rejects the current attempt as if
    /// it had diverged.
    ///
    /// # Errors
    ///
    /// See [`Model::step`].
    pub fn step_observed<Obs>(&mut self, mut observer: Obs) -> Result<StepReport, Error>
    where
        Obs: for<'a> Observer<StepEvent<'a>, newton::Action>,
    {
        if self.phase != Phase::Ready {
            return Err(Error::Phase {
                operation: "step",
                phase: self.phase,
            });
        }
        let Some(runtime) = self.runtime.as_mut() else {
            return Err(Error::Phase {
                operation: "step",
                phase: self.phase,
            });
        };
        self.phase = Phase::Stepping;
        let result = integrator::advance(
            runtime,
            &self.config.solver,
            self.backend.as_ref(),
            &mut observer,
        );
        let final_t = runtime.grid.to_ticks(self.config.solver.final_t.unwrap_or(0.0));
        let finished = runtime.t >= final_t;
        match &result {
            Ok(_) => {
                self.transition(Phase::Converged);
                self.transition(if finished { Phase::Finished } else { Phase::Ready });
            }
            Err(_) => {
                self.transition(Phase::Diverged);
                self.transition(Phase::Ready);
            }
        }
        result
    }

    /// Steps until `final_t`, writing every species to `sink` at the start
    /// and after each accepted step. Initializes the model if needed.
    ///
    /// # Errors
    ///
    /// Returns the first initialization, step or output error.
    pub fn run(&mut self, sink: &mut impl FieldSink) -> Result<Vec<StepReport>, Error> {
        if self.phase == Phase::Uninitialized {
            self.initialize()?;
        }
        if self.steps() == 0 {
            self.write_fields(sink)?;
        }
        let mut reports = Vec::new();
        while self.phase == Phase::Ready {
            reports.push(self.step()?);
            self.write_fields(sink)?;
        }
        Ok(reports)
    }

    fn species_index(
        &self,
        operation: &'static str,
        name: &str,
    ) -> Result<(&Runtime, usize), Error> {
        let runtime = self.runtime(operation)?;
        let index = runtime
            .prepared
            .species
            .position(name)
            .ok_or_else(|| Error::Unknown {
                kind: "species",
                name: name.to_owned(),
            })?;
        Ok((runtime, index))
    }

    /// Current vertex values of a species on its compartment.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown species.
    pub fn species_values(&self, name: &str) -> Result<ArrayView1<'_, f64>, Error> {
        let (runtime, index) = self.species_index("read species values", name)?;
        let range = runtime.system.layout().species_range(index);
        Ok(runtime.u.slice(s![range]))
    }

    /// Vertex coordinates of the compartment a species lives on, aligned
    /// with [`Model::species_values`].
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown species.
    pub fn species_coordinates(&self, name: &str) -> Result<&[[f64; 3]], Error> {
        let (runtime, index) = self.species_index("read species coordinates", name)?;
        let compartment = &runtime.prepared.species.as_slice()[index].compartment;
        runtime
            .hierarchy
            .child(compartment)
            .map(reacdiff_mesh::ChildMesh::coordinates)
            .ok_or_else(|| Error::Unknown {
                kind: "compartment",
                name: compartment.clone(),
            })
    }

    /// Replaces every vertex value of a species by `f(point, value)`.
    ///
    /// Used to perturb an initial condition. Vertices outside a species'
    /// subdomain restriction stay at zero.
    ///
    /// # Errors
    ///
    /// Returns an error unless the model is ready, or for an unknown species.
    pub fn map_species(
        &mut self,
        name: &str,
        mut f: impl FnMut([f64; 3], f64) -> f64,
    ) -> Result<(), Error> {
        if self.phase != Phase::Ready {
            return Err(Error::Phase {
                operation: "modify species values",
                phase: self.phase,
            });
        }
        let (runtime, index) = self.species_index("modify species values", name)?;
        let range = runtime.system.layout().species_range(index);
        let coordinates = self.species_coordinates(name)?.to_vec();
        let Some(runtime) = self.runtime.as_mut() else {
            return Ok(());
        };
        for (v, dof) in range.enumerate() {
            runtime.u[dof] = f(coordinates[v], runtime.u[dof]);
        }
        for &dof in runtime.system.pinned() {
            runtime.u[dof] = 0.0;
        }
        Ok(())
    }

    /// `∫ u` of a species over its compartment.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown species.
    pub fn integrate(&self, name: &str) -> Result<f64, Error> {
        let (runtime, index) = self.species_index("integrate", name)?;
        Ok(runtime.system.integrate(&runtime.u, index))
    }

    /// `(∫ u²)^½` of a species over its compartment.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown species.
    pub fn l2_norm(&self, name: &str) -> Result<f64, Error> {
        let (runtime, index) = self.species_index("integrate", name)?;
        Ok(runtime.system.l2_norm(&runtime.u, index))
    }

    /// Measure of a compartment: length, area or volume, weighted by the
    /// radius in axisymmetric models.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown or dropped
    /// compartment.
    pub fn measure(&self, compartment: &str) -> Result<f64, Error> {
        let runtime = self.runtime("measure")?;
        let index = runtime
            .system
            .compartment_index(compartment)
            .ok_or_else(|| Error::Unknown {
                kind: "compartment",
                name: compartment.to_owned(),
            })?;
        Ok(runtime.system.measure(index))
    }

    /// Vertex statistics of a species.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or for an unknown species.
    pub fn stats(&self, name: &str) -> Result<FieldStats, Error> {
        let values = self.species_values(name)?;
        Ok(FieldStats::from_values(values.iter().copied()))
    }

    /// The current value of a scalar parameter.
    #[must_use]
    pub fn parameter_value(&self, name: &str) -> Option<f64> {
        match &self.runtime {
            Some(runtime) => runtime.params.value(name),
            None => self.parameters.get(name).map(|p| p.value),
        }
    }

    /// Changes the value of a constant parameter without discarding the
    /// simulation state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unknown`] if no constant parameter has this name.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), Error> {
        let unknown = || Error::Unknown {
            kind: "constant parameter",
            name: name.to_owned(),
        };
        if let Some(runtime) = self.runtime.as_mut()
            && runtime.prepared.parameters.contains(name)
            && !runtime.params.set_constant(name, value)
        {
            return Err(unknown());
        }
        let parameter = self.parameters.get_mut(name).ok_or_else(unknown)?;
        parameter.value = value;
        Ok(())
    }

    /// Sends one frame per species to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or if the sink fails.
    pub fn write_fields(&self, sink: &mut impl FieldSink) -> Result<(), Error> {
        let runtime = self.runtime("write fields")?;
        let t = runtime.grid.to_time(runtime.t);
        for species in &runtime.prepared.species {
            let frame = FieldFrame {
                species: species.name.clone(),
                compartment: species.compartment.clone(),
                step: runtime.step,
                t,
                values: self.species_values(&species.name)?.to_vec(),
                coordinates: self.species_coordinates(&species.name)?.to_vec(),
            };
            sink.write(&frame)?;
        }
        Ok(())
    }

    /// The layout of the state vector.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization.
    pub fn layout(&self) -> Result<&DofLayout, Error> {
        Ok(self.runtime("read the layout")?.system.layout())
    }

    /// The residual of the next step of length `dt` at the current state,
    /// assembled with `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or if assembly fails.
    pub fn residual(&self, backend: &dyn AssemblyBackend, dt: f64) -> Result<Array1<f64>, Error> {
        let runtime = self.runtime("assemble")?;
        let inputs = self.inputs(runtime, dt);
        Ok(runtime.system.residual(backend, &inputs)?)
    }

    /// The Jacobian matching [`Model::residual`], as `(column, value)` rows
    /// over its sparsity pattern.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or if assembly fails.
    pub fn jacobian(
        &self,
        backend: &dyn AssemblyBackend,
        dt: f64,
    ) -> Result<Vec<Vec<(usize, f64)>>, Error> {
        let runtime = self.runtime("assemble")?;
        let inputs = self.inputs(runtime, dt);
        let jacobian = runtime.system.jacobian(backend, &inputs)?;
        Ok((0..jacobian.nrows()).map(|r| jacobian.row(r).collect()).collect())
    }

    /// Residual norm of each compartment block for a step of length `dt`.
    ///
    /// # Errors
    ///
    /// Returns an error before initialization or if assembly fails.
    pub fn residual_norms(&self, dt: f64) -> Result<Vec<(String, f64)>, Error> {
        let residual = self.residual(self.backend.as_ref(), dt)?;
        Ok(self.runtime("assemble")?.system.block_norms(&residual))
    }

    fn inputs<'a>(&self, runtime: &'a Runtime, dt: f64) -> Inputs<'a> {
        let t = runtime.grid.to_time(runtime.t);
        Inputs {
            u: &runtime.u,
            previous: &runtime.u,
            params: &runtime.params,
            window: StepWindow::new(t, t + dt),
        }
    }
}

/// Evaluates every species' initial condition at its vertices.
fn initial_state(
    prepared: &Prepared,
    hierarchy: &MeshHierarchy,
    system: &System,
) -> Result<Array1<f64>, Error> {
    let layout = system.layout();
    let mut u = Array1::zeros(layout.size());
    for (index, species) in prepared.species.iter().enumerate() {
        let expr = species.initial_expression()?;
        let Some(child) = hierarchy.child(&species.compartment) else {
            continue;
        };
        for (v, point) in child.coordinates().iter().enumerate() {
            let value = expr.eval(&|name: &String| match name.as_str() {
                "x" => point[0],
                "y" => point[1],
                "z" => point[2],
                _ => 0.0,
            });
            if !value.is_finite() {
                return Err(ConfigurationError::InvalidEntity {
                    kind: "species",
                    name: species.name.clone(),
                    reason: format!("initial condition is not finite at {point:?}"),
                }
                .into());
            }
            u[layout.dof(index, v)] = value;
        }
    }
    for &dof in system.pinned() {
        u[dof] = 0.0;
    }
    Ok(u)
}
