//! The monolithic discrete system.
//!
//! Every species of every compartment is one block of a single state
//! vector, and every reaction, including those that couple a surface to the
//! volumes it bounds, is one set of entries in a single residual and
//! Jacobian. The sparsity pattern is fixed when the system is built.
//!
//! For species `u` on compartment `Ω` with previous state `u⁻` the residual
//! of test function `φ` is
//!
//! ```text
//! ∫Ω (u - u⁻)/dt φ + D ∇u·∇φ  -  Σ_reactions coef ∫Γ rate φ
//! ```
//!
//! where `Γ` is the reaction's domain (`Ω` itself or a surface bounding it).

mod backend;
pub(crate) mod forms;
mod kernels;
mod layout;

pub use backend::{AssemblyBackend, LocalAssembly, Partitioned, Serial};
pub use layout::{Block, DofLayout};

use ndarray::Array1;
use reacdiff_mesh::MeshHierarchy;
use reacdiff_solvers::{CsrMatrix, SparseError};
use tracing::debug;

use crate::{
    Error,
    model::setup::Prepared,
    parameters::{ParameterTable, StepWindow},
};
use forms::{Context, ReactionForm, Transport};
use kernels::CompartmentGeometry;

/// State and parameters an assembly reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Inputs<'a> {
    pub u: &'a Array1<f64>,
    pub previous: &'a Array1<f64>,
    pub params: &'a ParameterTable,
    pub window: StepWindow,
}

/// One unit of element-local work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Transport { transport: usize, cell: usize },
    Reaction { form: usize, cell: usize },
}

/// The compiled forms, geometry and sparsity pattern of a model.
#[derive(Debug, Clone)]
pub(crate) struct System {
    layout: DofLayout,
    /// Compartment names, aligned with `geometry`.
    compartments: Vec<String>,
    geometry: Vec<CompartmentGeometry>,
    transports: Vec<Transport>,
    forms: Vec<ReactionForm>,
    tasks: Vec<Task>,
    pattern: CsrMatrix,
    pinned: Vec<usize>,
}

impl System {
    pub(crate) fn build(
        prepared: &Prepared,
        hierarchy: &MeshHierarchy,
        axisymmetric: bool,
    ) -> Result<Self, Error> {
        let layout = DofLayout::new(&prepared.species, hierarchy);
        let mut compartments = Vec::with_capacity(prepared.compartments.len());
        let mut geometry = Vec::with_capacity(prepared.compartments.len());
        for c in &prepared.compartments {
            let child = hierarchy.child(&c.name).ok_or_else(|| Error::Unknown {
                kind: "compartment",
                name: c.name.clone(),
            })?;
            compartments.push(c.name.clone());
            geometry.push(CompartmentGeometry::new(child, axisymmetric)?);
        }

        let ctx = Context {
            parameters: &prepared.parameters,
            species: &prepared.species,
            compartments: &prepared.compartments,
            hierarchy,
            layout: &layout,
        };
        let transports = forms::compile_transports(&ctx, &prepared.diffusion)?;
        let forms = prepared
            .reactions
            .iter()
            .map(|r| forms::compile_reaction(&ctx, r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tasks = Vec::new();
        for (t, transport) in transports.iter().enumerate() {
            tasks.extend(
                (0..transport.cells.len()).map(|cell| Task::Transport { transport: t, cell }),
            );
        }
        for (f, form) in forms.iter().enumerate() {
            tasks.extend((0..form.cells.len()).map(|cell| Task::Reaction { form: f, cell }));
        }

        let mut system = Self {
            pattern: CsrMatrix::identity(0),
            pinned: transports.iter().flat_map(|t| t.pinned.iter().copied()).collect(),
            layout,
            compartments,
            geometry,
            transports,
            forms,
            tasks,
        };
        system.pattern = system.sparsity();
        debug!(
            unknowns = system.layout.size(),
            nonzeros = system.pattern.nnz(),
            tasks = system.tasks.len(),
            "assembled system structure"
        );
        Ok(system)
    }

    fn sparsity(&self) -> CsrMatrix {
        let n = self.layout.size();
        let mut entries: Vec<(usize, usize)> = (0..n).map(|i| (i, i)).collect();
        for transport in &self.transports {
            for &cell in &transport.cells {
                let dofs = &transport.dofs[cell];
                for &row in dofs {
                    entries.extend(dofs.iter().map(|&col| (row, col)));
                }
            }
        }
        for form in &self.forms {
            for cell in &form.cells {
                for &(p, _) in &form.destinations {
                    for (v, _) in &form.derivatives {
                        for &row in &cell.dofs[p] {
                            entries.extend(cell.dofs[*v].iter().map(|&col| (row, col)));
                        }
                    }
                }
            }
        }
        CsrMatrix::from_pattern(n, n, entries)
    }

    #[must_use]
    pub(crate) fn layout(&self) -> &DofLayout {
        &self.layout
    }

    /// Compartment index of a name.
    pub(crate) fn compartment_index(&self, name: &str) -> Option<usize> {
        self.compartments.iter().position(|c| c == name)
    }

    pub(crate) fn pinned(&self) -> &[usize] {
        &self.pinned
    }

    /// Evaluates the residual.
    pub(crate) fn residual(
        &self,
        backend: &dyn AssemblyBackend,
        inputs: &Inputs<'_>,
    ) -> Result<Array1<f64>, SparseError> {
        let n = self.layout.size();
        check_length(n, inputs.u.len())?;
        check_length(n, inputs.previous.len())?;
        let local = |range: std::ops::Range<usize>| -> Result<Vec<f64>, SparseError> {
            let mut out = vec![0.0; n];
            for task in &self.tasks[range] {
                match *task {
                    Task::Transport { transport, cell } => {
                        let t = &self.transports[transport];
                        let c = t.cells[cell];
                        kernels::transport_residual(
                            t,
                            &self.geometry[t.compartment],
                            &t.dofs[c],
                            c,
                            inputs,
                            &mut out,
                        );
                    }
                    Task::Reaction { form, cell } => {
                        let f = &self.forms[form];
                        let fc = &f.cells[cell];
                        let element = &self.geometry[f.compartment].elements[fc.cell];
                        kernels::reaction_residual(f, element, fc, inputs, &mut out);
                    }
                }
            }
            Ok(out)
        };
        let mut residual = Array1::from(reduce(backend.assemble_local(self.tasks.len(), &local)?, n));
        for &dof in &self.pinned {
            residual[dof] = inputs.u[dof];
        }
        Ok(residual)
    }

    /// Evaluates the Jacobian on the fixed sparsity pattern.
    pub(crate) fn jacobian(
        &self,
        backend: &dyn AssemblyBackend,
        inputs: &Inputs<'_>,
    ) -> Result<CsrMatrix, SparseError> {
        let n = self.layout.size();
        check_length(n, inputs.u.len())?;
        let nnz = self.pattern.nnz();
        let local = |range: std::ops::Range<usize>| -> Result<Vec<f64>, SparseError> {
            let mut out = vec![0.0; nnz];
            for task in &self.tasks[range] {
                match *task {
                    Task::Transport { transport, cell } => {
                        let t = &self.transports[transport];
                        let c = t.cells[cell];
                        kernels::transport_jacobian(
                            t,
                            &self.geometry[t.compartment],
                            &t.dofs[c],
                            c,
                            inputs,
                            &self.pattern,
                            &mut out,
                        )?;
                    }
                    Task::Reaction { form, cell } => {
                        let f = &self.forms[form];
                        let fc = &f.cells[cell];
                        let element = &self.geometry[f.compartment].elements[fc.cell];
                        kernels::reaction_jacobian(f, element, fc, inputs, &self.pattern, &mut out)?;
                    }
                }
            }
            Ok(out)
        };
        let values = reduce(backend.assemble_local(self.tasks.len(), &local)?, nnz);

        let mut jacobian = self.pattern.clone();
        jacobian.values_mut().copy_from_slice(&values);
        // Pinned rows become identity rows.
        let row_ptr = jacobian.row_ptr().to_vec();
        for &dof in &self.pinned {
            let diagonal = jacobian.position(dof, dof);
            let values = jacobian.values_mut();
            for k in row_ptr[dof]..row_ptr[dof + 1] {
                values[k] = if Some(k) == diagonal { 1.0 } else { 0.0 };
            }
        }
        Ok(jacobian)
    }

    /// `∫ u` of one species over its compartment.
    pub(crate) fn integrate(&self, u: &Array1<f64>, species: usize) -> f64 {
        self.quadrature_sum(u, species, |value| value)
    }

    /// `(∫ u²)^½` of one species over its compartment.
    pub(crate) fn l2_norm(&self, u: &Array1<f64>, species: usize) -> f64 {
        self.quadrature_sum(u, species, |value| value * value).sqrt()
    }

    fn quadrature_sum(&self, u: &Array1<f64>, species: usize, f: impl Fn(f64) -> f64) -> f64 {
        let transport = &self.transports[species];
        let geometry = &self.geometry[transport.compartment];
        let mut total = 0.0;
        for (dofs, element) in transport.dofs.iter().zip(&geometry.elements) {
            for (phi, weight) in element.shape.iter().zip(&element.weights) {
                let value: f64 = dofs.iter().enumerate().map(|(i, &d)| phi[i] * u[d]).sum();
                total += weight * f(value);
            }
        }
        total
    }

    /// Measure of a compartment, radially weighted in axisymmetric models.
    pub(crate) fn measure(&self, compartment: usize) -> f64 {
        self.geometry[compartment].measure()
    }

    /// Euclidean norm of the residual restricted to each block.
    pub(crate) fn block_norms(&self, residual: &Array1<f64>) -> Vec<(String, f64)> {
        self.layout
            .blocks()
            .iter()
            .map(|block| {
                let norm = block
                    .range()
                    .map(|i| residual[i] * residual[i])
                    .sum::<f64>()
                    .sqrt();
                (block.compartment.clone(), norm)
            })
            .collect()
    }
}

fn check_length(expected: usize, found: usize) -> Result<(), SparseError> {
    if expected == found {
        Ok(())
    } else {
        Err(SparseError::DimensionMismatch { expected, found })
    }
}

/// Sums part buffers in order.
fn reduce(parts: Vec<Vec<f64>>, len: usize) -> Vec<f64> {
    let mut total = vec![0.0; len];
    for part in parts {
        for (t, p) in total.iter_mut().zip(part) {
            *t += p;
        }
    }
    total
}
