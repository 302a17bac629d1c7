//! Element-local evaluation of the discrete system.
//!
//! Each task writes into a dense buffer: the residual vector for residual
//! assembly, or the value array of the shared sparsity pattern for Jacobian
//! assembly.

use reacdiff_mesh::{ChildMesh, ElementGeometry};
use reacdiff_solvers::{CsrMatrix, SparseError};

use crate::{
    Error,
    assembly::{
        Inputs,
        forms::{FormCell, ReactionForm, Slot, Transport},
    },
};

/// Geometry and local matrices of every cell of one compartment.
#[derive(Debug, Clone)]
pub(crate) struct CompartmentGeometry {
    pub elements: Vec<ElementGeometry>,
    pub mass: Vec<Vec<Vec<f64>>>,
    pub stiffness: Vec<Vec<Vec<f64>>>,
}

impl CompartmentGeometry {
    pub(crate) fn new(child: &ChildMesh, axisymmetric: bool) -> Result<Self, Error> {
        let elements = child
            .geometry(axisymmetric)
            .map_err(|(cell, source)| Error::Element {
                compartment: child.compartment().to_owned(),
                cell,
                source,
            })?;
        let mass = elements.iter().map(ElementGeometry::mass).collect();
        let stiffness = elements.iter().map(ElementGeometry::stiffness).collect();
        Ok(Self {
            elements,
            mass,
            stiffness,
        })
    }

    /// Total (possibly radially weighted) measure.
    pub(crate) fn measure(&self) -> f64 {
        self.elements.iter().map(ElementGeometry::weighted_measure).sum()
    }
}

/// `M (u - u_prev) / dt + D K u` on one cell.
pub(crate) fn transport_residual(
    transport: &Transport,
    geometry: &CompartmentGeometry,
    dofs: &[usize],
    cell: usize,
    inputs: &Inputs<'_>,
    out: &mut [f64],
) {
    let mass = &geometry.mass[cell];
    let stiffness = &geometry.stiffness[cell];
    let dt = inputs.window.dt();
    for (i, &row) in dofs.iter().enumerate() {
        let mut value = 0.0;
        for (j, &col) in dofs.iter().enumerate() {
            value += mass[i][j] * (inputs.u[col] - inputs.previous[col]) / dt;
            if transport.diffusion > 0.0 {
                value += transport.diffusion * stiffness[i][j] * inputs.u[col];
            }
        }
        out[row] += value;
    }
}

pub(crate) fn transport_jacobian(
    transport: &Transport,
    geometry: &CompartmentGeometry,
    dofs: &[usize],
    cell: usize,
    inputs: &Inputs<'_>,
    pattern: &CsrMatrix,
    out: &mut [f64],
) -> Result<(), SparseError> {
    let mass = &geometry.mass[cell];
    let stiffness = &geometry.stiffness[cell];
    let dt = inputs.window.dt();
    for (i, &row) in dofs.iter().enumerate() {
        for (j, &col) in dofs.iter().enumerate() {
            let k = pattern
                .position(row, col)
                .ok_or(SparseError::NotInPattern { row, col })?;
            out[k] += mass[i][j] / dt + transport.diffusion * stiffness[i][j];
        }
    }
    Ok(())
}

/// Values of one reaction at a quadrature point.
struct PointValues<'a> {
    species: Vec<f64>,
    fields: Vec<f64>,
    point: [f64; 3],
    inputs: &'a Inputs<'a>,
}

impl PointValues<'_> {
    fn lookup(&self, slot: &Slot) -> f64 {
        match *slot {
            Slot::Species(p) => self.species[p],
            Slot::Parameter(i) => self.inputs.params.scalars()[i],
            Slot::Field(k) => self.fields[k],
            Slot::Coordinate(c) => self.point[c],
            Slot::Time => self.inputs.window.end,
            Slot::StepStart => self.inputs.window.start,
            Slot::StepLength => self.inputs.window.dt(),
        }
    }
}

fn point_values<'a>(
    form: &ReactionForm,
    cell: &FormCell,
    element: &ElementGeometry,
    q: usize,
    inputs: &'a Inputs<'a>,
) -> PointValues<'a> {
    let phi = &element.shape[q];
    let at = |values: &dyn Fn(usize) -> f64, n: usize| -> f64 {
        (0..n).map(|i| phi[i] * values(i)).sum()
    };
    let n = element.num_basis();
    let species = cell
        .dofs
        .iter()
        .map(|dofs| at(&|i| inputs.u[dofs[i]], n))
        .collect();
    let fields = cell
        .fields
        .iter()
        .zip(&form.fields)
        .map(|(vertices, &parameter)| {
            let field = inputs.params.field(parameter);
            at(&|i| field[vertices[i]], n)
        })
        .collect();
    PointValues {
        species,
        fields,
        point: element.points[q],
        inputs,
    }
}

/// `-Σ coef ∫ rate φ_i` on one reaction cell.
pub(crate) fn reaction_residual(
    form: &ReactionForm,
    element: &ElementGeometry,
    cell: &FormCell,
    inputs: &Inputs<'_>,
    out: &mut [f64],
) {
    for (q, weight) in element.weights.iter().enumerate() {
        let values = point_values(form, cell, element, q, inputs);
        let rate = form.rate.eval(&|s| values.lookup(s));
        let phi = &element.shape[q];
        for &(p, coef) in &form.destinations {
            for (i, &row) in cell.dofs[p].iter().enumerate() {
                out[row] -= coef * weight * phi[i] * rate;
            }
        }
    }
}

pub(crate) fn reaction_jacobian(
    form: &ReactionForm,
    element: &ElementGeometry,
    cell: &FormCell,
    inputs: &Inputs<'_>,
    pattern: &CsrMatrix,
    out: &mut [f64],
) -> Result<(), SparseError> {
    for (q, weight) in element.weights.iter().enumerate() {
        let values = point_values(form, cell, element, q, inputs);
        let phi = &element.shape[q];
        for (v, derivative) in &form.derivatives {
            let slope = derivative.eval(&|s| values.lookup(s));
            for &(p, coef) in &form.destinations {
                for (i, &row) in cell.dofs[p].iter().enumerate() {
                    for (j, &col) in cell.dofs[*v].iter().enumerate() {
                        let k = pattern
                            .position(row, col)
                            .ok_or(SparseError::NotInPattern { row, col })?;
                        out[k] -= coef * weight * phi[i] * phi[j] * slope;
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn lumped_rows_of_the_mass_matrix_sum_to_the_measure() {
        let element =
            ElementGeometry::new(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 1.0, 0.0]], false)
                .unwrap();
        let total: f64 = element.mass().iter().flatten().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-14);
        let stiffness_rows: Vec<f64> = element.stiffness().iter().map(|r| r.iter().sum()).collect();
        for row in stiffness_rows {
            assert_relative_eq!(row, 0.0, epsilon = 1e-14);
        }
    }
}
