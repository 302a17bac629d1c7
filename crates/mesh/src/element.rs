//! Linear (P1) simplex elements embedded in three-dimensional space.
//!
//! Intervals, triangles and tetrahedra are handled uniformly through the
//! Gram matrix of their edge vectors, so a triangle lying on a curved
//! membrane in 3D has the same treatment as one in the plane.

use thiserror::Error;

/// A quadrature point in barycentric coordinates with a reference weight.
///
/// Weights of a rule sum to one; multiply by the element measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadPoint {
    pub bary: [f64; 4],
    pub weight: f64,
}

const INTERVAL_A: f64 = 0.788_675_134_594_812_9;
const INTERVAL_B: f64 = 0.211_324_865_405_187_1;
const TET_A: f64 = 0.585_410_196_624_968_5;
const TET_B: f64 = 0.138_196_601_125_010_5;

const INTERVAL_RULE: [QuadPoint; 2] = [
    QuadPoint { bary: [INTERVAL_A, INTERVAL_B, 0.0, 0.0], weight: 0.5 },
    QuadPoint { bary: [INTERVAL_B, INTERVAL_A, 0.0, 0.0], weight: 0.5 },
];

const TRIANGLE_RULE: [QuadPoint; 3] = [
    QuadPoint { bary: [2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0, 0.0], weight: 1.0 / 3.0 },
    QuadPoint { bary: [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0, 0.0], weight: 1.0 / 3.0 },
    QuadPoint { bary: [1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0, 0.0], weight: 1.0 / 3.0 },
];

const TET_RULE: [QuadPoint; 4] = [
    QuadPoint { bary: [TET_A, TET_B, TET_B, TET_B], weight: 0.25 },
    QuadPoint { bary: [TET_B, TET_A, TET_B, TET_B], weight: 0.25 },
    QuadPoint { bary: [TET_B, TET_B, TET_A, TET_B], weight: 0.25 },
    QuadPoint { bary: [TET_B, TET_B, TET_B, TET_A], weight: 0.25 },
];

/// Errors computing element geometry.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ElementError {
    #[error("simplices of dimension {0} are not supported")]
    UnsupportedDimension(usize),

    #[error("degenerate simplex with measure {0:e}")]
    Degenerate(f64),
}

/// Degree-2 quadrature rule for a simplex of dimension `dim`.
///
/// # Errors
///
/// Returns [`ElementError::UnsupportedDimension`] unless `dim` is 1, 2 or 3.
pub fn quadrature(dim: usize) -> Result<&'static [QuadPoint], ElementError> {
    match dim {
        1 => Ok(&INTERVAL_RULE),
        2 => Ok(&TRIANGLE_RULE),
        3 => Ok(&TET_RULE),
        _ => Err(ElementError::UnsupportedDimension(dim)),
    }
}

/// Precomputed geometry of one P1 element.
///
/// `weights` already include the element measure and, in axisymmetric mode,
/// the radial coordinate of each quadrature point.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry {
    pub measure: f64,
    /// Gradients of the barycentric basis functions, constant on the element.
    pub gradients: Vec<[f64; 3]>,
    /// Basis function values at each quadrature point.
    pub shape: Vec<[f64; 4]>,
    /// Physical quadrature points.
    pub points: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
}

impl ElementGeometry {
    /// Computes the geometry of the simplex spanned by `points`.
    ///
    /// # Errors
    ///
    /// Returns an [`ElementError`] for unsupported or degenerate simplices.
    pub fn new(points: &[[f64; 3]], axisymmetric: bool) -> Result<Self, ElementError> {
        let dim = points.len().saturating_sub(1);
        let rule = quadrature(dim)?;

        let edges: Vec<[f64; 3]> = points[1..].iter().map(|p| sub(p, &points[0])).collect();
        let mut gram = [[0.0; 3]; 3];
        for i in 0..dim {
            for j in 0..dim {
                gram[i][j] = dot(&edges[i], &edges[j]);
            }
        }
        let det = determinant(&gram, dim);
        let factorial = [1.0, 1.0, 2.0, 6.0][dim];
        let measure = det.max(0.0).sqrt() / factorial;

        let scale = edges.iter().map(|e| dot(e, e)).fold(0.0, f64::max);
        if !(measure > 0.0) || det <= 1e-14 * scale.powi(i32::try_from(dim).unwrap_or(3)) {
            return Err(ElementError::Degenerate(measure));
        }

        // Rows of G^-1 E^T are the gradients of barycentric coordinates 1..=dim.
        let inverse = inverse(&gram, dim, det);
        let mut gradients = vec![[0.0; 3]; dim + 1];
        for i in 0..dim {
            for k in 0..dim {
                for c in 0..3 {
                    gradients[i + 1][c] += inverse[i][k] * edges[k][c];
                }
            }
        }
        let first: [f64; 3] = std::array::from_fn(|c| -gradients[1..].iter().map(|g| g[c]).sum::<f64>());
        gradients[0] = first;

        let mut shape = Vec::with_capacity(rule.len());
        let mut physical = Vec::with_capacity(rule.len());
        let mut weights = Vec::with_capacity(rule.len());
        for q in rule {
            let x: [f64; 3] = std::array::from_fn(|c| {
                points.iter().zip(q.bary).map(|(p, l)| p[c] * l).sum()
            });
            let radial = if axisymmetric { x[0] } else { 1.0 };
            shape.push(q.bary);
            physical.push(x);
            weights.push(q.weight * measure * radial);
        }

        Ok(Self {
            measure,
            gradients,
            shape,
            points: physical,
            weights,
        })
    }

    /// Number of basis functions (vertices).
    #[must_use]
    pub fn num_basis(&self) -> usize {
        self.gradients.len()
    }

    /// Sum of the quadrature weights: the (possibly weighted) measure.
    #[must_use]
    pub fn weighted_measure(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Local mass matrix `∫ φi φj`.
    #[must_use]
    pub fn mass(&self) -> Vec<Vec<f64>> {
        let n = self.num_basis();
        let mut m = vec![vec![0.0; n]; n];
        for (phi, w) in self.shape.iter().zip(&self.weights) {
            for i in 0..n {
                for j in 0..n {
                    m[i][j] += w * phi[i] * phi[j];
                }
            }
        }
        m
    }

    /// Local stiffness matrix `∫ ∇φi · ∇φj`.
    #[must_use]
    pub fn stiffness(&self) -> Vec<Vec<f64>> {
        let n = self.num_basis();
        let volume = self.weighted_measure();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| volume * dot(&self.gradients[i], &self.gradients[j]))
                    .collect()
            })
            .collect()
    }
}

fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn determinant(m: &[[f64; 3]; 3], n: usize) -> f64 {
    match n {
        1 => m[0][0],
        2 => m[0][0] * m[1][1] - m[0][1] * m[1][0],
        _ => {
            m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
                - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
                + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
        }
    }
}

/// Inverse of the leading `n × n` block, given its nonzero determinant.
fn inverse(m: &[[f64; 3]; 3], n: usize, det: f64) -> [[f64; 3]; 3] {
    let mut inv = [[0.0; 3]; 3];
    match n {
        1 => inv[0][0] = 1.0 / det,
        2 => {
            inv[0][0] = m[1][1] / det;
            inv[0][1] = -m[0][1] / det;
            inv[1][0] = -m[1][0] / det;
            inv[1][1] = m[0][0] / det;
        }
        _ => {
            for i in 0..3 {
                for j in 0..3 {
                    let (r0, r1) = ((j + 1) % 3, (j + 2) % 3);
                    let (c0, c1) = ((i + 1) % 3, (i + 2) % 3);
                    inv[i][j] = (m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]) / det;
                }
            }
        }
    }
    inv
}
