use ndarray::Array1;
use reacdiff_core::Preconditioner as Kind;
use thiserror::Error;

use crate::CsrMatrix;

/// Errors building a preconditioner.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PreconditionerError {
    #[error("row {row} has no stored diagonal entry")]
    MissingDiagonal { row: usize },

    #[error("zero pivot in row {row}")]
    ZeroPivot { row: usize },
}

/// An approximate inverse applied to Krylov vectors.
#[derive(Debug, Clone)]
pub enum Preconditioner {
    Identity,
    /// Inverse of the matrix diagonal.
    Jacobi(Array1<f64>),
    /// Incomplete LU factors sharing the matrix pattern.
    Ilu0 { factors: CsrMatrix, diag: Vec<usize> },
}

impl Preconditioner {
    /// Builds a preconditioner of the requested kind for `matrix`.
    ///
    /// # Errors
    ///
    /// Returns a [`PreconditionerError`] if the matrix has a missing or zero
    /// diagonal entry (Jacobi) or a zero pivot arises (ILU(0)).
    pub fn new(kind: Kind, matrix: &CsrMatrix) -> Result<Self, PreconditionerError> {
        match kind {
            Kind::None => Ok(Self::Identity),
            Kind::Jacobi => {
                let diag = matrix.diagonal();
                if let Some(row) = diag.iter().position(|&d| d == 0.0 || !d.is_finite()) {
                    return Err(PreconditionerError::ZeroPivot { row });
                }
                Ok(Self::Jacobi(diag.mapv(f64::recip)))
            }
            Kind::Ilu0 => ilu0(matrix),
        }
    }

    /// Applies the approximate inverse to `r`.
    #[must_use]
    pub fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        match self {
            Self::Identity => r.clone(),
            Self::Jacobi(inv) => r * inv,
            Self::Ilu0 { factors, diag } => {
                let n = r.len();
                let ptr = factors.row_ptr();
                let cols = factors.col_idx();
                let vals = factors.values();
                let mut y = r.clone();
                // Forward solve with the unit lower factor.
                for i in 0..n {
                    let mut sum = y[i];
                    for k in ptr[i]..diag[i] {
                        sum -= vals[k] * y[cols[k]];
                    }
                    y[i] = sum;
                }
                // Backward solve with the upper factor.
                for i in (0..n).rev() {
                    let mut sum = y[i];
                    for k in (diag[i] + 1)..ptr[i + 1] {
                        sum -= vals[k] * y[cols[k]];
                    }
                    y[i] = sum / vals[diag[i]];
                }
                y
            }
        }
    }
}

fn ilu0(matrix: &CsrMatrix) -> Result<Preconditioner, PreconditionerError> {
    let n = matrix.nrows();
    let mut factors = matrix.clone();
    let ptr = matrix.row_ptr().to_vec();
    let cols = matrix.col_idx().to_vec();

    let diag = (0..n)
        .map(|i| {
            matrix
                .position(i, i)
                .ok_or(PreconditionerError::MissingDiagonal { row: i })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Column to value index for the row being eliminated.
    let mut slot = vec![usize::MAX; matrix.ncols()];
    let vals = factors.values_mut();
    for i in 0..n {
        for k in ptr[i]..ptr[i + 1] {
            slot[cols[k]] = k;
        }
        for k in ptr[i]..diag[i] {
            let j = cols[k];
            let pivot = vals[diag[j]];
            if pivot == 0.0 || !pivot.is_finite() {
                return Err(PreconditionerError::ZeroPivot { row: j });
            }
            vals[k] /= pivot;
            let factor = vals[k];
            for m in (diag[j] + 1)..ptr[j + 1] {
                let target = slot[cols[m]];
                if target != usize::MAX {
                    vals[target] -= factor * vals[m];
                }
            }
        }
        for k in ptr[i]..ptr[i + 1] {
            slot[cols[k]] = usize::MAX;
        }
        if vals[diag[i]] == 0.0 {
            return Err(PreconditionerError::ZeroPivot { row: i });
        }
    }

    Ok(Preconditioner::Ilu0 { factors, diag })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    fn tridiagonal() -> CsrMatrix {
        CsrMatrix::from_triplets(
            3,
            3,
            &[
                (0, 0, 4.0),
                (0, 1, -1.0),
                (1, 0, -1.0),
                (1, 1, 4.0),
                (1, 2, -1.0),
                (2, 1, -1.0),
                (2, 2, 4.0),
            ],
        )
    }

    #[test]
    fn ilu0_is_exact_for_tridiagonal_matrices() {
        // A tridiagonal matrix has no fill-in, so ILU(0) is the full LU.
        let a = tridiagonal();
        let b = array![1.0, 2.0, 3.0];
        let p = Preconditioner::new(Kind::Ilu0, &a).unwrap();
        let x = p.apply(&b);
        let ax = a.mul_vec(x.view()).unwrap();
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn jacobi_scales_by_inverse_diagonal() {
        let p = Preconditioner::new(Kind::Jacobi, &tridiagonal()).unwrap();
        assert_eq!(p.apply(&array![4.0, 8.0, 2.0]), array![1.0, 2.0, 0.5]);
    }

    #[test]
    fn missing_diagonal_is_reported() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (1, 0, 1.0)]);
        assert_eq!(
            Preconditioner::new(Kind::Ilu0, &a).unwrap_err(),
            PreconditionerError::MissingDiagonal { row: 0 }
        );
        assert!(Preconditioner::new(Kind::Jacobi, &a).is_err());
    }
}
