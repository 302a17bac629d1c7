//! Compressed sparse row matrices.
//!
//! Finite-element systems reuse one sparsity pattern for every assembly, so
//! a [`CsrMatrix`] is built once from its pattern and then refilled in place
//! with [`CsrMatrix::fill`] and [`CsrMatrix::add_at`].

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// Errors from sparse matrix operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SparseError {
    #[error("entry ({row}, {col}) is not in the sparsity pattern")]
    NotInPattern { row: usize, col: usize },

    #[error("matrices have different sparsity patterns")]
    PatternMismatch,

    #[error("expected a vector of length {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// A sparse matrix in compressed sparse row format with sorted columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Creates a zero matrix with the given nonzero positions.
    ///
    /// Duplicate positions are merged. Positions outside the matrix are
    /// ignored.
    pub fn from_pattern(
        nrows: usize,
        ncols: usize,
        entries: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); nrows];
        for (r, c) in entries {
            if r < nrows && c < ncols {
                rows[r].push(c);
            }
        }
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for mut cols in rows {
            cols.sort_unstable();
            cols.dedup();
            col_idx.extend(cols);
            row_ptr.push(col_idx.len());
        }
        let values = vec![0.0; col_idx.len()];
        Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Creates a matrix from `(row, col, value)` triplets, summing duplicates.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut matrix = Self::from_pattern(nrows, ncols, triplets.iter().map(|&(r, c, _)| (r, c)));
        for &(r, c, v) in triplets {
            if let Some(k) = matrix.position(r, c) {
                matrix.values[k] += v;
            }
        }
        matrix
    }

    /// The `n × n` identity.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::from_triplets(n, n, &(0..n).map(|i| (i, i, 1.0)).collect::<Vec<_>>())
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    #[must_use]
    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Index into [`CsrMatrix::values`] of entry `(row, col)`.
    #[must_use]
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.nrows {
            return None;
        }
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        self.col_idx[start..end]
            .binary_search(&col)
            .ok()
            .map(|k| start + k)
    }

    /// Value at `(row, col)`; zero outside the pattern.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.position(row, col).map_or(0.0, |k| self.values[k])
    }

    /// Adds `value` to entry `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::NotInPattern`] if the entry is not stored.
    pub fn add_at(&mut self, row: usize, col: usize, value: f64) -> Result<(), SparseError> {
        let k = self
            .position(row, col)
            .ok_or(SparseError::NotInPattern { row, col })?;
        self.values[k] += value;
        Ok(())
    }

    /// Sets every stored entry to `value`.
    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    #[must_use]
    pub fn same_pattern(&self, other: &Self) -> bool {
        self.nrows == other.nrows
            && self.ncols == other.ncols
            && self.row_ptr == other.row_ptr
            && self.col_idx == other.col_idx
    }

    /// `self += alpha * other` for matrices with identical patterns.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::PatternMismatch`] if the patterns differ.
    pub fn add_scaled(&mut self, alpha: f64, other: &Self) -> Result<(), SparseError> {
        if !self.same_pattern(other) {
            return Err(SparseError::PatternMismatch);
        }
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += alpha * b;
        }
        Ok(())
    }

    /// Stored entries of one row as `(col, value)` pairs.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        self.col_idx[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Diagonal entries; zero where the diagonal is not stored.
    #[must_use]
    pub fn diagonal(&self) -> Array1<f64> {
        Array1::from_iter((0..self.nrows.min(self.ncols)).map(|i| self.get(i, i)))
    }

    /// Matrix-vector product `y = A x`.
    ///
    /// # Errors
    ///
    /// Returns [`SparseError::DimensionMismatch`] if `x` has the wrong length.
    pub fn mul_vec(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>, SparseError> {
        if x.len() != self.ncols {
            return Err(SparseError::DimensionMismatch {
                expected: self.ncols,
                found: x.len(),
            });
        }
        Ok(Array1::from_iter((0..self.nrows).map(|i| {
            self.row(i).map(|(j, a)| a * x[j]).sum::<f64>()
        })))
    }
}
