//! Sparse matrix utilities for the global system
//!
//! Frame stiffness matrices are typically 95-99% sparse. Assembly goes
//! through COO triplets, products use CSR, and the factorization uses a
//! skyline (variable band) profile after bandwidth-reducing reordering.

use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::VecDeque;

use crate::error::{FrameError, FrameResult};

/// Rows factorized between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 128;

/// Sparse matrix builder using COO format
/// More efficient for incremental assembly; duplicates are summed on conversion
pub struct SparseMatrixBuilder {
    nrows: usize,
    ncols: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseMatrixBuilder {
    /// Create a new square builder
    pub fn new(size: usize) -> Self {
        Self::rectangular(size, size)
    }

    /// Create a builder for an `nrows x ncols` matrix
    pub fn rectangular(nrows: usize, ncols: usize) -> Self {
        // A frame node couples to ~4 neighbours: 6 DOFs x 30 entries per row
        let estimated_nnz = nrows.min(ncols) * 30;
        Self {
            nrows,
            ncols,
            entries: Vec::with_capacity(estimated_nnz),
        }
    }

    /// Add a value to the matrix (accumulates if already exists)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.entries.push((row, col, value));
        }
    }

    /// Convert to CSR format, summing duplicate entries
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.nrows, self.ncols);
        for &(row, col, val) in &self.entries {
            coo.push(row, col, val);
        }
        CsrMatrix::from(&coo)
    }

    /// Convert to dense matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.nrows, self.ncols);
        for &(row, col, val) in &self.entries {
            mat[(row, col)] += val;
        }
        mat
    }

    /// Number of stored triplets (before duplicates are summed)
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Sparse matrix-vector multiplication
pub fn sparse_matvec(csr: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(csr.nrows());
    for (row, lane) in csr.row_iter().enumerate() {
        y[row] = lane
            .col_indices()
            .iter()
            .zip(lane.values())
            .map(|(&col, &val)| val * x[col])
            .sum();
    }
    y
}

/// Expand a CSR matrix to dense storage
pub fn to_dense(csr: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut mat = DMatrix::zeros(csr.nrows(), csr.ncols());
    for (row, col, &val) in csr.triplet_iter() {
        mat[(row, col)] += val;
    }
    mat
}

/// Bandwidth reduction using the Reverse Cuthill-McKee algorithm
///
/// Returns `perm` with `perm[new] = old`. Each connected component starts
/// from its lowest-degree unvisited equation.
pub fn reverse_cuthill_mckee(csr: &CsrMatrix<f64>) -> Vec<usize> {
    let n = csr.nrows();
    if n == 0 {
        return vec![];
    }

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (row, col, &val) in csr.triplet_iter() {
        if val != 0.0 && row != col {
            adj[row].push(col);
        }
    }

    let degrees: Vec<usize> = adj.iter().map(|v| v.len()).collect();
    for neighbors in &mut adj {
        neighbors.sort_by_key(|&i| (degrees[i], i));
    }

    let mut visited = vec![false; n];
    let mut result = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    let mut by_degree: Vec<usize> = (0..n).collect();
    by_degree.sort_by_key(|&i| (degrees[i], i));

    for start in by_degree {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &neighbor in &adj[node] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
    }

    result.reverse();
    result
}

/// Create inverse permutation
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (new_idx, &old_idx) in perm.iter().enumerate() {
        inv[old_idx] = new_idx;
    }
    inv
}

/// Skyline Cholesky factorization K = P·L·Lᵗ·Pᵗ of a symmetric positive
/// definite matrix.
///
/// Row `i` of L is stored contiguously from its first non-zero column
/// `first[i]` to the diagonal. The factor is immutable once built and can be
/// shared between threads for any number of solves.
#[derive(Debug, Clone)]
pub struct SkylineCholesky {
    size: usize,
    /// perm[new] = old
    perm: Vec<usize>,
    /// inv[old] = new
    inv: Vec<usize>,
    first: Vec<usize>,
    row_ptr: Vec<usize>,
    values: Vec<f64>,
}

impl SkylineCholesky {
    /// Factorize a symmetric matrix given in CSR form.
    ///
    /// # Arguments
    /// * `csr` - Symmetric matrix (only the lower triangle is read)
    /// * `perm` - Optional ordering, `perm[new] = old`; identity when `None`
    /// * `tolerance` - A pivot fails when it is not above `tolerance` times
    ///   the original diagonal entry
    /// * `cancelled` - Polled periodically; returns `FrameError::Cancelled`
    ///
    /// A failing pivot is reported as `FrameError::SingularMatrix` with the
    /// equation number in the caller's (unpermuted) numbering.
    pub fn factorize(
        csr: &CsrMatrix<f64>,
        perm: Option<Vec<usize>>,
        tolerance: f64,
        cancelled: &dyn Fn() -> bool,
    ) -> FrameResult<Self> {
        let size = csr.nrows();
        let perm = perm.unwrap_or_else(|| (0..size).collect());
        let inv = inverse_permutation(&perm);

        // Skyline profile in the permuted ordering
        let mut first: Vec<usize> = (0..size).collect();
        for (row, col, _) in csr.triplet_iter() {
            let (r, c) = (inv[row], inv[col]);
            let (hi, lo) = if r >= c { (r, c) } else { (c, r) };
            first[hi] = first[hi].min(lo);
        }

        let mut row_ptr = Vec::with_capacity(size + 1);
        row_ptr.push(0);
        for i in 0..size {
            row_ptr.push(row_ptr[i] + (i - first[i] + 1));
        }

        let mut values = vec![0.0; row_ptr[size]];
        for (row, col, &val) in csr.triplet_iter() {
            let (r, c) = (inv[row], inv[col]);
            if c <= r {
                values[row_ptr[r] + c - first[r]] += val;
            }
        }

        let diagonal: Vec<f64> = (0..size)
            .map(|i| values[row_ptr[i + 1] - 1])
            .collect();

        for i in 0..size {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancelled() {
                return Err(FrameError::Cancelled);
            }

            let fi = first[i];
            let (head, tail) = values.split_at_mut(row_ptr[i]);
            let row_i = &mut tail[..i - fi + 1];

            // Off-diagonal terms L[i][j]
            for j in fi..i {
                let fj = first[j];
                let row_j = &head[row_ptr[j]..row_ptr[j + 1]];
                let start = fi.max(fj);
                let dot: f64 = (start..j)
                    .map(|k| row_i[k - fi] * row_j[k - fj])
                    .sum();
                let pivot_j = row_j[j - fj];
                row_i[j - fi] = (row_i[j - fi] - dot) / pivot_j;
            }

            // Diagonal
            let sum: f64 = row_i[..i - fi].iter().map(|v| v * v).sum();
            let pivot = row_i[i - fi] - sum;
            if !(diagonal[i] > 0.0 && pivot > tolerance * diagonal[i]) {
                return Err(FrameError::SingularMatrix {
                    equation: perm[i],
                    location: format!("equation {}", perm[i]),
                    pivot,
                });
            }
            row_i[i - fi] = pivot.sqrt();
        }

        debug!(
            "skyline factorization: {} equations, profile {} entries",
            size,
            values.len()
        );

        Ok(Self {
            size,
            perm,
            inv,
            first,
            row_ptr,
            values,
        })
    }

    /// Number of equations
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stored entries of the factor
    pub fn profile(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn row(&self, i: usize) -> &[f64] {
        &self.values[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Solve L·y = b in place, in the permuted ordering
    pub fn forward_substitute(&self, y: &mut [f64]) {
        for i in 0..self.size {
            let fi = self.first[i];
            let row = self.row(i);
            let dot: f64 = (fi..i).map(|k| row[k - fi] * y[k]).sum();
            y[i] = (y[i] - dot) / row[i - fi];
        }
    }

    /// Solve Lᵗ·x = y in place, in the permuted ordering
    pub fn backward_substitute(&self, x: &mut [f64]) {
        for i in (0..self.size).rev() {
            let fi = self.first[i];
            let row = self.row(i);
            x[i] /= row[i - fi];
            let xi = x[i];
            for k in fi..i {
                x[k] -= row[k - fi] * xi;
            }
        }
    }

    /// Position of an equation of the caller's numbering in the factor
    pub fn permuted_index(&self, old: usize) -> usize {
        self.inv[old]
    }

    /// Reorder a vector from the caller's numbering into the factor's
    pub fn permute(&self, b: &DVector<f64>) -> Vec<f64> {
        self.perm.iter().map(|&old| b[old]).collect()
    }

    /// Reorder a vector from the factor's numbering back to the caller's
    pub fn unpermute(&self, y: &[f64]) -> DVector<f64> {
        DVector::from_fn(self.size, |old, _| y[self.inv[old]])
    }

    /// Solve K·x = b
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let mut y = self.permute(b);
        self.forward_substitute(&mut y);
        self.backward_substitute(&mut y);
        self.unpermute(&y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let mut builder = SparseMatrixBuilder::new(n);
        for i in 0..n {
            builder.add(i, i, 4.0);
            if i + 1 < n {
                builder.add(i, i + 1, -1.0);
                builder.add(i + 1, i, -1.0);
            }
        }
        builder.to_csr()
    }

    #[test]
    fn test_sparse_builder_sums_duplicates() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 4.0);
        builder.add(0, 0, 1.0);
        builder.add(1, 1, 3.0);

        let dense = to_dense(&builder.to_csr());
        assert_relative_eq!(dense[(0, 0)], 5.0);
        assert_relative_eq!(dense[(1, 1)], 3.0);
    }

    #[test]
    fn test_skyline_solve() {
        let csr = tridiagonal(5);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let chol = SkylineCholesky::factorize(&csr, None, 1e-10, &|| false).unwrap();
        let x = chol.solve(&b);
        assert_relative_eq!(sparse_matvec(&csr, &x), b, epsilon = 1e-12);
    }

    #[test]
    fn test_skyline_solve_with_rcm() {
        // Arrow matrix: the first equation couples to all others
        let n = 8;
        let mut builder = SparseMatrixBuilder::new(n);
        for i in 0..n {
            builder.add(i, i, 10.0);
            if i > 0 {
                builder.add(0, i, 1.0);
                builder.add(i, 0, 1.0);
            }
        }
        let csr = builder.to_csr();
        let perm = reverse_cuthill_mckee(&csr);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>());

        let b = DVector::from_fn(n, |i, _| i as f64 + 1.0);
        let chol = SkylineCholesky::factorize(&csr, Some(perm), 1e-10, &|| false).unwrap();
        assert_relative_eq!(sparse_matvec(&csr, &chol.solve(&b)), b, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_pivot_reports_equation() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 1.0);
        builder.add(0, 1, 1.0);
        builder.add(1, 0, 1.0);
        builder.add(1, 1, 1.0);
        let err = SkylineCholesky::factorize(&builder.to_csr(), None, 1e-10, &|| false)
            .unwrap_err();
        assert!(matches!(err, FrameError::SingularMatrix { equation: 1, .. }));
    }

    #[test]
    fn test_cancelled_factorization() {
        let csr = tridiagonal(3);
        let err = SkylineCholesky::factorize(&csr, None, 1e-10, &|| true).unwrap_err();
        assert!(matches!(err, FrameError::Cancelled));
    }
}
