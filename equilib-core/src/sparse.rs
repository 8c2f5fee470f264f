//! Sparse matrix storage and arithmetic.
//!
//! Uses CSC (Compressed Sparse Column) format for the global stiffness matrix,
//! the constraint system and every factorization back-end. Matrices are built
//! from triplets (COO format) and converted once; duplicates are summed on
//! conversion.

use crate::error::{Error, Result};
use nalgebra::DMatrix;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csc::CscMatrix;

/// Compressed Sparse Column matrix.
pub type SparseMatrix = CscMatrix<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSC when complete.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.n_cols
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Add a dense submatrix at the specified DOF indices.
    ///
    /// This is the core operation for finite element assembly.
    pub fn add_submatrix(&mut self, dof_indices: &[usize], submatrix: &DMatrix<f64>) {
        let n = dof_indices.len();
        debug_assert_eq!(submatrix.nrows(), n);
        debug_assert_eq!(submatrix.ncols(), n);

        for j in 0..n {
            for i in 0..n {
                self.add(dof_indices[i], dof_indices[j], submatrix[(i, j)]);
            }
        }
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSC format, summing duplicate entries.
    pub fn to_csc(self) -> Result<SparseMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows,
            self.cols,
            self.values,
        )
        .map_err(|e| Error::Assembly(format!("invalid triplet data: {e}")))?;

        Ok(SparseMatrix::from(&coo))
    }
}

/// Dense vector accumulator for global load assembly.
#[derive(Debug, Clone)]
pub struct GlobalVector {
    values: Vec<f64>,
}

impl GlobalVector {
    /// Create a zero vector of given size.
    pub fn zeros(size: usize) -> Self {
        Self {
            values: vec![0.0; size],
        }
    }

    /// Add a value at the given index.
    pub fn add(&mut self, index: usize, value: f64) {
        self.values[index] += value;
    }

    /// Add values at multiple indices (for element load assembly).
    pub fn add_subvector(&mut self, indices: &[usize], values: &[f64]) {
        debug_assert_eq!(indices.len(), values.len());
        for (&idx, &val) in indices.iter().zip(values.iter()) {
            self.values[idx] += val;
        }
    }

    /// Get the underlying dense vector.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Consume and return the dense vector.
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

/// Value stored at (row, col), zero when absent.
pub fn get(a: &SparseMatrix, row: usize, col: usize) -> f64 {
    let start = a.col_offsets()[col];
    let end = a.col_offsets()[col + 1];
    match a.row_indices()[start..end].binary_search(&row) {
        Ok(pos) => a.values()[start + pos],
        Err(_) => 0.0,
    }
}

/// y = A * x
pub fn mul_vec(a: &SparseMatrix, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; a.nrows()];
    mul_vec_into(a, x, &mut y);
    y
}

/// y = A * x, overwriting `y`.
pub fn mul_vec_into(a: &SparseMatrix, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), a.ncols());
    debug_assert_eq!(y.len(), a.nrows());

    y.iter_mut().for_each(|v| *v = 0.0);
    let cp = a.col_offsets();
    let ri = a.row_indices();
    let vals = a.values();
    for j in 0..a.ncols() {
        let xj = x[j];
        if xj == 0.0 {
            continue;
        }
        for p in cp[j]..cp[j + 1] {
            y[ri[p]] += vals[p] * xj;
        }
    }
}

/// y = Aᵀ * x
pub fn transpose_mul_vec(a: &SparseMatrix, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(x.len(), a.nrows());

    let cp = a.col_offsets();
    let ri = a.row_indices();
    let vals = a.values();
    (0..a.ncols())
        .map(|j| (cp[j]..cp[j + 1]).map(|p| vals[p] * x[ri[p]]).sum())
        .collect()
}

/// C = A * B
pub fn multiply(a: &SparseMatrix, b: &SparseMatrix) -> Result<SparseMatrix> {
    if a.ncols() != b.nrows() {
        return Err(Error::Assembly(format!(
            "dimension mismatch in product: {}x{} * {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    Ok(a * b)
}

/// C = A + B
pub fn add(a: &SparseMatrix, b: &SparseMatrix) -> Result<SparseMatrix> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(Error::Assembly(format!(
            "dimension mismatch in sum: {}x{} + {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    Ok(a + b)
}

/// Diagonal entries (zero where structurally absent).
pub fn diagonal(a: &SparseMatrix) -> Vec<f64> {
    (0..a.nrows().min(a.ncols())).map(|i| get(a, i, i)).collect()
}

/// Largest |A(i,j) - A(j,i)| and where it occurs, relative to max |A|.
///
/// Returns `None` for a symmetric matrix within `tolerance`.
pub fn symmetry_violation(a: &SparseMatrix, tolerance: f64) -> Option<(usize, usize, f64)> {
    if a.nrows() != a.ncols() {
        return Some((0, 0, f64::INFINITY));
    }
    let scale = max_abs(a).max(f64::MIN_POSITIVE);
    a.triplet_iter()
        .filter(|&(i, j, _)| i > j)
        .map(|(i, j, &v)| (i, j, (v - get(a, j, i)).abs() / scale))
        .chain(
            a.triplet_iter()
                .filter(|&(i, j, _)| i < j)
                .map(|(i, j, &v)| (i, j, (v - get(a, j, i)).abs() / scale)),
        )
        .filter(|&(_, _, d)| d > tolerance)
        .max_by(|x, y| x.2.total_cmp(&y.2))
}

/// Maximum absolute stored value.
pub fn max_abs(a: &SparseMatrix) -> f64 {
    a.values().iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// Dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
