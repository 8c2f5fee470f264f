//! Sparse Cholesky factorization.
//!
//! Up-looking `LLᵀ`: row k of `L` is computed from the k-th column of the
//! permuted matrix by a sparse triangular solve whose nonzero pattern is the
//! row subtree of k in the elimination tree. Storage for `L` is allocated
//! once from the symbolic column counts.

use super::{check_initialize, check_solve, LinearSolver, SolverState};
use crate::error::{Error, Result};
use crate::ordering::{permute_symmetric, row_reach, OrderingMethod, SymbolicFactorization};
use crate::sparse::SparseMatrix;

/// Numeric factor in compressed columns, diagonal first in every column.
#[derive(Debug, Clone)]
struct Factor {
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
    values: Vec<f64>,
}

impl Factor {
    fn n(&self) -> usize {
        self.col_offsets.len() - 1
    }

    /// Solve `L·y = b` in place.
    fn forward(&self, x: &mut [f64]) {
        for j in 0..self.n() {
            let start = self.col_offsets[j];
            let end = self.col_offsets[j + 1];
            x[j] /= self.values[start];
            let xj = x[j];
            for p in start + 1..end {
                x[self.row_indices[p]] -= self.values[p] * xj;
            }
        }
    }

    /// Solve `Lᵀ·x = y` in place.
    fn backward(&self, x: &mut [f64]) {
        for j in (0..self.n()).rev() {
            let start = self.col_offsets[j];
            let end = self.col_offsets[j + 1];
            let mut sum = x[j];
            for p in start + 1..end {
                sum -= self.values[p] * x[self.row_indices[p]];
            }
            x[j] = sum / self.values[start];
        }
    }
}

/// Sparse Cholesky solver for symmetric positive definite matrices.
#[derive(Debug, Clone)]
pub struct CholeskySolver {
    ordering: OrderingMethod,
    seed: i64,
    pivot_tolerance: f64,
    symbolic: Option<SymbolicFactorization>,
    factor: Option<Factor>,
    state: SolverState,
}

impl CholeskySolver {
    pub fn new(ordering: OrderingMethod, seed: i64, pivot_tolerance: f64) -> Self {
        Self {
            ordering,
            seed,
            pivot_tolerance,
            symbolic: None,
            factor: None,
            state: SolverState::Uninitialized,
        }
    }

    /// Symbolic analysis of the last factorized matrix.
    pub fn symbolic(&self) -> Option<&SymbolicFactorization> {
        self.symbolic.as_ref()
    }

    /// The factor `L` of the permuted matrix, if factorized.
    pub fn factor(&self) -> Option<SparseMatrix> {
        let f = self.factor.as_ref()?;
        let n = f.n();
        SparseMatrix::try_from_csc_data(
            n,
            n,
            f.col_offsets.clone(),
            f.row_indices.clone(),
            f.values.clone(),
        )
        .ok()
    }

    fn factorize(&mut self, matrix: &SparseMatrix) -> Result<()> {
        let reuse = self
            .symbolic
            .as_ref()
            .is_some_and(|s| s.matches_pattern(matrix));
        if !reuse {
            self.symbolic = Some(SymbolicFactorization::analyze(
                matrix,
                self.ordering,
                self.seed,
            )?);
        } else {
            log::debug!("reusing symbolic analysis for n = {}", matrix.nrows());
        }
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or_else(|| Error::Solver("missing symbolic analysis".into()))?;

        let c = permute_symmetric(matrix, &symbolic.inverse)?;
        self.factor = Some(up_looking(&c, symbolic, self.pivot_tolerance)?);
        Ok(())
    }
}

fn up_looking(
    c: &SparseMatrix,
    symbolic: &SymbolicFactorization,
    pivot_tolerance: f64,
) -> Result<Factor> {
    let n = c.ncols();
    let cp = c.col_offsets();
    let ci = c.row_indices();
    let cv = c.values();

    let mut col_offsets = Vec::with_capacity(n + 1);
    col_offsets.push(0);
    for &count in &symbolic.column_counts {
        let last = col_offsets[col_offsets.len() - 1];
        col_offsets.push(last + count);
    }
    let nnz = col_offsets[n];
    let mut row_indices = vec![0usize; nnz];
    let mut values = vec![0.0; nnz];
    // Next free slot of every column.
    let mut next: Vec<usize> = col_offsets[..n].to_vec();

    let mut x = vec![0.0; n];
    let mut mark = vec![usize::MAX; n];

    for k in 0..n {
        let reach = row_reach(c, k, &symbolic.parent, &mut mark);

        let mut diagonal = 0.0;
        for p in cp[k]..cp[k + 1] {
            let i = ci[p];
            if i < k {
                x[i] = cv[p];
            } else if i == k {
                diagonal = cv[p];
            }
        }

        let mut d = diagonal;
        for &j in &reach {
            let start = col_offsets[j];
            let lkj = x[j] / values[start];
            x[j] = 0.0;
            for p in start + 1..next[j] {
                x[row_indices[p]] -= values[p] * lkj;
            }
            d -= lkj * lkj;

            let slot = next[j];
            if slot >= col_offsets[j + 1] {
                return Err(Error::Solver(format!(
                    "column {} of L exceeds its symbolic count",
                    j
                )));
            }
            row_indices[slot] = k;
            values[slot] = lkj;
            next[j] += 1;
        }

        if d <= pivot_tolerance * diagonal.abs() || d <= 0.0 {
            return Err(Error::NotPositiveDefinite {
                pivot: symbolic.permutation[k],
            });
        }
        let start = col_offsets[k];
        row_indices[start] = k;
        values[start] = d.sqrt();
        next[k] = start + 1;
    }

    Ok(Factor {
        col_offsets,
        row_indices,
        values,
    })
}

impl LinearSolver for CholeskySolver {
    fn initialize(&mut self, matrix: &SparseMatrix) -> Result<()> {
        check_initialize(self.state, matrix)?;
        self.factor = None;
        self.state = SolverState::Uninitialized;
        self.factorize(matrix)?;
        self.state = SolverState::Factorized;
        log::debug!(
            "cholesky: n = {}, nnz(L) = {}",
            matrix.nrows(),
            self.symbolic.as_ref().map_or(0, |s| s.nnz_l)
        );
        Ok(())
    }

    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.factor.as_ref().map_or(0, Factor::n);
        check_solve(self.state, n, rhs)?;
        let (Some(symbolic), Some(factor)) = (&self.symbolic, &self.factor) else {
            return Err(Error::Solver("solve called before initialize".into()));
        };

        let mut y: Vec<f64> = symbolic.permutation.iter().map(|&old| rhs[old]).collect();
        factor.forward(&mut y);
        factor.backward(&mut y);

        let mut x = vec![0.0; rhs.len()];
        for (new, &old) in symbolic.permutation.iter().enumerate() {
            x[old] = y[new];
        }
        Ok(x)
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn dispose(&mut self) {
        self.symbolic = None;
        self.factor = None;
        self.state = SolverState::Disposed;
    }

    fn name(&self) -> &str {
        "Cholesky"
    }
}

impl Drop for CholeskySolver {
    fn drop(&mut self) {
        self.dispose();
    }
}
