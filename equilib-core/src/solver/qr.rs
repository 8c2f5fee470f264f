//! Sparse QR by Givens rotations.
//!
//! Rows of `A` are merged one at a time into the upper triangular `R`
//! (George–Heath): the leading entry of an incoming row is annihilated
//! against the matching row of `R`, or the row becomes that row of `R` if
//! it is still empty. `Q` is never formed; solves use the corrected
//! semi-normal equations `RᵀR·x = Aᵀb` followed by one refinement step.
//!
//! Columns are ordered by a fill-reducing order of the pattern of `AᵀA`.

use super::{check_initialize, check_solve, LinearSolver, SolverState};
use crate::error::{Error, Result};
use crate::ordering::{
    invert, minimum_degree, reverse_cuthill_mckee, structural_rank, OrderingMethod, Permutation,
};
use crate::sparse::{mul_vec, transpose_mul_vec, SparseMatrix, TripletMatrix};
/// Row entries `(column, value)` sorted by column, no explicit zeros.
type SparseRow = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
struct Factorization {
    matrix: SparseMatrix,
    permutation: Permutation,
    /// Rows of `R` in permuted column numbering, diagonal first.
    rows: Vec<Vec<(usize, f64)>>,
}

impl Factorization {
    fn n(&self) -> usize {
        self.permutation.len()
    }

    /// `x = (RᵀR)⁻¹·z` in permuted numbering.
    fn semi_normal(&self, z: &mut [f64]) {
        let n = self.n();
        // Rᵀ·y = z
        for j in 0..n {
            let row = &self.rows[j];
            z[j] /= row[0].1;
            let yj = z[j];
            for &(k, v) in &row[1..] {
                z[k] -= v * yj;
            }
        }
        // R·x = y
        for j in (0..n).rev() {
            let row = &self.rows[j];
            let mut sum = z[j];
            for &(k, v) in &row[1..] {
                sum -= v * z[k];
            }
            z[j] = sum / row[0].1;
        }
    }

    /// `x = (AᵀA)⁻¹·Aᵀ·b` in original numbering.
    fn apply(&self, b: &[f64]) -> Vec<f64> {
        let atb = transpose_mul_vec(&self.matrix, b);
        let mut z: Vec<f64> = self.permutation.iter().map(|&old| atb[old]).collect();
        self.semi_normal(&mut z);
        let mut x = vec![0.0; self.n()];
        for (new, &old) in self.permutation.iter().enumerate() {
            x[old] = z[new];
        }
        x
    }
}

/// Sparse QR solver. Handles non-symmetric matrices.
#[derive(Debug, Clone)]
pub struct QrSolver {
    ordering: OrderingMethod,
    seed: i64,
    pivot_tolerance: f64,
    factorization: Option<Factorization>,
    state: SolverState,
}

impl QrSolver {
    pub fn new(ordering: OrderingMethod, seed: i64, pivot_tolerance: f64) -> Self {
        Self {
            ordering,
            seed,
            pivot_tolerance,
            factorization: None,
            state: SolverState::Uninitialized,
        }
    }

    /// Nonzeros of `R`, if factorized.
    pub fn nnz_r(&self) -> Option<usize> {
        self.factorization
            .as_ref()
            .map(|f| f.rows.iter().map(Vec::len).sum())
    }

    fn column_order(&self, a: &SparseMatrix) -> Result<Permutation> {
        let n = a.ncols();
        if self.ordering == OrderingMethod::Natural {
            return Ok((0..n).collect());
        }
        let ata = normal_pattern(a)?;
        Ok(match self.ordering {
            OrderingMethod::ReverseCuthillMcKee => reverse_cuthill_mckee(&ata),
            _ => minimum_degree(&ata),
        })
    }
}

/// Pattern of `AᵀA`, values set to one.
fn normal_pattern(a: &SparseMatrix) -> Result<SparseMatrix> {
    let n = a.ncols();
    let mut by_row: Vec<Vec<usize>> = vec![Vec::new(); a.nrows()];
    for (i, j, _) in a.triplet_iter() {
        by_row[i].push(j);
    }
    let mut t = TripletMatrix::new(n, n);
    for cols in &by_row {
        for &p in cols {
            for &q in cols {
                t.add(p, q, 1.0);
            }
        }
    }
    t.to_csc()
}

fn factorize(
    a: &SparseMatrix,
    permutation: Permutation,
    pivot_tolerance: f64,
) -> Result<Factorization> {
    let n = a.ncols();
    let inverse = invert(&permutation);

    let mut incoming: Vec<SparseRow> = vec![SparseRow::new(); a.nrows()];
    for (i, j, &v) in a.triplet_iter() {
        if v != 0.0 {
            incoming[i].push((inverse[j], v));
        }
    }
    for row in &mut incoming {
        row.sort_unstable_by_key(|&(k, _)| k);
    }

    let mut r: Vec<Option<SparseRow>> = vec![None; n];
    for mut row in incoming {
        loop {
            let Some(&(j, b)) = row.first() else {
                break;
            };
            let rj = match &mut r[j] {
                Some(rj) => rj,
                slot @ None => {
                    *slot = Some(row);
                    break;
                }
            };
            let a_jj = diagonal(rj, j);
            let h = a_jj.hypot(b);
            let (top, bottom) = rotate(rj, &row, a_jj / h, b / h, j);
            *rj = top;
            row = bottom;
        }
    }

    let max_diagonal = r
        .iter()
        .enumerate()
        .filter_map(|(j, row)| row.as_ref().map(|row| diagonal(row, j)))
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    let threshold = pivot_tolerance * max_diagonal;

    let mut rows = Vec::with_capacity(n);
    for (j, row) in r.into_iter().enumerate() {
        let pivot = row.as_ref().map_or(0.0, |row| diagonal(row, j));
        let Some(row) = row.filter(|_| pivot.abs() > threshold) else {
            return Err(Error::NumericSingular {
                column: permutation[j],
                pivot,
            });
        };
        // Columns are ascending and start at j, so the diagonal comes first.
        rows.push(row);
    }

    Ok(Factorization {
        matrix: a.clone(),
        permutation,
        rows,
    })
}

/// Entry `j` of a row of `R`, which can only be its first entry.
fn diagonal(row: &[(usize, f64)], j: usize) -> f64 {
    match row.first() {
        Some(&(k, v)) if k == j => v,
        _ => 0.0,
    }
}

/// Rotate `top` and `bottom` by `[c s; −s c]` in one merge over their
/// columns. Column `lead` of the new bottom row is dropped: it is the entry
/// the rotation annihilates.
fn rotate(
    top: &[(usize, f64)],
    bottom: &[(usize, f64)],
    c: f64,
    s: f64,
    lead: usize,
) -> (SparseRow, SparseRow) {
    let mut new_top = Vec::with_capacity(top.len() + bottom.len());
    let mut new_bottom = Vec::with_capacity(top.len() + bottom.len());
    let (mut p, mut q) = (0, 0);
    loop {
        let (k, t, b) = match (top.get(p), bottom.get(q)) {
            (Some(&(kt, t)), Some(&(kb, b))) if kt == kb => {
                p += 1;
                q += 1;
                (kt, t, b)
            }
            (Some(&(kt, t)), Some(&(kb, _))) if kt < kb => {
                p += 1;
                (kt, t, 0.0)
            }
            (Some(&(kt, t)), None) => {
                p += 1;
                (kt, t, 0.0)
            }
            (_, Some(&(kb, b))) => {
                q += 1;
                (kb, 0.0, b)
            }
            (None, None) => break,
        };
        let upper = c * t + s * b;
        if upper != 0.0 {
            new_top.push((k, upper));
        }
        let lower = c * b - s * t;
        if k != lead && lower != 0.0 {
            new_bottom.push((k, lower));
        }
    }
    (new_top, new_bottom)
}

impl LinearSolver for QrSolver {
    fn initialize(&mut self, matrix: &SparseMatrix) -> Result<()> {
        check_initialize(self.state, matrix)?;
        self.factorization = None;
        self.state = SolverState::Uninitialized;

        let n = matrix.ncols();
        let rank = structural_rank(matrix, self.seed);
        if rank < n {
            return Err(Error::StructuralSingularity { rank, size: n });
        }
        let permutation = self.column_order(matrix)?;
        self.factorization = Some(factorize(matrix, permutation, self.pivot_tolerance)?);
        self.state = SolverState::Factorized;
        log::debug!("qr: n = {}, nnz(R) = {}", n, self.nnz_r().unwrap_or(0));
        Ok(())
    }

    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = self.factorization.as_ref().map_or(0, Factorization::n);
        check_solve(self.state, n, rhs)?;
        let Some(f) = &self.factorization else {
            return Err(Error::Solver("solve called before initialize".into()));
        };

        let mut x = f.apply(rhs);
        let ax = mul_vec(&f.matrix, &x);
        let residual: Vec<f64> = rhs.iter().zip(&ax).map(|(b, y)| b - y).collect();
        let correction = f.apply(&residual);
        for (xi, ci) in x.iter_mut().zip(&correction) {
            *xi += ci;
        }
        Ok(x)
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn dispose(&mut self) {
        self.factorization = None;
        self.state = SolverState::Disposed;
    }

    fn name(&self) -> &str {
        "QR"
    }
}

impl Drop for QrSolver {
    fn drop(&mut self) {
        self.dispose();
    }
}
