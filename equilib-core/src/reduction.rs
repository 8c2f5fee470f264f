//! Elimination of constrained DOFs.
//!
//! Given `C·u = d`, every admissible displacement is `u = P·u_m + u_p` where
//! the columns of `P` span the null space of `C` and `u_p` is one particular
//! solution. Pivot columns of the row-reduced `C` become slave DOFs, all other
//! DOFs are masters and map one-to-one onto the columns of `P`.
//!
//! DOFs coupled by a common row are grouped (connected components over
//! the rows). A group touching a single DOF needs no elimination: its first
//! row fixes the value and later rows only have to agree with it. Other
//! groups are reduced densely with Gauss–Jordan elimination on `[C_g | I]`,
//! which also records the row transformation needed to map any right-hand
//! side onto the slaves. When no slave depends on a master, `P` is stored as a
//! [`HollowPermutation`].

use crate::config::Tolerances;
use crate::constraint::ConstraintEquations;
use crate::error::{Error, Result};
use crate::sparse::{self, SparseMatrix, TripletMatrix};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet};

/// Projection with at most one unit entry per row and per column.
///
/// `map[i] = Some(c)` means row `i` of `P` is the unit vector `e_c`;
/// `None` means the row is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HollowPermutation {
    map: Vec<Option<usize>>,
    columns: usize,
}

impl HollowPermutation {
    /// Build from a row map, checking that each column is used exactly once.
    pub fn new(map: Vec<Option<usize>>, columns: usize) -> Result<Self> {
        let mut used = vec![false; columns];
        for (row, entry) in map.iter().enumerate() {
            if let Some(c) = *entry {
                if c >= columns || used[c] {
                    return Err(Error::Assembly(format!(
                        "row {} maps to column {} which is out of range or already used",
                        row, c
                    )));
                }
                used[c] = true;
            }
        }
        if let Some(c) = used.iter().position(|u| !u) {
            return Err(Error::Assembly(format!("column {} of the permutation is empty", c)));
        }
        Ok(Self { map, columns })
    }

    pub fn identity(n: usize) -> Self {
        Self {
            map: (0..n).map(Some).collect(),
            columns: n,
        }
    }

    pub fn nrows(&self) -> usize {
        self.map.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns
    }

    pub fn map(&self) -> &[Option<usize>] {
        &self.map
    }

    /// `P·x`
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.columns);
        self.map
            .iter()
            .map(|entry| entry.map_or(0.0, |c| x[c]))
            .collect()
    }

    /// `Pᵀ·y`
    pub fn apply_transpose(&self, y: &[f64]) -> Vec<f64> {
        debug_assert_eq!(y.len(), self.map.len());
        let mut out = vec![0.0; self.columns];
        for (row, entry) in self.map.iter().enumerate() {
            if let Some(c) = *entry {
                out[c] = y[row];
            }
        }
        out
    }

    /// `Pᵀ·K·P` by index mapping.
    pub fn reduce(&self, k: &SparseMatrix) -> Result<SparseMatrix> {
        let mut t = TripletMatrix::with_capacity(self.columns, self.columns, k.nnz());
        for (i, j, &v) in k.triplet_iter() {
            if let (Some(a), Some(b)) = (self.map[i], self.map[j]) {
                t.add(a, b, v);
            }
        }
        t.to_csc()
    }

    pub fn to_sparse(&self) -> Result<SparseMatrix> {
        let mut t = TripletMatrix::with_capacity(self.map.len(), self.columns, self.columns);
        for (row, entry) in self.map.iter().enumerate() {
            if let Some(c) = *entry {
                t.add(row, c, 1.0);
            }
        }
        t.to_csc()
    }
}

/// The reduction matrix `P` in one of its two storage forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ReductionOperator {
    Hollow(HollowPermutation),
    General(SparseMatrix),
}

impl ReductionOperator {
    pub fn nrows(&self) -> usize {
        match self {
            ReductionOperator::Hollow(h) => h.nrows(),
            ReductionOperator::General(p) => p.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            ReductionOperator::Hollow(h) => h.ncols(),
            ReductionOperator::General(p) => p.ncols(),
        }
    }

    pub fn is_hollow(&self) -> bool {
        matches!(self, ReductionOperator::Hollow(_))
    }

    /// `P·x`
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        match self {
            ReductionOperator::Hollow(h) => h.apply(x),
            ReductionOperator::General(p) => sparse::mul_vec(p, x),
        }
    }

    /// `Pᵀ·y`
    pub fn apply_transpose(&self, y: &[f64]) -> Vec<f64> {
        match self {
            ReductionOperator::Hollow(h) => h.apply_transpose(y),
            ReductionOperator::General(p) => sparse::transpose_mul_vec(p, y),
        }
    }

    /// `Pᵀ·K·P`
    pub fn reduce(&self, k: &SparseMatrix) -> Result<SparseMatrix> {
        match self {
            ReductionOperator::Hollow(h) => h.reduce(k),
            ReductionOperator::General(p) => {
                let kp = sparse::multiply(k, p)?;
                sparse::multiply(&p.transpose(), &kp)
            }
        }
    }

    pub fn to_sparse(&self) -> Result<SparseMatrix> {
        match self {
            ReductionOperator::Hollow(h) => h.to_sparse(),
            ReductionOperator::General(p) => Ok(p.clone()),
        }
    }
}

/// Load-case invariant outcome of eliminating a constraint system.
#[derive(Debug, Clone)]
pub struct ConstraintReduction {
    operator: ReductionOperator,
    /// `n x m`: `u_p = G·d`.
    particular_map: SparseMatrix,
    /// `q x m`: each row must satisfy `Z·d = 0`.
    consistency: SparseMatrix,
    /// Constraint row reported when the matching consistency row fails.
    consistency_equations: Vec<usize>,
    masters: Vec<usize>,
    slaves: Vec<usize>,
    tolerance: f64,
}

impl ConstraintReduction {
    /// Eliminate the coefficient matrix `C` (`m x n`).
    pub fn analyze(coefficients: &SparseMatrix, tolerances: &Tolerances) -> Result<Self> {
        let m = coefficients.nrows();
        let n = coefficients.ncols();

        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); m];
        for (i, j, &v) in coefficients.triplet_iter() {
            if v != 0.0 {
                rows[i].push((j, v));
            }
        }

        let mut sets = DisjointSet::new(n);
        for row in &rows {
            if let Some(&(first, _)) = row.first() {
                for &(j, _) in &row[1..] {
                    sets.union(first, j);
                }
            }
        }

        let mut builder = Builder::new(n, m);
        let mut groups: BTreeMap<usize, Group> = BTreeMap::new();
        for (i, row) in rows.iter().enumerate() {
            match row.first() {
                // 0 = d_i
                None => builder.consistency_row(vec![(i, 1.0)], i),
                Some(&(first, _)) => {
                    let group = groups.entry(sets.find(first)).or_default();
                    group.rows.push(i);
                    group.cols.extend(row.iter().map(|&(j, _)| j));
                }
            }
        }

        for group in groups.values() {
            if group.cols.len() == 1 {
                builder.single_dof(group, &rows);
            } else {
                builder.eliminate(group, &rows, tolerances.pivot);
            }
        }

        builder.finish(tolerances.constraint)
    }

    pub fn operator(&self) -> &ReductionOperator {
        &self.operator
    }

    /// Number of independent (master) DOFs.
    pub fn n_free(&self) -> usize {
        self.masters.len()
    }

    /// Size of the full DOF space.
    pub fn n_dofs(&self) -> usize {
        self.operator.nrows()
    }

    /// Master DOFs in ascending order; master `k` is column `k` of `P`.
    pub fn masters(&self) -> &[usize] {
        &self.masters
    }

    /// Slave DOFs in ascending order.
    pub fn slaves(&self) -> &[usize] {
        &self.slaves
    }

    /// Particular solution for the right-hand side `d`.
    ///
    /// # Errors
    ///
    /// `ConflictingConstraints` if `d` contradicts a redundant row.
    pub fn particular_solution(&self, d: &[f64]) -> Result<Vec<f64>> {
        if d.len() != self.particular_map.ncols() {
            return Err(Error::Solver(format!(
                "constraint right-hand side has {} entries, expected {}",
                d.len(),
                self.particular_map.ncols()
            )));
        }

        let z = sparse::mul_vec(&self.consistency, d);
        let mut scale = vec![0.0; z.len()];
        for (i, j, &v) in self.consistency.triplet_iter() {
            scale[i] += (v * d[j]).abs();
        }
        for (k, &zk) in z.iter().enumerate() {
            if zk.abs() > self.tolerance * scale[k].max(1.0) {
                return Err(Error::ConflictingConstraints {
                    equation: self.consistency_equations[k],
                    residual: zk,
                });
            }
        }

        Ok(sparse::mul_vec(&self.particular_map, d))
    }

    /// `u = P·u_m + u_p`
    pub fn expand(&self, reduced: &[f64], particular: &[f64]) -> Vec<f64> {
        let mut u = self.operator.apply(reduced);
        u.iter_mut().zip(particular).for_each(|(ui, pi)| *ui += pi);
        u
    }
}

/// Eliminate `[C | d]` in one step: returns `P` and the particular solution.
pub fn find_reduction(
    equations: &ConstraintEquations,
    tolerances: &Tolerances,
) -> Result<(ReductionOperator, Vec<f64>)> {
    let reduction = ConstraintReduction::analyze(&equations.coefficients, tolerances)?;
    let particular = reduction.particular_solution(&equations.rhs)?;
    Ok((reduction.operator, particular))
}

/// Rows and DOFs of one connected component.
#[derive(Debug, Default)]
struct Group {
    rows: Vec<usize>,
    cols: BTreeSet<usize>,
}

struct Builder {
    n: usize,
    m: usize,
    is_slave: Vec<bool>,
    /// (slave, master, coefficient) entries of `P`.
    slave_terms: Vec<(usize, usize, f64)>,
    particular: TripletMatrix,
    consistency: Vec<Vec<(usize, f64)>>,
    consistency_equations: Vec<usize>,
}

impl Builder {
    fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            is_slave: vec![false; n],
            slave_terms: Vec::new(),
            particular: TripletMatrix::new(n, m),
            consistency: Vec::new(),
            consistency_equations: Vec::new(),
        }
    }

    fn consistency_row(&mut self, entries: Vec<(usize, f64)>, equation: usize) {
        self.consistency.push(entries);
        self.consistency_equations.push(equation);
    }

    /// All rows touch the same DOF `j`: `a_r·u_j = d_r`.
    fn single_dof(&mut self, group: &Group, rows: &[Vec<(usize, f64)>]) {
        let first = group.rows[0];
        let (j, a0) = rows[first][0];
        self.is_slave[j] = true;
        self.particular.add(j, first, 1.0 / a0);
        for &r in &group.rows[1..] {
            let a = rows[r][0].1;
            self.consistency_row(vec![(first, a / a0), (r, -1.0)], r);
        }
    }

    /// Gauss–Jordan on `[C_g | I]`.
    fn eliminate(&mut self, group: &Group, rows: &[Vec<(usize, f64)>], pivot_tol: f64) {
        let cols: Vec<usize> = group.cols.iter().copied().collect();
        let p = group.rows.len();
        let k = cols.len();

        let mut a = DMatrix::<f64>::zeros(p, k);
        for (li, &r) in group.rows.iter().enumerate() {
            for &(j, v) in &rows[r] {
                if let Ok(lj) = cols.binary_search(&j) {
                    a[(li, lj)] = v;
                }
            }
        }
        let mut e = DMatrix::<f64>::identity(p, p);
        let mut origin = group.rows.clone();
        let thresh = pivot_tol * a.amax();

        let mut pivots: Vec<(usize, usize)> = Vec::new();
        let mut pivot_row = 0;
        for jc in 0..k {
            if pivot_row == p {
                break;
            }
            let mut best = pivot_row;
            let mut best_val = a[(pivot_row, jc)].abs();
            for r in pivot_row + 1..p {
                let v = a[(r, jc)].abs();
                if v > best_val {
                    best = r;
                    best_val = v;
                }
            }
            if best_val <= thresh {
                continue;
            }

            a.swap_rows(best, pivot_row);
            e.swap_rows(best, pivot_row);
            origin.swap(best, pivot_row);

            let piv = a[(pivot_row, jc)];
            for c in 0..k {
                a[(pivot_row, c)] /= piv;
            }
            for c in 0..p {
                e[(pivot_row, c)] /= piv;
            }

            for r in 0..p {
                if r == pivot_row {
                    continue;
                }
                let f = a[(r, jc)];
                if f == 0.0 {
                    continue;
                }
                for c in 0..k {
                    let v = a[(pivot_row, c)];
                    a[(r, c)] -= f * v;
                }
                for c in 0..p {
                    let v = e[(pivot_row, c)];
                    e[(r, c)] -= f * v;
                }
            }

            pivots.push((pivot_row, jc));
            pivot_row += 1;
        }

        let pivot_cols: BTreeSet<usize> = pivots.iter().map(|&(_, jc)| jc).collect();
        for &(t, jc) in &pivots {
            let slave = cols[jc];
            self.is_slave[slave] = true;
            for (lc, &r) in group.rows.iter().enumerate() {
                let g = e[(t, lc)];
                if g != 0.0 {
                    self.particular.add(slave, r, g);
                }
            }
            for jf in (0..k).filter(|jf| !pivot_cols.contains(jf)) {
                let coef = -a[(t, jf)];
                if coef != 0.0 {
                    self.slave_terms.push((slave, cols[jf], coef));
                }
            }
        }

        // Remaining rows vanished: their row combination must annihilate d.
        for t in pivot_row..p {
            let entries: Vec<(usize, f64)> = group
                .rows
                .iter()
                .enumerate()
                .map(|(lc, &r)| (r, e[(t, lc)]))
                .filter(|&(_, v)| v != 0.0)
                .collect();
            self.consistency_row(entries, origin[t]);
        }
    }

    fn finish(self, tolerance: f64) -> Result<ConstraintReduction> {
        let masters: Vec<usize> = (0..self.n).filter(|&j| !self.is_slave[j]).collect();
        let slaves: Vec<usize> = (0..self.n).filter(|&j| self.is_slave[j]).collect();

        let mut column = vec![None; self.n];
        for (c, &j) in masters.iter().enumerate() {
            column[j] = Some(c);
        }

        let operator = if self.slave_terms.is_empty() {
            ReductionOperator::Hollow(HollowPermutation::new(column, masters.len())?)
        } else {
            let mut t = TripletMatrix::with_capacity(
                self.n,
                masters.len(),
                masters.len() + self.slave_terms.len(),
            );
            for (c, &j) in masters.iter().enumerate() {
                t.add(j, c, 1.0);
            }
            for &(slave, master, coef) in &self.slave_terms {
                if let Some(c) = column[master] {
                    t.add(slave, c, coef);
                }
            }
            ReductionOperator::General(t.to_csc()?)
        };

        let mut z = TripletMatrix::new(self.consistency.len(), self.m);
        for (k, entries) in self.consistency.iter().enumerate() {
            for &(r, v) in entries {
                z.add(k, r, v);
            }
        }

        Ok(ConstraintReduction {
            operator,
            particular_map: self.particular.to_csc()?,
            consistency: z.to_csc()?,
            consistency_equations: self.consistency_equations,
            masters,
            slaves,
            tolerance,
        })
    }
}

/// Union–find with path halving.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
