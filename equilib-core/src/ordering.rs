//! Fill-reducing ordering and symbolic analysis for sparse factorization.
//!
//! Before a sparse factorization the matrix pattern is analysed once:
//!
//! - **Maximum matching**: a zero-free diagonal must exist, otherwise the
//!   matrix is structurally singular and no pivot order can factor it.
//! - **Ordering**: minimum degree, reverse Cuthill–McKee or natural.
//! - **Elimination tree**: column dependencies of the Cholesky factor.
//! - **Column counts**: nonzeros per column of `L`, hence `nnz(L)`.
//!
//! The result, [`SymbolicFactorization`], only depends on the sparsity
//! pattern and can be reused for any matrix with the same pattern.
//!
//! # References
//!
//! - Davis (2006). "Direct Methods for Sparse Linear Systems". SIAM.
//! - Cuthill & McKee (1969). "Reducing the Bandwidth of Sparse Symmetric Matrices".

use crate::error::{Error, Result};
use crate::sparse::{SparseMatrix, TripletMatrix};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeSet, VecDeque};

/// Permutation vector: `perm[new] = old`.
pub type Permutation = Vec<usize>;

/// Fill-reducing ordering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderingMethod {
    /// Keep the original order.
    Natural,
    /// Exact minimum degree on the elimination graph.
    #[default]
    MinimumDegree,
    /// Reverse Cuthill–McKee bandwidth reduction.
    ReverseCuthillMcKee,
}

/// Column-to-row matching of a square pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// `row_of_col[j] = Some(i)` when column j is matched to row i.
    pub row_of_col: Vec<Option<usize>>,
    /// Number of matched columns (the structural rank).
    pub size: usize,
}

/// Maximum bipartite matching between rows and columns.
///
/// A cheap pass matches each column to its first free row, then every
/// unmatched column searches depth-first for an augmenting path. `seed`
/// selects the column order of the search: 0 natural, -1 reverse, any other
/// value a reproducible random shuffle.
pub fn maximum_matching(a: &SparseMatrix, seed: i64) -> Matching {
    let n = a.ncols();
    let m = a.nrows();
    let cp = a.col_offsets();
    let ri = a.row_indices();
    let vals = a.values();

    let mut col_of_row: Vec<Option<usize>> = vec![None; m];
    let mut row_of_col: Vec<Option<usize>> = vec![None; n];

    for j in 0..n {
        for p in cp[j]..cp[j + 1] {
            let i = ri[p];
            if vals[p] != 0.0 && col_of_row[i].is_none() {
                col_of_row[i] = Some(j);
                row_of_col[j] = Some(i);
                break;
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    match seed {
        0 => {}
        -1 => order.reverse(),
        s => order.shuffle(&mut StdRng::seed_from_u64(s as u64)),
    }

    let mut mark = vec![usize::MAX; m];
    for (stamp, &k) in order.iter().enumerate() {
        if row_of_col[k].is_some() {
            continue;
        }
        augment(a, k, stamp, &mut mark, &mut col_of_row, &mut row_of_col);
    }

    let size = row_of_col.iter().filter(|r| r.is_some()).count();
    Matching { row_of_col, size }
}

/// Depth-first search for an augmenting path from column `k`.
fn augment(
    a: &SparseMatrix,
    k: usize,
    stamp: usize,
    mark: &mut [usize],
    col_of_row: &mut [Option<usize>],
    row_of_col: &mut [Option<usize>],
) -> bool {
    let cp = a.col_offsets();
    let ri = a.row_indices();
    let vals = a.values();

    // (column, next entry to inspect); path[l] is the row taken at level l.
    let mut stack: Vec<(usize, usize)> = vec![(k, cp[k])];
    let mut path: Vec<usize> = Vec::new();

    while let Some(top) = stack.last_mut() {
        let j = top.0;
        let mut step = None;
        while top.1 < cp[j + 1] {
            let p = top.1;
            top.1 += 1;
            let i = ri[p];
            if vals[p] == 0.0 || mark[i] == stamp {
                continue;
            }
            mark[i] = stamp;
            step = Some((i, col_of_row[i]));
            break;
        }

        match step {
            Some((i, None)) => {
                path.push(i);
                for (level, &(col, _)) in stack.iter().enumerate() {
                    let row = path[level];
                    col_of_row[row] = Some(col);
                    row_of_col[col] = Some(row);
                }
                return true;
            }
            Some((i, Some(next))) => {
                path.push(i);
                stack.push((next, cp[next]));
            }
            None => {
                stack.pop();
                path.pop();
            }
        }
    }
    false
}

/// Structural rank of `a`.
pub fn structural_rank(a: &SparseMatrix, seed: i64) -> usize {
    maximum_matching(a, seed).size
}

/// Elimination tree of a symmetric matrix stored with both triangles.
///
/// `parent[j]` is the parent of column j, `None` for a root.
pub fn elimination_tree(a: &SparseMatrix) -> Vec<Option<usize>> {
    let n = a.ncols();
    let cp = a.col_offsets();
    let ri = a.row_indices();

    let mut parent = vec![None; n];
    let mut ancestor: Vec<Option<usize>> = vec![None; n];

    for k in 0..n {
        for &row in &ri[cp[k]..cp[k + 1]] {
            let mut i = row;
            if i >= k {
                continue;
            }
            // Walk from i to the root of its subtree, compressing the path to k.
            loop {
                let next = ancestor[i];
                ancestor[i] = Some(k);
                match next {
                    None => {
                        parent[i] = Some(k);
                        break;
                    }
                    Some(x) if x == k => break,
                    Some(x) => i = x,
                }
            }
        }
    }
    parent
}

/// Post-order of a forest: children before parents.
pub fn post_order(parent: &[Option<usize>]) -> Vec<usize> {
    let n = parent.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (j, p) in parent.iter().enumerate() {
        match *p {
            Some(p) => children[p].push(j),
            None => roots.push(j),
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();
    while let Some((node, visited)) = stack.pop() {
        if visited {
            order.push(node);
        } else {
            stack.push((node, true));
            for &c in children[node].iter().rev() {
                stack.push((c, false));
            }
        }
    }
    order
}

/// Nonzero count of every column of the Cholesky factor `L`, diagonal included.
///
/// Row k of `L` is the union of the etree paths from each `i < k` with
/// `A(i, k) ≠ 0` up to k; every column on those paths gains one entry.
pub fn column_counts(a: &SparseMatrix, parent: &[Option<usize>]) -> Vec<usize> {
    let n = a.ncols();
    let mut counts = vec![1usize; n];
    let mut mark = vec![usize::MAX; n];
    for k in 0..n {
        for j in row_reach(a, k, parent, &mut mark) {
            counts[j] += 1;
        }
    }
    counts
}

/// Columns `j < k` with `L(k, j) ≠ 0`: the row subtree of k in the etree.
///
/// Returned in topological order (descendants before ancestors), the order
/// in which an up-looking factorization must visit them.
pub(crate) fn row_reach(
    a: &SparseMatrix,
    k: usize,
    parent: &[Option<usize>],
    mark: &mut [usize],
) -> Vec<usize> {
    let n = a.ncols();
    let cp = a.col_offsets();
    // Paths are collected at the bottom of `s` and moved to the top, so later
    // paths (hanging below earlier ones) end up first.
    let mut s = vec![0usize; n];
    let mut top = n;
    mark[k] = k;
    for &row in &a.row_indices()[cp[k]..cp[k + 1]] {
        if row >= k {
            continue;
        }
        let mut i = row;
        let mut len = 0;
        while mark[i] != k {
            s[len] = i;
            len += 1;
            mark[i] = k;
            match parent[i] {
                Some(p) => i = p,
                None => break,
            }
        }
        while len > 0 {
            top -= 1;
            len -= 1;
            s[top] = s[len];
        }
    }
    s[top..].to_vec()
}

/// Symmetric adjacency lists (pattern of A + Aᵀ without the diagonal).
fn adjacency(a: &SparseMatrix) -> Vec<BTreeSet<usize>> {
    let mut adj = vec![BTreeSet::new(); a.ncols()];
    for (i, j, _) in a.triplet_iter() {
        if i != j {
            adj[i].insert(j);
            adj[j].insert(i);
        }
    }
    adj
}

/// Minimum degree ordering. Ties go to the lowest index.
pub fn minimum_degree(a: &SparseMatrix) -> Permutation {
    let n = a.ncols();
    let mut adj = adjacency(a);
    let mut queue: BTreeSet<(usize, usize)> = (0..n).map(|v| (adj[v].len(), v)).collect();
    let mut perm = Vec::with_capacity(n);

    while let Some((_, v)) = queue.pop_first() {
        perm.push(v);
        let neighbours: Vec<usize> = std::mem::take(&mut adj[v]).into_iter().collect();

        // Eliminating v turns its neighbourhood into a clique.
        for &u in &neighbours {
            queue.remove(&(adj[u].len(), u));
            adj[u].remove(&v);
            for &w in &neighbours {
                if w != u {
                    adj[u].insert(w);
                }
            }
            queue.insert((adj[u].len(), u));
        }
    }
    perm
}

/// Reverse Cuthill–McKee ordering.
///
/// Each connected component starts from an unvisited node of minimum degree;
/// neighbours are visited by increasing degree.
pub fn reverse_cuthill_mckee(a: &SparseMatrix) -> Permutation {
    let n = a.ncols();
    let adj = adjacency(a);
    let mut visited = vec![false; n];
    let mut ordering = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    let mut by_degree: Vec<usize> = (0..n).collect();
    by_degree.sort_by_key(|&v| (adj[v].len(), v));

    for &start in &by_degree {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            ordering.push(node);
            let mut neighbours: Vec<usize> =
                adj[node].iter().copied().filter(|&u| !visited[u]).collect();
            neighbours.sort_by_key(|&u| (adj[u].len(), u));
            for u in neighbours {
                visited[u] = true;
                queue.push_back(u);
            }
        }
    }

    ordering.reverse();
    ordering
}

/// Inverse permutation: `inverse[old] = new`.
pub fn invert(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; perm.len()];
    for (new, &old) in perm.iter().enumerate() {
        inverse[old] = new;
    }
    inverse
}

/// `C = P·A·Pᵀ` with `C(inverse[i], inverse[j]) = A(i, j)`.
pub fn permute_symmetric(a: &SparseMatrix, inverse: &[usize]) -> Result<SparseMatrix> {
    let n = a.ncols();
    let mut t = TripletMatrix::with_capacity(n, n, a.nnz());
    for (i, j, &v) in a.triplet_iter() {
        t.add(inverse[i], inverse[j], v);
    }
    t.to_csc()
}

/// Bandwidth of `a` under a permutation given by its inverse.
pub fn bandwidth(a: &SparseMatrix, inverse: &[usize]) -> usize {
    a.triplet_iter()
        .map(|(i, j, _)| inverse[i].abs_diff(inverse[j]))
        .max()
        .unwrap_or(0)
}

/// Pattern-only analysis reusable across numeric factorizations.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicFactorization {
    /// Fill-reducing order, `permutation[new] = old`.
    pub permutation: Permutation,
    /// `inverse[old] = new`.
    pub inverse: Vec<usize>,
    /// Elimination tree of the permuted matrix.
    pub parent: Vec<Option<usize>>,
    /// Post-order of the elimination tree.
    pub post_order: Vec<usize>,
    /// Nonzeros per column of `L`, diagonal included.
    pub column_counts: Vec<usize>,
    /// Predicted `nnz(L)`.
    pub nnz_l: usize,
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
}

impl SymbolicFactorization {
    /// Analyse the pattern of a square symmetric matrix.
    ///
    /// # Errors
    ///
    /// `StructuralSingularity` when no zero-free diagonal exists.
    pub fn analyze(a: &SparseMatrix, method: OrderingMethod, seed: i64) -> Result<Self> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(Error::Solver(format!(
                "symbolic analysis needs a square matrix, got {}x{}",
                a.nrows(),
                a.ncols()
            )));
        }

        let rank = structural_rank(a, seed);
        if rank < n {
            return Err(Error::StructuralSingularity { rank, size: n });
        }

        let permutation = match method {
            OrderingMethod::Natural => (0..n).collect(),
            OrderingMethod::MinimumDegree => minimum_degree(a),
            OrderingMethod::ReverseCuthillMcKee => reverse_cuthill_mckee(a),
        };
        let inverse = invert(&permutation);
        let c = permute_symmetric(a, &inverse)?;
        let parent = elimination_tree(&c);
        let post_order = post_order(&parent);
        let column_counts = column_counts(&c, &parent);
        let nnz_l = column_counts.iter().sum();

        Ok(Self {
            permutation,
            inverse,
            parent,
            post_order,
            column_counts,
            nnz_l,
            col_offsets: a.col_offsets().to_vec(),
            row_indices: a.row_indices().to_vec(),
        })
    }

    /// Dimension of the analysed matrix.
    pub fn n(&self) -> usize {
        self.permutation.len()
    }

    /// True if `a` has exactly the analysed pattern.
    pub fn matches_pattern(&self, a: &SparseMatrix) -> bool {
        a.col_offsets() == self.col_offsets.as_slice()
            && a.row_indices() == self.row_indices.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(n: usize, entries: &[(usize, usize)]) -> SparseMatrix {
        let mut t = TripletMatrix::new(n, n);
        for &(i, j) in entries {
            t.add(i, j, 1.0);
            if i != j {
                t.add(j, i, 1.0);
            }
        }
        t.to_csc().unwrap()
    }

    fn tridiagonal(n: usize) -> SparseMatrix {
        let mut e: Vec<(usize, usize)> = (0..n).map(|i| (i, i)).collect();
        e.extend((0..n - 1).map(|i| (i, i + 1)));
        pattern(n, &e)
    }

    /// Arrow matrix: dense first row/column plus diagonal.
    fn arrow(n: usize) -> SparseMatrix {
        let mut e: Vec<(usize, usize)> = (0..n).map(|i| (i, i)).collect();
        e.extend((1..n).map(|i| (0, i)));
        pattern(n, &e)
    }

    fn is_permutation(p: &[usize]) -> bool {
        let mut seen = vec![false; p.len()];
        p.iter().all(|&i| i < p.len() && !std::mem::replace(&mut seen[i], true))
    }

    #[test]
    fn test_identity_etree() {
        let a = pattern(4, &[(0, 0), (1, 1), (2, 2), (3, 3)]);
        assert_eq!(elimination_tree(&a), vec![None; 4]);
        assert_eq!(column_counts(&a, &elimination_tree(&a)), vec![1; 4]);
    }

    #[test]
    fn test_tridiagonal_etree_is_chain() {
        let a = tridiagonal(5);
        let parent = elimination_tree(&a);
        assert_eq!(parent, vec![Some(1), Some(2), Some(3), Some(4), None]);
        assert_eq!(column_counts(&a, &parent), vec![2, 2, 2, 2, 1]);
        assert_eq!(post_order(&parent), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_arrow_fill_depends_on_order() {
        let a = arrow(6);

        let natural = SymbolicFactorization::analyze(&a, OrderingMethod::Natural, 0).unwrap();
        assert_eq!(natural.nnz_l, 21, "hub first fills the whole factor");

        let md = SymbolicFactorization::analyze(&a, OrderingMethod::MinimumDegree, 0).unwrap();
        assert_eq!(md.nnz_l, 11);
        assert!(md.inverse[0] >= 4, "hub is eliminated after the leaves");
        assert!(is_permutation(&md.permutation));
    }

    #[test]
    fn test_post_order_children_first() {
        let a = arrow(5);
        let sym = SymbolicFactorization::analyze(&a, OrderingMethod::MinimumDegree, 0).unwrap();
        let pos = invert(&sym.post_order);
        for (j, p) in sym.parent.iter().enumerate() {
            if let Some(p) = *p {
                assert!(pos[j] < pos[p]);
            }
        }
    }

    #[test]
    fn test_rcm_reduces_bandwidth() {
        // A path graph numbered badly: 0-5-1-4-2-3.
        let a = pattern(6, &[(0, 5), (5, 1), (1, 4), (4, 2), (2, 3), (0, 0), (1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
        let identity: Vec<usize> = (0..6).collect();
        let perm = reverse_cuthill_mckee(&a);
        assert!(is_permutation(&perm));
        assert!(bandwidth(&a, &invert(&perm)) < bandwidth(&a, &identity));
        assert_eq!(bandwidth(&a, &invert(&perm)), 1);
    }

    #[test]
    fn test_matching_full_rank() {
        let a = tridiagonal(6);
        for seed in [0, -1, 42] {
            let m = maximum_matching(&a, seed);
            assert_eq!(m.size, 6);
            let rows: Vec<usize> = m.row_of_col.iter().map(|r| r.unwrap()).collect();
            assert!(is_permutation(&rows));
        }
    }

    #[test]
    fn test_matching_needs_augmenting_path() {
        // Column 0 takes row 0 cheaply; column 1 only has row 0 and must push
        // column 0 over to row 1.
        let mut t = TripletMatrix::new(2, 2);
        t.add(0, 0, 1.0);
        t.add(1, 0, 1.0);
        t.add(0, 1, 1.0);
        let a = t.to_csc().unwrap();
        let m = maximum_matching(&a, 0);
        assert_eq!(m.size, 2);
        assert_eq!(m.row_of_col, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_structural_singularity() {
        // Column 2 is empty.
        let a = pattern(3, &[(0, 0), (0, 1), (1, 1)]);
        assert_eq!(structural_rank(&a, 0), 2);
        assert_eq!(
            SymbolicFactorization::analyze(&a, OrderingMethod::MinimumDegree, 0),
            Err(Error::StructuralSingularity { rank: 2, size: 3 })
        );
    }

    #[test]
    fn test_pattern_reuse() {
        let a = tridiagonal(4);
        let sym = SymbolicFactorization::analyze(&a, OrderingMethod::ReverseCuthillMcKee, 0).unwrap();
        assert!(sym.matches_pattern(&a));
        assert!(!sym.matches_pattern(&arrow(4)));
        assert_eq!(sym.n(), 4);
    }
}
