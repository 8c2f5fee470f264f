//! Constraint equation collection.
//!
//! Every displacement restriction in a model (node supports, virtual
//! supports, rigid elements, hinges, equal-DOF couplings) is written as rows
//! of one linear system `C·u = d` over all `6·N` global DOFs. Supports come
//! first in node order, then each MPC source in insertion order, so the row
//! layout only depends on the model and the coefficients never depend on the
//! load case.

use crate::config::AssemblyOptions;
use crate::error::{Error, Result};
use crate::model::{Constraint, LoadCase, Model, Node, Settlement};
use crate::sparse::{self, SparseMatrix, TripletMatrix};
use crate::types::{Displacement, Dof, DofAddress, DOFS_PER_NODE};

/// One equation `Σ a_k·u_k = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    /// (global DOF, coefficient) pairs.
    pub terms: Vec<(usize, f64)>,
    pub rhs: f64,
}

impl ConstraintRow {
    fn new(terms: Vec<(usize, f64)>, rhs: f64) -> Self {
        Self { terms, rhs }
    }

    /// `u_a - u_b = 0`
    fn equal(a: DofAddress, b: DofAddress) -> Self {
        Self::new(vec![(a.global_index(), 1.0), (b.global_index(), -1.0)], 0.0)
    }

    /// `u_a = value`
    fn prescribed(a: DofAddress, value: f64) -> Self {
        Self::new(vec![(a.global_index(), 1.0)], value)
    }
}

/// Multi-point constraint sources.
#[derive(Debug, Clone, PartialEq)]
pub enum MpcElement {
    /// Fully rigid body: every node follows the rigid motion of the first.
    RigidElement { nodes: Vec<usize> },
    /// Coincident nodes sharing translations; rotations stay independent.
    HingeLink { nodes: Vec<usize> },
    /// Nodes sharing the components marked fixed in `coupled`.
    EqualDof { nodes: Vec<usize>, coupled: Constraint },
    /// Support applied to a set of nodes, with its own settlements.
    VirtualSupport {
        nodes: Vec<usize>,
        constraint: Constraint,
        settlements: Vec<Settlement>,
    },
}

impl MpcElement {
    fn nodes(&self) -> &[usize] {
        match self {
            MpcElement::RigidElement { nodes }
            | MpcElement::HingeLink { nodes }
            | MpcElement::EqualDof { nodes, .. }
            | MpcElement::VirtualSupport { nodes, .. } => nodes,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            MpcElement::RigidElement { .. } => "rigid element",
            MpcElement::HingeLink { .. } => "hinge link",
            MpcElement::EqualDof { .. } => "equal-dof coupling",
            MpcElement::VirtualSupport { .. } => "virtual support",
        }
    }

    /// Nodes in first-occurrence order without repeats.
    fn distinct_nodes(&self) -> Vec<usize> {
        let mut seen = Vec::with_capacity(self.nodes().len());
        for &n in self.nodes() {
            if !seen.contains(&n) {
                seen.push(n);
            }
        }
        seen
    }

    /// Number of rows this source contributes.
    pub fn extra_equations_count(&self) -> usize {
        let k = self.distinct_nodes().len();
        let links = k.saturating_sub(1);
        match self {
            MpcElement::RigidElement { .. } => 6 * links,
            MpcElement::HingeLink { .. } => 3 * links,
            MpcElement::EqualDof { coupled, .. } => coupled.fixed_dofs().count() * links,
            MpcElement::VirtualSupport { constraint, .. } => {
                constraint.fixed_dofs().count() * k
            }
        }
    }

    /// Rows of this source for `case`.
    ///
    /// Hinge link nodes further apart than `geometry_tolerance` (relative to
    /// their coordinates) are rejected.
    pub fn extra_equations(
        &self,
        nodes: &[Node],
        case: &LoadCase,
        geometry_tolerance: f64,
    ) -> Result<Vec<ConstraintRow>> {
        let distinct = self.distinct_nodes();
        if let Some(&bad) = distinct.iter().find(|&&n| n >= nodes.len()) {
            return Err(Error::MalformedConstraint(format!(
                "{} references node {} but the model has {} nodes",
                self.name(),
                bad,
                nodes.len()
            )));
        }
        let min_nodes = match self {
            MpcElement::VirtualSupport { .. } => 1,
            _ => 2,
        };
        if distinct.len() < min_nodes {
            return Err(Error::MalformedConstraint(format!(
                "{} needs at least {} distinct nodes, got {}",
                self.name(),
                min_nodes,
                distinct.len()
            )));
        }

        let c = distinct[0];
        let mut rows = Vec::with_capacity(self.extra_equations_count());
        match self {
            MpcElement::RigidElement { .. } => {
                let xc = nodes[c].location;
                for &i in &distinct[1..] {
                    let r = nodes[i].location - xc;
                    rows.extend(rigid_rows(c, i, [r.x, r.y, r.z]));
                }
            }
            MpcElement::HingeLink { .. } => {
                let xc = nodes[c].location;
                for &i in &distinct[1..] {
                    let gap = (nodes[i].location - xc).norm();
                    let scale = 1.0 + xc.norm().max(nodes[i].location.norm());
                    if gap > geometry_tolerance * scale {
                        return Err(Error::MalformedConstraint(format!(
                            "hinge link nodes {} and {} are {:e} apart",
                            c, i, gap
                        )));
                    }
                    for dof in [Dof::Dx, Dof::Dy, Dof::Dz] {
                        rows.push(ConstraintRow::equal(
                            DofAddress::new(c, dof),
                            DofAddress::new(i, dof),
                        ));
                    }
                }
            }
            MpcElement::EqualDof { coupled, .. } => {
                for dof in coupled.fixed_dofs() {
                    for &i in &distinct[1..] {
                        rows.push(ConstraintRow::equal(
                            DofAddress::new(c, dof),
                            DofAddress::new(i, dof),
                        ));
                    }
                }
            }
            MpcElement::VirtualSupport {
                constraint,
                settlements,
                ..
            } => {
                let settlement = settlements
                    .iter()
                    .filter(|s| &s.case == case)
                    .fold(Displacement::zero(), |acc, s| acc + s.displacement);
                for &n in &distinct {
                    for dof in constraint.fixed_dofs() {
                        rows.push(ConstraintRow::prescribed(
                            DofAddress::new(n, dof),
                            settlement.get(dof),
                        ));
                    }
                }
            }
        }
        Ok(rows)
    }
}

/// `u_i - u_c - θ_c × r = 0` and `θ_i - θ_c = 0` with `r = x_i - x_c`.
fn rigid_rows(c: usize, i: usize, r: [f64; 3]) -> Vec<ConstraintRow> {
    let [rx, ry, rz] = r;
    let g = |node: usize, dof: Dof| DofAddress::new(node, dof).global_index();

    let mut rows = vec![
        ConstraintRow::new(
            vec![
                (g(i, Dof::Dx), 1.0),
                (g(c, Dof::Dx), -1.0),
                (g(c, Dof::Ry), -rz),
                (g(c, Dof::Rz), ry),
            ],
            0.0,
        ),
        ConstraintRow::new(
            vec![
                (g(i, Dof::Dy), 1.0),
                (g(c, Dof::Dy), -1.0),
                (g(c, Dof::Rz), -rx),
                (g(c, Dof::Rx), rz),
            ],
            0.0,
        ),
        ConstraintRow::new(
            vec![
                (g(i, Dof::Dz), 1.0),
                (g(c, Dof::Dz), -1.0),
                (g(c, Dof::Rx), -ry),
                (g(c, Dof::Ry), rx),
            ],
            0.0,
        ),
    ];
    for dof in [Dof::Rx, Dof::Ry, Dof::Rz] {
        rows.push(ConstraintRow::equal(
            DofAddress::new(i, dof),
            DofAddress::new(c, dof),
        ));
    }
    rows
}

/// The constraint system `C·u = d`.
#[derive(Debug, Clone)]
pub struct ConstraintEquations {
    /// `m x 6N` coefficient matrix.
    pub coefficients: SparseMatrix,
    /// Right-hand side `d`, one entry per row.
    pub rhs: Vec<f64>,
}

impl ConstraintEquations {
    /// Number of equations.
    pub fn nrows(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }

    /// `[C | d]` with `6N + 1` columns.
    pub fn augmented(&self) -> Result<SparseMatrix> {
        let n = self.coefficients.ncols();
        let mut t = TripletMatrix::with_capacity(self.nrows(), n + 1, self.coefficients.nnz() + self.nrows());
        for (i, j, &v) in self.coefficients.triplet_iter() {
            t.add(i, j, v);
        }
        for (i, &v) in self.rhs.iter().enumerate() {
            t.add(i, n, v);
        }
        t.to_csc()
    }

    /// `C·u - d`
    pub fn residual(&self, u: &[f64]) -> Vec<f64> {
        let mut r = sparse::mul_vec(&self.coefficients, u);
        r.iter_mut().zip(&self.rhs).for_each(|(ri, di)| *ri -= di);
        r
    }
}

/// Gather every constraint of `model` for `case` with default options.
pub fn collect(model: &Model, case: &LoadCase) -> Result<ConstraintEquations> {
    collect_with(model, case, &AssemblyOptions::default())
}

/// Gather every constraint of `model` for `case`.
pub fn collect_with(
    model: &Model,
    case: &LoadCase,
    options: &AssemblyOptions,
) -> Result<ConstraintEquations> {
    let nodes = model.nodes();
    let n_dofs = model.n_dofs();

    let mut rows: Vec<ConstraintRow> = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        let settlement = node.settlement(case);
        for dof in node.constraint.fixed_dofs() {
            rows.push(ConstraintRow::prescribed(
                DofAddress::new(idx, dof),
                settlement.get(dof),
            ));
        }
    }
    for mpc in model.mpc_elements() {
        rows.extend(mpc.extra_equations(nodes, case, options.geometry_tolerance)?);
    }

    let nnz: usize = rows.iter().map(|r| r.terms.len()).sum();
    let mut coefficients = TripletMatrix::with_capacity(rows.len(), n_dofs, nnz);
    let mut rhs = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        for &(j, a) in &row.terms {
            debug_assert!(j < n_dofs && j / DOFS_PER_NODE < nodes.len());
            coefficients.add(i, j, a);
        }
        rhs.push(row.rhs);
    }

    Ok(ConstraintEquations {
        coefficients: coefficients.to_csc()?,
        rhs,
    })
}
