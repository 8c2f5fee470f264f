//! Static analysis driver.
//!
//! [`StaticAnalysis`] runs the pipeline for one model:
//!
//! 1. assemble the global stiffness `K`;
//! 2. collect the constraint system `C·u = d` and eliminate it into
//!    `u = P·u_m + u_p`;
//! 3. reduce `Kr = PᵀKP` and factorize it once;
//! 4. per load case, solve `Kr·u_m = Pᵀ(f − K·u_p)`, expand to the full
//!    displacement vector and recover reactions `R = K·u − f` on the
//!    constrained DOFs.
//!
//! Steps 1 to 3 do not depend on the load case and are cached, so several
//! load cases can be solved in parallel against the same factorization.

use crate::assembly::{assemble, assemble_loads};
use crate::config::SolverConfiguration;
use crate::constraint::{collect_with, ConstraintEquations};
use crate::element::MatrixKind;
use crate::error::{Error, Result};
use crate::model::{LoadCase, Model};
use crate::reduction::ConstraintReduction;
use crate::solver::{LinearSolver, SolveStats};
use crate::sparse::{self, SparseMatrix};
use crate::trace::{LogSink, TraceSink};
use crate::types::{Displacement, DofAddress, Force, DOFS_PER_NODE};
use nalgebra::Vector6;
use rayon::prelude::*;
use std::sync::Arc;

/// Outcome category of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolveStatus {
    Success,
    /// Structurally or numerically singular system.
    Singular,
    NotPositiveDefinite,
    NotConverged,
    Failed,
}

impl SolveStatus {
    /// Category of a solve outcome.
    pub fn of(result: &Result<SolveResult>) -> Self {
        match result {
            Ok(r) => r.status,
            Err(e) => e.status(),
        }
    }
}

/// Result of one load case.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub case: LoadCase,
    /// Full displacement vector, six entries per node.
    pub displacements: Vec<f64>,
    /// `K·u − f`, zero outside the constrained DOFs.
    pub reactions: Vec<f64>,
    /// DOFs that appear in at least one constraint equation, ascending.
    pub constrained_dofs: Vec<usize>,
    pub status: SolveStatus,
    /// Solver statistics; `None` when the reduced system was empty.
    pub stats: Option<SolveStats>,
    /// `‖Kr·u_m − fr‖` of the reduced solve.
    pub residual: f64,
}

impl SolveResult {
    /// Displacement of a node.
    pub fn displacement(&self, node: usize) -> Option<Displacement> {
        node_block(&self.displacements, node).map(Displacement)
    }

    /// Reaction at a node.
    pub fn reaction(&self, node: usize) -> Option<Force> {
        node_block(&self.reactions, node).map(Force)
    }
}

fn node_block(values: &[f64], node: usize) -> Option<Vector6<f64>> {
    let start = node * DOFS_PER_NODE;
    values
        .get(start..start + DOFS_PER_NODE)
        .map(Vector6::from_column_slice)
}

/// Load-case independent state.
struct Prepared {
    stiffness: SparseMatrix,
    reduction: ConstraintReduction,
    reduced: SparseMatrix,
    constraint_rows: usize,
    constrained_dofs: Vec<usize>,
    solver: Box<dyn LinearSolver>,
}

/// Linear static analysis of one model.
pub struct StaticAnalysis<'a> {
    model: &'a Model,
    config: SolverConfiguration,
    trace: Arc<dyn TraceSink>,
    prepared: Option<Prepared>,
}

impl<'a> StaticAnalysis<'a> {
    pub fn new(model: &'a Model, config: &SolverConfiguration) -> Self {
        Self {
            model,
            config: config.clone(),
            trace: Arc::new(LogSink),
            prepared: None,
        }
    }

    /// Route trace records to `sink` instead of the `log` facade.
    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = sink;
        self
    }

    pub fn config(&self) -> &SolverConfiguration {
        &self.config
    }

    /// Assembled stiffness, once prepared.
    pub fn stiffness(&self) -> Option<&SparseMatrix> {
        self.prepared.as_ref().map(|p| &p.stiffness)
    }

    /// Constraint elimination, once prepared.
    pub fn reduction(&self) -> Option<&ConstraintReduction> {
        self.prepared.as_ref().map(|p| &p.reduction)
    }

    /// `PᵀKP`, once prepared.
    pub fn reduced_stiffness(&self) -> Option<&SparseMatrix> {
        self.prepared.as_ref().map(|p| &p.reduced)
    }

    /// Assemble, reduce and factorize. Does nothing if already done.
    ///
    /// Settlements of every configured load case are checked against the
    /// constraint system before the factorization.
    pub fn prepare(&mut self) -> Result<()> {
        self.prepare_for(None)
    }

    fn prepare_for(&mut self, requested: Option<&LoadCase>) -> Result<()> {
        if self.prepared.is_none() {
            self.prepared = Some(self.build(requested)?);
        }
        Ok(())
    }

    fn build(&self, requested: Option<&LoadCase>) -> Result<Prepared> {
        let model = self.model;
        let trace = &self.trace;

        let stiffness = assemble(model, MatrixKind::Stiffness, &self.config.assembly)?;
        trace.info(
            "assembly",
            format!(
                "{} nodes, {} elements, {} dofs, nnz(K) = {}",
                model.n_nodes(),
                model.elements().len(),
                model.n_dofs(),
                stiffness.nnz()
            ),
        );

        // Coefficients do not depend on the load case, only `d` does.
        let reference_case = self.config.load_cases.first().cloned().unwrap_or_default();
        let equations = collect_with(model, &reference_case, &self.config.assembly)?;
        let reduction = ConstraintReduction::analyze(&equations.coefficients, &self.config.tolerances)?;
        trace.info(
            "reduction",
            format!(
                "{} constraint equations, {} masters, {} slaves, {} operator",
                equations.nrows(),
                reduction.n_free(),
                reduction.slaves().len(),
                if reduction.operator().is_hollow() { "hollow" } else { "general" }
            ),
        );

        let mut constrained_dofs: Vec<usize> = equations
            .coefficients
            .triplet_iter()
            .map(|(_, j, _)| j)
            .collect();
        constrained_dofs.sort_unstable();
        constrained_dofs.dedup();

        self.check_settlements(&reduction, &equations, &reference_case, requested)?;

        let reduced = reduction.operator().reduce(&stiffness)?;
        self.warn_zero_diagonal(&reduced, reduction.masters());

        let mut solver = self.config.solver.create(&self.config);
        if reduced.nrows() > 0 {
            solver.initialize(&reduced)?;
            trace.info(
                "factorization",
                format!("{} initialized, n = {}", solver.name(), reduced.nrows()),
            );
        } else {
            trace.info("factorization", "no free DOFs, solver skipped".to_string());
        }

        Ok(Prepared {
            stiffness,
            reduction,
            reduced,
            constraint_rows: equations.nrows(),
            constrained_dofs,
            solver,
        })
    }

    /// Fails with `ConflictingConstraints` if the settlements of any known
    /// load case contradict each other.
    fn check_settlements(
        &self,
        reduction: &ConstraintReduction,
        reference: &ConstraintEquations,
        reference_case: &LoadCase,
        requested: Option<&LoadCase>,
    ) -> Result<()> {
        reduction.particular_solution(&reference.rhs)?;
        let mut checked = vec![reference_case];
        for case in self.config.load_cases.iter().chain(requested) {
            if checked.contains(&case) {
                continue;
            }
            let equations = collect_with(self.model, case, &self.config.assembly)?;
            check_rows(case, &equations, reference.nrows())?;
            reduction.particular_solution(&equations.rhs)?;
            checked.push(case);
        }
        Ok(())
    }

    /// A zero on the diagonal of `Kr` is a master DOF nothing resists.
    fn warn_zero_diagonal(&self, reduced: &SparseMatrix, masters: &[usize]) {
        let diag = sparse::diagonal(reduced);
        let max = diag.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
        let threshold = self.config.tolerances.pivot * max;
        for (k, d) in diag.iter().enumerate() {
            if d.abs() <= threshold {
                let addr = DofAddress::from_global(masters[k]);
                self.trace.warning(
                    "stiffness",
                    format!(
                        "zero stiffness at node {} {:?} (equation {})",
                        addr.node, addr.dof, k
                    ),
                );
            }
        }
    }

    /// Solve one load case.
    pub fn solve(&mut self, case: &LoadCase) -> Result<SolveResult> {
        self.prepare_for(Some(case))?;
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| Error::Solver("analysis is not prepared".into()))?;
        self.solve_prepared(prepared, case)
    }

    /// Solve every configured load case in parallel.
    ///
    /// Preparation errors abort everything; per-case errors are reported
    /// next to their case.
    pub fn solve_all(&mut self) -> Result<Vec<(LoadCase, Result<SolveResult>)>> {
        self.prepare()?;
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| Error::Solver("analysis is not prepared".into()))?;
        let this = &*self;
        Ok(this
            .config
            .load_cases
            .par_iter()
            .map(|case| (case.clone(), this.solve_prepared(prepared, case)))
            .collect())
    }

    fn solve_prepared(&self, prepared: &Prepared, case: &LoadCase) -> Result<SolveResult> {
        let model = self.model;
        let reduction = &prepared.reduction;
        let operator = reduction.operator();

        let equations = collect_with(model, case, &self.config.assembly)?;
        check_rows(case, &equations, prepared.constraint_rows)?;
        let particular = reduction.particular_solution(&equations.rhs)?;

        let loads = assemble_loads(model, case, &self.config.assembly)?;
        let k_up = sparse::mul_vec(&prepared.stiffness, &particular);
        let effective: Vec<f64> = loads.iter().zip(&k_up).map(|(f, k)| f - k).collect();
        let reduced_rhs = operator.apply_transpose(&effective);

        let (reduced_u, stats) = if reduced_rhs.is_empty() {
            (Vec::new(), None)
        } else {
            let (x, stats) = prepared.solver.solve_with_stats(&reduced_rhs)?;
            (x, Some(stats))
        };

        let kr_u = sparse::mul_vec(&prepared.reduced, &reduced_u);
        let residual = sparse::norm(
            &kr_u
                .iter()
                .zip(&reduced_rhs)
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>(),
        );
        self.trace.debug(
            "solve",
            format!("case '{}': reduced residual = {:.3e}", case.name, residual),
        );

        let displacements = reduction.expand(&reduced_u, &particular);
        let ku = sparse::mul_vec(&prepared.stiffness, &displacements);
        let mut reactions = vec![0.0; displacements.len()];
        for &dof in &prepared.constrained_dofs {
            reactions[dof] = ku[dof] - loads[dof];
        }

        Ok(SolveResult {
            case: case.clone(),
            displacements,
            reactions,
            constrained_dofs: prepared.constrained_dofs.clone(),
            status: SolveStatus::Success,
            stats,
            residual,
        })
    }
}

/// Solve one load case of `model` from scratch.
pub fn solve(
    model: &Model,
    case: &LoadCase,
    config: &SolverConfiguration,
) -> Result<SolveResult> {
    StaticAnalysis::new(model, config).solve(case)
}
