//! Linear system solvers.
//!
//! Provides direct and iterative solvers for the reduced system `Kr·u = f`.
//!
//! # Solver Backends
//!
//! - [`CholeskySolver`]: Up-looking sparse LLᵀ on a fill-reducing order.
//!   The production choice for the symmetric positive definite matrices
//!   that stiffness reduction produces.
//! - [`QrSolver`]: Row-wise Givens QR. Slower, but also handles
//!   non-symmetric matrices and reports rank deficiency by column.
//! - [`ConjugateGradientSolver`]: Preconditioned CG for large SPD systems.
//!
//! Every solver follows the same life cycle: `initialize` factorizes (or
//! prepares) the matrix once, `solve` may then be called any number of times
//! and from several threads, `dispose` releases the factorization.

use crate::config::{SolverConfiguration, SolverKind};
use crate::error::{Error, Result};
use crate::sparse::SparseMatrix;
use std::time::Instant;

pub mod cg;
pub mod cholesky;
pub mod preconditioner;
pub mod qr;

pub use cg::ConjugateGradientSolver;
pub use cholesky::CholeskySolver;
pub use preconditioner::{
    IdentityPreconditioner, JacobiPreconditioner, Preconditioner, SsorPreconditioner,
};
pub use qr::QrSolver;

/// Life cycle of a solver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    Factorized,
    Disposed,
}

/// Linear solver interface.
pub trait LinearSolver: Send + Sync {
    /// Factorize (or otherwise prepare) the system matrix.
    ///
    /// Calling it again on a factorized solver replaces the factorization.
    ///
    /// # Errors
    ///
    /// Fails after `dispose`, and with the back-end's numerical error.
    fn initialize(&mut self, matrix: &SparseMatrix) -> Result<()>;

    /// Solve `A·x = rhs` with the current factorization.
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Solve and report statistics.
    fn solve_with_stats(&self, rhs: &[f64]) -> Result<(Vec<f64>, SolveStats)> {
        let start = Instant::now();
        let x = self.solve(rhs)?;
        let stats = SolveStats {
            solver: self.name().to_string(),
            iterations: None,
            residual: None,
            time_seconds: start.elapsed().as_secs_f64(),
        };
        Ok((x, stats))
    }

    /// Current life-cycle state.
    fn state(&self) -> SolverState;

    fn is_initialized(&self) -> bool {
        self.state() == SolverState::Factorized
    }

    /// Release the factorization. Calling it twice is a no-op.
    fn dispose(&mut self);

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Solution statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    /// Solver name used.
    pub solver: String,
    /// Number of iterations (for iterative solvers).
    pub iterations: Option<usize>,
    /// Final relative residual (for iterative solvers).
    pub residual: Option<f64>,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

impl SolverKind {
    /// Create an uninitialized solver of this kind.
    pub fn create(self, config: &SolverConfiguration) -> Box<dyn LinearSolver> {
        match self {
            SolverKind::Cholesky => Box::new(CholeskySolver::new(
                config.ordering,
                config.matching_seed,
                config.tolerances.pivot,
            )),
            SolverKind::Qr => Box::new(QrSolver::new(
                config.ordering,
                config.matching_seed,
                config.tolerances.pivot,
            )),
            SolverKind::ConjugateGradient => Box::new(ConjugateGradientSolver::new(
                config.preconditioner,
                config.tolerances.cg_residual,
                config.max_iterations,
            )),
        }
    }
}

/// Select solver based on configuration.
pub fn select_solver(config: &SolverConfiguration) -> Box<dyn LinearSolver> {
    config.solver.create(config)
}

/// Shared state check for `initialize`.
pub(crate) fn check_initialize(state: SolverState, matrix: &SparseMatrix) -> Result<()> {
    if state == SolverState::Disposed {
        return Err(Error::Solver("solver was disposed".into()));
    }
    if matrix.nrows() != matrix.ncols() {
        return Err(Error::Solver(format!(
            "matrix must be square, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    Ok(())
}

/// Shared state and dimension check for `solve`.
pub(crate) fn check_solve(state: SolverState, n: usize, rhs: &[f64]) -> Result<()> {
    match state {
        SolverState::Factorized => {}
        SolverState::Uninitialized => {
            return Err(Error::Solver("solve called before initialize".into()))
        }
        SolverState::Disposed => return Err(Error::Solver("solver was disposed".into())),
    }
    if rhs.len() != n {
        return Err(Error::Solver(format!(
            "RHS size mismatch: expected {}, got {}",
            n,
            rhs.len()
        )));
    }
    Ok(())
}
