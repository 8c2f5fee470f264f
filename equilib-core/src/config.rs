//! Solver configuration.

use crate::model::LoadCase;
use crate::ordering::OrderingMethod;

/// Linear solver back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Sparse LLᵀ factorization. Requires an SPD reduced matrix.
    #[default]
    Cholesky,
    /// Sparse QR by Givens rotations. Tolerates non-symmetric matrices.
    Qr,
    /// Preconditioned conjugate gradient.
    ConjugateGradient,
}

/// Preconditioner for the conjugate gradient solver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PreconditionerKind {
    Identity,
    #[default]
    Jacobi,
    /// Symmetric successive over-relaxation with factor `omega` in (0, 2).
    Ssor { omega: f64 },
}

/// Numerical tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Relative pivot threshold. Used by constraint elimination, the QR
    /// and Cholesky pivot tests, and the zero-stiffness warning on the
    /// reduced diagonal.
    pub pivot: f64,
    /// Relative residual accepted for consistency rows of `[C | d]`.
    pub constraint: f64,
    /// Relative residual at which conjugate gradient stops.
    pub cg_residual: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            pivot: 1e-12,
            constraint: 1e-9,
            cg_residual: 1e-10,
        }
    }
}

/// Options for global matrix assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    /// Check that the assembled matrix is symmetric.
    pub validate_symmetry: bool,
    /// Relative tolerance for the symmetry check.
    pub symmetry_tolerance: f64,
    /// Distance, relative to the coordinate magnitude, below which two
    /// points coincide. Applies to member lengths, hinge link gaps and the
    /// transverse part of truss loads.
    pub geometry_tolerance: f64,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            validate_symmetry: false,
            symmetry_tolerance: 1e-10,
            geometry_tolerance: 1e-9,
        }
    }
}

/// Everything that selects how a model is solved.
#[derive(Debug, Clone)]
pub struct SolverConfiguration {
    /// Solver type to use.
    pub solver: SolverKind,
    /// Load cases solved by `solve_all`.
    pub load_cases: Vec<LoadCase>,
    /// Preconditioner for iterative solves.
    pub preconditioner: PreconditionerKind,
    /// Fill-reducing ordering for direct solves.
    pub ordering: OrderingMethod,
    pub tolerances: Tolerances,
    /// Maximum iterations for iterative solvers.
    pub max_iterations: usize,
    /// Column traversal for the structural rank check: 0 natural,
    /// -1 reverse, any other value seeds a random order.
    pub matching_seed: i64,
    pub assembly: AssemblyOptions,
}

impl Default for SolverConfiguration {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            load_cases: vec![LoadCase::default()],
            preconditioner: PreconditionerKind::default(),
            ordering: OrderingMethod::default(),
            tolerances: Tolerances::default(),
            max_iterations: 10_000,
            matching_seed: 0,
            assembly: AssemblyOptions::default(),
        }
    }
}

impl SolverConfiguration {
    /// Default configuration using the given back-end.
    pub fn with_solver(solver: SolverKind) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SolverConfiguration::default();
        assert_eq!(config.solver, SolverKind::Cholesky);
        assert_eq!(config.load_cases.len(), 1);
        assert_eq!(config.ordering, OrderingMethod::MinimumDegree);
        assert!(config.tolerances.pivot < config.tolerances.constraint);
        assert!(!config.assembly.validate_symmetry);
    }

    #[test]
    fn test_with_solver() {
        let config = SolverConfiguration::with_solver(SolverKind::ConjugateGradient);
        assert_eq!(config.solver, SolverKind::ConjugateGradient);
        assert_eq!(config.max_iterations, 10_000);
    }
}
