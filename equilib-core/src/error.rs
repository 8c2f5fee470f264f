//! Error types for equilib operations.

use thiserror::Error;

use crate::analysis::SolveStatus;

/// Result type alias using equilib Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, reducing or solving a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A constraint source cannot express its coupling with the model DOFs.
    #[error("malformed constraint: {0}")]
    MalformedConstraint(String),

    /// Contradictory equality rows in the constraint system.
    #[error("conflicting constraints: equation {equation} is inconsistent (residual {residual:e})")]
    ConflictingConstraints { equation: usize, residual: f64 },

    /// No zero-free diagonal exists for the matrix pattern.
    #[error("structurally singular matrix: structural rank {rank} < {size}")]
    StructuralSingularity { rank: usize, size: usize },

    /// Cholesky pivot was not positive.
    #[error("matrix is not positive definite at pivot {pivot}")]
    NotPositiveDefinite { pivot: usize },

    /// Zero pivot within tolerance during QR or elimination.
    #[error("numerically singular matrix at column {column} (pivot {pivot:e})")]
    NumericSingular { column: usize, pivot: f64 },

    /// Iterative solver exceeded its iteration budget.
    #[error("not converged after {iterations} iterations (relative residual {residual:e})")]
    NotConverged { iterations: usize, residual: f64 },

    /// Element, matrix and load kinds that have no handler.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// Model-related errors.
    #[error("model error: {0}")]
    Model(String),

    /// Assembly errors.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver misuse (state machine, dimensions).
    #[error("solver error: {0}")]
    Solver(String),

    /// Invalid material or section properties.
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
}

impl Error {
    /// Status category reported for this failure.
    pub fn status(&self) -> SolveStatus {
        match self {
            Error::StructuralSingularity { .. } | Error::NumericSingular { .. } => {
                SolveStatus::Singular
            }
            Error::NotPositiveDefinite { .. } => SolveStatus::NotPositiveDefinite,
            Error::NotConverged { .. } => SolveStatus::NotConverged,
            _ => SolveStatus::Failed,
        }
    }
}
