//! Preconditioners for the conjugate gradient solver.
//!
//! Each preconditioner applies `z = M⁻¹·r` for an approximation `M` of the
//! symmetric system matrix.

use crate::config::PreconditionerKind;
use crate::error::{Error, Result};
use crate::sparse::{diagonal, SparseMatrix};

/// Preconditioner interface.
pub trait Preconditioner: Send + Sync {
    /// Apply the preconditioner: `z = M⁻¹·r`.
    fn apply(&self, r: &[f64]) -> Vec<f64>;

    fn name(&self) -> &str;
}

impl PreconditionerKind {
    /// Build the preconditioner for `matrix`.
    pub fn build(self, matrix: &SparseMatrix) -> Result<Box<dyn Preconditioner>> {
        Ok(match self {
            PreconditionerKind::Identity => Box::new(IdentityPreconditioner),
            PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::new(matrix)?),
            PreconditionerKind::Ssor { omega } => {
                Box::new(SsorPreconditioner::new(matrix, omega)?)
            }
        })
    }
}

/// No preconditioning.
#[derive(Clone, Debug, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.to_vec()
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Strictly positive diagonal of `matrix`.
fn positive_diagonal(matrix: &SparseMatrix) -> Result<Vec<f64>> {
    let diag = diagonal(matrix);
    match diag.iter().position(|&d| d <= 0.0) {
        Some(pivot) => Err(Error::NotPositiveDefinite { pivot }),
        None => Ok(diag),
    }
}

/// Diagonal scaling `M = diag(A)`.
#[derive(Clone, Debug)]
pub struct JacobiPreconditioner {
    inverse_diagonal: Vec<f64>,
}

impl JacobiPreconditioner {
    pub fn new(matrix: &SparseMatrix) -> Result<Self> {
        let inverse_diagonal = positive_diagonal(matrix)?
            .into_iter()
            .map(|d| 1.0 / d)
            .collect();
        Ok(Self { inverse_diagonal })
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        r.iter()
            .zip(&self.inverse_diagonal)
            .map(|(ri, di)| ri * di)
            .collect()
    }

    fn name(&self) -> &str {
        "Jacobi"
    }
}

/// Symmetric successive over-relaxation.
///
/// With `A = L + D + Lᵀ`,
/// `M = (D + ωL)·D⁻¹·(D + ωLᵀ) / (ω(2 − ω))`.
#[derive(Clone, Debug)]
pub struct SsorPreconditioner {
    matrix: SparseMatrix,
    diagonal: Vec<f64>,
    omega: f64,
}

impl SsorPreconditioner {
    /// # Errors
    ///
    /// `Solver` unless `0 < omega < 2`; `NotPositiveDefinite` for a
    /// non-positive diagonal entry.
    pub fn new(matrix: &SparseMatrix, omega: f64) -> Result<Self> {
        if !(omega > 0.0 && omega < 2.0) {
            return Err(Error::Solver(format!(
                "SSOR relaxation factor must lie in (0, 2), got {}",
                omega
            )));
        }
        let diagonal = positive_diagonal(matrix)?;
        Ok(Self {
            matrix: matrix.clone(),
            diagonal,
            omega,
        })
    }
}

impl Preconditioner for SsorPreconditioner {
    fn apply(&self, r: &[f64]) -> Vec<f64> {
        let n = self.diagonal.len();
        let w = self.omega;
        let cp = self.matrix.col_offsets();
        let ri = self.matrix.row_indices();
        let rv = self.matrix.values();

        // (D + ωL)·y = r, column-oriented over the strict lower triangle.
        let mut y = r.to_vec();
        for j in 0..n {
            y[j] /= self.diagonal[j];
            let yj = y[j];
            for p in cp[j]..cp[j + 1] {
                if ri[p] > j {
                    y[ri[p]] -= w * rv[p] * yj;
                }
            }
        }

        // (D + ωLᵀ)·z = D·y, row j of Lᵀ is the lower part of column j.
        let mut z: Vec<f64> = y.iter().zip(&self.diagonal).map(|(a, d)| a * d).collect();
        for j in (0..n).rev() {
            let mut sum = z[j];
            for p in cp[j]..cp[j + 1] {
                if ri[p] > j {
                    sum -= w * rv[p] * z[ri[p]];
                }
            }
            z[j] = sum / self.diagonal[j];
        }

        let scale = w * (2.0 - w);
        for v in &mut z {
            *v *= scale;
        }
        z
    }

    fn name(&self) -> &str {
        "SSOR"
    }
}
