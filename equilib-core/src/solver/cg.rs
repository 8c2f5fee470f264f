//! Preconditioned conjugate gradient solver.
//!
//! For symmetric positive definite systems. The iteration starts from
//! `x = 0` and stops once `‖b − A·x‖ / ‖b‖` drops below the tolerance.

use super::{check_initialize, check_solve, LinearSolver, Preconditioner, SolveStats, SolverState};
use crate::config::PreconditionerKind;
use crate::error::{Error, Result};
use crate::sparse::{dot, mul_vec_into, norm, SparseMatrix};
use std::time::Instant;

struct Prepared {
    matrix: SparseMatrix,
    preconditioner: Box<dyn Preconditioner>,
}

/// Iterative solver for symmetric positive definite matrices.
pub struct ConjugateGradientSolver {
    preconditioner: PreconditionerKind,
    tolerance: f64,
    max_iterations: usize,
    prepared: Option<Prepared>,
    state: SolverState,
}

impl ConjugateGradientSolver {
    pub fn new(preconditioner: PreconditionerKind, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            preconditioner,
            tolerance,
            max_iterations,
            prepared: None,
            state: SolverState::Uninitialized,
        }
    }

    fn iterate(&self, prepared: &Prepared, b: &[f64]) -> Result<(Vec<f64>, usize, f64)> {
        let n = b.len();
        let mut x = vec![0.0; n];

        let b_norm = norm(b);
        if b_norm == 0.0 {
            return Ok((x, 0, 0.0));
        }

        let mut r = b.to_vec();
        let mut z = prepared.preconditioner.apply(&r);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);
        let mut ap = vec![0.0; n];
        let mut rel_residual = 1.0;

        for iter in 0..self.max_iterations {
            mul_vec_into(&prepared.matrix, &p, &mut ap);
            let pap = dot(&p, &ap);
            if pap <= 0.0 {
                return Err(Error::NotPositiveDefinite { pivot: iter });
            }

            let alpha = rz / pap;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            rel_residual = norm(&r) / b_norm;
            if rel_residual < self.tolerance {
                return Ok((x, iter + 1, rel_residual));
            }

            z = prepared.preconditioner.apply(&r);
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            rz = rz_new;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
        }

        Err(Error::NotConverged {
            iterations: self.max_iterations,
            residual: rel_residual,
        })
    }
}

impl LinearSolver for ConjugateGradientSolver {
    fn initialize(&mut self, matrix: &SparseMatrix) -> Result<()> {
        check_initialize(self.state, matrix)?;
        self.prepared = None;
        self.state = SolverState::Uninitialized;
        let preconditioner = self.preconditioner.build(matrix)?;
        self.prepared = Some(Prepared {
            matrix: matrix.clone(),
            preconditioner,
        });
        self.state = SolverState::Factorized;
        Ok(())
    }

    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        self.solve_with_stats(rhs).map(|(x, _)| x)
    }

    fn solve_with_stats(&self, rhs: &[f64]) -> Result<(Vec<f64>, SolveStats)> {
        let n = self.prepared.as_ref().map_or(0, |p| p.matrix.nrows());
        check_solve(self.state, n, rhs)?;
        let Some(prepared) = &self.prepared else {
            return Err(Error::Solver("solve called before initialize".into()));
        };

        let start = Instant::now();
        let (x, iterations, residual) = self.iterate(prepared, rhs)?;
        log::debug!(
            "CG ({}): {} iterations, relative residual = {:.3e}",
            prepared.preconditioner.name(),
            iterations,
            residual
        );
        let stats = SolveStats {
            solver: self.name().to_string(),
            iterations: Some(iterations),
            residual: Some(residual),
            time_seconds: start.elapsed().as_secs_f64(),
        };
        Ok((x, stats))
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn dispose(&mut self) {
        self.prepared = None;
        self.state = SolverState::Disposed;
    }

    fn name(&self) -> &str {
        "ConjugateGradient"
    }
}

impl Drop for ConjugateGradientSolver {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_matrices::{banded, from_dense, spd3};
    use crate::sparse::mul_vec;
    use approx::assert_relative_eq;

    #[test]
    fn test_converges_with_every_preconditioner() {
        let a = banded(50);
        let b: Vec<f64> = (0..50).map(|i| 1.0 + (i % 3) as f64).collect();
        for kind in [
            PreconditionerKind::Identity,
            PreconditionerKind::Jacobi,
            PreconditionerKind::Ssor { omega: 1.3 },
        ] {
            let mut s = ConjugateGradientSolver::new(kind, 1e-12, 500);
            s.initialize(&a).unwrap();
            let (x, stats) = s.solve_with_stats(&b).unwrap();
            assert!(stats.residual.unwrap() < 1e-12);
            assert!(stats.iterations.unwrap() <= 50);
            let ax = mul_vec(&a, &x);
            for i in 0..50 {
                assert_relative_eq!(ax[i], b[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_small_system() {
        let mut s = ConjugateGradientSolver::new(PreconditionerKind::Identity, 1e-12, 10);
        s.initialize(&spd3()).unwrap();
        let (x, stats) = s.solve_with_stats(&[2.0, 8.0, 5.0]).unwrap();
        assert!(stats.iterations.unwrap() <= 4);
        assert_relative_eq!(x[0], -0.1875, epsilon = 1e-10);
        assert_relative_eq!(x[1], 1.375, epsilon = 1e-10);
        assert_relative_eq!(x[2], 0.75, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_rhs() {
        let mut s = ConjugateGradientSolver::new(PreconditionerKind::Jacobi, 1e-10, 10);
        s.initialize(&spd3()).unwrap();
        let (x, stats) = s.solve_with_stats(&[0.0; 3]).unwrap();
        assert_eq!(x, vec![0.0; 3]);
        assert_eq!(stats.iterations, Some(0));
    }

    #[test]
    fn test_not_converged() {
        let mut s = ConjugateGradientSolver::new(PreconditionerKind::Identity, 1e-14, 2);
        s.initialize(&banded(30)).unwrap();
        assert!(matches!(
            s.solve(&[1.0; 30]),
            Err(Error::NotConverged { iterations: 2, .. })
        ));
    }

    #[test]
    fn test_indefinite_breakdown() {
        let a = from_dense(2, &[1.0, 0.0, 0.0, -1.0]);
        let mut s = ConjugateGradientSolver::new(PreconditionerKind::Identity, 1e-12, 10);
        s.initialize(&a).unwrap();
        assert!(matches!(
            s.solve(&[0.0, 1.0]),
            Err(Error::NotPositiveDefinite { pivot: 0 })
        ));
    }
}
