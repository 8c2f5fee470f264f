//! Reusable scratch buffers for dense element matrices.
//!
//! Element routines build several small dense matrices (transformations,
//! intermediate products) per call. A [`MatrixPool`] hands out zeroed
//! buffers through a [`PooledMatrix`] guard that puts the storage back when
//! dropped, so every exit path (including `?` early returns) returns it.
//!
//! The pool uses interior mutability without locking and is therefore
//! `!Sync`: create one per element computation or per worker thread.

use nalgebra::DMatrix;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Pool of dense matrix buffers, bucketed by shape.
#[derive(Debug, Default)]
pub struct MatrixPool {
    free: RefCell<HashMap<(usize, usize), Vec<DMatrix<f64>>>>,
}

impl MatrixPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a zero-filled `nrows x ncols` matrix.
    pub fn take(&self, nrows: usize, ncols: usize) -> PooledMatrix<'_> {
        let reused = self
            .free
            .borrow_mut()
            .get_mut(&(nrows, ncols))
            .and_then(Vec::pop);
        let matrix = match reused {
            Some(mut m) => {
                m.fill(0.0);
                m
            }
            None => DMatrix::zeros(nrows, ncols),
        };
        PooledMatrix {
            pool: self,
            matrix: Some(matrix),
        }
    }

    /// Number of idle buffers.
    pub fn available(&self) -> usize {
        self.free.borrow().values().map(Vec::len).sum()
    }

    fn give_back(&self, matrix: DMatrix<f64>) {
        self.free
            .borrow_mut()
            .entry(matrix.shape())
            .or_default()
            .push(matrix);
    }
}

/// A matrix on loan from a [`MatrixPool`].
#[derive(Debug)]
pub struct PooledMatrix<'a> {
    pool: &'a MatrixPool,
    matrix: Option<DMatrix<f64>>,
}

impl PooledMatrix<'_> {
    /// Detach the buffer from the pool and keep it.
    pub fn into_inner(mut self) -> DMatrix<f64> {
        self.matrix.take().unwrap_or_else(|| DMatrix::zeros(0, 0))
    }
}

impl Deref for PooledMatrix<'_> {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &DMatrix<f64> {
        match &self.matrix {
            Some(m) => m,
            None => unreachable!("pooled matrix accessed after release"),
        }
    }
}

impl DerefMut for PooledMatrix<'_> {
    fn deref_mut(&mut self) -> &mut DMatrix<f64> {
        match &mut self.matrix {
            Some(m) => m,
            None => unreachable!("pooled matrix accessed after release"),
        }
    }
}

impl Drop for PooledMatrix<'_> {
    fn drop(&mut self) {
        if let Some(m) = self.matrix.take() {
            self.pool.give_back(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_returned_on_drop() {
        let pool = MatrixPool::new();
        {
            let mut a = pool.take(3, 3);
            a[(0, 0)] = 5.0;
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);

        let b = pool.take(3, 3);
        assert_eq!(b[(0, 0)], 0.0, "reused buffer must be zeroed");
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_shapes_are_kept_apart() {
        let pool = MatrixPool::new();
        drop(pool.take(2, 2));
        let c = pool.take(4, 4);
        assert_eq!(c.nrows(), 4);
        assert_eq!(pool.available(), 1);

        drop(c);
        drop(pool.take(2, 2));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_returned_on_early_exit() {
        fn fails(pool: &MatrixPool) -> Result<(), ()> {
            let _m = pool.take(2, 2);
            Err(())
        }
        let pool = MatrixPool::new();
        assert!(fails(&pool).is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool = MatrixPool::new();
        let m = pool.take(2, 3).into_inner();
        assert_eq!(m.ncols(), 3);
        assert_eq!(pool.available(), 0);
    }
}
