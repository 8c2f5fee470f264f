//! Equilib Core - constraint elimination for linear static structural analysis
//!
//! Finite element library for frame and truss models with:
//! - Line elements (truss, 3D frame) and their equivalent nodal loads
//! - Parallel assembly using Rayon
//! - Elimination of supports, settlements and multi-point constraints
//! - Fill-reducing orderings and symbolic analysis
//! - Sparse Cholesky, sparse QR and preconditioned CG solvers
//!
//! # Architecture
//!
//! The solver is designed around these core abstractions:
//!
//! - [`Model`]: Nodes, elements, supports, loads and MPC elements
//! - [`Element`] trait: Local element matrices in global axes
//! - [`ConstraintReduction`]: `u = P·u_m + u_p` from `C·u = d`
//! - [`LinearSolver`] trait: Factorize once, solve many right-hand sides
//! - [`StaticAnalysis`]: Assemble, reduce, solve and recover reactions

pub mod analysis;
pub mod assembly;
pub mod config;
pub mod constraint;
pub mod element;
pub mod error;
pub mod material;
pub mod model;
pub mod ordering;
pub mod pool;
pub mod reduction;
pub mod solver;
pub mod sparse;
pub mod trace;
pub mod types;

pub use analysis::{solve, SolveResult, SolveStatus, StaticAnalysis};
pub use config::{PreconditionerKind, SolverConfiguration, SolverKind, Tolerances};
pub use constraint::{ConstraintEquations, MpcElement};
pub use element::{create_element, Element, ElementKind, MatrixKind};
pub use error::{Error, Result};
pub use material::{Material, Section};
pub use model::{Constraint, LoadCase, LoadType, Model};
pub use ordering::OrderingMethod;
pub use reduction::{find_reduction, ConstraintReduction, HollowPermutation, ReductionOperator};
pub use solver::{select_solver, LinearSolver, SolveStats};
pub use sparse::SparseMatrix;
pub use types::{Displacement, Dof, DofAddress, Force, Point3, Vec3};
