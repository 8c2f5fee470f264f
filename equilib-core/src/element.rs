//! Element trait and implementations.
//!
//! The Element trait defines the interface for line elements, enabling
//! the assembly process to work with any element type uniformly.
//!
//! # Submodules
//!
//! - [`truss`] - two-node axial bar
//! - [`frame`] - two-node 3D Euler–Bernoulli beam-column
//! - [`loads`] - equivalent nodal loads of element loads

use crate::error::{Error, Result};
use crate::material::{Material, Section};
use crate::pool::MatrixPool;
use crate::types::{Point3, Vec3, DOFS_PER_NODE};
use nalgebra::{DMatrix, Matrix3};

pub mod frame;
pub mod loads;
pub mod truss;

pub use frame::Frame2Node;
pub use truss::Truss2Node;

/// Supported element formulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Two-node bar carrying axial force only.
    Truss2Node,
    /// Two-node beam-column with axial, torsion and biaxial bending.
    Frame2Node,
}

impl ElementKind {
    /// Number of nodes for this element type.
    pub fn n_nodes(self) -> usize {
        match self {
            ElementKind::Truss2Node | ElementKind::Frame2Node => 2,
        }
    }
}

/// Kind of local matrix requested from an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    Stiffness,
    Mass,
    Damping,
}

/// Finite element interface.
///
/// All element types implement this trait, providing local matrices in the
/// global coordinate frame, ordered node by node with six DOFs per node.
///
/// Elements must be thread-safe (Send + Sync) to enable parallel assembly.
pub trait Element: Send + Sync {
    /// Formulation tag.
    fn kind(&self) -> ElementKind;

    /// Number of nodes in this element.
    fn n_nodes(&self) -> usize {
        self.kind().n_nodes()
    }

    /// Total degrees of freedom for this element.
    fn n_dofs(&self) -> usize {
        self.n_nodes() * DOFS_PER_NODE
    }

    /// Compute the element stiffness matrix in global axes.
    ///
    /// # Arguments
    ///
    /// * `coords` - Nodal coordinates
    /// * `material` - Material properties
    /// * `section` - Cross-section constants
    /// * `pool` - Scratch buffers for intermediate products
    fn stiffness(
        &self,
        coords: &[Point3],
        material: &Material,
        section: &Section,
        pool: &MatrixPool,
    ) -> Result<DMatrix<f64>>;

    /// Local matrix of the requested kind.
    fn local_matrix(
        &self,
        kind: MatrixKind,
        coords: &[Point3],
        material: &Material,
        section: &Section,
        pool: &MatrixPool,
    ) -> Result<DMatrix<f64>> {
        match kind {
            MatrixKind::Stiffness => self.stiffness(coords, material, section, pool),
            MatrixKind::Mass => lumped_mass(coords, material, section),
            MatrixKind::Damping => Err(Error::UnsupportedCombination(format!(
                "{:?} has no damping matrix",
                self.kind()
            ))),
        }
    }
}

/// Create an element implementation from its kind.
pub fn create_element(kind: ElementKind) -> Box<dyn Element> {
    match kind {
        ElementKind::Truss2Node => Box::new(Truss2Node),
        ElementKind::Frame2Node => Box::new(Frame2Node),
    }
}

/// Member length and unit axis from node i to node j.
pub(crate) fn member_axis(coords: &[Point3]) -> Result<(f64, Vec3)> {
    if coords.len() != 2 {
        return Err(Error::Model(format!(
            "line element needs 2 nodes, got {}",
            coords.len()
        )));
    }
    let d = coords[1] - coords[0];
    let length = d.norm();
    if length == 0.0 {
        return Err(Error::Model("element has zero length".into()));
    }
    Ok((length, d / length))
}

/// True if the nodes of a line element coincide within `tolerance`,
/// relative to the size of their coordinates.
pub fn is_degenerate(coords: &[Point3], tolerance: f64) -> bool {
    match coords {
        [a, b] => (b - a).norm() <= tolerance * (1.0 + a.norm().max(b.norm())),
        _ => false,
    }
}

/// Direction cosine matrix whose rows are the local x, y, z axes.
///
/// Local y is horizontal (perpendicular to global Z) except for vertical
/// members, where global X is the reference direction.
pub(crate) fn rotation_matrix(axis: &Vec3) -> Matrix3<f64> {
    let reference = if axis.z.abs() > 0.999_999 {
        Vec3::x()
    } else {
        Vec3::z()
    };
    let y = reference.cross(axis).normalize();
    let z = axis.cross(&y);
    Matrix3::from_rows(&[axis.transpose(), y.transpose(), z.transpose()])
}

/// Lumped mass: half the member mass on each translational DOF.
pub fn lumped_mass(coords: &[Point3], material: &Material, section: &Section) -> Result<DMatrix<f64>> {
    let density = material.density.ok_or_else(|| {
        Error::UnsupportedCombination("mass matrix requires a material density".into())
    })?;
    let (length, _) = member_axis(coords)?;
    let half = density * section.area * length / 2.0;

    let mut m = DMatrix::zeros(2 * DOFS_PER_NODE, 2 * DOFS_PER_NODE);
    for node in 0..2 {
        for d in 0..3 {
            let i = node * DOFS_PER_NODE + d;
            m[(i, i)] = half;
        }
    }
    Ok(m)
}
