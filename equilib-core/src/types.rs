//! Core data types for structural analysis.
//!
//! This module defines fundamental types used throughout equilib:
//! - Geometric primitives (points, vectors)
//! - Six-component nodal displacements and forces
//! - Degree of freedom addressing

use nalgebra::{Vector3, Vector6};
use std::ops::{Add, AddAssign, Neg, Sub};

/// A point in 3D space.
pub type Point3 = Vector3<f64>;

/// A 3D vector (translation, moment arm, etc.).
pub type Vec3 = Vector3<f64>;

/// Number of degrees of freedom carried by every node.
pub const DOFS_PER_NODE: usize = 6;

/// Local component of a nodal degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dof {
    Dx = 0,
    Dy = 1,
    Dz = 2,
    Rx = 3,
    Ry = 4,
    Rz = 5,
}

impl Dof {
    /// All components in global-index order.
    pub const ALL: [Dof; DOFS_PER_NODE] = [Dof::Dx, Dof::Dy, Dof::Dz, Dof::Rx, Dof::Ry, Dof::Rz];

    /// Offset of this component within a node's block.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Component for an offset in `0..6`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// True for the three translational components.
    pub fn is_translation(self) -> bool {
        self.index() < 3
    }
}

/// Address of one scalar DOF: a node and a component.
///
/// Maps bijectively onto the global index `6 * node + component`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DofAddress {
    pub node: usize,
    pub dof: Dof,
}

impl DofAddress {
    pub fn new(node: usize, dof: Dof) -> Self {
        Self { node, dof }
    }

    /// Global equation index.
    pub fn global_index(self) -> usize {
        self.node * DOFS_PER_NODE + self.dof.index()
    }

    /// Inverse of [`DofAddress::global_index`].
    pub fn from_global(index: usize) -> Self {
        let dof = Dof::ALL[index % DOFS_PER_NODE];
        Self {
            node: index / DOFS_PER_NODE,
            dof,
        }
    }
}

/// Global DOF indices of a list of nodes, six per node.
pub fn node_dofs(nodes: &[usize]) -> Vec<usize> {
    nodes
        .iter()
        .flat_map(|&node| (0..DOFS_PER_NODE).map(move |d| node * DOFS_PER_NODE + d))
        .collect()
}

macro_rules! six_component {
    ($name:ident, $doc:literal, $t:ident, $r:ident) => {
        #[doc = $doc]
        ///
        /// Components are ordered as: [x, y, z, rx, ry, rz]
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name(pub Vector6<f64>);

        impl $name {
            /// Create from six components.
            pub fn new(components: [f64; 6]) -> Self {
                Self(Vector6::from_row_slice(&components))
            }

            /// All components zero.
            pub fn zero() -> Self {
                Self(Vector6::zeros())
            }

            /// Translational (or force) part.
            pub fn $t(&self) -> Vec3 {
                Vec3::new(self.0[0], self.0[1], self.0[2])
            }

            /// Rotational (or moment) part.
            pub fn $r(&self) -> Vec3 {
                Vec3::new(self.0[3], self.0[4], self.0[5])
            }

            /// Component value.
            pub fn get(&self, dof: Dof) -> f64 {
                self.0[dof.index()]
            }

            /// Component slice.
            pub fn as_slice(&self) -> &[f64] {
                self.0.as_slice()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }
    };
}

six_component!(
    Displacement,
    "Nodal displacement: three translations and three rotations.",
    translation,
    rotation
);
six_component!(
    Force,
    "Nodal force: three forces and three moments.",
    force,
    moment
);
