//! Two-node axial bar.
//!
//! Only the translational DOFs carry stiffness. The rotational DOFs of the
//! element's nodes stay in the 12x12 block with zero entries, so a model
//! made only of trusses must restrain node rotations by supports or links.

use super::{member_axis, Element, ElementKind};
use crate::error::Result;
use crate::material::{Material, Section};
use crate::pool::MatrixPool;
use crate::types::Point3;
use nalgebra::DMatrix;

/// Two-node bar.
#[derive(Debug, Clone, Copy, Default)]
pub struct Truss2Node;

impl Element for Truss2Node {
    fn kind(&self) -> ElementKind {
        ElementKind::Truss2Node
    }

    fn stiffness(
        &self,
        coords: &[Point3],
        material: &Material,
        section: &Section,
        pool: &MatrixPool,
    ) -> Result<DMatrix<f64>> {
        let (length, axis) = member_axis(coords)?;
        let ea_l = material.youngs_modulus * section.area / length;

        let mut block = pool.take(3, 3);
        for i in 0..3 {
            for j in 0..3 {
                block[(i, j)] = ea_l * axis[i] * axis[j];
            }
        }

        let mut k = DMatrix::zeros(12, 12);
        for i in 0..3 {
            for j in 0..3 {
                let v = block[(i, j)];
                k[(i, j)] = v;
                k[(i + 6, j + 6)] = v;
                k[(i, j + 6)] = -v;
                k[(i + 6, j)] = -v;
            }
        }
        Ok(k)
    }
}
