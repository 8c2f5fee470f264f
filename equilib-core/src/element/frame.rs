//! Two-node 3D frame element (Euler–Bernoulli beam-column).
//!
//! Local DOF order per node: [u, v, w, θx, θy, θz] with x along the member.
//! The local stiffness couples axial, torsion and bending about both
//! principal axes; shear deformation is neglected.

use super::{member_axis, rotation_matrix, Element, ElementKind};
use crate::error::Result;
use crate::material::{Material, Section};
use crate::pool::{MatrixPool, PooledMatrix};
use crate::types::Point3;
use nalgebra::{DMatrix, Matrix3};

/// Two-node beam-column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frame2Node;

impl Element for Frame2Node {
    fn kind(&self) -> ElementKind {
        ElementKind::Frame2Node
    }

    fn stiffness(
        &self,
        coords: &[Point3],
        material: &Material,
        section: &Section,
        pool: &MatrixPool,
    ) -> Result<DMatrix<f64>> {
        let (length, axis) = member_axis(coords)?;
        let r = rotation_matrix(&axis);

        let mut k_local = pool.take(12, 12);
        local_stiffness(material, section, length, &mut k_local);

        let t = transformation(&r, pool);
        let mut kt = pool.take(12, 12);
        k_local.mul_to(&*t, &mut *kt);

        let mut k = DMatrix::zeros(12, 12);
        t.tr_mul_to(&*kt, &mut k);
        Ok(k)
    }
}

/// Block-diagonal 12x12 transformation built from the 3x3 rotation.
pub(crate) fn transformation<'a>(r: &Matrix3<f64>, pool: &'a MatrixPool) -> PooledMatrix<'a> {
    let mut t = pool.take(12, 12);
    for block in 0..4 {
        let offset = block * 3;
        for row in 0..3 {
            for col in 0..3 {
                t[(offset + row, offset + col)] = r[(row, col)];
            }
        }
    }
    t
}

fn local_stiffness(material: &Material, section: &Section, length: f64, k: &mut DMatrix<f64>) {
    let e = material.youngs_modulus;
    let g = material.shear_modulus();
    let l = length;
    let l2 = l * l;
    let l3 = l2 * l;

    let ea_l = e * section.area / l;
    let gj_l = g * section.j / l;

    let eiy_l3 = e * section.iy / l3;
    let eiy_l2 = e * section.iy / l2;
    let eiy_l = e * section.iy / l;

    let eiz_l3 = e * section.iz / l3;
    let eiz_l2 = e * section.iz / l2;
    let eiz_l = e * section.iz / l;

    // Upper triangle, mirrored below.
    let entries = [
        (0, 0, ea_l),
        (0, 6, -ea_l),
        (6, 6, ea_l),
        (3, 3, gj_l),
        (3, 9, -gj_l),
        (9, 9, gj_l),
        // bending in the local x-y plane (about z)
        (1, 1, 12.0 * eiz_l3),
        (1, 5, 6.0 * eiz_l2),
        (1, 7, -12.0 * eiz_l3),
        (1, 11, 6.0 * eiz_l2),
        (5, 5, 4.0 * eiz_l),
        (5, 7, -6.0 * eiz_l2),
        (5, 11, 2.0 * eiz_l),
        (7, 7, 12.0 * eiz_l3),
        (7, 11, -6.0 * eiz_l2),
        (11, 11, 4.0 * eiz_l),
        // bending in the local x-z plane (about y)
        (2, 2, 12.0 * eiy_l3),
        (2, 4, -6.0 * eiy_l2),
        (2, 8, -12.0 * eiy_l3),
        (2, 10, -6.0 * eiy_l2),
        (4, 4, 4.0 * eiy_l),
        (4, 8, 6.0 * eiy_l2),
        (4, 10, 2.0 * eiy_l),
        (8, 8, 12.0 * eiy_l3),
        (8, 10, 6.0 * eiy_l2),
        (10, 10, 4.0 * eiy_l),
    ];
    for (i, j, v) in entries {
        k[(i, j)] = v;
        k[(j, i)] = v;
    }
}
