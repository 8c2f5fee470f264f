//! Equivalent nodal loads of element loads.
//!
//! Each (element kind, load kind) pair either has a handler or is rejected
//! with [`Error::UnsupportedCombination`]. Loads are returned in global axes
//! as a 12-component vector ordered like the element stiffness.

use super::{member_axis, rotation_matrix, ElementKind};
use crate::error::{Error, Result};
use crate::material::{Material, Section};
use crate::types::{Point3, Vec3};
use nalgebra::{SVector, Vector3};

/// Element end-load vector (two nodes, six components each).
pub type ElementLoadVector = SVector<f64, 12>;

/// Load applied along an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementLoadKind {
    /// Uniform load per unit length, in global axes.
    Uniform { w: Vec3 },
    /// Imposed axial strain (e.g. thermal expansion αΔT).
    ImposedStrain { strain: f64 },
}

/// Equivalent nodal loads of `load` on an element of `kind`.
pub fn equivalent_nodal_loads(
    kind: ElementKind,
    load: &ElementLoadKind,
    coords: &[Point3],
    material: &Material,
    section: &Section,
    tolerance: f64,
) -> Result<ElementLoadVector> {
    let (length, axis) = member_axis(coords)?;
    let r = rotation_matrix(&axis);

    let local = match (kind, load) {
        (ElementKind::Frame2Node, ElementLoadKind::Uniform { w }) => {
            uniform_frame(&(r * w), length)
        }
        (ElementKind::Truss2Node, ElementLoadKind::Uniform { w }) => {
            let w_local = r * w;
            let transverse = w_local.y.hypot(w_local.z);
            if transverse > tolerance * w.norm() {
                return Err(Error::UnsupportedCombination(
                    "truss element cannot carry a transverse distributed load".into(),
                ));
            }
            uniform_frame(&Vector3::new(w_local.x, 0.0, 0.0), length)
        }
        (
            ElementKind::Frame2Node | ElementKind::Truss2Node,
            ElementLoadKind::ImposedStrain { strain },
        ) => {
            let n = material.youngs_modulus * section.area * strain;
            let mut f = ElementLoadVector::zeros();
            f[0] = -n;
            f[6] = n;
            f
        }
    };

    Ok(to_global(&r, &local))
}

/// Fixed-end forces reversed: nodal loads equivalent to a uniform load
/// given in local axes.
fn uniform_frame(w: &Vec3, length: f64) -> ElementLoadVector {
    let l = length;
    let l2 = l * l;
    let mut f = ElementLoadVector::zeros();

    f[0] = w.x * l / 2.0;
    f[6] = w.x * l / 2.0;

    f[1] = w.y * l / 2.0;
    f[5] = w.y * l2 / 12.0;
    f[7] = w.y * l / 2.0;
    f[11] = -w.y * l2 / 12.0;

    f[2] = w.z * l / 2.0;
    f[4] = -w.z * l2 / 12.0;
    f[8] = w.z * l / 2.0;
    f[10] = w.z * l2 / 12.0;
    f
}

fn to_global(r: &nalgebra::Matrix3<f64>, local: &ElementLoadVector) -> ElementLoadVector {
    let mut global = ElementLoadVector::zeros();
    for block in 0..4 {
        let o = block * 3;
        let v = r.transpose() * Vector3::new(local[o], local[o + 1], local[o + 2]);
        global[o] = v.x;
        global[o + 1] = v.y;
        global[o + 2] = v.z;
    }
    global
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TOL: f64 = 1e-9;

    fn props() -> (Material, Section) {
        (
            Material::new(200.0, 0.3).unwrap(),
            Section::new(0.5, 1.0, 1.0, 1.0).unwrap(),
        )
    }

    #[test]
    fn test_uniform_on_horizontal_frame() {
        let coords = [Vector3::zeros(), Vector3::new(6.0, 0.0, 0.0)];
        let (m, s) = props();
        let load = ElementLoadKind::Uniform {
            w: Vector3::new(0.0, -2.0, 0.0),
        };
        let f = equivalent_nodal_loads(ElementKind::Frame2Node, &load, &coords, &m, &s, TOL)
            .unwrap();

        assert_relative_eq!(f[1], -6.0, epsilon = 1e-12);
        assert_relative_eq!(f[7], -6.0, epsilon = 1e-12);
        assert_relative_eq!(f[5], -6.0, epsilon = 1e-12);
        assert_relative_eq!(f[11], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_gravity_on_inclined_frame_sums_to_total() {
        let coords = [Vector3::zeros(), Vector3::new(3.0, 0.0, 4.0)];
        let (m, s) = props();
        let load = ElementLoadKind::Uniform {
            w: Vector3::new(0.0, 0.0, -1.0),
        };
        let f = equivalent_nodal_loads(ElementKind::Frame2Node, &load, &coords, &m, &s, TOL)
            .unwrap();
        assert_relative_eq!(f[2] + f[8], -5.0, epsilon = 1e-12);
        assert_relative_eq!(f[0] + f[6], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_truss_axial_only() {
        let coords = [Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)];
        let (m, s) = props();
        let axial = ElementLoadKind::Uniform {
            w: Vector3::new(3.0, 0.0, 0.0),
        };
        let f = equivalent_nodal_loads(ElementKind::Truss2Node, &axial, &coords, &m, &s, TOL)
            .unwrap();
        assert_relative_eq!(f[0], 3.0);
        assert_relative_eq!(f[6], 3.0);

        let transverse = ElementLoadKind::Uniform {
            w: Vector3::new(0.0, 0.0, 1.0),
        };
        assert!(matches!(
            equivalent_nodal_loads(ElementKind::Truss2Node, &transverse, &coords, &m, &s, TOL),
            Err(Error::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_imposed_strain() {
        let coords = [Vector3::zeros(), Vector3::new(0.0, 2.0, 0.0)];
        let (m, s) = props();
        let load = ElementLoadKind::ImposedStrain { strain: 1e-3 };
        let f = equivalent_nodal_loads(ElementKind::Truss2Node, &load, &coords, &m, &s, TOL)
            .unwrap();
        // EAε = 200 * 0.5 * 1e-3 along +y at node j.
        assert_relative_eq!(f[7], 0.1, epsilon = 1e-12);
        assert_relative_eq!(f[1], -0.1, epsilon = 1e-12);
    }
}
