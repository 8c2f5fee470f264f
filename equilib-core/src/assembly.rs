//! Parallel finite element assembly.
//!
//! Assembles the global stiffness (or mass) matrix and the load vector of a
//! load case from element contributions, using Rayon for shared-memory
//! parallelism. Each worker thread owns a [`MatrixPool`] for the scratch
//! matrices of its element computations.

use crate::config::AssemblyOptions;
use crate::element::loads::equivalent_nodal_loads;
use crate::element::{create_element, is_degenerate, MatrixKind};
use crate::error::{Error, Result};
use crate::model::{LoadCase, Model};
use crate::pool::MatrixPool;
use crate::sparse::{symmetry_violation, GlobalVector, SparseMatrix, TripletMatrix};
use crate::types::{node_dofs, Point3};
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Assemble a global matrix of the given kind.
///
/// Element matrices are computed in parallel; they are summed into the
/// triplet list in element order, so the result is bitwise reproducible.
///
/// # Example
///
/// ```
/// use equilib_core::assembly::assemble;
/// use equilib_core::config::AssemblyOptions;
/// use equilib_core::element::{ElementKind, MatrixKind};
/// use equilib_core::material::{Material, Section};
/// use equilib_core::model::Model;
/// use nalgebra::Vector3;
///
/// let mut model = Model::new();
/// let a = model.add_node(Vector3::new(0.0, 0.0, 0.0));
/// let b = model.add_node(Vector3::new(2.0, 0.0, 0.0));
/// let steel = Material::steel();
/// let section = Section::axial(0.01).unwrap();
/// model.add_element(ElementKind::Truss2Node, vec![a, b], steel, section).unwrap();
///
/// let k = assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()).unwrap();
/// assert_eq!(k.nrows(), 12);
/// ```
pub fn assemble(
    model: &Model,
    kind: MatrixKind,
    options: &AssemblyOptions,
) -> Result<SparseMatrix> {
    let n_dofs = model.n_dofs();

    let contributions: Vec<(Vec<usize>, DMatrix<f64>)> = model
        .elements()
        .par_iter()
        .enumerate()
        .map_init(
            MatrixPool::new,
            |pool, (elem_idx, elem)| -> Result<(Vec<usize>, DMatrix<f64>)> {
                let element = create_element(elem.kind);
                let coords = element_coords(model, elem_idx, options)?;
                let ke = element
                    .local_matrix(kind, &coords, &elem.material, &elem.section, pool)
                    .map_err(|e| match e {
                        Error::Model(msg) => {
                            Error::Model(format!("element {}: {}", elem_idx, msg))
                        }
                        other => other,
                    })?;
                Ok((node_dofs(&elem.nodes), ke))
            },
        )
        .collect::<Result<_>>()?;

    // 12x12 element matrices, fully populated for frames.
    let nnz_estimate = contributions.len() * 144;
    let mut triplet = TripletMatrix::with_capacity(n_dofs, n_dofs, nnz_estimate);
    for (dofs, ke) in &contributions {
        triplet.add_submatrix(dofs, ke);
    }
    let matrix = triplet.to_csc()?;

    if options.validate_symmetry {
        if let Some((i, j, rel)) = symmetry_violation(&matrix, options.symmetry_tolerance) {
            return Err(Error::Assembly(format!(
                "{:?} matrix is not symmetric at ({}, {}): relative difference {:e}",
                kind, i, j, rel
            )));
        }
    }

    log::debug!(
        "assembled {:?} matrix: {} elements, n = {}, nnz = {}",
        kind,
        model.elements().len(),
        n_dofs,
        matrix.nnz()
    );
    Ok(matrix)
}

/// Coordinates of an element, rejecting members shorter than the geometry
/// tolerance.
fn element_coords(
    model: &Model,
    elem_idx: usize,
    options: &AssemblyOptions,
) -> Result<Vec<Point3>> {
    let coords = model.element_coords(elem_idx).ok_or_else(|| {
        Error::Assembly(format!("element {} has invalid connectivity", elem_idx))
    })?;
    if is_degenerate(&coords, options.geometry_tolerance) {
        return Err(Error::Model(format!("element {}: element has zero length", elem_idx)));
    }
    Ok(coords)
}

/// Assemble the load vector of one load case.
///
/// Nodal loads enter directly; element loads through their equivalent
/// nodal loads.
pub fn assemble_loads(
    model: &Model,
    case: &LoadCase,
    options: &AssemblyOptions,
) -> Result<Vec<f64>> {
    let mut rhs = GlobalVector::zeros(model.n_dofs());

    for (idx, node) in model.nodes().iter().enumerate() {
        let force = node.load(case);
        rhs.add_subvector(&node_dofs(&[idx]), force.as_slice());
    }

    for (elem_idx, elem) in model.elements().iter().enumerate() {
        let loads: Vec<_> = elem.loads.iter().filter(|l| &l.case == case).collect();
        if loads.is_empty() {
            continue;
        }
        let coords = element_coords(model, elem_idx, options)?;
        let dofs = node_dofs(&elem.nodes);
        for load in loads {
            let f = equivalent_nodal_loads(
                elem.kind,
                &load.kind,
                &coords,
                &elem.material,
                &elem.section,
                options.geometry_tolerance,
            )?;
            rhs.add_subvector(&dofs, f.as_slice());
        }
    }

    Ok(rhs.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::loads::ElementLoadKind;
    use crate::element::ElementKind;
    use crate::material::{Material, Section};
    use crate::model::ElementLoad;
    use crate::sparse::get;
    use crate::types::{Dof, DofAddress, Force};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn two_bar_line() -> Model {
        let mut model = Model::new();
        for x in [0.0, 1.0, 3.0] {
            model.add_node(Vector3::new(x, 0.0, 0.0));
        }
        let m = Material::new(100.0, 0.3).unwrap();
        let s = Section::axial(2.0).unwrap();
        model
            .add_element(ElementKind::Truss2Node, vec![0, 1], m, s)
            .unwrap();
        model
            .add_element(ElementKind::Truss2Node, vec![1, 2], m, s)
            .unwrap();
        model
    }

    fn frame_portal() -> Model {
        let mut model = Model::new();
        let pts = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
            Vector3::new(4.0, 0.0, 3.0),
            Vector3::new(4.0, 1.0, 0.0),
        ];
        for p in pts {
            model.add_node(p);
        }
        let m = Material::steel();
        let s = Section::rectangle(0.2, 0.4).unwrap();
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            model
                .add_element(ElementKind::Frame2Node, vec![a, b], m, s)
                .unwrap();
        }
        model
    }

    #[test]
    fn test_assembly_empty_model() {
        let model = Model::new();
        let k = assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()).unwrap();
        assert_eq!(k.nrows(), 0);
        let options = AssemblyOptions::default();
        assert!(assemble_loads(&model, &LoadCase::default(), &options)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_collinear_bars_add_at_shared_node() {
        let model = two_bar_line();
        let k = assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()).unwrap();
        assert_eq!(k.nrows(), 18);

        let ux = |node| DofAddress::new(node, Dof::Dx).global_index();
        // EA/L = 200 and 100.
        assert_relative_eq!(get(&k, ux(0), ux(0)), 200.0, epsilon = 1e-10);
        assert_relative_eq!(get(&k, ux(1), ux(1)), 300.0, epsilon = 1e-10);
        assert_relative_eq!(get(&k, ux(1), ux(2)), -100.0, epsilon = 1e-10);
        assert_eq!(get(&k, ux(0), ux(2)), 0.0);
        // Trusses leave rotations empty.
        let rx = DofAddress::new(1, Dof::Rx).global_index();
        assert_eq!(get(&k, rx, rx), 0.0);
    }

    #[test]
    fn test_frame_assembly_is_symmetric_with_positive_diagonal() {
        let model = frame_portal();
        let options = AssemblyOptions {
            validate_symmetry: true,
            ..AssemblyOptions::default()
        };
        let k = assemble(&model, MatrixKind::Stiffness, &options).unwrap();
        let dense = nalgebra::DMatrix::from(&k);
        for i in 0..24 {
            assert!(dense[(i, i)] > 0.0, "diagonal {} is not positive", i);
        }
        assert!(symmetry_violation(&k, 1e-10).is_none());
    }

    #[test]
    fn test_assembly_is_bitwise_reproducible() {
        let model = frame_portal();
        let first = assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()).unwrap();
        for _ in 0..5 {
            let again =
                assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()).unwrap();
            assert_eq!(first.values(), again.values());
            assert_eq!(first.row_indices(), again.row_indices());
        }
    }

    #[test]
    fn test_mass_requires_density() {
        let model = two_bar_line();
        assert!(matches!(
            assemble(&model, MatrixKind::Mass, &AssemblyOptions::default()),
            Err(Error::UnsupportedCombination(_))
        ));
        assert!(matches!(
            assemble(&model, MatrixKind::Damping, &AssemblyOptions::default()),
            Err(Error::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_short_member_rejected_by_geometry_tolerance() {
        let mut model = Model::new();
        model.add_node(Vector3::new(1000.0, 0.0, 0.0));
        model.add_node(Vector3::new(1000.0 + 1e-8, 0.0, 0.0));
        let m = Material::new(100.0, 0.3).unwrap();
        let s = Section::axial(1.0).unwrap();
        model
            .add_element(ElementKind::Truss2Node, vec![0, 1], m, s)
            .unwrap();

        assert!(matches!(
            assemble(&model, MatrixKind::Stiffness, &AssemblyOptions::default()),
            Err(Error::Model(_))
        ));
        let strict = AssemblyOptions {
            geometry_tolerance: 1e-14,
            ..AssemblyOptions::default()
        };
        assert!(assemble(&model, MatrixKind::Stiffness, &strict).is_ok());
    }

    #[test]
    fn test_lumped_mass_total() {
        let mut model = Model::new();
        model.add_node(Vector3::new(0.0, 0.0, 0.0));
        model.add_node(Vector3::new(0.0, 5.0, 0.0));
        let m = Material::new(100.0, 0.3).unwrap().with_density(2.0).unwrap();
        let s = Section::axial(0.5).unwrap();
        model
            .add_element(ElementKind::Truss2Node, vec![0, 1], m, s)
            .unwrap();
        let mass = assemble(&model, MatrixKind::Mass, &AssemblyOptions::default()).unwrap();
        let uy_total: f64 = (0..2)
            .map(|n| {
                let i = DofAddress::new(n, Dof::Dy).global_index();
                get(&mass, i, i)
            })
            .sum();
        assert_relative_eq!(uy_total, 2.0 * 0.5 * 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_load_vector_combines_nodal_and_element_loads() {
        let mut model = frame_portal();
        let case = LoadCase::default();
        let other = LoadCase::new("Wind", crate::model::LoadType::Wind);
        model
            .add_nodal_load(
                2,
                case.clone(),
                Force::new([10.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            )
            .unwrap();
        model
            .add_nodal_load(
                2,
                other.clone(),
                Force::new([0.0, 99.0, 0.0, 0.0, 0.0, 0.0]),
            )
            .unwrap();
        model
            .add_element_load(
                1,
                ElementLoad {
                    case: case.clone(),
                    kind: ElementLoadKind::Uniform {
                        w: Vector3::new(0.0, 0.0, -3.0),
                    },
                },
            )
            .unwrap();

        let options = AssemblyOptions::default();
        let f = assemble_loads(&model, &case, &options).unwrap();
        let at = |node, dof| f[DofAddress::new(node, dof).global_index()];
        assert_relative_eq!(at(2, Dof::Dx), 10.0);
        assert_relative_eq!(at(2, Dof::Dy), 0.0);
        // wL/2 on each end of the 4 m beam.
        assert_relative_eq!(at(1, Dof::Dz), -6.0, epsilon = 1e-12);
        assert_relative_eq!(at(2, Dof::Dz), -6.0, epsilon = 1e-12);

        let g = assemble_loads(&model, &other, &options).unwrap();
        assert_relative_eq!(g[DofAddress::new(2, Dof::Dy).global_index()], 99.0);
    }
}
