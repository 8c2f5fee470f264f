//! End-to-end static analyses with closed-form answers.

use approx::assert_relative_eq;
use equilib_core::constraint::collect;
use equilib_core::sparse::{max_abs, multiply};
use equilib_core::{
    find_reduction, solve, Constraint, Dof, DofAddress, ElementKind, Error, Force, LoadCase, LoadType,
    Material, Model, MpcElement, OrderingMethod, Section, SolveResult, SolveStatus,
    SolverConfiguration, SolverKind, StaticAnalysis, Tolerances,
};
use equilib_core::model::{DofConstraint, Settlement};
use equilib_core::types::Displacement;
use nalgebra::{DMatrix, Vector3};

const E: f64 = 210_000.0;
const I: f64 = 0.5;

fn material() -> Material {
    Material::new(E, 0.3).unwrap()
}

fn frame_section() -> Section {
    Section::new(1.0, I, I, 0.8).unwrap()
}

fn all_solvers() -> Vec<SolverConfiguration> {
    let mut cg = SolverConfiguration::with_solver(SolverKind::ConjugateGradient);
    cg.tolerances.cg_residual = 1e-13;
    let mut rcm = SolverConfiguration::with_solver(SolverKind::Cholesky);
    rcm.ordering = OrderingMethod::ReverseCuthillMcKee;
    vec![
        SolverConfiguration::with_solver(SolverKind::Cholesky),
        rcm,
        SolverConfiguration::with_solver(SolverKind::Qr),
        cg,
    ]
}

/// ΣR + ΣF = 0 and Σ(x × R) + ΣM_R + Σ(x × F) + ΣM_F = 0.
fn assert_equilibrium(model: &Model, result: &SolveResult, case: &LoadCase) {
    let mut force = Vector3::zeros();
    let mut moment = Vector3::zeros();
    let mut scale: f64 = 1.0;
    for (idx, node) in model.nodes().iter().enumerate() {
        let total = result.reaction(idx).unwrap().0 + node.load(case).0;
        let f = Vector3::new(total[0], total[1], total[2]);
        let m = Vector3::new(total[3], total[4], total[5]);
        force += f;
        moment += m + node.location.cross(&f);
        scale = scale.max(node.load(case).0.abs().max());
    }
    assert!(force.norm() < 1e-6 * scale, "force imbalance {}", force);
    assert!(moment.norm() < 1e-6 * scale, "moment imbalance {}", moment);
}

#[test]
fn bar_with_opposite_end_moments() {
    let length = 4.0;
    let mut model = Model::new();
    model.add_node(Vector3::new(0.0, 0.0, 0.0));
    model.add_node(Vector3::new(length, 0.0, 0.0));
    model
        .add_element(ElementKind::Frame2Node, vec![0, 1], material(), frame_section())
        .unwrap();
    model
        .set_constraint(
            0,
            Constraint::movement_fixed().with(Dof::Rx, DofConstraint::Fixed),
        )
        .unwrap();
    model.set_constraint(1, Constraint::movement_fixed()).unwrap();

    let case = LoadCase::default();
    let moment = 10.0;
    model
        .add_nodal_load(0, case.clone(), Force::new([0.0, 0.0, 0.0, 0.0, 0.0, moment]))
        .unwrap();
    model
        .add_nodal_load(1, case.clone(), Force::new([0.0, 0.0, 0.0, 0.0, 0.0, -moment]))
        .unwrap();

    // Simply supported beam under equal and opposite end moments: θ = ML/(2EI).
    let expected = moment * length / (2.0 * E * I);
    for config in all_solvers() {
        let result = solve(&model, &case, &config).unwrap();
        let rz0 = result.displacement(0).unwrap().get(Dof::Rz);
        let rz1 = result.displacement(1).unwrap().get(Dof::Rz);
        assert_relative_eq!(rz0, expected, max_relative = 1e-6);
        assert_relative_eq!(rz1, -expected, max_relative = 1e-6);
        assert_equilibrium(&model, &result, &case);
    }
}

fn pyramid() -> Model {
    let mut model = Model::new();
    let s = Section::axial(0.01).unwrap();
    let apex = model.add_node(Vector3::new(0.0, 0.0, 3.0));
    for (x, y) in [(2.0, 2.0), (-2.0, 2.0), (-2.0, -2.0), (2.0, -2.0)] {
        let base = model.add_node(Vector3::new(x, y, 0.0));
        model
            .add_element(ElementKind::Truss2Node, vec![base, apex], material(), s)
            .unwrap();
        model.set_constraint(base, Constraint::fixed()).unwrap();
    }
    model.set_constraint(apex, Constraint::rotation_fixed()).unwrap();
    model
        .add_nodal_load(
            apex,
            LoadCase::default(),
            Force::new([0.0, 0.0, -1000.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
    model
}

#[test]
fn pyramid_truss_base_reactions_carry_apex_load() {
    let model = pyramid();
    let case = LoadCase::default();
    for config in all_solvers() {
        let result = solve(&model, &case, &config).unwrap();
        let vertical: f64 = (1..5)
            .map(|n| result.reaction(n).unwrap().get(Dof::Dz))
            .sum();
        assert_relative_eq!(vertical, 1000.0, max_relative = 1e-9);
        // Symmetry: every leg takes a quarter.
        for n in 1..5 {
            assert_relative_eq!(
                result.reaction(n).unwrap().get(Dof::Dz),
                250.0,
                max_relative = 1e-6
            );
        }
        assert!(result.displacement(0).unwrap().get(Dof::Dz) < 0.0);
        assert_equilibrium(&model, &result, &case);
    }
}

/// Two collinear frame segments along x whose inner ends are joined by a
/// rigid element. Node 0 is clamped, node 3 carries a tip load.
fn rigid_linked_cantilever(gap: f64) -> Model {
    let mut model = Model::new();
    for x in [0.0, 2.0, 2.0 + gap, 4.0 + gap] {
        model.add_node(Vector3::new(x, 0.0, 0.0));
    }
    model
        .add_element(ElementKind::Frame2Node, vec![0, 1], material(), frame_section())
        .unwrap();
    model
        .add_element(ElementKind::Frame2Node, vec![2, 3], material(), frame_section())
        .unwrap();
    model.add_mpc(MpcElement::RigidElement { nodes: vec![1, 2] });
    model.set_constraint(0, Constraint::fixed()).unwrap();
    model
        .add_nodal_load(
            3,
            LoadCase::default(),
            Force::new([0.0, 3.0, -10.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
    model
}

#[test]
fn rigid_link_forces_equal_rotations() {
    let case = LoadCase::default();
    for gap in [0.0, 0.5] {
        let model = rigid_linked_cantilever(gap);
        for config in all_solvers() {
            let result = solve(&model, &case, &config).unwrap();
            let a = result.displacement(1).unwrap();
            let b = result.displacement(2).unwrap();
            for dof in [Dof::Rx, Dof::Ry, Dof::Rz] {
                assert_relative_eq!(a.get(dof), b.get(dof), epsilon = 1e-12);
            }
            // u_2 = u_1 + θ_1 × r
            let r = Vector3::new(gap, 0.0, 0.0);
            let expected = a.translation() + a.rotation().cross(&r);
            assert_relative_eq!(b.translation(), expected, epsilon = 1e-10);
            assert_equilibrium(&model, &result, &case);
        }
    }

    // Without a gap the link is invisible: a plain cantilever of length 4.
    let result = solve(&rigid_linked_cantilever(0.0), &case, &SolverConfiguration::default())
        .unwrap();
    let tip = result.displacement(3).unwrap();
    assert_relative_eq!(tip.get(Dof::Dz), -10.0 * 64.0 / (3.0 * E * I), max_relative = 1e-9);
    assert_relative_eq!(tip.get(Dof::Dy), 3.0 * 64.0 / (3.0 * E * I), max_relative = 1e-9);
}

#[test]
fn conflicting_supports_produce_no_result() {
    let mut model = rigid_linked_cantilever(0.0);
    let case = LoadCase::default();
    model.add_mpc(MpcElement::VirtualSupport {
        nodes: vec![0],
        constraint: Constraint::released().with(Dof::Dx, DofConstraint::Fixed),
        settlements: vec![Settlement {
            case: case.clone(),
            displacement: Displacement::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        }],
    });

    let result = solve(&model, &case, &SolverConfiguration::default());
    assert!(matches!(result, Err(Error::ConflictingConstraints { .. })));
    assert_eq!(SolveStatus::of(&result), SolveStatus::Failed);

    // A consistent duplicate is merely redundant.
    let quiet = LoadCase::new("Quiet", LoadType::Dead);
    let mut config = SolverConfiguration::default();
    config.load_cases = vec![quiet.clone()];
    let result = solve(&model, &quiet, &config).unwrap();
    assert_eq!(result.displacement(0).unwrap().get(Dof::Dx), 0.0);
}

/// Two frame segments joined only through an equal-Dx link; the second
/// segment can still swing freely.
fn linked_mechanism(settlement_case: &LoadCase) -> Model {
    let mut model = Model::new();
    for x in [0.0, 2.0, 2.0, 4.0] {
        model.add_node(Vector3::new(x, 0.0, 0.0));
    }
    for (a, b) in [(0, 1), (2, 3)] {
        model
            .add_element(ElementKind::Frame2Node, vec![a, b], material(), frame_section())
            .unwrap();
    }
    model.set_constraint(0, Constraint::fixed()).unwrap();
    let dx = Constraint::from_fixed(&[Dof::Dx]);
    model.set_constraint(1, dx).unwrap();
    model.set_constraint(2, dx).unwrap();
    model
        .add_settlement(
            2,
            settlement_case.clone(),
            Displacement::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
    model.add_mpc(MpcElement::EqualDof {
        nodes: vec![1, 2],
        coupled: dx,
    });
    model
}

#[test]
fn conflicting_settlements_reported_before_factorization() {
    let case = LoadCase::default();
    let model = linked_mechanism(&case);
    for config in all_solvers() {
        let result = solve(&model, &case, &config);
        assert!(
            matches!(result, Err(Error::ConflictingConstraints { .. })),
            "{:?}: got {:?}",
            config.solver,
            result.map(|r| r.status)
        );

        let mut analysis = StaticAnalysis::new(&model, &config);
        assert!(matches!(
            analysis.prepare(),
            Err(Error::ConflictingConstraints { .. })
        ));
        assert!(analysis.reduced_stiffness().is_none());
    }

    // A case outside the configured list is checked too.
    let settle = LoadCase::new("Settle", LoadType::Dead);
    let model = linked_mechanism(&settle);
    let result = solve(&model, &settle, &SolverConfiguration::default());
    assert!(matches!(result, Err(Error::ConflictingConstraints { .. })));
}

#[test]
fn null_space_annihilates_constraints() {
    let mut model = rigid_linked_cantilever(0.5);
    model.add_mpc(MpcElement::EqualDof {
        nodes: vec![3, 2],
        coupled: Constraint::from_fixed(&[Dof::Dy]),
    });
    model.add_mpc(MpcElement::HingeLink { nodes: vec![1, 1] });
    let case = LoadCase::default();

    // The degenerate hinge (one distinct node) is rejected.
    assert!(matches!(
        collect(&model, &case),
        Err(Error::MalformedConstraint(_))
    ));

    let mut model = rigid_linked_cantilever(0.5);
    model.add_mpc(MpcElement::EqualDof {
        nodes: vec![3, 2],
        coupled: Constraint::from_fixed(&[Dof::Dy]),
    });
    model
        .add_settlement(0, case.clone(), Displacement::new([0.0, 0.0, 0.002, 0.0, 0.001, 0.0]))
        .unwrap();
    let equations = collect(&model, &case).unwrap();
    let (p, particular) = find_reduction(&equations, &Tolerances::default()).unwrap();
    assert!(!p.is_hollow());

    let cp = multiply(&equations.coefficients, &p.to_sparse().unwrap()).unwrap();
    assert!(max_abs(&cp) < 1e-12);
    for r in equations.residual(&particular) {
        assert!(r.abs() < 1e-12);
    }

    // Full column rank: PᵀP is positive definite.
    let pd = DMatrix::from(&p.to_sparse().unwrap());
    assert!((pd.transpose() * &pd).cholesky().is_some());
    assert_eq!(p.ncols(), model.n_dofs() - equations.nrows());
}

#[test]
fn unconstrained_dofs_give_identity_operator() {
    let mut model = Model::new();
    model.add_node(Vector3::new(0.0, 0.0, 0.0));
    model.add_node(Vector3::new(1.0, 0.0, 0.0));
    let equations = collect(&model, &LoadCase::default()).unwrap();
    assert!(equations.is_empty());
    let (p, particular) = find_reduction(&equations, &Tolerances::default()).unwrap();
    assert!(p.is_hollow());
    let pd = DMatrix::from(&p.to_sparse().unwrap());
    assert_eq!(pd, DMatrix::identity(12, 12));
    assert!(particular.iter().all(|&u| u == 0.0));
}

#[test]
fn repeated_runs_are_bitwise_identical() {
    let model = rigid_linked_cantilever(0.5);
    let case = LoadCase::default();
    for config in all_solvers() {
        let first = solve(&model, &case, &config).unwrap();
        let mut analysis = StaticAnalysis::new(&model, &config);
        for _ in 0..3 {
            let again = analysis.solve(&case).unwrap();
            assert_eq!(first.displacements, again.displacements);
            assert_eq!(first.reactions, again.reactions);
        }
    }
}

#[test]
fn hinge_releases_rotation() {
    // Two segments meeting at coincident nodes 1 and 2 joined by a hinge,
    // the far end on a roller: the hinge rotates, the segments kink.
    let mut model = Model::new();
    for x in [0.0, 2.0, 2.0, 4.0] {
        model.add_node(Vector3::new(x, 0.0, 0.0));
    }
    model
        .add_element(ElementKind::Frame2Node, vec![0, 1], material(), frame_section())
        .unwrap();
    model
        .add_element(ElementKind::Frame2Node, vec![2, 3], material(), frame_section())
        .unwrap();
    model.add_mpc(MpcElement::HingeLink { nodes: vec![1, 2] });
    // Torsion of the second segment is otherwise free.
    model.add_mpc(MpcElement::EqualDof {
        nodes: vec![1, 2],
        coupled: Constraint::from_fixed(&[Dof::Rx]),
    });
    model.set_constraint(0, Constraint::fixed()).unwrap();
    model
        .set_constraint(3, Constraint::from_fixed(&[Dof::Dy, Dof::Dz]))
        .unwrap();
    let case = LoadCase::default();
    model
        .add_nodal_load(1, case.clone(), Force::new([0.0, 0.0, -5.0, 0.0, 0.0, 0.0]))
        .unwrap();

    let result = solve(&model, &case, &SolverConfiguration::default()).unwrap();
    let a = result.displacement(1).unwrap();
    let b = result.displacement(2).unwrap();
    assert_relative_eq!(a.translation(), b.translation(), epsilon = 1e-12);
    assert!((a.get(Dof::Ry) - b.get(Dof::Ry)).abs() > 1e-9);
    assert_equilibrium(&model, &result, &case);

    let addr = DofAddress::new(3, Dof::Dz).global_index();
    assert!(result.constrained_dofs.contains(&addr));
}
