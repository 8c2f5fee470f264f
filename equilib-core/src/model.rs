//! Structural model: nodes, supports, loads, elements and constraint sources.
//!
//! The model is a plain value container. It is validated on insertion
//! (node indices, element arity) and is never mutated by the analysis.

use crate::constraint::MpcElement;
use crate::element::loads::ElementLoadKind;
use crate::element::ElementKind;
use crate::error::{Error, Result};
use crate::material::{Material, Section};
use crate::types::{Displacement, Dof, Force, Point3, DOFS_PER_NODE};

/// Support state of one nodal component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DofConstraint {
    #[default]
    Released,
    Fixed,
}

/// Support conditions of a node, one flag per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Constraint(pub [DofConstraint; DOFS_PER_NODE]);

impl Constraint {
    /// All six components fixed.
    pub fn fixed() -> Self {
        Self([DofConstraint::Fixed; DOFS_PER_NODE])
    }

    /// No support.
    pub fn released() -> Self {
        Self([DofConstraint::Released; DOFS_PER_NODE])
    }

    /// Translations fixed, rotations free (pin).
    pub fn movement_fixed() -> Self {
        Self::from_fixed(&[Dof::Dx, Dof::Dy, Dof::Dz])
    }

    /// Rotations fixed, translations free.
    pub fn rotation_fixed() -> Self {
        Self::from_fixed(&[Dof::Rx, Dof::Ry, Dof::Rz])
    }

    /// Fix exactly the listed components.
    pub fn from_fixed(dofs: &[Dof]) -> Self {
        let mut c = Self::released();
        for &dof in dofs {
            c.0[dof.index()] = DofConstraint::Fixed;
        }
        c
    }

    /// Copy of `self` with one component changed.
    pub fn with(mut self, dof: Dof, state: DofConstraint) -> Self {
        self.0[dof.index()] = state;
        self
    }

    pub fn is_fixed(&self, dof: Dof) -> bool {
        self.0[dof.index()] == DofConstraint::Fixed
    }

    /// Fixed components in component order.
    pub fn fixed_dofs(&self) -> impl Iterator<Item = Dof> + '_ {
        Dof::ALL.into_iter().filter(move |&d| self.is_fixed(d))
    }

    pub fn is_released(&self) -> bool {
        self.fixed_dofs().next().is_none()
    }
}

/// Load type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LoadType {
    #[default]
    Default,
    Dead,
    Live,
    Snow,
    Wind,
    Quake,
    Crane,
    Other,
}

/// Identity of a load case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadCase {
    pub name: String,
    pub load_type: LoadType,
}

impl LoadCase {
    pub fn new(name: impl Into<String>, load_type: LoadType) -> Self {
        Self {
            name: name.into(),
            load_type,
        }
    }
}

impl Default for LoadCase {
    fn default() -> Self {
        Self::new("Default", LoadType::Default)
    }
}

/// Prescribed displacement of a supported node in one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub case: LoadCase,
    pub displacement: Displacement,
}

/// Concentrated nodal load in one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct NodalLoad {
    pub case: LoadCase,
    pub force: Force,
}

/// Distributed or imposed load on an element in one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementLoad {
    pub case: LoadCase,
    pub kind: ElementLoadKind,
}

/// A node with its support, settlements and loads.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub location: Point3,
    pub constraint: Constraint,
    pub settlements: Vec<Settlement>,
    pub loads: Vec<NodalLoad>,
}

impl Node {
    pub fn new(location: Point3) -> Self {
        Self {
            location,
            constraint: Constraint::released(),
            settlements: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// Total settlement in `case` (zero if none).
    pub fn settlement(&self, case: &LoadCase) -> Displacement {
        self.settlements
            .iter()
            .filter(|s| &s.case == case)
            .fold(Displacement::zero(), |acc, s| acc + s.displacement)
    }

    /// Total nodal load in `case` (zero if none).
    pub fn load(&self, case: &LoadCase) -> Force {
        self.loads
            .iter()
            .filter(|l| &l.case == case)
            .fold(Force::zero(), |acc, l| acc + l.force)
    }
}

/// Element record: formulation, connectivity, properties and loads.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelElement {
    pub kind: ElementKind,
    /// Node indices (0-based).
    pub nodes: Vec<usize>,
    pub material: Material,
    pub section: Section,
    pub loads: Vec<ElementLoad>,
}

/// Finite element model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: Vec<Node>,
    elements: Vec<ModelElement>,
    mpc_elements: Vec<MpcElement>,
}

impl Model {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index.
    pub fn add_node(&mut self, location: Point3) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::new(location));
        idx
    }

    /// Add an element, returning its index.
    pub fn add_element(
        &mut self,
        kind: ElementKind,
        nodes: Vec<usize>,
        material: Material,
        section: Section,
    ) -> Result<usize> {
        if nodes.len() != kind.n_nodes() {
            return Err(Error::Model(format!(
                "element type {:?} requires {} nodes, got {}",
                kind,
                kind.n_nodes(),
                nodes.len()
            )));
        }
        for &node_idx in &nodes {
            self.check_node(node_idx)?;
        }
        if nodes[0] == nodes[1] {
            return Err(Error::Model(format!(
                "element connects node {} to itself",
                nodes[0]
            )));
        }

        let idx = self.elements.len();
        self.elements.push(ModelElement {
            kind,
            nodes,
            material,
            section,
            loads: Vec::new(),
        });
        Ok(idx)
    }

    /// Add a multi-point constraint source. Its couplings are checked when
    /// constraint equations are collected.
    pub fn add_mpc(&mut self, mpc: MpcElement) -> usize {
        self.mpc_elements.push(mpc);
        self.mpc_elements.len() - 1
    }

    pub fn set_constraint(&mut self, node: usize, constraint: Constraint) -> Result<()> {
        self.node_mut(node)?.constraint = constraint;
        Ok(())
    }

    pub fn add_settlement(
        &mut self,
        node: usize,
        case: LoadCase,
        displacement: Displacement,
    ) -> Result<()> {
        self.node_mut(node)?
            .settlements
            .push(Settlement { case, displacement });
        Ok(())
    }

    pub fn add_nodal_load(&mut self, node: usize, case: LoadCase, force: Force) -> Result<()> {
        self.node_mut(node)?.loads.push(NodalLoad { case, force });
        Ok(())
    }

    pub fn add_element_load(&mut self, element: usize, load: ElementLoad) -> Result<()> {
        let n = self.elements.len();
        self.elements
            .get_mut(element)
            .ok_or_else(|| {
                Error::Model(format!(
                    "element index {} out of bounds (model has {} elements)",
                    element, n
                ))
            })?
            .loads
            .push(load);
        Ok(())
    }

    /// Number of nodes in the model.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Size of the global system, six per node.
    pub fn n_dofs(&self) -> usize {
        self.nodes.len() * DOFS_PER_NODE
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn elements(&self) -> &[ModelElement] {
        &self.elements
    }

    pub fn mpc_elements(&self) -> &[MpcElement] {
        &self.mpc_elements
    }

    /// Coordinates of an element's nodes.
    pub fn element_coords(&self, elem_idx: usize) -> Option<Vec<Point3>> {
        let elem = self.elements.get(elem_idx)?;
        elem.nodes
            .iter()
            .map(|&i| self.nodes.get(i).map(|n| n.location))
            .collect()
    }

    /// Every load case referenced by a settlement or load, sorted.
    pub fn load_cases(&self) -> Vec<LoadCase> {
        let mut cases: Vec<LoadCase> = self
            .nodes
            .iter()
            .flat_map(|n| {
                n.settlements
                    .iter()
                    .map(|s| s.case.clone())
                    .chain(n.loads.iter().map(|l| l.case.clone()))
            })
            .chain(
                self.elements
                    .iter()
                    .flat_map(|e| e.loads.iter().map(|l| l.case.clone())),
            )
            .collect();
        cases.sort();
        cases.dedup();
        cases
    }

    fn check_node(&self, idx: usize) -> Result<()> {
        if idx >= self.nodes.len() {
            return Err(Error::Model(format!(
                "node index {} out of bounds (model has {} nodes)",
                idx,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    fn node_mut(&mut self, idx: usize) -> Result<&mut Node> {
        self.check_node(idx)?;
        Ok(&mut self.nodes[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn steel_bar() -> (Material, Section) {
        (Material::steel(), Section::axial(0.01).unwrap())
    }

    #[test]
    fn test_model_creation() {
        let mut model = Model::new();
        model.add_node(Vector3::new(0.0, 0.0, 0.0));
        model.add_node(Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(model.n_nodes(), 2);
        assert_eq!(model.n_dofs(), 12);

        let (m, s) = steel_bar();
        model
            .add_element(ElementKind::Truss2Node, vec![0, 1], m, s)
            .unwrap();
        assert_eq!(model.elements().len(), 1);
        assert_eq!(model.element_coords(0).unwrap()[1].x, 1.0);
    }

    #[test]
    fn test_invalid_element_node_count() {
        let mut model = Model::new();
        model.add_node(Vector3::new(0.0, 0.0, 0.0));
        model.add_node(Vector3::new(1.0, 0.0, 0.0));
        let (m, s) = steel_bar();
        assert!(model
            .add_element(ElementKind::Frame2Node, vec![0], m, s)
            .is_err());
    }

    #[test]
    fn test_invalid_node_index() {
        let mut model = Model::new();
        model.add_node(Vector3::new(0.0, 0.0, 0.0));
        let (m, s) = steel_bar();
        assert!(model
            .add_element(ElementKind::Truss2Node, vec![0, 3], m.clone(), s)
            .is_err());
        assert!(model
            .add_element(ElementKind::Truss2Node, vec![0, 0], m, s)
            .is_err());
        assert!(model.set_constraint(5, Constraint::fixed()).is_err());
    }

    #[test]
    fn test_constraint_presets() {
        let pin = Constraint::movement_fixed();
        assert!(pin.is_fixed(Dof::Dy));
        assert!(!pin.is_fixed(Dof::Rz));
        assert_eq!(Constraint::fixed().fixed_dofs().count(), 6);
        assert!(Constraint::released().is_released());
        let roller = Constraint::released().with(Dof::Dz, DofConstraint::Fixed);
        assert_eq!(roller.fixed_dofs().collect::<Vec<_>>(), vec![Dof::Dz]);
    }

    #[test]
    fn test_loads_per_case() {
        let mut model = Model::new();
        let n = model.add_node(Vector3::zeros());
        let dead = LoadCase::new("G", LoadType::Dead);
        let live = LoadCase::new("Q", LoadType::Live);

        model
            .add_nodal_load(n, dead.clone(), Force::new([0.0, 0.0, -1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        model
            .add_nodal_load(n, dead.clone(), Force::new([0.0, 0.0, -2.0, 0.0, 0.0, 0.0]))
            .unwrap();
        model
            .add_settlement(n, live.clone(), Displacement::new([0.01, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();

        let node = model.node(n).unwrap();
        assert_eq!(node.load(&dead).get(Dof::Dz), -3.0);
        assert_eq!(node.load(&live).get(Dof::Dz), 0.0);
        assert_eq!(node.settlement(&live).get(Dof::Dx), 0.01);
        assert_eq!(model.load_cases(), vec![dead, live]);
    }
}
