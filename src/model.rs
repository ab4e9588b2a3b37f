//! Structural model store - the idealized structure a run analyzes

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use crate::elements::{BoundaryCondition, Dof, Element, Material, Node, Section};
use crate::error::{EntityKind, FrameError, FrameResult};
use crate::loads::{Load, LoadCase, LoadCombination, LoadKind, LoadTarget};
use crate::math;

/// Units the model is authored in. Declared by the caller and carried
/// through to every result; the solver never converts or infers them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    /// N, m, Pa, kg
    #[default]
    SiNewtonMetre,
    /// kN, m, kPa, t
    SiKilonewtonMetre,
    /// Caller-supplied labels for a consistent unit set
    Custom {
        force: String,
        length: String,
        mass: String,
    },
}

impl UnitSystem {
    pub fn force(&self) -> &str {
        match self {
            Self::SiNewtonMetre => "N",
            Self::SiKilonewtonMetre => "kN",
            Self::Custom { force, .. } => force,
        }
    }

    pub fn length(&self) -> &str {
        match self {
            Self::SiNewtonMetre | Self::SiKilonewtonMetre => "m",
            Self::Custom { length, .. } => length,
        }
    }

    pub fn mass(&self) -> &str {
        match self {
            Self::SiNewtonMetre => "kg",
            Self::SiKilonewtonMetre => "t",
            Self::Custom { mass, .. } => mass,
        }
    }
}

/// Insertion-ordered map from entity id to entity
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.index.get(id).map(|&i| &mut self.entries[i].1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Insertion position of an entity
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(id, item)| (id.as_str(), item))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries.iter_mut().map(|(id, item)| (id.as_str(), item))
    }

    /// Entity at an insertion position
    pub fn at(&self, position: usize) -> Option<(&str, &T)> {
        self.entries.get(position).map(|(id, item)| (id.as_str(), item))
    }

    fn insert(&mut self, id: &str, item: T) -> FrameResult<usize> {
        if id.trim().is_empty() {
            return Err(FrameError::validation(id, "id must not be empty"));
        }
        if self.index.contains_key(id) {
            return Err(FrameError::validation(id, "duplicate id"));
        }
        let position = self.entries.len();
        self.entries.push((id.to_string(), item));
        self.index.insert(id.to_string(), position);
        Ok(position)
    }
}

/// The structural model store.
///
/// Every mutation validates referential integrity before touching state, so a
/// rejected call leaves the model unchanged. Every accepted mutation bumps
/// [`version`](Self::version).
#[derive(Debug, Clone, Default)]
pub struct StructuralModel {
    units: UnitSystem,
    nodes: Registry<Node>,
    materials: Registry<Material>,
    sections: Registry<Section>,
    elements: Registry<Element>,
    boundary: HashMap<String, BoundaryCondition>,
    load_cases: Registry<LoadCase>,
    loads: Registry<Load>,
    combinations: Registry<LoadCombination>,

    version: u64,
    /// Free-DOF count from the last numbering, cleared when nodes or
    /// boundary conditions change
    num_free: Option<usize>,
}

impl StructuralModel {
    /// Create a new empty model in SI units
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty model in the given units
    pub fn with_units(units: UnitSystem) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    pub fn units(&self) -> &UnitSystem {
        &self.units
    }

    /// Counter incremented by every accepted mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    fn invalidate_numbering(&mut self) {
        self.num_free = None;
        for (_, node) in self.nodes.iter_mut() {
            node.equations = [None; 6];
        }
    }

    // ========================
    // Model Building Methods
    // ========================

    /// Add a node to the model
    pub fn add_node(&mut self, id: &str, node: Node) -> FrameResult<()> {
        if !node.is_finite() {
            return Err(FrameError::validation(id, "node coordinates must be finite"));
        }
        self.nodes.insert(id, node)?;
        self.invalidate_numbering();
        self.touch();
        Ok(())
    }

    /// Add a material to the model
    pub fn add_material(&mut self, id: &str, material: Material) -> FrameResult<()> {
        material.validate(id)?;
        self.materials.insert(id, material)?;
        self.touch();
        Ok(())
    }

    /// Add a section to the model
    pub fn add_section(&mut self, id: &str, section: Section) -> FrameResult<()> {
        section.validate(id)?;
        self.sections.insert(id, section)?;
        self.touch();
        Ok(())
    }

    /// Add a frame element to the model
    pub fn add_element(&mut self, id: &str, element: Element) -> FrameResult<()> {
        if self.elements.contains(id) {
            return Err(FrameError::validation(id, "duplicate id"));
        }
        if element.start == element.end {
            return Err(FrameError::validation(
                id,
                "start and end node must be different",
            ));
        }
        let start = self
            .nodes
            .get(&element.start)
            .ok_or_else(|| FrameError::reference(EntityKind::Node, &element.start, id))?;
        let end = self
            .nodes
            .get(&element.end)
            .ok_or_else(|| FrameError::reference(EntityKind::Node, &element.end, id))?;
        if !self.materials.contains(&element.material) {
            return Err(FrameError::reference(
                EntityKind::Material,
                &element.material,
                id,
            ));
        }
        if !self.sections.contains(&element.section) {
            return Err(FrameError::reference(
                EntityKind::Section,
                &element.section,
                id,
            ));
        }
        if start.distance_to(end) < 1e-10 {
            return Err(FrameError::validation(id, "element has zero length"));
        }
        if !element.rotation.is_finite() {
            return Err(FrameError::validation(id, "rotation must be finite"));
        }
        if math::local_axes(&start.coords(), &end.coords(), element.reference, element.rotation)
            .is_none()
        {
            return Err(FrameError::validation(
                id,
                "reference vector must be non-zero and not parallel to the element axis",
            ));
        }

        self.elements.insert(id, element)?;
        self.touch();
        Ok(())
    }

    /// Set the boundary condition of a node, replacing any previous one.
    /// Invalidates DOF numbering.
    pub fn set_boundary_condition(
        &mut self,
        node: &str,
        condition: BoundaryCondition,
    ) -> FrameResult<()> {
        if !self.nodes.contains(node) {
            return Err(FrameError::reference(EntityKind::Node, node, "boundary condition"));
        }
        if condition.prescribed.iter().any(|v| !v.is_finite()) {
            return Err(FrameError::validation(
                node,
                "prescribed displacements must be finite",
            ));
        }
        self.boundary.insert(node.to_string(), condition);
        self.invalidate_numbering();
        self.touch();
        Ok(())
    }

    /// Add a load case
    pub fn add_load_case(&mut self, id: &str, case: LoadCase) -> FrameResult<()> {
        let mut case = case;
        case.loads.clear();
        self.load_cases.insert(id, case)?;
        self.touch();
        Ok(())
    }

    /// Add a load to its load case
    pub fn add_load(&mut self, id: &str, load: Load) -> FrameResult<()> {
        if self.loads.contains(id) {
            return Err(FrameError::validation(id, "duplicate id"));
        }
        if !self.load_cases.contains(&load.case) {
            return Err(FrameError::reference(EntityKind::LoadCase, &load.case, id));
        }
        self.validate_load(id, &load)?;

        let position = self.loads.insert(id, load.clone())?;
        if let Some(case) = self.load_cases.get_mut(&load.case) {
            case.loads.push(position);
        }
        self.touch();
        Ok(())
    }

    fn validate_load(&self, id: &str, load: &Load) -> FrameResult<()> {
        match &load.target {
            LoadTarget::Node(node) => {
                if !self.nodes.contains(node) {
                    return Err(FrameError::reference(EntityKind::Node, node, id));
                }
                match &load.kind {
                    LoadKind::Point { components, .. } => {
                        if components.iter().any(|c| !c.is_finite()) {
                            return Err(FrameError::validation(id, "load components must be finite"));
                        }
                    }
                    LoadKind::Distributed { .. } => {
                        return Err(FrameError::validation(
                            id,
                            "distributed loads must target an element",
                        ));
                    }
                }
            }
            LoadTarget::Element(element_id) => {
                let length = self.element_length(element_id).ok_or_else(|| {
                    FrameError::reference(EntityKind::Element, element_id, id)
                })?;
                match &load.kind {
                    LoadKind::Point {
                        components,
                        position,
                    } => {
                        if components.iter().any(|c| !c.is_finite()) {
                            return Err(FrameError::validation(id, "load components must be finite"));
                        }
                        if components[3..].iter().any(|&c| c != 0.0) {
                            return Err(FrameError::validation(
                                id,
                                "element point loads carry force components only",
                            ));
                        }
                        if !(0.0..=length).contains(position) {
                            return Err(FrameError::validation(
                                id,
                                format!("position {} lies outside the element (length {})", position, length),
                            ));
                        }
                    }
                    LoadKind::Distributed {
                        w_start,
                        w_end,
                        from,
                        to,
                    } => {
                        if w_start.iter().chain(w_end).any(|c| !c.is_finite()) {
                            return Err(FrameError::validation(id, "load intensities must be finite"));
                        }
                        let to = to.unwrap_or(length);
                        if !(*from >= 0.0 && *from < to && to <= length + 1e-9 * length) {
                            return Err(FrameError::validation(
                                id,
                                format!(
                                    "load extent [{}, {}] must be increasing and within the element (length {})",
                                    from, to, length
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a named load combination. Every referenced case must exist.
    pub fn add_combination(&mut self, combination: LoadCombination) -> FrameResult<()> {
        combination.validate(self)?;
        let id = combination.id.clone();
        self.combinations.insert(&id, combination)?;
        self.touch();
        Ok(())
    }

    /// Replace the properties of a material that no element references yet
    pub fn replace_material(&mut self, id: &str, material: Material) -> FrameResult<()> {
        if !self.materials.contains(id) {
            return Err(FrameError::reference(EntityKind::Material, id, "replace_material"));
        }
        if let Some((element, _)) = self.elements.iter().find(|(_, e)| e.material == id) {
            return Err(FrameError::validation(
                id,
                format!("material is referenced by element '{}' and is immutable", element),
            ));
        }
        material.validate(id)?;
        if let Some(slot) = self.materials.get_mut(id) {
            *slot = material;
        }
        self.touch();
        Ok(())
    }

    /// Replace the properties of a section that no element references yet
    pub fn replace_section(&mut self, id: &str, section: Section) -> FrameResult<()> {
        if !self.sections.contains(id) {
            return Err(FrameError::reference(EntityKind::Section, id, "replace_section"));
        }
        if let Some((element, _)) = self.elements.iter().find(|(_, e)| e.section == id) {
            return Err(FrameError::validation(
                id,
                format!("section is referenced by element '{}' and is immutable", element),
            ));
        }
        section.validate(id)?;
        if let Some(slot) = self.sections.get_mut(id) {
            *slot = section;
        }
        self.touch();
        Ok(())
    }

    // ========================
    // DOF Numbering
    // ========================

    /// Number the free DOFs densely from zero, walking nodes in insertion
    /// order and DOFs in [DX, DY, DZ, RX, RY, RZ] order. Returns the number
    /// of free DOFs.
    ///
    /// Must be re-run after nodes or boundary conditions change, before any
    /// solve.
    pub fn assign_dof_numbering(&mut self) -> usize {
        let mut next = 0;
        let boundary = &self.boundary;
        for (id, node) in self.nodes.iter_mut() {
            let condition = boundary.get(id).copied().unwrap_or_default();
            for dof in Dof::ALL {
                node.equations[dof.index()] = if condition.is_restrained(dof) {
                    None
                } else {
                    next += 1;
                    Some(next - 1)
                };
            }
        }
        self.num_free = Some(next);
        info!(
            "numbered {} free DOFs over {} nodes ({} restrained)",
            next,
            self.nodes.len(),
            self.nodes.len() * 6 - next
        );
        next
    }

    /// Free-DOF count of the current numbering, `None` when stale
    pub fn num_free_dofs(&self) -> Option<usize> {
        self.num_free
    }

    /// Fail when DOF numbering is missing or stale
    pub fn require_numbering(&self) -> FrameResult<usize> {
        self.num_free.ok_or_else(|| {
            FrameError::validation(
                "model",
                "DOF numbering is stale; call assign_dof_numbering after changing nodes or boundary conditions",
            )
        })
    }

    /// Capture an immutable snapshot for a run
    pub fn snapshot(&self) -> ModelSnapshot {
        debug!("snapshot of model version {}", self.version);
        ModelSnapshot {
            model: Arc::new(self.clone()),
        }
    }

    // ========================
    // Accessors
    // ========================

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter()
    }

    pub fn node_registry(&self) -> &Registry<Node> {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn material(&self, id: &str) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn materials(&self) -> impl Iterator<Item = (&str, &Material)> {
        self.materials.iter()
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.get(id)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter()
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn elements(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.elements.iter()
    }

    /// Insertion position of an element
    pub fn element_position(&self, id: &str) -> Option<usize> {
        self.elements.position(id)
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Length of an element, `None` for an unknown element
    pub fn element_length(&self, id: &str) -> Option<f64> {
        let element = self.elements.get(id)?;
        let start = self.nodes.get(&element.start)?;
        let end = self.nodes.get(&element.end)?;
        Some(start.distance_to(end))
    }

    /// Boundary condition of a node (free when never set)
    pub fn boundary_condition(&self, node: &str) -> BoundaryCondition {
        self.boundary.get(node).copied().unwrap_or_default()
    }

    pub fn load_case(&self, id: &str) -> Option<&LoadCase> {
        self.load_cases.get(id)
    }

    pub fn load_cases(&self) -> impl Iterator<Item = (&str, &LoadCase)> {
        self.load_cases.iter()
    }

    pub fn load(&self, id: &str) -> Option<&Load> {
        self.loads.get(id)
    }

    pub fn loads(&self) -> impl Iterator<Item = (&str, &Load)> {
        self.loads.iter()
    }

    /// Loads of a case in insertion order
    pub fn loads_in_case<'a>(&'a self, case: &str) -> impl Iterator<Item = (&'a str, &'a Load)> {
        self.load_cases
            .get(case)
            .map(|c| c.loads.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&position| self.loads.at(position))
    }

    pub fn combination(&self, id: &str) -> Option<&LoadCombination> {
        self.combinations.get(id)
    }

    pub fn combinations(&self) -> impl Iterator<Item = (&str, &LoadCombination)> {
        self.combinations.iter()
    }
}

/// Immutable view of the model handed to a run.
///
/// Cloning a snapshot is cheap; edits to the live model never reach it.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    model: Arc<StructuralModel>,
}

impl ModelSnapshot {
    /// Model version the snapshot was taken at
    pub fn version(&self) -> u64 {
        self.model.version
    }

    /// Whether `live` has not been edited since the snapshot was taken
    pub fn is_current(&self, live: &StructuralModel) -> bool {
        live.version == self.model.version
    }

    pub fn model(&self) -> &StructuralModel {
        &self.model
    }
}

impl Deref for ModelSnapshot {
    type Target = StructuralModel;

    fn deref(&self) -> &StructuralModel {
        &self.model
    }
}

impl From<StructuralModel> for ModelSnapshot {
    fn from(model: StructuralModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loads::LoadAxes;

    fn two_node_model() -> StructuralModel {
        let mut model = StructuralModel::new();
        model.add_node("N1", Node::new(0.0, 0.0, 0.0)).unwrap();
        model.add_node("N2", Node::new(4.0, 0.0, 0.0)).unwrap();
        model.add_material("Steel", Material::steel()).unwrap();
        model
            .add_section("R", Section::rectangular(0.2, 0.4))
            .unwrap();
        model
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut model = two_node_model();
        let version = model.version();
        let err = model.add_node("N1", Node::new(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, FrameError::Validation { ref entity, .. } if entity == "N1"));
        assert_eq!(model.version(), version);
    }

    #[test]
    fn test_element_references() {
        let mut model = two_node_model();
        let err = model
            .add_element("B1", Element::beam("N1", "N3", "Steel", "R"))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Reference { kind: EntityKind::Node, ref id, .. } if id == "N3"
        ));

        let err = model
            .add_element("B1", Element::beam("N1", "N2", "Concrete", "R"))
            .unwrap_err();
        assert!(matches!(err, FrameError::Reference { kind: EntityKind::Material, .. }));

        let err = model
            .add_element("B1", Element::beam("N1", "N1", "Steel", "R"))
            .unwrap_err();
        assert!(matches!(err, FrameError::Validation { .. }));

        model
            .add_element("B1", Element::beam("N1", "N2", "Steel", "R"))
            .unwrap();
        assert_eq!(model.num_elements(), 1);
    }

    #[test]
    fn test_parallel_reference_vector_rejected() {
        let mut model = two_node_model();
        let element = Element::beam("N1", "N2", "Steel", "R").with_reference([1.0, 0.0, 0.0]);
        assert!(matches!(
            model.add_element("B1", element),
            Err(FrameError::Validation { .. })
        ));
    }

    #[test]
    fn test_numbering_skips_restrained_dofs() {
        let mut model = two_node_model();
        model
            .set_boundary_condition("N1", BoundaryCondition::fixed())
            .unwrap();
        assert!(model.require_numbering().is_err());

        let free = model.assign_dof_numbering();
        assert_eq!(free, 6);
        assert_eq!(model.node("N1").unwrap().equation(Dof::Dx), None);
        assert_eq!(model.node("N2").unwrap().equation(Dof::Dx), Some(0));
        assert_eq!(model.node("N2").unwrap().equation(Dof::Rz), Some(5));

        model
            .set_boundary_condition("N2", BoundaryCondition::pinned())
            .unwrap();
        assert!(model.require_numbering().is_err());
        assert_eq!(model.assign_dof_numbering(), 3);
        assert_eq!(model.node("N2").unwrap().equation(Dof::Rx), Some(0));
    }

    #[test]
    fn test_loads_are_grouped_by_case() {
        let mut model = two_node_model();
        model
            .add_element("B1", Element::beam("N1", "N2", "Steel", "R"))
            .unwrap();
        model.add_load_case("D", LoadCase::dead("Dead")).unwrap();

        let err = model
            .add_load("L1", Load::node_force("X", "N2", 0.0, -1.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, FrameError::Reference { kind: EntityKind::LoadCase, .. }));

        model
            .add_load("L1", Load::node_force("D", "N2", 0.0, -1.0, 0.0))
            .unwrap();
        model
            .add_load("L2", Load::uniform("D", "B1", [0.0, -2.0, 0.0], LoadAxes::Global))
            .unwrap();
        let ids: Vec<&str> = model.loads_in_case("D").map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["L1", "L2"]);
        assert_eq!(model.load_case("D").unwrap().len(), 2);

        let outside = Load::element_point("D", "B1", 5.0, [0.0, -1.0, 0.0], LoadAxes::Local);
        assert!(matches!(
            model.add_load("L3", outside),
            Err(FrameError::Validation { .. })
        ));
    }

    #[test]
    fn test_referenced_material_is_immutable() {
        let mut model = two_node_model();
        model
            .replace_material("Steel", Material::steel().with_yield_strength(355e6))
            .unwrap();
        model
            .add_element("B1", Element::beam("N1", "N2", "Steel", "R"))
            .unwrap();
        assert!(matches!(
            model.replace_material("Steel", Material::steel()),
            Err(FrameError::Validation { .. })
        ));
        assert!(matches!(
            model.replace_section("R", Section::rectangular(0.3, 0.5)),
            Err(FrameError::Validation { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_isolated_from_edits() {
        let mut model = two_node_model();
        let snapshot = model.snapshot();
        assert!(snapshot.is_current(&model));

        model.add_node("N3", Node::new(8.0, 0.0, 0.0)).unwrap();
        assert!(!snapshot.is_current(&model));
        assert_eq!(snapshot.num_nodes(), 2);
        assert_eq!(model.num_nodes(), 3);
    }
}
