//! Assembler: element matrices scattered into the partitioned global system
//!
//! Global DOFs are indexed `node_position * 6 + dof` over all nodes in
//! insertion order. Free DOFs carry the equation numbers assigned by
//! [`StructuralModel::assign_dof_numbering`]; restrained DOFs are numbered
//! separately in the same walk. The system is kept in four blocks
//! (free/restrained rows and columns) so prescribed displacements move to the
//! right-hand side and reactions come out of the restrained rows.

use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::time::Instant;

use crate::elements::{Dof, Element};
use crate::error::{FrameError, FrameResult};
use crate::math::{self, MassFormulation, Mat12, Mat3, SparseMatrixBuilder};
use crate::model::StructuralModel;

/// Where a global DOF lands in the partitioned system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equation {
    Free(usize),
    Restrained(usize),
}

/// Mapping between global DOFs, free equations and restrained equations
#[derive(Debug, Clone)]
pub struct DofMap {
    node_ids: Vec<String>,
    equations: Vec<Equation>,
    free: Vec<usize>,
    restrained: Vec<usize>,
    prescribed: DVector<f64>,
}

impl DofMap {
    /// Build the map from the model's current DOF numbering
    pub fn from_model(model: &StructuralModel) -> FrameResult<Self> {
        let num_free = model.require_numbering()?;
        let num_total = model.num_nodes() * 6;

        let mut node_ids = Vec::with_capacity(model.num_nodes());
        let mut equations = Vec::with_capacity(num_total);
        let mut free = vec![0; num_free];
        let mut restrained = Vec::with_capacity(num_total - num_free);
        let mut prescribed = Vec::with_capacity(num_total - num_free);

        for (id, node) in model.nodes() {
            let condition = model.boundary_condition(id);
            for dof in Dof::ALL {
                let global = node_ids.len() * 6 + dof.index();
                match node.equation(dof) {
                    Some(eq) => {
                        free[eq] = global;
                        equations.push(Equation::Free(eq));
                    }
                    None => {
                        equations.push(Equation::Restrained(restrained.len()));
                        restrained.push(global);
                        prescribed.push(condition.prescribed(dof).unwrap_or(0.0));
                    }
                }
            }
            node_ids.push(id.to_string());
        }

        Ok(Self {
            node_ids,
            equations,
            free,
            restrained,
            prescribed: DVector::from_vec(prescribed),
        })
    }

    pub fn num_free(&self) -> usize {
        self.free.len()
    }

    pub fn num_restrained(&self) -> usize {
        self.restrained.len()
    }

    /// Number of global DOFs (six per node)
    pub fn num_total(&self) -> usize {
        self.equations.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn node_id(&self, position: usize) -> &str {
        &self.node_ids[position]
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn equation(&self, global: usize) -> Equation {
        self.equations[global]
    }

    /// Global DOF of a free equation
    pub fn free_dof(&self, eq: usize) -> usize {
        self.free[eq]
    }

    /// Prescribed displacements of the restrained DOFs (U_r)
    pub fn prescribed(&self) -> &DVector<f64> {
        &self.prescribed
    }

    /// Node id and DOF of a global DOF
    pub fn location(&self, global: usize) -> (&str, Dof) {
        let dof = Dof::from_index(global % 6).unwrap_or(Dof::Dx);
        (&self.node_ids[global / 6], dof)
    }

    /// Describe a global DOF for error messages
    pub fn describe(&self, global: usize) -> String {
        let (node, dof) = self.location(global);
        format!("node '{}' {}", node, dof)
    }

    /// Translate a factorization failure reported against a free equation
    /// into global DOF and node/DOF terms
    pub fn annotate(&self, err: FrameError) -> FrameError {
        match err {
            FrameError::SingularMatrix {
                equation, pivot, ..
            } if equation < self.free.len() => {
                let global = self.free[equation];
                FrameError::SingularMatrix {
                    equation: global,
                    location: self.describe(global),
                    pivot,
                }
            }
            other => other,
        }
    }

    /// Split a global vector into its free and restrained parts
    pub fn split(&self, full: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let f = DVector::from_fn(self.free.len(), |i, _| full[self.free[i]]);
        let r = DVector::from_fn(self.restrained.len(), |i, _| full[self.restrained[i]]);
        (f, r)
    }

    /// Merge free and restrained parts into a global vector
    pub fn merge(&self, free: &DVector<f64>, restrained: &DVector<f64>) -> DVector<f64> {
        let mut full = DVector::zeros(self.num_total());
        for (eq, &global) in self.free.iter().enumerate() {
            full[global] = free[eq];
        }
        for (eq, &global) in self.restrained.iter().enumerate() {
            full[global] = restrained[eq];
        }
        full
    }

    /// Global DOFs of an element's two end nodes, in local DOF order
    fn element_dofs(&self, start: usize, end: usize) -> [usize; 12] {
        let mut dofs = [0; 12];
        for k in 0..6 {
            dofs[k] = start * 6 + k;
            dofs[k + 6] = end * 6 + k;
        }
        dofs
    }
}

/// Per-element data shared by assembly, loading and result recovery
#[derive(Debug, Clone)]
pub struct ElementFrame {
    pub id: String,
    pub length: f64,
    /// Direction cosines, rows are local x, y, z in global components
    pub rotation: Mat3,
    /// 12x12 transformation, `u_local = t * u_global`
    pub t: Mat12,
    /// Local stiffness before releases
    pub k_local: Mat12,
    /// Local stiffness after condensing the end releases
    pub k_condensed: Mat12,
    pub releases: [bool; 12],
    /// Global DOFs of the element ends
    pub dofs: [usize; 12],
}

impl ElementFrame {
    /// Build the element's local matrices and transformation
    pub fn build(
        model: &StructuralModel,
        dof_map: &DofMap,
        id: &str,
        element: &Element,
    ) -> FrameResult<Self> {
        let registry = model.node_registry();
        let missing_node =
            |node: &str| FrameError::reference(crate::error::EntityKind::Node, node, id);
        let start_pos = registry
            .position(&element.start)
            .ok_or_else(|| missing_node(&element.start))?;
        let end_pos = registry
            .position(&element.end)
            .ok_or_else(|| missing_node(&element.end))?;
        let start = registry.get(&element.start).ok_or_else(|| missing_node(&element.start))?;
        let end = registry.get(&element.end).ok_or_else(|| missing_node(&element.end))?;

        let material = model.material(&element.material).ok_or_else(|| {
            FrameError::reference(crate::error::EntityKind::Material, &element.material, id)
        })?;
        let section = model.section(&element.section).ok_or_else(|| {
            FrameError::reference(crate::error::EntityKind::Section, &element.section, id)
        })?;

        let rotation = math::local_axes(
            &start.coords(),
            &end.coords(),
            element.reference,
            element.rotation,
        )
        .ok_or_else(|| {
            FrameError::validation(
                id,
                "element has zero length or a reference vector parallel to its axis",
            )
        })?;
        let length = start.distance_to(end);

        let k_local = math::member_local_stiffness(
            material.e,
            material.g,
            section.a,
            section.iy,
            section.iz,
            section.j,
            length,
        );
        let releases = element.releases.as_array();
        let dofs = dof_map.element_dofs(start_pos, end_pos);

        let k_condensed = math::apply_releases(&k_local, &releases).ok_or_else(|| {
            let first = releases.iter().position(|&r| r).unwrap_or(0);
            FrameError::SingularMatrix {
                equation: dofs[first],
                location: format!("element '{}' (end releases form a mechanism)", id),
                pivot: 0.0,
            }
        })?;

        Ok(Self {
            id: id.to_string(),
            length,
            rotation,
            t: math::member_transformation_matrix(&rotation),
            k_local,
            k_condensed,
            releases,
            dofs,
        })
    }

    /// Condensed stiffness in global axes
    pub fn global_stiffness(&self) -> Mat12 {
        math::transform_to_global(&self.k_condensed, &self.t)
    }
}

/// The partitioned global system of one model snapshot.
///
/// Immutable once built; static and modal solves share it.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub dof_map: DofMap,
    pub frames: Vec<ElementFrame>,
    pub k_ff: CsrMatrix<f64>,
    pub k_fr: CsrMatrix<f64>,
    pub k_rf: CsrMatrix<f64>,
    pub k_rr: CsrMatrix<f64>,
    /// Free-free mass block, present when mass was requested
    pub m_ff: Option<CsrMatrix<f64>>,
}

/// Fail with `SingularModel` for any node that no element touches but that
/// still has free DOFs.
pub fn check_connectivity(model: &StructuralModel) -> FrameResult<()> {
    let mut connected = vec![false; model.num_nodes()];
    let registry = model.node_registry();
    for (_, element) in model.elements() {
        for node in [&element.start, &element.end] {
            if let Some(pos) = registry.position(node) {
                connected[pos] = true;
            }
        }
    }

    for (pos, (id, _)) in model.nodes().enumerate() {
        if connected[pos] {
            continue;
        }
        let dofs = model.boundary_condition(id).free_dofs();
        if !dofs.is_empty() {
            return Err(FrameError::SingularModel {
                node: id.to_string(),
                dofs,
            });
        }
    }
    Ok(())
}

/// Assemble the partitioned stiffness (and optionally mass) of a model
pub fn assemble(
    model: &StructuralModel,
    mass: Option<MassFormulation>,
) -> FrameResult<AssembledSystem> {
    let started = Instant::now();
    let dof_map = DofMap::from_model(model)?;
    check_connectivity(model)?;

    let frames = model
        .elements()
        .map(|(id, element)| ElementFrame::build(model, &dof_map, id, element))
        .collect::<FrameResult<Vec<_>>>()?;

    let nf = dof_map.num_free();
    let nr = dof_map.num_restrained();
    let mut k_ff = SparseMatrixBuilder::new(nf);
    let mut k_fr = SparseMatrixBuilder::rectangular(nf, nr);
    let mut k_rf = SparseMatrixBuilder::rectangular(nr, nf);
    let mut k_rr = SparseMatrixBuilder::new(nr);
    let mut m_ff = mass.map(|_| SparseMatrixBuilder::new(nf));

    for (frame, (_, element)) in frames.iter().zip(model.elements()) {
        let k = frame.global_stiffness();
        let m = match mass {
            Some(formulation) => {
                let material = model.material(&element.material);
                let section = model.section(&element.section);
                match (material, section) {
                    (Some(mat), Some(sec)) => {
                        let m_local = math::member_local_mass(
                            formulation,
                            mat.rho,
                            sec.a,
                            sec.iy,
                            sec.iz,
                            frame.length,
                        );
                        Some(math::transform_to_global(&m_local, &frame.t))
                    }
                    _ => None,
                }
            }
            None => None,
        };

        for (a, &ga) in frame.dofs.iter().enumerate() {
            for (b, &gb) in frame.dofs.iter().enumerate() {
                let value = k[(a, b)];
                match (dof_map.equation(ga), dof_map.equation(gb)) {
                    (Equation::Free(i), Equation::Free(j)) => {
                        k_ff.add(i, j, value);
                        if let (Some(builder), Some(m)) = (m_ff.as_mut(), m.as_ref()) {
                            builder.add(i, j, m[(a, b)]);
                        }
                    }
                    (Equation::Free(i), Equation::Restrained(j)) => k_fr.add(i, j, value),
                    (Equation::Restrained(i), Equation::Free(j)) => k_rf.add(i, j, value),
                    (Equation::Restrained(i), Equation::Restrained(j)) => k_rr.add(i, j, value),
                }
            }
        }
    }

    let system = AssembledSystem {
        k_ff: k_ff.to_csr(),
        k_fr: k_fr.to_csr(),
        k_rf: k_rf.to_csr(),
        k_rr: k_rr.to_csr(),
        m_ff: m_ff.map(|builder| builder.to_csr()),
        dof_map,
        frames,
    };

    info!(
        "assembled {} elements: {} free / {} restrained DOFs, {} non-zeros in K_ff",
        system.frames.len(),
        nf,
        nr,
        system.k_ff.nnz()
    );
    debug!("assembly took {:?}", started.elapsed());
    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BoundaryCondition, EndReleases, Material, Node, Section};
    use crate::math::sparse::to_dense;

    fn cantilever() -> StructuralModel {
        let mut model = StructuralModel::new();
        model.add_node("N1", Node::new(0.0, 0.0, 0.0)).unwrap();
        model.add_node("N2", Node::new(3.0, 0.0, 0.0)).unwrap();
        model.add_material("Steel", Material::steel()).unwrap();
        model
            .add_section("R", Section::rectangular(0.1, 0.2))
            .unwrap();
        model
            .add_element("B1", crate::elements::Element::beam("N1", "N2", "Steel", "R"))
            .unwrap();
        model
            .set_boundary_condition("N1", BoundaryCondition::fixed())
            .unwrap();
        model.assign_dof_numbering();
        model
    }

    #[test]
    fn test_partition_sizes() {
        let model = cantilever();
        let system = assemble(&model, Some(MassFormulation::Consistent)).unwrap();
        assert_eq!(system.dof_map.num_free(), 6);
        assert_eq!(system.dof_map.num_restrained(), 6);
        assert_eq!(system.k_ff.nrows(), 6);
        assert_eq!(system.k_fr.ncols(), 6);
        assert!(system.m_ff.is_some());

        let k = to_dense(&system.k_ff);
        approx::assert_relative_eq!(k, k.transpose(), epsilon = 1e-6);
    }

    #[test]
    fn test_stale_numbering_is_rejected() {
        let mut model = cantilever();
        model
            .set_boundary_condition("N2", BoundaryCondition::pinned())
            .unwrap();
        assert!(matches!(
            assemble(&model, None),
            Err(FrameError::Validation { .. })
        ));
    }

    #[test]
    fn test_disconnected_node_is_singular_model() {
        let mut model = cantilever();
        model.add_node("N3", Node::new(9.0, 0.0, 0.0)).unwrap();
        model.assign_dof_numbering();
        match assemble(&model, None) {
            Err(FrameError::SingularModel { node, dofs }) => {
                assert_eq!(node, "N3");
                assert_eq!(dofs.len(), 6);
            }
            other => panic!("expected SingularModel, got {:?}", other.map(|_| ())),
        }

        // A fully restrained orphan node is harmless
        model
            .set_boundary_condition("N3", BoundaryCondition::fixed())
            .unwrap();
        model.assign_dof_numbering();
        assert!(assemble(&model, None).is_ok());
    }

    #[test]
    fn test_release_mechanism_names_element() {
        let mut model = cantilever();
        model.add_node("N3", Node::new(6.0, 0.0, 0.0)).unwrap();
        let releases = EndReleases::none().with_start(Dof::Rx).with_end(Dof::Rx);
        model
            .add_element(
                "B2",
                crate::elements::Element::beam("N2", "N3", "Steel", "R").with_releases(releases),
            )
            .unwrap();
        model.assign_dof_numbering();
        match assemble(&model, None) {
            Err(FrameError::SingularMatrix { location, .. }) => assert!(location.contains("B2")),
            other => panic!("expected SingularMatrix, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_annotate_names_node_and_dof() {
        let model = cantilever();
        let dof_map = DofMap::from_model(&model).unwrap();
        let err = dof_map.annotate(FrameError::SingularMatrix {
            equation: 5,
            location: String::new(),
            pivot: 0.0,
        });
        match err {
            FrameError::SingularMatrix { equation, location, .. } => {
                assert_eq!(equation, 11);
                assert_eq!(location, "node 'N2' RZ");
            }
            _ => unreachable!(),
        }
    }
}
