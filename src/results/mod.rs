//! Result types for frame analysis
//!
//! Results belong to the run that produced them. Nothing here refers back to
//! the live model; re-running produces a new [`AnalysisResults`].

mod envelope;

pub use envelope::{ElementEnvelope, Envelope, EnvelopeValue, NodeEnvelope};

use serde::{Deserialize, Serialize};

use crate::error::FrameResult;
use crate::model::UnitSystem;

/// Displacement results at a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDisplacement {
    /// Displacement in X direction
    pub dx: f64,
    /// Displacement in Y direction
    pub dy: f64,
    /// Displacement in Z direction
    pub dz: f64,
    /// Rotation about X axis
    pub rx: f64,
    /// Rotation about Y axis
    pub ry: f64,
    /// Rotation about Z axis
    pub rz: f64,
}

impl NodeDisplacement {
    /// Create from array [DX, DY, DZ, RX, RY, RZ]
    pub fn from_array(arr: [f64; 6]) -> Self {
        Self {
            dx: arr[0],
            dy: arr[1],
            dz: arr[2],
            rx: arr[3],
            ry: arr[4],
            rz: arr[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.dx, self.dy, self.dz, self.rx, self.ry, self.rz]
    }

    /// Get translation magnitude
    pub fn translation_magnitude(&self) -> f64 {
        (self.dx.powi(2) + self.dy.powi(2) + self.dz.powi(2)).sqrt()
    }

    /// Get rotation magnitude
    pub fn rotation_magnitude(&self) -> f64 {
        (self.rx.powi(2) + self.ry.powi(2) + self.rz.powi(2)).sqrt()
    }
}

/// Reaction forces at a supported node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reactions {
    /// Reaction force in X direction
    pub fx: f64,
    /// Reaction force in Y direction
    pub fy: f64,
    /// Reaction force in Z direction
    pub fz: f64,
    /// Reaction moment about X axis
    pub mx: f64,
    /// Reaction moment about Y axis
    pub my: f64,
    /// Reaction moment about Z axis
    pub mz: f64,
}

impl Reactions {
    /// Create from array [FX, FY, FZ, MX, MY, MZ]
    pub fn from_array(arr: [f64; 6]) -> Self {
        Self {
            fx: arr[0],
            fy: arr[1],
            fz: arr[2],
            mx: arr[3],
            my: arr[4],
            mz: arr[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.fx, self.fy, self.fz, self.mx, self.my, self.mz]
    }

    /// Get total force magnitude
    pub fn force_magnitude(&self) -> f64 {
        (self.fx.powi(2) + self.fy.powi(2) + self.fz.powi(2)).sqrt()
    }

    /// Get total moment magnitude
    pub fn moment_magnitude(&self) -> f64 {
        (self.mx.powi(2) + self.my.powi(2) + self.mz.powi(2)).sqrt()
    }
}

/// Internal forces at a section of an element, local axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberForces {
    /// Axial force (positive = tension)
    pub axial: f64,
    /// Shear force in local y direction
    pub shear_y: f64,
    /// Shear force in local z direction
    pub shear_z: f64,
    /// Torsion
    pub torsion: f64,
    /// Bending moment about local y axis (strong axis)
    pub moment_y: f64,
    /// Bending moment about local z axis (weak axis)
    pub moment_z: f64,
}

impl MemberForces {
    /// Internal forces just inside the start node, from the local end force vector
    pub fn from_start_forces(forces: &[f64; 12]) -> Self {
        Self {
            axial: -forces[0],
            shear_y: forces[1],
            shear_z: forces[2],
            torsion: -forces[3],
            moment_y: forces[4],
            moment_z: forces[5],
        }
    }

    /// Internal forces just inside the end node, from the local end force vector
    pub fn from_end_forces(forces: &[f64; 12]) -> Self {
        Self {
            axial: forces[6],
            shear_y: -forces[7],
            shear_z: -forces[8],
            torsion: forces[9],
            moment_y: -forces[10],
            moment_z: -forces[11],
        }
    }

    /// Larger of the two bending moment magnitudes
    pub fn max_moment(&self) -> f64 {
        self.moment_y.abs().max(self.moment_z.abs())
    }
}

/// One station of an element force diagram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagramPoint {
    /// Distance from the start node
    pub x: f64,
    #[serde(flatten)]
    pub forces: MemberForces,
}

/// Extreme fiber stresses N/A ± M·c/I along an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StressExtremes {
    /// Largest (most tensile) fiber stress
    pub max: f64,
    /// Station of `max`
    pub max_at: f64,
    /// Smallest (most compressive) fiber stress
    pub min: f64,
    /// Station of `min`
    pub min_at: f64,
}

/// Results at one node for one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: String,
    pub displacement: NodeDisplacement,
    pub translation: f64,
    pub rotation: f64,
    /// Present for nodes with at least one restrained DOF
    pub reaction: Option<Reactions>,
}

/// Results of one element for one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementResult {
    pub element: String,
    pub length: f64,
    /// Local end forces K·u + fixed-end reactions, [start 0..6, end 6..12]
    pub end_forces: [f64; 12],
    pub start: MemberForces,
    pub end: MemberForces,
    pub diagram: Vec<DiagramPoint>,
    pub stress: StressExtremes,
}

impl ElementResult {
    /// Largest absolute axial force over the diagram
    pub fn max_axial(&self) -> f64 {
        self.diagram
            .iter()
            .map(|p| p.forces.axial.abs())
            .fold(0.0, f64::max)
    }

    /// Largest absolute bending moment over the diagram
    pub fn max_moment(&self) -> f64 {
        self.diagram
            .iter()
            .map(|p| p.forces.max_moment())
            .fold(0.0, f64::max)
    }
}

/// Summary of one combination's results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Maximum translation magnitude
    pub max_displacement: f64,
    /// Node with maximum displacement
    pub max_disp_node: String,
    /// Maximum reaction force magnitude
    pub max_reaction: f64,
    /// Node with maximum reaction
    pub max_reaction_node: String,
    /// Maximum element axial force
    pub max_axial: f64,
    /// Element with maximum axial
    pub max_axial_element: String,
    /// Maximum element moment
    pub max_moment: f64,
    /// Element with maximum moment
    pub max_moment_element: String,
    /// Resultant of applied forces, global axes
    pub applied_force: [f64; 3],
    /// Resultant of reaction forces, global axes
    pub reaction_force: [f64; 3],
    /// Total number of nodes
    pub num_nodes: usize,
    /// Total number of elements
    pub num_elements: usize,
    /// Total DOFs
    pub total_dofs: usize,
    /// Free DOFs (unknown)
    pub free_dofs: usize,
}

impl AnalysisSummary {
    /// Largest component of applied + reaction forces; zero at equilibrium
    pub fn equilibrium_residual(&self) -> f64 {
        (0..3)
            .map(|k| (self.applied_force[k] + self.reaction_force[k]).abs())
            .fold(0.0, f64::max)
    }
}

/// Static results of one load combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationResult {
    pub combination: String,
    /// Displacements indexed by global DOF (`node_position * 6 + dof`)
    pub displacements: Vec<f64>,
    /// Reactions indexed by global DOF, zero at free DOFs
    pub reactions: Vec<f64>,
    pub nodes: Vec<NodeResult>,
    pub elements: Vec<ElementResult>,
    pub summary: AnalysisSummary,
}

impl CombinationResult {
    pub fn node(&self, id: &str) -> Option<&NodeResult> {
        self.nodes.iter().find(|n| n.node == id)
    }

    pub fn element(&self, id: &str) -> Option<&ElementResult> {
        self.elements.iter().find(|e| e.element == id)
    }
}

/// One natural mode of vibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeResult {
    pub number: usize,
    pub eigenvalue: f64,
    pub angular_frequency: f64,
    /// Hz
    pub frequency: f64,
    pub period: f64,
    /// Effective modal mass ratios in global X, Y, Z
    pub participation: [f64; 3],
    /// Mass-normalized shape indexed by global DOF, zero at restrained DOFs
    pub shape: Vec<f64>,
}

impl ModeResult {
    /// Shape components of the node at `position` in the model's node order
    pub fn node_shape(&self, position: usize) -> Option<NodeDisplacement> {
        let slice = self.shape.get(position * 6..position * 6 + 6)?;
        let mut arr = [0.0; 6];
        arr.copy_from_slice(slice);
        Some(NodeDisplacement::from_array(arr))
    }
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    /// Version of the model snapshot the run analysed
    pub model_version: u64,
    pub units: UnitSystem,
    /// Node ids in global DOF order
    pub node_ids: Vec<String>,
    pub static_results: Vec<CombinationResult>,
    pub modes: Vec<ModeResult>,
    /// Max/min across all static combinations
    pub envelope: Option<Envelope>,
}

impl AnalysisResults {
    pub fn combination(&self, id: &str) -> Option<&CombinationResult> {
        self.static_results.iter().find(|r| r.combination == id)
    }

    pub fn node_displacement(&self, node: &str, combination: &str) -> Option<NodeDisplacement> {
        Some(self.combination(combination)?.node(node)?.displacement)
    }

    pub fn reaction(&self, node: &str, combination: &str) -> Option<Reactions> {
        self.combination(combination)?.node(node)?.reaction
    }

    pub fn element(&self, element: &str, combination: &str) -> Option<&ElementResult> {
        self.combination(combination)?.element(element)
    }

    /// Every combination's result for one node
    pub fn node_results<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a NodeResult> + 'a {
        self.static_results.iter().filter_map(move |r| r.node(node))
    }

    /// Every combination's result for one element
    pub fn element_results<'a>(
        &'a self,
        element: &'a str,
    ) -> impl Iterator<Item = &'a ElementResult> + 'a {
        self.static_results.iter().filter_map(move |r| r.element(element))
    }

    /// Mode by 1-based number
    pub fn mode(&self, number: usize) -> Option<&ModeResult> {
        self.modes.iter().find(|m| m.number == number)
    }

    /// Mode shape of one node
    pub fn mode_shape(&self, number: usize, node: &str) -> Option<NodeDisplacement> {
        let position = self.node_ids.iter().position(|id| id == node)?;
        self.mode(number)?.node_shape(position)
    }

    pub fn to_json(&self) -> FrameResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_displacement_magnitudes() {
        let d = NodeDisplacement::from_array([3.0, 4.0, 0.0, 0.0, 0.0, 2.0]);
        assert_eq!(d.translation_magnitude(), 5.0);
        assert_eq!(d.rotation_magnitude(), 2.0);
        assert_eq!(d.to_array()[5], 2.0);
    }

    #[test]
    fn test_end_forces_to_internal_forces() {
        // Simply supported span, unit midspan load: no end moments, shears ±0.5
        let forces = [0.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0];
        let start = MemberForces::from_start_forces(&forces);
        let end = MemberForces::from_end_forces(&forces);
        assert_eq!(start.shear_y, 0.5);
        assert_eq!(end.shear_y, -0.5);
        assert_eq!(end.max_moment(), 0.0);
    }

    #[test]
    fn test_mode_node_shape() {
        let mode = ModeResult {
            number: 1,
            eigenvalue: 1.0,
            angular_frequency: 1.0,
            frequency: 1.0,
            period: 1.0,
            participation: [0.0; 3],
            shape: (0..12).map(|i| i as f64).collect(),
        };
        let shape = mode.node_shape(1).unwrap();
        assert_eq!(shape.dx, 6.0);
        assert!(mode.node_shape(2).is_none());
    }

    #[test]
    fn test_summary_equilibrium_residual() {
        let summary = AnalysisSummary {
            applied_force: [1.0, -10.0, 0.0],
            reaction_force: [-1.0, 9.5, 0.0],
            ..Default::default()
        };
        assert_eq!(summary.equilibrium_residual(), 0.5);
    }
}
