//! Boundary conditions (supports)

use serde::{Deserialize, Serialize};

use super::node::Dof;

/// Per-DOF restraint state of a node.
///
/// Restrained DOFs carry a prescribed displacement (zero by default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    /// Restrained flags [DX, DY, DZ, RX, RY, RZ]
    pub restrained: [bool; 6],
    /// Prescribed displacements for restrained DOFs
    #[serde(default)]
    pub prescribed: [f64; 6],
}

impl BoundaryCondition {
    /// No restraints
    pub fn free() -> Self {
        Self::default()
    }

    /// Fully fixed support (all DOFs restrained)
    pub fn fixed() -> Self {
        Self::with_restraints([true; 6])
    }

    /// Pinned support (translations restrained, rotations free)
    pub fn pinned() -> Self {
        Self::with_restraints([true, true, true, false, false, false])
    }

    /// Roller support restraining only vertical (Y) translation
    pub fn roller_y() -> Self {
        Self::with_restraints([false, true, false, false, false, false])
    }

    /// Support with explicit restraints
    pub fn with_restraints(restrained: [bool; 6]) -> Self {
        Self {
            restrained,
            prescribed: [0.0; 6],
        }
    }

    /// Restrain a DOF
    pub fn restrain(mut self, dof: Dof) -> Self {
        self.restrained[dof.index()] = true;
        self
    }

    /// Prescribe a displacement on a DOF, restraining it
    pub fn with_prescribed(mut self, dof: Dof, value: f64) -> Self {
        self.restrained[dof.index()] = true;
        self.prescribed[dof.index()] = value;
        self
    }

    pub fn is_restrained(&self, dof: Dof) -> bool {
        self.restrained[dof.index()]
    }

    /// Prescribed displacement of a DOF, `None` when the DOF is free
    pub fn prescribed(&self, dof: Dof) -> Option<f64> {
        self.is_restrained(dof).then(|| self.prescribed[dof.index()])
    }

    /// Check if any DOF is restrained
    pub fn is_supported(&self) -> bool {
        self.restrained.iter().any(|&r| r)
    }

    /// Count number of restrained DOFs
    pub fn num_restrained(&self) -> usize {
        self.restrained.iter().filter(|&&r| r).count()
    }

    /// Free DOFs of this node
    pub fn free_dofs(&self) -> Vec<Dof> {
        Dof::ALL
            .into_iter()
            .filter(|&dof| !self.is_restrained(dof))
            .collect()
    }

    /// Whether any restrained DOF has a non-zero prescribed displacement
    pub fn has_settlement(&self) -> bool {
        Dof::ALL
            .into_iter()
            .any(|dof| self.prescribed(dof).map_or(false, |v| v != 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_support() {
        let support = BoundaryCondition::fixed();
        assert!(support.is_supported());
        assert_eq!(support.num_restrained(), 6);
        assert!(support.free_dofs().is_empty());
    }

    #[test]
    fn test_pinned_support() {
        let support = BoundaryCondition::pinned();
        assert_eq!(support.num_restrained(), 3);
        assert_eq!(support.free_dofs(), vec![Dof::Rx, Dof::Ry, Dof::Rz]);
    }

    #[test]
    fn test_prescribed_displacement() {
        let support = BoundaryCondition::pinned().with_prescribed(Dof::Dy, -0.01);
        assert!(support.is_restrained(Dof::Dy));
        assert_eq!(support.prescribed(Dof::Dy), Some(-0.01));
        assert_eq!(support.prescribed(Dof::Rx), None);
        assert!(support.has_settlement());
        assert!(!BoundaryCondition::fixed().has_settlement());
    }
}
