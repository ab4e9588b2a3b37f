//! Frame element - one 3D Euler-Bernoulli formulation for beams, columns and braces

use serde::{Deserialize, Serialize};

use super::node::Dof;

/// End releases for an element (DOFs that transmit no force or moment)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndReleases {
    /// Start-node releases [DX, DY, DZ, RX, RY, RZ]
    pub start: [bool; 6],
    /// End-node releases [DX, DY, DZ, RX, RY, RZ]
    pub end: [bool; 6],
}

impl EndReleases {
    /// No end releases
    pub fn none() -> Self {
        Self::default()
    }

    /// Moment releases (pin) at the start node
    pub fn pin_start() -> Self {
        Self {
            start: [false, false, false, false, true, true],
            end: [false; 6],
        }
    }

    /// Moment releases (pin) at the end node
    pub fn pin_end() -> Self {
        Self {
            start: [false; 6],
            end: [false, false, false, false, true, true],
        }
    }

    /// Moment releases at both ends
    pub fn pin_both() -> Self {
        Self {
            start: [false, false, false, false, true, true],
            end: [false, false, false, false, true, true],
        }
    }

    /// Release one DOF at the start node
    pub fn with_start(mut self, dof: Dof) -> Self {
        self.start[dof.index()] = true;
        self
    }

    /// Release one DOF at the end node
    pub fn with_end(mut self, dof: Dof) -> Self {
        self.end[dof.index()] = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.start.iter().chain(self.end.iter()).any(|&r| r)
    }

    /// Combined releases as a 12-element array in local element DOF order
    pub fn as_array(&self) -> [bool; 12] {
        let mut arr = [false; 12];
        arr[0..6].copy_from_slice(&self.start);
        arr[6..12].copy_from_slice(&self.end);
        arr
    }
}

/// Label of a frame element. Metadata only: every kind shares one formulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    #[default]
    Beam,
    Column,
    Brace,
}

/// A 3D frame element between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Id of the start node
    pub start: String,
    /// Id of the end node
    pub end: String,
    #[serde(default)]
    pub kind: ElementKind,
    /// Id of the material
    pub material: String,
    /// Id of the section
    pub section: String,
    /// End releases
    #[serde(default)]
    pub releases: EndReleases,
    /// Reference vector lying in the local x-z plane, resolving the
    /// orientation of the transverse axes. Defaults to global +Y
    /// (global +X for elements parallel to Y).
    #[serde(default)]
    pub reference: Option<[f64; 3]>,
    /// Roll about the longitudinal axis applied after orientation (radians)
    #[serde(default)]
    pub rotation: f64,
}

impl Element {
    /// Create a new element
    pub fn new(start: &str, end: &str, material: &str, section: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            kind: ElementKind::Beam,
            material: material.to_string(),
            section: section.to_string(),
            releases: EndReleases::none(),
            reference: None,
            rotation: 0.0,
        }
    }

    pub fn beam(start: &str, end: &str, material: &str, section: &str) -> Self {
        Self::new(start, end, material, section)
    }

    pub fn column(start: &str, end: &str, material: &str, section: &str) -> Self {
        Self::new(start, end, material, section).with_kind(ElementKind::Column)
    }

    pub fn brace(start: &str, end: &str, material: &str, section: &str) -> Self {
        Self::new(start, end, material, section).with_kind(ElementKind::Brace)
    }

    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set element end releases
    pub fn with_releases(mut self, releases: EndReleases) -> Self {
        self.releases = releases;
        self
    }

    /// Set the orientation reference vector
    pub fn with_reference(mut self, reference: [f64; 3]) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Set element roll about its longitudinal axis
    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_creation() {
        let element = Element::column("N1", "N2", "Steel", "W12x26");
        assert_eq!(element.start, "N1");
        assert_eq!(element.end, "N2");
        assert_eq!(element.kind, ElementKind::Column);
        assert_eq!(element.rotation, 0.0);
    }

    #[test]
    fn test_releases() {
        let releases = EndReleases::pin_start();
        let arr = releases.as_array();
        assert!(!arr[0]);
        assert!(arr[4]);
        assert!(arr[5]);
        assert!(!arr[11]);

        let torsion = EndReleases::none().with_end(Dof::Rx);
        assert!(torsion.as_array()[9]);
        assert!(!torsion.is_empty());
        assert!(EndReleases::none().is_empty());

        let both = EndReleases::pin_both().as_array();
        assert_eq!(both.iter().filter(|&&r| r).count(), 4);
        assert!(both[4] && both[5] && both[10] && both[11]);
    }
}
