//! Individual loads applied to nodes or elements

use serde::{Deserialize, Serialize};

/// What a load acts on. A load targets exactly one node or one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTarget {
    Node(String),
    Element(String),
}

impl LoadTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Node(id) | Self::Element(id) => id,
        }
    }
}

/// Coordinate system in which element load components are given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadAxes {
    /// Global X, Y, Z
    #[default]
    Global,
    /// The element's local x (axial), y, z
    Local,
}

/// Shape of a load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadKind {
    /// Concentrated load.
    ///
    /// On a node: `[FX, FY, FZ, MX, MY, MZ]` in global axes, `position` unused.
    /// On an element: force components `[F1, F2, F3, 0, 0, 0]` applied at
    /// `position` (distance from the start node).
    Point {
        components: [f64; 6],
        #[serde(default)]
        position: f64,
    },
    /// Line load per unit length varying linearly from `w_start` at `from`
    /// to `w_end` at `to` (element end when `to` is `None`). Elements only.
    Distributed {
        w_start: [f64; 3],
        w_end: [f64; 3],
        #[serde(default)]
        from: f64,
        #[serde(default)]
        to: Option<f64>,
    },
}

/// A load assigned to exactly one load case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// Id of the load case this load belongs to
    pub case: String,
    pub target: LoadTarget,
    #[serde(flatten)]
    pub kind: LoadKind,
    #[serde(default)]
    pub axes: LoadAxes,
}

impl Load {
    /// Force and moment applied directly to a node
    pub fn nodal(case: &str, node: &str, components: [f64; 6]) -> Self {
        Self {
            case: case.to_string(),
            target: LoadTarget::Node(node.to_string()),
            kind: LoadKind::Point {
                components,
                position: 0.0,
            },
            axes: LoadAxes::Global,
        }
    }

    /// Force-only nodal load
    pub fn node_force(case: &str, node: &str, fx: f64, fy: f64, fz: f64) -> Self {
        Self::nodal(case, node, [fx, fy, fz, 0.0, 0.0, 0.0])
    }

    /// Moment-only nodal load
    pub fn node_moment(case: &str, node: &str, mx: f64, my: f64, mz: f64) -> Self {
        Self::nodal(case, node, [0.0, 0.0, 0.0, mx, my, mz])
    }

    /// Concentrated force on an element at `position` from its start node
    pub fn element_point(
        case: &str,
        element: &str,
        position: f64,
        force: [f64; 3],
        axes: LoadAxes,
    ) -> Self {
        Self {
            case: case.to_string(),
            target: LoadTarget::Element(element.to_string()),
            kind: LoadKind::Point {
                components: [force[0], force[1], force[2], 0.0, 0.0, 0.0],
                position,
            },
            axes,
        }
    }

    /// Uniform line load over the whole element
    pub fn uniform(case: &str, element: &str, w: [f64; 3], axes: LoadAxes) -> Self {
        Self::trapezoidal(case, element, w, w, 0.0, None, axes)
    }

    /// Linearly varying line load over `[from, to]`
    pub fn trapezoidal(
        case: &str,
        element: &str,
        w_start: [f64; 3],
        w_end: [f64; 3],
        from: f64,
        to: Option<f64>,
        axes: LoadAxes,
    ) -> Self {
        Self {
            case: case.to_string(),
            target: LoadTarget::Element(element.to_string()),
            kind: LoadKind::Distributed {
                w_start,
                w_end,
                from,
                to,
            },
            axes,
        }
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.kind, LoadKind::Distributed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let load = Load::node_force("Dead", "N2", 0.0, -10.0, 0.0);
        assert_eq!(load.target, LoadTarget::Node("N2".into()));
        assert!(!load.is_distributed());

        let load = Load::uniform("Live", "B1", [0.0, -5.0, 0.0], LoadAxes::Global);
        assert_eq!(load.target.id(), "B1");
        assert!(load.is_distributed());
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"{
            "case": "Dead",
            "target": {"element": "B1"},
            "kind": "distributed",
            "w_start": [0.0, -2.0, 0.0],
            "w_end": [0.0, -4.0, 0.0],
            "axes": "local"
        }"#;
        let load: Load = serde_json::from_str(json).unwrap();
        assert_eq!(load.axes, LoadAxes::Local);
        match load.kind {
            LoadKind::Distributed { from, to, .. } => {
                assert_eq!(from, 0.0);
                assert_eq!(to, None);
            }
            _ => panic!("expected distributed load"),
        }
    }
}
