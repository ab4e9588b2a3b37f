//! Max/min envelopes across load combinations

use serde::{Deserialize, Serialize};

use super::{CombinationResult, ElementResult, MemberForces};

/// Extreme values of one quantity and the combinations that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeValue {
    pub max: f64,
    pub max_combination: String,
    pub min: f64,
    pub min_combination: String,
}

impl Default for EnvelopeValue {
    fn default() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            max_combination: String::new(),
            min: f64::INFINITY,
            min_combination: String::new(),
        }
    }
}

impl EnvelopeValue {
    /// Fold one value in. Ties keep the first combination seen.
    pub fn update(&mut self, value: f64, combination: &str) {
        if value > self.max {
            self.max = value;
            self.max_combination = combination.to_string();
        }
        if value < self.min {
            self.min = value;
            self.min_combination = combination.to_string();
        }
    }

    /// Larger of |max| and |min|
    pub fn abs_max(&self) -> f64 {
        self.max.abs().max(self.min.abs())
    }
}

/// Envelope of one node's displacements and reactions, [DX..RZ] / [FX..MZ]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEnvelope {
    pub node: String,
    pub displacement: [EnvelopeValue; 6],
    pub reaction: Option<[EnvelopeValue; 6]>,
}

/// Envelope of one element's internal forces over every diagram station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementEnvelope {
    pub element: String,
    pub axial: EnvelopeValue,
    pub shear_y: EnvelopeValue,
    pub shear_z: EnvelopeValue,
    pub torsion: EnvelopeValue,
    pub moment_y: EnvelopeValue,
    pub moment_z: EnvelopeValue,
    /// Fiber stress: `max` from the stress maxima, `min` from the minima
    pub stress: EnvelopeValue,
}

impl ElementEnvelope {
    fn fold_forces(&mut self, forces: &MemberForces, combination: &str) {
        self.axial.update(forces.axial, combination);
        self.shear_y.update(forces.shear_y, combination);
        self.shear_z.update(forces.shear_z, combination);
        self.torsion.update(forces.torsion, combination);
        self.moment_y.update(forces.moment_y, combination);
        self.moment_z.update(forces.moment_z, combination);
    }

    fn fold(&mut self, result: &ElementResult, combination: &str) {
        for point in &result.diagram {
            self.fold_forces(&point.forces, combination);
        }
        self.stress.update(result.stress.max, combination);
        self.stress.update(result.stress.min, combination);
    }
}

/// Envelope of every node and element across a set of combinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub combinations: Vec<String>,
    pub nodes: Vec<NodeEnvelope>,
    pub elements: Vec<ElementEnvelope>,
}

impl Envelope {
    /// Build the envelope. `None` when there are no results to envelope.
    ///
    /// All results must come from the same run, so node and element records
    /// line up by position.
    pub fn from_results(results: &[CombinationResult]) -> Option<Self> {
        let first = results.first()?;

        let mut nodes: Vec<NodeEnvelope> = first
            .nodes
            .iter()
            .map(|n| NodeEnvelope {
                node: n.node.clone(),
                displacement: Default::default(),
                reaction: n.reaction.map(|_| Default::default()),
            })
            .collect();
        let mut elements: Vec<ElementEnvelope> = first
            .elements
            .iter()
            .map(|e| ElementEnvelope {
                element: e.element.clone(),
                ..Default::default()
            })
            .collect();

        for result in results {
            let combination = result.combination.as_str();
            for (envelope, node) in nodes.iter_mut().zip(&result.nodes) {
                for (value, d) in envelope
                    .displacement
                    .iter_mut()
                    .zip(node.displacement.to_array())
                {
                    value.update(d, combination);
                }
                if let (Some(values), Some(reaction)) = (envelope.reaction.as_mut(), node.reaction) {
                    for (value, r) in values.iter_mut().zip(reaction.to_array()) {
                        value.update(r, combination);
                    }
                }
            }
            for (envelope, element) in elements.iter_mut().zip(&result.elements) {
                envelope.fold(element, combination);
            }
        }

        Some(Self {
            combinations: results.iter().map(|r| r.combination.clone()).collect(),
            nodes,
            elements,
        })
    }

    pub fn node(&self, id: &str) -> Option<&NodeEnvelope> {
        self.nodes.iter().find(|n| n.node == id)
    }

    pub fn element(&self, id: &str) -> Option<&ElementEnvelope> {
        self.elements.iter().find(|e| e.element == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{AnalysisSummary, DiagramPoint, NodeDisplacement, NodeResult, Reactions, StressExtremes};

    fn result(name: &str, dy: f64, moment: f64) -> CombinationResult {
        let forces = MemberForces {
            moment_z: moment,
            ..Default::default()
        };
        CombinationResult {
            combination: name.to_string(),
            displacements: vec![0.0; 6],
            reactions: vec![0.0; 6],
            nodes: vec![NodeResult {
                node: "N1".to_string(),
                displacement: NodeDisplacement::from_array([0.0, dy, 0.0, 0.0, 0.0, 0.0]),
                translation: dy.abs(),
                rotation: 0.0,
                reaction: Some(Reactions::from_array([0.0, -dy, 0.0, 0.0, 0.0, 0.0])),
            }],
            elements: vec![ElementResult {
                element: "E1".to_string(),
                length: 1.0,
                end_forces: [0.0; 12],
                start: forces,
                end: forces,
                diagram: vec![DiagramPoint { x: 0.0, forces }],
                stress: StressExtremes {
                    max: moment.abs(),
                    max_at: 0.0,
                    min: -moment.abs(),
                    min_at: 0.0,
                },
            }],
            summary: AnalysisSummary::default(),
        }
    }

    #[test]
    fn test_envelope_records_governing_combination() {
        let results = vec![
            result("D", -1.0, 10.0),
            result("D+L", -3.0, 25.0),
            result("Uplift", 0.5, -4.0),
        ];
        let envelope = Envelope::from_results(&results).unwrap();

        let node = envelope.node("N1").unwrap();
        assert_eq!(node.displacement[1].min, -3.0);
        assert_eq!(node.displacement[1].min_combination, "D+L");
        assert_eq!(node.displacement[1].max, 0.5);
        assert_eq!(node.displacement[1].max_combination, "Uplift");
        let reaction = node.reaction.as_ref().unwrap();
        assert_eq!(reaction[1].max_combination, "D+L");

        let element = envelope.element("E1").unwrap();
        assert_eq!(element.moment_z.max, 25.0);
        assert_eq!(element.moment_z.min_combination, "Uplift");
        assert_eq!(element.stress.abs_max(), 25.0);
        assert_eq!(envelope.combinations.len(), 3);
    }

    #[test]
    fn test_empty_results_have_no_envelope() {
        assert!(Envelope::from_results(&[]).is_none());
    }
}
