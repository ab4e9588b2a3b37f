//! JSON model document: the ingestion format for complete models and run
//! requests

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOptions;
use crate::elements::{BoundaryCondition, Dof, Element, Material, Node, Section};
use crate::error::{FrameError, FrameResult};
use crate::loads::{CombinationRule, Load, LoadCase, LoadCombination};
use crate::model::{StructuralModel, UnitSystem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    #[serde(flatten)]
    pub node: Node,
}

/// Material entry. Either `g` or `nu` must be given; with only `nu`,
/// G = E / (2 (1 + ν)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialData {
    pub id: String,
    pub e: f64,
    #[serde(default)]
    pub g: Option<f64>,
    #[serde(default)]
    pub nu: Option<f64>,
    pub rho: f64,
    #[serde(default)]
    pub fy: Option<f64>,
    #[serde(default)]
    pub fc: Option<f64>,
}

impl MaterialData {
    fn to_material(&self) -> FrameResult<Material> {
        let mut material = match (self.g, self.nu) {
            (Some(g), nu) => Material::new(self.e, g, nu.unwrap_or(self.e / (2.0 * g) - 1.0), self.rho),
            (None, Some(nu)) => Material::isotropic(self.e, nu, self.rho),
            (None, None) => {
                return Err(FrameError::validation(
                    &self.id,
                    "material needs a shear modulus or a Poisson ratio",
                ))
            }
        };
        material.fy = self.fy;
        material.fc = self.fc;
        Ok(material)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionData {
    pub id: String,
    #[serde(flatten)]
    pub section: Section,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementData {
    pub id: String,
    #[serde(flatten)]
    pub element: Element,
}

/// Prescribed displacement of one restrained DOF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementData {
    pub dof: Dof,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportData {
    pub node: String,
    #[serde(default)]
    pub dx: bool,
    #[serde(default)]
    pub dy: bool,
    #[serde(default)]
    pub dz: bool,
    #[serde(default)]
    pub rx: bool,
    #[serde(default)]
    pub ry: bool,
    #[serde(default)]
    pub rz: bool,
    #[serde(default)]
    pub settlements: Vec<SettlementData>,
}

impl SupportData {
    fn to_condition(&self) -> FrameResult<BoundaryCondition> {
        let mut condition = BoundaryCondition::with_restraints([
            self.dx, self.dy, self.dz, self.rx, self.ry, self.rz,
        ]);
        for settlement in &self.settlements {
            if !condition.is_restrained(settlement.dof) {
                return Err(FrameError::validation(
                    &self.node,
                    format!("settlement on free DOF {}", settlement.dof),
                ));
            }
            condition = condition.with_prescribed(settlement.dof, settlement.value);
        }
        Ok(condition)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadCaseData {
    pub id: String,
    #[serde(flatten)]
    pub case: LoadCase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadData {
    pub id: String,
    #[serde(flatten)]
    pub load: Load,
}

/// A complete model as submitted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default)]
    pub units: UnitSystem,
    pub nodes: Vec<NodeData>,
    pub materials: Vec<MaterialData>,
    pub sections: Vec<SectionData>,
    pub elements: Vec<ElementData>,
    #[serde(default)]
    pub supports: Vec<SupportData>,
    #[serde(default)]
    pub load_cases: Vec<LoadCaseData>,
    #[serde(default)]
    pub loads: Vec<LoadData>,
    #[serde(default)]
    pub combinations: Vec<LoadCombination>,
    /// Rules expanded against the load cases into further combinations
    #[serde(default)]
    pub rules: Vec<CombinationRule>,
}

impl ModelDocument {
    pub fn from_json(json: &str) -> FrameResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a validated, numbered model.
    ///
    /// Entities are added in dependency order, so the first broken reference
    /// or duplicate id is reported exactly as the store would report it.
    pub fn into_model(self) -> FrameResult<StructuralModel> {
        let mut model = StructuralModel::with_units(self.units);

        for data in &self.materials {
            model.add_material(&data.id, data.to_material()?)?;
        }
        for data in self.sections {
            model.add_section(&data.id, data.section)?;
        }
        for data in self.nodes {
            model.add_node(&data.id, data.node)?;
        }
        for data in self.elements {
            model.add_element(&data.id, data.element)?;
        }
        for support in &self.supports {
            model.set_boundary_condition(&support.node, support.to_condition()?)?;
        }
        for data in self.load_cases {
            model.add_load_case(&data.id, data.case)?;
        }
        for data in self.loads {
            model.add_load(&data.id, data.load)?;
        }
        for combination in self.combinations {
            model.add_combination(combination)?;
        }
        for rule in &self.rules {
            for combination in rule.expand(&model) {
                model.add_combination(combination)?;
            }
        }

        let free = model.assign_dof_numbering();
        info!(
            "ingested model: {} nodes, {} elements, {} free DOFs",
            model.num_nodes(),
            model.num_elements(),
            free
        );
        Ok(model)
    }
}

/// A run request: a model, the combinations to analyse (all stored ones when
/// empty) and the analysis options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub model: ModelDocument,
    #[serde(default)]
    pub combinations: Vec<String>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl RunRequest {
    pub fn from_json(json: &str) -> FrameResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Ingest the model and resolve the requested combination ids
    pub fn into_parts(self) -> FrameResult<(StructuralModel, Vec<LoadCombination>, AnalysisOptions)> {
        let model = self.model.into_model()?;
        let combinations = self
            .combinations
            .iter()
            .map(|id| {
                model.combination(id).cloned().ok_or_else(|| {
                    FrameError::reference(crate::error::EntityKind::Combination, id, "run request")
                })
            })
            .collect::<FrameResult<Vec<_>>>()?;
        Ok((model, combinations, self.options))
    }
}
