//! Frame Solver - finite element analysis of 3D building frames
//!
//! This library provides the analysis engine behind a structural design
//! workflow for frames made of beams, columns and braces:
//! - Structural model store with referential-integrity checks
//! - 12-DOF Euler-Bernoulli frame elements with end releases
//! - Load cases, factored combinations and combination rules
//! - Linear static analysis (one factorization, many combinations)
//! - Modal analysis with consistent or lumped mass
//! - Element force diagrams, fiber stresses and envelopes
//!
//! ## Example
//! ```rust
//! use frame_solver::prelude::*;
//!
//! let mut model = StructuralModel::new();
//!
//! model.add_material("Steel", Material::steel()).unwrap();
//! model.add_section("R200x100", Section::rectangular(0.1, 0.2)).unwrap();
//!
//! model.add_node("N1", Node::new(0.0, 0.0, 0.0)).unwrap();
//! model.add_node("N2", Node::new(3.0, 0.0, 0.0)).unwrap();
//! model.add_element("B1", Element::beam("N1", "N2", "Steel", "R200x100")).unwrap();
//! model.set_boundary_condition("N1", BoundaryCondition::fixed()).unwrap();
//!
//! model.add_load_case("D", LoadCase::dead("Dead")).unwrap();
//! model.add_load("P", Load::node_force("D", "N2", 0.0, -10e3, 0.0)).unwrap();
//! model.assign_dof_numbering();
//!
//! let combos = [LoadCombination::single("1.0D", "D")];
//! let results = run(&model.snapshot(), &combos, &AnalysisOptions::default(), &CancelToken::new()).unwrap();
//!
//! let tip = results.node_displacement("N2", "1.0D").unwrap();
//! assert!(tip.dy < 0.0);
//! ```

pub mod analysis;
pub mod assembly;
pub mod document;
pub mod elements;
pub mod error;
pub mod loads;
pub mod math;
pub mod modal;
pub mod model;
pub mod postprocess;
pub mod results;
pub mod solver;

#[cfg(feature = "service")]
pub mod service;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::{run, AnalysisOptions, AnalysisType, CancelToken};
    pub use crate::document::{ModelDocument, RunRequest};
    pub use crate::elements::{
        BoundaryCondition, Dof, Element, ElementKind, EndReleases, Material, Node, Section,
    };
    pub use crate::error::{FrameError, FrameResult};
    pub use crate::loads::{
        CombinationRule, Load, LoadAxes, LoadCase, LoadCategory, LoadCombination,
    };
    pub use crate::math::MassFormulation;
    pub use crate::model::{ModelSnapshot, StructuralModel, UnitSystem};
    pub use crate::results::{
        AnalysisResults, CombinationResult, ElementResult, MemberForces, ModeResult,
        NodeDisplacement, Reactions,
    };
}
