//! Analysis types, options and the run pipeline
//!
//! A run takes a [`ModelSnapshot`], assembles K (and M when modes are
//! wanted) once, factorizes K_ff once and then solves every requested
//! combination and the modal problem against that shared factorization.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::assembly::{assemble, AssembledSystem};
use crate::error::{FrameError, FrameResult};
use crate::loads::{combine, LoadCombination};
use crate::math::{MassFormulation, SkylineCholesky};
use crate::modal::{solve_modes, EigenSettings};
use crate::model::{ModelSnapshot, StructuralModel};
use crate::postprocess;
use crate::results::{AnalysisResults, CombinationResult, Envelope, ModeResult};
use crate::solver::{factorize, solve_many, DEFAULT_PIVOT_TOLERANCE};

/// Type of structural analysis to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Linear static analysis of load combinations
    Static,
    /// Modal (eigenvalue) analysis for natural frequencies
    Modal,
    /// Both, sharing one assembly and one factorization
    StaticAndModal,
}

impl Default for AnalysisType {
    fn default() -> Self {
        Self::Static
    }
}

impl AnalysisType {
    pub fn includes_static(self) -> bool {
        matches!(self, Self::Static | Self::StaticAndModal)
    }

    pub fn includes_modal(self) -> bool {
        matches!(self, Self::Modal | Self::StaticAndModal)
    }
}

/// Options for structural analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Type of analysis
    pub analysis_type: AnalysisType,
    /// Number of modes to calculate (for modal analysis)
    pub num_modes: usize,
    /// Mass matrix formulation (for modal analysis)
    pub mass_formulation: MassFormulation,
    /// Relative pivot tolerance of the factorization
    pub pivot_tolerance: f64,
    /// Convergence tolerance of the eigensolver
    pub eigen_tolerance: f64,
    /// Maximum eigensolver iterations
    pub max_eigen_iterations: usize,
    /// Evenly spaced diagram stations per element (load positions are added)
    pub diagram_stations: usize,
    /// Reverse Cuthill-McKee reordering before factorization
    pub reorder: bool,
    /// Solve combinations (and static/modal branches) concurrently
    pub parallel: bool,
    /// Load combination tags to analyze (None = all)
    pub combo_tags: Option<Vec<String>>,
    /// Enable progress output
    pub log: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        let eigen = EigenSettings::default();
        Self {
            analysis_type: AnalysisType::Static,
            num_modes: 12,
            mass_formulation: MassFormulation::Consistent,
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            eigen_tolerance: eigen.tolerance,
            max_eigen_iterations: eigen.max_iterations,
            diagram_stations: 11,
            reorder: true,
            parallel: true,
            combo_tags: None,
            log: false,
        }
    }
}

impl AnalysisOptions {
    /// Create options for linear static analysis
    pub fn linear() -> Self {
        Self::default()
    }

    /// Create options for modal analysis
    pub fn modal(num_modes: usize) -> Self {
        Self {
            analysis_type: AnalysisType::Modal,
            num_modes,
            ..Self::default()
        }
    }

    /// Create options for static and modal analysis in one run
    pub fn static_and_modal(num_modes: usize) -> Self {
        Self {
            analysis_type: AnalysisType::StaticAndModal,
            num_modes,
            ..Self::default()
        }
    }

    /// Enable logging
    pub fn with_logging(mut self) -> Self {
        self.log = true;
        self
    }

    /// Set the pivot tolerance
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.pivot_tolerance = tol;
        self
    }

    pub fn with_mass(mut self, formulation: MassFormulation) -> Self {
        self.mass_formulation = formulation;
        self
    }

    pub fn with_diagram_stations(mut self, stations: usize) -> Self {
        self.diagram_stations = stations;
        self
    }

    pub fn with_reordering(mut self, reorder: bool) -> Self {
        self.reorder = reorder;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Filter by combo tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.combo_tags = Some(tags);
        self
    }

    pub fn eigen_settings(&self) -> EigenSettings {
        EigenSettings {
            tolerance: self.eigen_tolerance,
            max_iterations: self.max_eigen_iterations,
        }
    }

    /// Reject option values no run could honour
    pub fn validate(&self) -> FrameResult<()> {
        if !(self.pivot_tolerance.is_finite() && self.pivot_tolerance > 0.0) {
            return Err(FrameError::InvalidArgument(format!(
                "pivot tolerance must be positive, got {}",
                self.pivot_tolerance
            )));
        }
        if self.analysis_type.includes_modal() {
            if self.num_modes == 0 {
                return Err(FrameError::InvalidArgument(
                    "number of modes must be at least 1".to_string(),
                ));
            }
            if !(self.eigen_tolerance.is_finite() && self.eigen_tolerance > 0.0) {
                return Err(FrameError::InvalidArgument(
                    "eigen tolerance must be positive".to_string(),
                ));
            }
        }
        if self.diagram_stations < 2 {
            return Err(FrameError::InvalidArgument(
                "diagram needs at least 2 stations".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a run and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the run stops at its next check
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> FrameResult<()> {
        if self.is_cancelled() {
            Err(FrameError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ========================
// Run pipeline
// ========================

/// Combinations a run analyses: the explicit list, or the model's stored
/// combinations, filtered by tag
fn select_combinations(
    model: &StructuralModel,
    explicit: &[LoadCombination],
    tags: Option<&[String]>,
) -> Vec<LoadCombination> {
    let all: Vec<LoadCombination> = if explicit.is_empty() {
        model.combinations().map(|(_, c)| c.clone()).collect()
    } else {
        explicit.to_vec()
    };
    match tags {
        Some(tags) => all
            .into_iter()
            .filter(|c| c.tags.iter().any(|t| tags.contains(t)))
            .collect(),
        None => all,
    }
}

fn run_static(
    model: &StructuralModel,
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    combinations: &[LoadCombination],
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> FrameResult<Vec<CombinationResult>> {
    let loads = combinations
        .iter()
        .map(|combination| combine(model, system, combination))
        .collect::<FrameResult<Vec<_>>>()?;
    cancel.check()?;

    let solutions = solve_many(system, factor, &loads, options.parallel, cancel)?;
    cancel.check()?;

    loads
        .iter()
        .zip(&solutions)
        .map(|(combined, solution)| {
            postprocess::combination_result(model, system, combined, solution, options.diagram_stations)
        })
        .collect()
}

fn run_modal(
    system: &AssembledSystem,
    factor: &SkylineCholesky,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> FrameResult<Vec<ModeResult>> {
    let modes = solve_modes(system, factor, options.num_modes, &options.eigen_settings(), cancel)?;
    Ok(modes
        .iter()
        .map(|mode| postprocess::mode_result(system, mode))
        .collect())
}

#[cfg(feature = "parallel")]
fn join<A, B, RA, RB>(parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if parallel {
        rayon::join(a, b)
    } else {
        (a(), b())
    }
}

#[cfg(not(feature = "parallel"))]
fn join<A, B, RA, RB>(_parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    (a(), b())
}

/// Run an analysis on a model snapshot.
///
/// With an empty `combinations` slice the model's stored combinations are
/// used. The snapshot is read-only for the whole run; nothing is written
/// back. A cancelled run returns `Err(Cancelled)` and no partial results.
pub fn run(
    snapshot: &ModelSnapshot,
    combinations: &[LoadCombination],
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> FrameResult<AnalysisResults> {
    options.validate()?;
    let started = Instant::now();
    let model = snapshot.model();

    let combinations = if options.analysis_type.includes_static() {
        let selected = select_combinations(model, combinations, options.combo_tags.as_deref());
        if selected.is_empty() {
            return Err(FrameError::InvalidArgument(
                "static analysis requested without any load combination".to_string(),
            ));
        }
        selected
    } else {
        Vec::new()
    };
    cancel.check()?;

    let mass = options
        .analysis_type
        .includes_modal()
        .then_some(options.mass_formulation);
    let system = assemble(model, mass)?;
    cancel.check()?;

    let factor = factorize(&system, options.pivot_tolerance, options.reorder, cancel)?;
    cancel.check()?;

    let (static_results, modes) = match options.analysis_type {
        AnalysisType::Static => (
            run_static(model, &system, &factor, &combinations, options, cancel)?,
            Vec::new(),
        ),
        AnalysisType::Modal => (Vec::new(), run_modal(&system, &factor, options, cancel)?),
        AnalysisType::StaticAndModal => {
            let (static_results, modes) = join(
                options.parallel,
                || run_static(model, &system, &factor, &combinations, options, cancel),
                || run_modal(&system, &factor, options, cancel),
            );
            (static_results?, modes?)
        }
    };

    if cancel.is_cancelled() {
        warn!("run on model version {} cancelled", snapshot.version());
        return Err(FrameError::Cancelled);
    }

    let envelope = Envelope::from_results(&static_results);
    if options.log {
        info!(
            "analysis of model version {}: {} combinations, {} modes in {:?}",
            snapshot.version(),
            static_results.len(),
            modes.len(),
            started.elapsed()
        );
    } else {
        debug!("analysis finished in {:?}", started.elapsed());
    }

    Ok(AnalysisResults {
        model_version: snapshot.version(),
        units: model.units().clone(),
        node_ids: system.dof_map.node_ids().to_vec(),
        static_results,
        modes,
        envelope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BoundaryCondition, Element, Material, Node, Section};
    use crate::loads::{Load, LoadCase};

    fn portal() -> StructuralModel {
        let mut model = StructuralModel::new();
        model.add_node("A", Node::new(0.0, 0.0, 0.0)).unwrap();
        model.add_node("B", Node::new(0.0, 4.0, 0.0)).unwrap();
        model.add_node("C", Node::new(6.0, 4.0, 0.0)).unwrap();
        model.add_node("D", Node::new(6.0, 0.0, 0.0)).unwrap();
        model.add_material("Steel", Material::steel()).unwrap();
        model
            .add_section("S", Section::rectangular(0.2, 0.3))
            .unwrap();
        model.add_element("C1", Element::column("A", "B", "Steel", "S")).unwrap();
        model.add_element("B1", Element::beam("B", "C", "Steel", "S")).unwrap();
        model.add_element("C2", Element::column("D", "C", "Steel", "S")).unwrap();
        for support in ["A", "D"] {
            model
                .set_boundary_condition(support, BoundaryCondition::fixed())
                .unwrap();
        }
        model.add_load_case("D", LoadCase::dead("Dead")).unwrap();
        model.add_load_case("W", LoadCase::wind("Wind")).unwrap();
        model
            .add_load("q", Load::uniform("D", "B1", [0.0, -5e3, 0.0], crate::loads::LoadAxes::Global))
            .unwrap();
        model
            .add_load("w", Load::node_force("W", "B", 10e3, 0.0, 0.0))
            .unwrap();
        model
            .add_combination(LoadCombination::single("DL", "D").with_tag("service"))
            .unwrap();
        model
            .add_combination(
                LoadCombination::new("ULS")
                    .with_case("D", 1.2)
                    .with_case("W", 1.6)
                    .with_tag("strength"),
            )
            .unwrap();
        model.assign_dof_numbering();
        model
    }

    #[test]
    fn test_stored_combinations_and_tag_filter() {
        let snapshot = portal().snapshot();
        let results = run(&snapshot, &[], &AnalysisOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(results.static_results.len(), 2);
        assert!(results.envelope.is_some());
        assert_eq!(results.model_version, snapshot.version());

        let options = AnalysisOptions::default().with_tags(vec!["strength".to_string()]);
        let results = run(&snapshot, &[], &options, &CancelToken::new()).unwrap();
        assert_eq!(results.static_results.len(), 1);
        assert_eq!(results.static_results[0].combination, "ULS");
    }

    #[test]
    fn test_static_and_modal_share_one_run() {
        let snapshot = portal().snapshot();
        let options = AnalysisOptions::static_and_modal(3);
        let results = run(&snapshot, &[], &options, &CancelToken::new()).unwrap();
        assert_eq!(results.static_results.len(), 2);
        assert_eq!(results.modes.len(), 3);
        assert!(results.modes[0].frequency > 0.0);
        assert_eq!(results.modes[0].shape.len(), 24);
    }

    #[test]
    fn test_cancelled_run_publishes_nothing() {
        let snapshot = portal().snapshot();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            run(&snapshot, &[], &AnalysisOptions::default(), &cancel),
            Err(FrameError::Cancelled)
        ));
    }

    #[test]
    fn test_invalid_options() {
        let snapshot = portal().snapshot();
        let cancel = CancelToken::new();
        assert!(matches!(
            run(&snapshot, &[], &AnalysisOptions::modal(0), &cancel),
            Err(FrameError::InvalidArgument(_))
        ));
        assert!(matches!(
            run(&snapshot, &[], &AnalysisOptions::default().with_diagram_stations(1), &cancel),
            Err(FrameError::InvalidArgument(_))
        ));
        let no_combos = AnalysisOptions::default().with_tags(vec!["seismic".to_string()]);
        assert!(matches!(
            run(&snapshot, &[], &no_combos, &cancel),
            Err(FrameError::InvalidArgument(_))
        ));
    }
}
