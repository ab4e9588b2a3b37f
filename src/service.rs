//! Worker pool for analysis runs
//!
//! Each run is a unit of work executed on tokio's blocking pool, separate
//! from whatever async code submits it. A semaphore caps how many runs
//! compute at once; the rest wait in `Queued`.

use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::analysis::{self, AnalysisOptions, CancelToken};
use crate::error::{FrameError, FrameResult};
use crate::loads::LoadCombination;
use crate::model::ModelSnapshot;
use crate::results::AnalysisResults;

/// Environment variable overriding the worker count
pub const WORKERS_ENV: &str = "FRAME_SOLVER_WORKERS";

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Maximum number of runs computing at the same time
    pub workers: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { workers }
    }
}

impl ServiceConfig {
    /// Read the worker count from `FRAME_SOLVER_WORKERS`, falling back to
    /// the number of available cores
    pub fn from_env() -> Self {
        match std::env::var(WORKERS_ENV) {
            Ok(value) => match value.trim().parse::<usize>() {
                Ok(workers) if workers > 0 => Self { workers },
                _ => {
                    warn!("ignoring invalid {}={:?}", WORKERS_ENV, value);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed { error: String },
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }
}

/// Status record of one run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub status: RunStatus,
    pub model_version: u64,
    submitted: Instant,
    finished: Option<Instant>,
}

impl RunRecord {
    /// Time since submission, frozen once the run finishes
    pub fn elapsed(&self) -> Duration {
        self.finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.submitted)
    }
}

type RunTable = Arc<Mutex<HashMap<u64, RunRecord>>>;

/// Handle to a submitted run
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    cancel: CancelToken,
    task: JoinHandle<FrameResult<AnalysisResults>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation; the run stops at its next check
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run's outcome
    pub async fn wait(self) -> FrameResult<AnalysisResults> {
        self.task
            .await
            .map_err(|err| FrameError::Worker(err.to_string()))?
    }
}

/// Bounded pool executing analysis runs
#[derive(Debug)]
pub struct AnalysisService {
    config: ServiceConfig,
    permits: Arc<Semaphore>,
    runs: RunTable,
    next_id: AtomicU64,
}

impl AnalysisService {
    pub fn new(config: ServiceConfig) -> Self {
        let workers = config.workers.max(1);
        info!("analysis service with {} workers", workers);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            config,
            runs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Queue a run. Must be called from within a tokio runtime.
    pub async fn submit(
        &self,
        snapshot: ModelSnapshot,
        combinations: Vec<LoadCombination>,
        options: AnalysisOptions,
    ) -> RunHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        self.runs.lock().await.insert(
            id,
            RunRecord {
                status: RunStatus::Queued,
                model_version: snapshot.version(),
                submitted: Instant::now(),
                finished: None,
            },
        );

        let permits = Arc::clone(&self.permits);
        let runs = Arc::clone(&self.runs);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = execute(id, permits, &runs, snapshot, combinations, options, token).await;
            let status = match &outcome {
                Ok(_) => RunStatus::Completed,
                Err(FrameError::Cancelled) => RunStatus::Cancelled,
                Err(err) => RunStatus::Failed {
                    error: err.to_string(),
                },
            };
            set_status(&runs, id, status).await;
            outcome
        });

        RunHandle { id, cancel, task }
    }

    /// Current status of a run, `None` for unknown ids
    pub async fn status(&self, id: u64) -> Option<RunRecord> {
        self.runs.lock().await.get(&id).cloned()
    }

    /// Drop the records of finished runs
    pub async fn prune(&self) -> usize {
        let mut runs = self.runs.lock().await;
        let before = runs.len();
        runs.retain(|_, record| !record.status.is_finished());
        before - runs.len()
    }
}

async fn set_status(runs: &RunTable, id: u64, status: RunStatus) {
    if let Some(record) = runs.lock().await.get_mut(&id) {
        if status.is_finished() {
            record.finished = Some(Instant::now());
        }
        record.status = status;
    }
}

async fn execute(
    id: u64,
    permits: Arc<Semaphore>,
    runs: &RunTable,
    snapshot: ModelSnapshot,
    combinations: Vec<LoadCombination>,
    options: AnalysisOptions,
    cancel: CancelToken,
) -> FrameResult<AnalysisResults> {
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|err| FrameError::Worker(err.to_string()))?;
    cancel.check()?;
    set_status(runs, id, RunStatus::Running).await;

    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = analysis::run(&snapshot, &combinations, &options, &cancel);
        drop(permit);
        outcome
    })
    .await
    .map_err(|err| FrameError::Worker(err.to_string()))?;

    match &outcome {
        Ok(_) => info!("run {} finished in {:?}", id, started.elapsed()),
        Err(FrameError::Cancelled) => info!("run {} cancelled", id),
        Err(err) => warn!("run {} failed: {}", id, err),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BoundaryCondition, Element, Material, Node, Section};
    use crate::loads::{Load, LoadCase};
    use crate::model::StructuralModel;

    fn cantilever() -> ModelSnapshot {
        let mut model = StructuralModel::new();
        model.add_node("N1", Node::new(0.0, 0.0, 0.0)).unwrap();
        model.add_node("N2", Node::new(2.0, 0.0, 0.0)).unwrap();
        model.add_material("Steel", Material::steel()).unwrap();
        model
            .add_section("R", Section::rectangular(0.1, 0.2))
            .unwrap();
        model
            .add_element("B1", Element::beam("N1", "N2", "Steel", "R"))
            .unwrap();
        model
            .set_boundary_condition("N1", BoundaryCondition::fixed())
            .unwrap();
        model.add_load_case("D", LoadCase::dead("Dead")).unwrap();
        model
            .add_load("P", Load::node_force("D", "N2", 0.0, -1e3, 0.0))
            .unwrap();
        model
            .add_combination(LoadCombination::single("DL", "D"))
            .unwrap();
        model.assign_dof_numbering();
        model.snapshot()
    }

    #[tokio::test]
    async fn test_runs_complete_and_report_status() {
        let service = AnalysisService::new(ServiceConfig { workers: 1 });
        let snapshot = cantilever();
        let first = service
            .submit(snapshot.clone(), Vec::new(), AnalysisOptions::default())
            .await;
        let second = service
            .submit(snapshot, Vec::new(), AnalysisOptions::modal(2))
            .await;
        let (first_id, second_id) = (first.id(), second.id());

        let statics = first.wait().await.unwrap();
        let modes = second.wait().await.unwrap();
        assert_eq!(statics.static_results.len(), 1);
        assert_eq!(modes.modes.len(), 2);

        for id in [first_id, second_id] {
            let record = service.status(id).await.unwrap();
            assert_eq!(record.status, RunStatus::Completed);
        }
        assert_eq!(service.prune().await, 2);
        assert!(service.status(first_id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_run_publishes_nothing() {
        let service = AnalysisService::new(ServiceConfig { workers: 1 });
        let handle = service
            .submit(cantilever(), Vec::new(), AnalysisOptions::default())
            .await;
        let id = handle.id();
        handle.cancel();
        assert!(matches!(handle.wait().await, Err(FrameError::Cancelled)));
        let record = service.status(id).await.unwrap();
        assert_eq!(record.status, RunStatus::Cancelled);
        assert!(service.permits.available_permits() == 1);
    }

    #[tokio::test]
    async fn test_failed_run_records_error() {
        let service = AnalysisService::new(ServiceConfig { workers: 2 });
        let handle = service
            .submit(cantilever(), Vec::new(), AnalysisOptions::modal(500))
            .await;
        let id = handle.id();
        assert!(matches!(handle.wait().await, Err(FrameError::InvalidArgument(_))));
        match service.status(id).await.unwrap().status {
            RunStatus::Failed { error } => assert!(error.contains("modes")),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
