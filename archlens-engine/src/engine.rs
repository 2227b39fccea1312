//! Engine facade wiring the store, ingestion and analyses together.

use crate::baseline::{Baseline, BaselineError, BaselineRegistry, BaselineState, BaselineStore};
use crate::config::EngineConfig;
use crate::cycles::{Cycle, CycleDetector, CycleSearchOutcome};
use crate::drift::{DriftDetector, DriftOutcome, ViolationRecord};
use crate::facts::FactBatch;
use crate::ingest::{IngestError, IngestReport, Ingestor};
use crate::metrics::{Bottleneck, CouplingReport, CriticalModule, HotPath, MetricsEngine};
use archlens_graph::{DeletionSummary, GraphError, GraphStore, Matches, Pattern, ProjectId};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse fact batch: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The architecture analysis engine.
///
/// Cheap to share across threads by reference; every method takes `&self`.
pub struct Engine {
    store: GraphStore,
    baselines: Arc<dyn BaselineStore>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine with an in-memory baseline registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_baseline_store(config, Arc::new(BaselineRegistry::new()))
    }

    /// Engine persisting baselines through an external store.
    pub fn with_baseline_store(config: EngineConfig, baselines: Arc<dyn BaselineStore>) -> Self {
        Self {
            store: GraphStore::new(),
            baselines,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn baselines(&self) -> &dyn BaselineStore {
        self.baselines.as_ref()
    }

    // === Ingestion ===

    pub fn ingest(&self, batch: &FactBatch) -> Result<IngestReport, IngestError> {
        Ingestor::new(&self.store).ingest(batch)
    }

    /// Parse a JSON fact batch and ingest it.
    pub fn ingest_json(&self, json: &str) -> Result<IngestReport, EngineError> {
        let batch = FactBatch::from_json(json)?;
        Ok(self.ingest(&batch)?)
    }

    /// Remove a project's graph. Its baselines are kept.
    pub fn delete_project(&self, project: &ProjectId) -> DeletionSummary {
        self.store.delete_project_subgraph(project)
    }

    pub fn query(&self, project: &ProjectId, pattern: impl Into<Pattern>) -> Matches {
        self.store.query(project, pattern)
    }

    // === Cycles ===

    pub fn direct_cycles(&self, project: &ProjectId) -> Vec<Cycle> {
        CycleDetector::new(&self.store.view(project)).direct_cycles()
    }

    /// Cycles up to the configured maximum length.
    pub fn cycles(&self, project: &ProjectId) -> Vec<Cycle> {
        CycleDetector::new(&self.store.view(project)).bounded_cycles(self.config.cycles.max_length)
    }

    /// Every cycle regardless of length. Cancellable.
    pub fn all_cycles(&self, project: &ProjectId, cancel: &CancellationToken) -> CycleSearchOutcome {
        CycleDetector::new(&self.store.view(project)).all_cycles(cancel)
    }

    // === Metrics ===

    pub fn coupling_report(&self, project: &ProjectId) -> CouplingReport {
        let graph = self.store.view(project);
        MetricsEngine::with_config(&graph, self.config.metrics.clone()).coupling_report()
    }

    pub fn hot_paths(&self, project: &ProjectId, limit: Option<usize>) -> Vec<HotPath> {
        let graph = self.store.view(project);
        MetricsEngine::with_config(&graph, self.config.metrics.clone()).hot_paths(limit)
    }

    pub fn critical_modules(&self, project: &ProjectId) -> Vec<CriticalModule> {
        let graph = self.store.view(project);
        MetricsEngine::with_config(&graph, self.config.metrics.clone()).critical_modules()
    }

    pub fn bottlenecks(&self, project: &ProjectId) -> Vec<Bottleneck> {
        let graph = self.store.view(project);
        MetricsEngine::with_config(&graph, self.config.metrics.clone()).bottlenecks()
    }

    // === Drift ===

    fn drift(&self) -> DriftDetector<'_> {
        DriftDetector::with_config(&self.store, self.baselines.as_ref(), self.config.drift.clone())
    }

    pub fn capture_baseline(
        &self,
        project: &ProjectId,
        version: impl Into<String>,
        commit: Option<String>,
        make_current: bool,
    ) -> Result<Baseline, BaselineError> {
        self.drift()
            .capture_baseline(project, version, commit, make_current)
    }

    pub fn set_current_baseline(&self, project: &ProjectId, id: Uuid) -> Result<(), BaselineError> {
        self.baselines.set_current(project, id)
    }

    pub fn baseline_state(&self, project: &ProjectId) -> BaselineState {
        self.baselines.state(project)
    }

    pub fn compare(&self, project: &ProjectId) -> Result<DriftOutcome, GraphError> {
        self.drift().compare(project)
    }

    pub fn layer_violations(&self, project: &ProjectId) -> Vec<ViolationRecord> {
        self.drift().check_layers(project)
    }

    pub fn recent_violations(&self, project: &ProjectId) -> Vec<ViolationRecord> {
        self.drift().recent_violations(project)
    }
}
