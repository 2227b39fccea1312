//! Architectural drift detection.
//!
//! Compares a project's live graph against its current baseline and checks
//! two standing rules:
//!
//! - **Layer violation**: a data-layer module depending on a
//!   presentation-layer module. Always flagged, baseline or not.
//! - **High coupling**: a module whose efferent coupling exceeds the
//!   threshold. Severity grows with the excess.
//!
//! Every comparison appends the violations it finds to the graph as
//! VIOLATES edges. Those edges form a log; they are never merged or pruned.

use crate::baseline::{Baseline, BaselineError, BaselineStore, MetricsSnapshot, ModuleMetricSnapshot};
use crate::config::DriftConfig;
use crate::metrics::MetricsEngine;
use archlens_graph::{
    EdgeKind, GraphError, GraphStore, LayerType, NodeId, ProjectGraph, ProjectId, Relation,
    Severity, Violation,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub const LAYER_VIOLATION: &str = "layer_violation";
pub const HIGH_COUPLING: &str = "high_coupling";

/// Kind of measured divergence from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    ModuleCount,
    DependencyCount,
    /// A module crossed the efferent threshold since the baseline
    NewHighCoupling,
}

impl std::fmt::Display for DriftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftType::ModuleCount => write!(f, "module_count"),
            DriftType::DependencyCount => write!(f, "dependency_count"),
            DriftType::NewHighCoupling => write!(f, "new_high_coupling"),
        }
    }
}

/// One measured divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftEntry {
    pub drift_type: DriftType,
    /// Module the entry is about, for per-module drift
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<NodeId>,
    pub baseline: i64,
    pub current: i64,
    /// `current - baseline`
    pub delta: i64,
}

impl DriftEntry {
    fn new(drift_type: DriftType, subject: Option<NodeId>, baseline: usize, current: usize) -> Self {
        let baseline = baseline as i64;
        let current = current as i64;
        Self {
            drift_type,
            subject,
            baseline,
            current,
            delta: current - baseline,
        }
    }
}

/// A violation, as reported and as recorded on the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub violation_type: String,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

impl ViolationRecord {
    fn to_violation(&self) -> Violation {
        Violation {
            violation_type: self.violation_type.clone(),
            severity: self.severity,
            description: self.description.clone(),
            detected_at: self.detected_at,
        }
    }
}

/// Result of comparing against the current baseline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub project_id: ProjectId,
    pub baseline_id: Uuid,
    pub baseline_version: String,
    pub drifts: Vec<DriftEntry>,
    pub layer_violations: Vec<ViolationRecord>,
    pub coupling_violations: Vec<ViolationRecord>,
    pub checked_at: DateTime<Utc>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.drifts.is_empty()
            || !self.layer_violations.is_empty()
            || !self.coupling_violations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum DriftOutcome {
    /// The project has no current baseline to compare against.
    NoBaseline,
    Report(DriftReport),
}

impl DriftOutcome {
    pub fn report(&self) -> Option<&DriftReport> {
        match self {
            DriftOutcome::Report(report) => Some(report),
            DriftOutcome::NoBaseline => None,
        }
    }
}

/// Severity of a high-coupling violation from how far Ce exceeds the threshold.
pub fn coupling_severity(excess: usize) -> Severity {
    match excess {
        0..=2 => Severity::Low,
        3..=5 => Severity::Medium,
        6..=10 => Severity::High,
        _ => Severity::Critical,
    }
}

/// DEPENDS_ON edges from a data module to a presentation module.
pub fn layer_violations(graph: &ProjectGraph, now: DateTime<Utc>) -> Vec<ViolationRecord> {
    let mut violations: Vec<ViolationRecord> = graph
        .edges_by_kind(EdgeKind::DependsOn)
        .filter_map(|edge| {
            let source = graph.get_node(&edge.source)?;
            let target = graph.get_node(&edge.target)?;
            (source.layer() == LayerType::Data && target.layer() == LayerType::Presentation).then(
                || ViolationRecord {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    violation_type: LAYER_VIOLATION.to_string(),
                    severity: Severity::High,
                    description: format!(
                        "Data layer module {} depends on presentation layer module {}",
                        source.name, target.name
                    ),
                    detected_at: now,
                },
            )
        })
        .collect();

    violations.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    violations
}

/// Modules whose efferent coupling exceeds `threshold`, recorded on the module itself.
pub fn coupling_violations(
    graph: &ProjectGraph,
    threshold: usize,
    now: DateTime<Utc>,
) -> Vec<ViolationRecord> {
    MetricsEngine::new(graph)
        .module_couplings()
        .into_iter()
        .filter(|m| m.ce > threshold)
        .map(|m| ViolationRecord {
            source: m.id.clone(),
            target: m.id.clone(),
            violation_type: HIGH_COUPLING.to_string(),
            severity: coupling_severity(m.ce - threshold),
            description: format!(
                "Module {} depends on {} modules (threshold {})",
                m.id, m.ce, threshold
            ),
            detected_at: now,
        })
        .collect()
}

/// Runs drift checks for projects in a [`GraphStore`].
pub struct DriftDetector<'a> {
    store: &'a GraphStore,
    baselines: &'a dyn BaselineStore,
    config: DriftConfig,
}

impl<'a> DriftDetector<'a> {
    pub fn new(store: &'a GraphStore, baselines: &'a dyn BaselineStore) -> Self {
        Self::with_config(store, baselines, DriftConfig::default())
    }

    pub fn with_config(
        store: &'a GraphStore,
        baselines: &'a dyn BaselineStore,
        config: DriftConfig,
    ) -> Self {
        Self {
            store,
            baselines,
            config,
        }
    }

    /// Freeze the live graph and its metrics as a new baseline.
    ///
    /// The first baseline of a project always becomes current.
    pub fn capture_baseline(
        &self,
        project: &ProjectId,
        version: impl Into<String>,
        commit: Option<String>,
        make_current: bool,
    ) -> Result<Baseline, BaselineError> {
        let graph = self.store.view(project);
        let report = MetricsEngine::new(&graph).coupling_report();

        let baseline = Baseline {
            id: Uuid::new_v4(),
            project_id: project.clone(),
            version: version.into(),
            commit,
            snapshot: graph.to_snapshot(),
            module_count: report.project.module_count,
            dependency_count: report.project.total_dependencies,
            metrics: MetricsSnapshot {
                modules: report.modules.iter().map(ModuleMetricSnapshot::from).collect(),
                project: report.project,
            },
            is_current: make_current,
            created_at: Utc::now(),
        };

        self.baselines.save(baseline)
    }

    /// Layer check alone; needs no baseline and writes nothing.
    pub fn check_layers(&self, project: &ProjectId) -> Vec<ViolationRecord> {
        layer_violations(&self.store.view(project), Utc::now())
    }

    /// Compare the live graph to the current baseline.
    pub fn compare(&self, project: &ProjectId) -> Result<DriftOutcome, GraphError> {
        self.compare_at(project, Utc::now())
    }

    /// Compare, stamping findings with `now`.
    pub fn compare_at(
        &self,
        project: &ProjectId,
        now: DateTime<Utc>,
    ) -> Result<DriftOutcome, GraphError> {
        let Some(baseline) = self.baselines.current(project) else {
            tracing::debug!("No baseline for {}, skipping drift check", project);
            return Ok(DriftOutcome::NoBaseline);
        };

        let graph = self.store.view(project);
        let threshold = self.config.efferent_threshold;
        let metrics = MetricsEngine::new(&graph).coupling_report();

        let mut drifts = Vec::new();
        if metrics.project.module_count != baseline.module_count {
            drifts.push(DriftEntry::new(
                DriftType::ModuleCount,
                None,
                baseline.module_count,
                metrics.project.module_count,
            ));
        }
        if metrics.project.total_dependencies != baseline.dependency_count {
            drifts.push(DriftEntry::new(
                DriftType::DependencyCount,
                None,
                baseline.dependency_count,
                metrics.project.total_dependencies,
            ));
        }

        let previously_high: HashSet<&NodeId> = baseline
            .metrics
            .modules
            .iter()
            .filter(|m| m.ce > threshold)
            .map(|m| &m.id)
            .collect();
        for module in metrics.modules.iter().filter(|m| m.ce > threshold) {
            if previously_high.contains(&module.id) {
                continue;
            }
            let before = baseline.metrics.module(&module.id).map_or(0, |m| m.ce);
            drifts.push(DriftEntry::new(
                DriftType::NewHighCoupling,
                Some(module.id.clone()),
                before,
                module.ce,
            ));
        }

        let layer = layer_violations(&graph, now);
        let coupling = coupling_violations(&graph, threshold, now);
        self.record(project, layer.iter().chain(coupling.iter()))?;

        tracing::info!(
            "Drift check for {} against {}: {} drifts, {} layer violations, {} coupling violations",
            project,
            baseline.version,
            drifts.len(),
            layer.len(),
            coupling.len()
        );

        Ok(DriftOutcome::Report(DriftReport {
            project_id: project.clone(),
            baseline_id: baseline.id,
            baseline_version: baseline.version,
            drifts,
            layer_violations: layer,
            coupling_violations: coupling,
            checked_at: now,
        }))
    }

    /// Append violations as VIOLATES edges in one transaction.
    fn record<'v>(
        &self,
        project: &ProjectId,
        violations: impl Iterator<Item = &'v ViolationRecord>,
    ) -> Result<(), GraphError> {
        let violations: Vec<_> = violations.collect();
        if violations.is_empty() {
            return Ok(());
        }
        self.store.transaction(project, |graph| {
            for v in &violations {
                graph.record_violation(&v.source, &v.target, v.to_violation())?;
            }
            Ok(())
        })
    }

    /// VIOLATES edges detected within `window` before `now`, most severe
    /// first, then most recent first.
    pub fn recent_violations_at(
        &self,
        project: &ProjectId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Vec<ViolationRecord> {
        let graph = self.store.view(project);
        let since = now - window;

        let mut recent: Vec<ViolationRecord> = graph
            .edges_by_kind(EdgeKind::Violates)
            .filter_map(|edge| match &edge.relation {
                Relation::Violates {
                    violation_type,
                    severity,
                    description,
                    detected_at,
                } if *detected_at >= since && *detected_at <= now => Some(ViolationRecord {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    violation_type: violation_type.clone(),
                    severity: *severity,
                    description: description.clone(),
                    detected_at: *detected_at,
                }),
                _ => None,
            })
            .collect();

        recent.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.detected_at.cmp(&a.detected_at))
                .then_with(|| a.source.cmp(&b.source))
        });
        recent
    }

    /// Recent violations over the configured window, up to the current time.
    pub fn recent_violations(&self, project: &ProjectId) -> Vec<ViolationRecord> {
        self.recent_violations_at(project, Utc::now(), self.config.recent_window())
    }
}
