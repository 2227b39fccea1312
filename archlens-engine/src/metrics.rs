//! Coupling metrics and risk rankings.
//!
//! Every query is a full scan of one graph view; nothing is maintained
//! incrementally. Empty or partially ingested graphs yield empty or zero
//! reports, never errors.
//!
//! Per module `m`:
//! - **Ca**: distinct modules with a DEPENDS_ON edge into `m`
//! - **Ce**: distinct modules `m` has a DEPENDS_ON edge to
//! - **Instability**: `Ce / (Ca + Ce)`, or 0.0 for an isolated module
//!
//! Self-dependencies do not count towards either side.

use crate::config::MetricsConfig;
use archlens_graph::{EdgeKind, NodeId, NodeKind, ProjectGraph, TraversalDirection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Coupling classification, applied to Ca and Ce independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CouplingLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CouplingLevel {
    /// >10 very high, >5 high, >2 medium, else low.
    pub fn from_count(count: usize) -> Self {
        match count {
            c if c > 10 => CouplingLevel::VeryHigh,
            c if c > 5 => CouplingLevel::High,
            c if c > 2 => CouplingLevel::Medium,
            _ => CouplingLevel::Low,
        }
    }
}

impl std::fmt::Display for CouplingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouplingLevel::Low => write!(f, "Low"),
            CouplingLevel::Medium => write!(f, "Medium"),
            CouplingLevel::High => write!(f, "High"),
            CouplingLevel::VeryHigh => write!(f, "Very High"),
        }
    }
}

/// Coupling of one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCoupling {
    pub id: NodeId,
    pub ca: usize,
    pub ce: usize,
    pub instability: f64,
    pub afferent_level: CouplingLevel,
    pub efferent_level: CouplingLevel,
    /// The higher of the two levels
    pub coupling_level: CouplingLevel,
}

impl ModuleCoupling {
    fn new(id: NodeId, ca: usize, ce: usize) -> Self {
        let instability = if ca + ce == 0 {
            0.0
        } else {
            ce as f64 / (ca + ce) as f64
        };
        let afferent_level = CouplingLevel::from_count(ca);
        let efferent_level = CouplingLevel::from_count(ce);
        Self {
            id,
            ca,
            ce,
            instability,
            afferent_level,
            efferent_level,
            coupling_level: afferent_level.max(efferent_level),
        }
    }
}

/// Dependency density of a project.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    Ratio(f64),
    /// Fewer than two modules
    Undefined,
}

impl Density {
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Density::Ratio(r) => Some(*r),
            Density::Undefined => None,
        }
    }
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Density::Ratio(r) => write!(f, "{:.3}", r),
            Density::Undefined => write!(f, "N/A"),
        }
    }
}

/// Project-level aggregate metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    pub module_count: usize,
    pub total_dependencies: usize,
    /// Mean DEPENDS_ON weight, 0.0 without edges
    pub avg_weight: f64,
    pub density: Density,
    /// Mean instability over all modules, 0.0 without modules
    pub avg_instability: f64,
}

/// Per-module coupling plus the project aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouplingReport {
    /// Sorted by module id
    pub modules: Vec<ModuleCoupling>,
    pub project: ProjectMetrics,
}

impl CouplingReport {
    pub fn module(&self, id: &NodeId) -> Option<&ModuleCoupling> {
        self.modules.iter().find(|m| &m.id == id)
    }
}

/// A function ranked by call frequency times complexity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotPath {
    pub function_id: NodeId,
    pub complexity: u64,
    /// Sum of frequencies over incoming CALLS edges
    pub call_frequency: u64,
    pub risk_score: u64,
}

/// A module many others depend on, directly or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalModule {
    pub id: NodeId,
    /// Distinct modules depending on this one over any path length
    pub impact: usize,
}

/// A module with high fan-in and high fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub id: NodeId,
    pub in_degree: usize,
    pub out_degree: usize,
}

impl Bottleneck {
    pub fn total_degree(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

/// Computes coupling metrics over one graph view.
pub struct MetricsEngine<'a> {
    graph: &'a ProjectGraph,
    config: MetricsConfig,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(graph: &'a ProjectGraph) -> Self {
        Self::with_config(graph, MetricsConfig::default())
    }

    pub fn with_config(graph: &'a ProjectGraph, config: MetricsConfig) -> Self {
        Self { graph, config }
    }

    /// Distinct (dependents, dependencies) of every module, self excluded.
    fn neighbor_sets(&self) -> HashMap<&'a NodeId, (HashSet<&'a NodeId>, HashSet<&'a NodeId>)> {
        let graph: &'a ProjectGraph = self.graph;
        let mut sets: HashMap<&NodeId, (HashSet<&NodeId>, HashSet<&NodeId>)> = graph
            .nodes_by_kind(NodeKind::Module)
            .map(|n| (&n.id, Default::default()))
            .collect();

        for edge in graph.edges_by_kind(EdgeKind::DependsOn) {
            if edge.source == edge.target {
                continue;
            }
            if let Some((_, out)) = sets.get_mut(&edge.source) {
                out.insert(&edge.target);
            }
            if let Some((incoming, _)) = sets.get_mut(&edge.target) {
                incoming.insert(&edge.source);
            }
        }

        sets
    }

    /// Coupling of a single module, if it exists.
    pub fn module_coupling(&self, id: &NodeId) -> Option<ModuleCoupling> {
        let node = self.graph.get_node(id)?;
        if node.kind != NodeKind::Module {
            return None;
        }
        let ca: HashSet<_> = self
            .graph
            .dependents(id)
            .into_iter()
            .filter(|n| &n.id != id)
            .map(|n| &n.id)
            .collect();
        let ce: HashSet<_> = self
            .graph
            .dependencies(id)
            .into_iter()
            .filter(|n| &n.id != id)
            .map(|n| &n.id)
            .collect();
        Some(ModuleCoupling::new(id.clone(), ca.len(), ce.len()))
    }

    /// Coupling of every module, sorted by id.
    pub fn module_couplings(&self) -> Vec<ModuleCoupling> {
        let mut modules: Vec<_> = self
            .neighbor_sets()
            .into_iter()
            .map(|(id, (incoming, out))| ModuleCoupling::new(id.clone(), incoming.len(), out.len()))
            .collect();
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        modules
    }

    /// Project-level aggregates.
    pub fn project_metrics(&self) -> ProjectMetrics {
        self.aggregate(&self.module_couplings())
    }

    fn aggregate(&self, modules: &[ModuleCoupling]) -> ProjectMetrics {
        let module_count = modules.len();
        let weights: Vec<f64> = self
            .graph
            .edges_by_kind(EdgeKind::DependsOn)
            .filter_map(|e| e.weight())
            .collect();
        let total_dependencies = weights.len();

        let avg_weight = if total_dependencies == 0 {
            0.0
        } else {
            weights.iter().sum::<f64>() / total_dependencies as f64
        };

        let density = if module_count < 2 {
            Density::Undefined
        } else {
            Density::Ratio(total_dependencies as f64 / (module_count * (module_count - 1)) as f64)
        };

        let avg_instability = if module_count == 0 {
            0.0
        } else {
            modules.iter().map(|m| m.instability).sum::<f64>() / module_count as f64
        };

        ProjectMetrics {
            module_count,
            total_dependencies,
            avg_weight,
            density,
            avg_instability,
        }
    }

    /// Full coupling report.
    pub fn coupling_report(&self) -> CouplingReport {
        let modules = self.module_couplings();
        let project = self.aggregate(&modules);
        CouplingReport { modules, project }
    }

    /// Functions ranked by risk, highest first. Ties break on id.
    pub fn hot_paths(&self, limit: Option<usize>) -> Vec<HotPath> {
        let mut ranked: Vec<HotPath> = self
            .graph
            .nodes_by_kind(NodeKind::Function)
            .map(|function| {
                let call_frequency: u64 = self
                    .graph
                    .edges_to_by_kind(&function.id, EdgeKind::Calls)
                    .iter()
                    .filter_map(|e| e.frequency())
                    .fold(0u64, u64::saturating_add);
                let complexity = function.complexity();
                HotPath {
                    function_id: function.id.clone(),
                    complexity,
                    call_frequency,
                    risk_score: call_frequency.saturating_mul(complexity),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then_with(|| a.function_id.cmp(&b.function_id))
        });
        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        ranked
    }

    /// Modules whose transitive dependents exceed the impact threshold,
    /// highest impact first.
    pub fn critical_modules(&self) -> Vec<CriticalModule> {
        let mut critical: Vec<CriticalModule> = self
            .graph
            .nodes_by_kind(NodeKind::Module)
            .map(|m| CriticalModule {
                id: m.id.clone(),
                impact: self
                    .graph
                    .reachable(&m.id, EdgeKind::DependsOn, TraversalDirection::Incoming)
                    .len(),
            })
            .filter(|c| c.impact > self.config.impact_threshold)
            .collect();

        critical.sort_by(|a, b| b.impact.cmp(&a.impact).then_with(|| a.id.cmp(&b.id)));
        critical
    }

    /// Modules whose direct in- and out-degree both exceed the bottleneck
    /// degree, ranked by their sum.
    pub fn bottlenecks(&self) -> Vec<Bottleneck> {
        let threshold = self.config.bottleneck_degree;
        let mut bottlenecks: Vec<Bottleneck> = self
            .neighbor_sets()
            .into_iter()
            .filter(|(_, (incoming, out))| incoming.len() > threshold && out.len() > threshold)
            .map(|(id, (incoming, out))| Bottleneck {
                id: id.clone(),
                in_degree: incoming.len(),
                out_degree: out.len(),
            })
            .collect();

        bottlenecks.sort_by(|a, b| {
            b.total_degree()
                .cmp(&a.total_degree())
                .then_with(|| a.id.cmp(&b.id))
        });
        bottlenecks
    }
}
