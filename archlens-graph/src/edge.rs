//! Edge types and structures for the architecture graph.

use crate::error::EdgeError;
use crate::node::{NodeId, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Structural hierarchy
    /// Direction: parent → child
    Contains,

    /// Module depends on another module
    /// Direction: dependent → dependency
    DependsOn,

    /// Function calls another function
    /// Direction: caller → callee
    Calls,

    /// Derived architectural violation written by drift detection
    /// Direction: offending module → affected module
    Violates,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::DependsOn => "DEPENDS_ON",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Violates => "VIOLATES",
        }
    }

    /// Valid source node kinds for this edge kind.
    pub fn valid_source_kinds(&self) -> &[NodeKind] {
        match self {
            EdgeKind::Contains => &[
                NodeKind::Project,
                NodeKind::Module,
                NodeKind::File,
                NodeKind::Class,
            ],
            EdgeKind::DependsOn | EdgeKind::Violates => &[NodeKind::Module],
            EdgeKind::Calls => &[NodeKind::Function],
        }
    }

    /// Valid target node kinds for this edge kind.
    pub fn valid_target_kinds(&self) -> &[NodeKind] {
        match self {
            EdgeKind::Contains => &[
                NodeKind::Module,
                NodeKind::File,
                NodeKind::Class,
                NodeKind::Function,
            ],
            EdgeKind::DependsOn | EdgeKind::Violates => &[NodeKind::Module],
            EdgeKind::Calls => &[NodeKind::Function],
        }
    }

    /// Check that `source → target` is a legal pairing for this kind.
    pub fn validate_endpoints(&self, source: NodeKind, target: NodeKind) -> Result<(), EdgeError> {
        if !self.valid_source_kinds().contains(&source) {
            return Err(EdgeError::InvalidSourceKind {
                edge_kind: *self,
                actual: source,
                expected: self.valid_source_kinds().to_vec(),
            });
        }
        if !self.valid_target_kinds().contains(&target) {
            return Err(EdgeError::InvalidTargetKind {
                edge_kind: *self,
                actual: target,
                expected: self.valid_target_kinds().to_vec(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hierarchy level of a CONTAINS edge, named after the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainmentLevel {
    Module,
    File,
    Class,
    Method,
}

impl ContainmentLevel {
    /// Level implied by the kind of the contained node.
    pub fn for_child(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Module => Some(ContainmentLevel::Module),
            NodeKind::File => Some(ContainmentLevel::File),
            NodeKind::Class => Some(ContainmentLevel::Class),
            NodeKind::Function => Some(ContainmentLevel::Method),
            NodeKind::Project => None,
        }
    }
}

/// Ordered severity of a violation or finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Kind-specific properties stored on an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    Contains {
        level: ContainmentLevel,
    },
    DependsOn {
        dependency_type: String,
        weight: f64,
    },
    Calls {
        /// Observed call-site count, cumulative across ingestion passes
        frequency: u64,
        call_type: String,
    },
    Violates {
        violation_type: String,
        severity: Severity,
        description: String,
        detected_at: DateTime<Utc>,
    },
}

impl Relation {
    pub fn kind(&self) -> EdgeKind {
        match self {
            Relation::Contains { .. } => EdgeKind::Contains,
            Relation::DependsOn { .. } => EdgeKind::DependsOn,
            Relation::Calls { .. } => EdgeKind::Calls,
            Relation::Violates { .. } => EdgeKind::Violates,
        }
    }
}

/// Input for merging a CONTAINS, DEPENDS_ON or CALLS edge.
///
/// VIOLATES edges are append-only and go through
/// [`ProjectGraph::record_violation`](crate::ProjectGraph::record_violation).
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeMerge {
    Contains { level: ContainmentLevel },
    /// Overwrites type and weight on an existing edge
    DependsOn { dependency_type: String, weight: f64 },
    /// Increments frequency by one and overwrites the call type
    Calls { call_type: String },
}

impl EdgeMerge {
    pub fn kind(&self) -> EdgeKind {
        match self {
            EdgeMerge::Contains { .. } => EdgeKind::Contains,
            EdgeMerge::DependsOn { .. } => EdgeKind::DependsOn,
            EdgeMerge::Calls { .. } => EdgeKind::Calls,
        }
    }

    pub fn depends_on(dependency_type: impl Into<String>, weight: f64) -> Self {
        EdgeMerge::DependsOn {
            dependency_type: dependency_type.into(),
            weight,
        }
    }

    pub fn calls(call_type: impl Into<String>) -> Self {
        EdgeMerge::Calls {
            call_type: call_type.into(),
        }
    }
}

/// Input for appending a VIOLATES edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub violation_type: String,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

/// An edge representing a relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node ID
    pub source: NodeId,

    /// Target node ID
    pub target: NodeId,

    #[serde(flatten)]
    pub relation: Relation,

    /// When this edge was first written
    pub created_at: DateTime<Utc>,

    /// When this edge was last merged
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, relation: Relation) -> Self {
        let now = Utc::now();
        Self {
            source,
            target,
            relation,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        self.relation.kind()
    }

    /// DEPENDS_ON weight, if this is a dependency edge.
    pub fn weight(&self) -> Option<f64> {
        match &self.relation {
            Relation::DependsOn { weight, .. } => Some(*weight),
            _ => None,
        }
    }

    /// CALLS frequency, if this is a call edge.
    pub fn frequency(&self) -> Option<u64> {
        match &self.relation {
            Relation::Calls { frequency, .. } => Some(*frequency),
            _ => None,
        }
    }
}
