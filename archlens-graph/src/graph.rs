//! ProjectGraph - the arena-backed property graph of a single project.

use crate::edge::{Edge, EdgeKind, EdgeMerge, Relation, Violation};
use crate::error::{EndpointRole, GraphError};
use crate::node::{Node, NodeId, NodeKind};
use chrono::{DateTime, Utc};
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Metadata about the graph itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Archlens version that created this graph
    pub archlens_version: String,

    /// When the graph was created
    pub created_at: DateTime<Utc>,

    /// When the graph was last modified
    pub modified_at: DateTime<Utc>,

    /// Number of ingestion batches committed into this graph
    pub ingestion_count: u32,

    /// Commit identifier of the last committed batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        Self {
            archlens_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            ingestion_count: 0,
            last_commit: None,
        }
    }
}

/// JSON-serializable representation of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Metadata about the graph
    pub metadata: GraphMetadata,

    /// All nodes in the graph
    pub nodes: Vec<Node>,

    /// All edges in the graph
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    /// Number of Module nodes captured in the snapshot.
    pub fn module_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Module)
            .count()
    }
}

/// The property graph of one project.
///
/// Nodes and edges live in petgraph's index arena; identifiers map to
/// indices so cyclic structures never need owning pointers.
#[derive(Clone)]
pub struct ProjectGraph {
    /// Underlying directed graph from petgraph
    inner: DiGraph<Node, Edge>,

    /// Index from NodeId to petgraph NodeIndex for O(1) lookup
    node_index: HashMap<NodeId, NodeIndex>,

    /// Graph metadata
    pub metadata: GraphMetadata,
}

impl Default for ProjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            inner: DiGraph::new(),
            node_index: HashMap::new(),
            metadata: GraphMetadata::default(),
        }
    }

    // === Node Operations ===

    /// Add or update a node (upsert semantics).
    ///
    /// An existing node keeps every attribute the update does not set;
    /// the update's values win for the ones it does.
    pub fn upsert_node(&mut self, node: Node) -> Result<NodeIndex, GraphError> {
        let idx = if let Some(&idx) = self.node_index.get(&node.id) {
            let existing = &mut self.inner[idx];
            if existing.kind != node.kind {
                return Err(GraphError::KindMismatch {
                    id: node.id,
                    existing: existing.kind,
                    requested: node.kind,
                });
            }
            existing.merge_from(node);
            idx
        } else {
            let id = node.id.clone();
            let idx = self.inner.add_node(node);
            self.node_index.insert(id, idx);
            idx
        };

        self.metadata.modified_at = Utc::now();
        Ok(idx)
    }

    /// Get a node by ID.
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&idx| &self.inner[idx])
    }

    /// Check if a node exists.
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    /// Get count of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner.node_weights()
    }

    /// Get all nodes of a specific kind.
    pub fn nodes_by_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.inner.node_weights().filter(move |n| n.kind == kind)
    }

    /// Number of Module nodes.
    pub fn module_count(&self) -> usize {
        self.nodes_by_kind(NodeKind::Module).count()
    }

    /// The node containing `id`, if any.
    pub fn parent_of(&self, id: &NodeId) -> Option<&Node> {
        let &idx = self.node_index.get(id)?;
        self.parent_index(idx).map(|p| &self.inner[p])
    }

    /// Nodes directly contained by `id`.
    pub fn children_of(&self, id: &NodeId) -> Vec<&Node> {
        self.edges_from_by_kind(id, EdgeKind::Contains)
            .into_iter()
            .filter_map(|e| self.get_node(&e.target))
            .collect()
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .find(|e| e.weight().kind() == EdgeKind::Contains)
            .map(|e| e.source())
    }

    // === Edge Operations ===

    /// Merge an edge between two existing nodes.
    ///
    /// - CONTAINS: created once; a different second parent is rejected.
    /// - DEPENDS_ON: created, or type and weight overwritten.
    /// - CALLS: created at frequency 0, then frequency incremented by one
    ///   and call type overwritten on every merge.
    pub fn merge_edge(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        merge: EdgeMerge,
    ) -> Result<&Edge, GraphError> {
        let kind = merge.kind();
        let (source_idx, target_idx) = self.resolve_endpoints(source, target, kind)?;

        let existing = self.find_edge(source_idx, target_idx, kind);
        let now = Utc::now();

        let edge_idx = match merge {
            EdgeMerge::Contains { level } => {
                if let Some(parent) = self.parent_index(target_idx) {
                    if parent != source_idx {
                        return Err(GraphError::MultipleParents {
                            child: target.clone(),
                            existing_parent: self.inner[parent].id.clone(),
                            parent: source.clone(),
                        });
                    }
                }
                if existing.is_none() && self.is_ancestor_or_self(target_idx, source_idx) {
                    return Err(GraphError::ContainmentCycle {
                        parent: source.clone(),
                        child: target.clone(),
                    });
                }
                match existing {
                    Some(idx) => {
                        let edge = &mut self.inner[idx];
                        edge.relation = Relation::Contains { level };
                        edge.updated_at = now;
                        idx
                    }
                    None => self.inner.add_edge(
                        source_idx,
                        target_idx,
                        Edge::new(source.clone(), target.clone(), Relation::Contains { level }),
                    ),
                }
            }
            EdgeMerge::DependsOn {
                dependency_type,
                weight,
            } => {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(GraphError::InvalidWeight {
                        source_node: source.clone(),
                        target_node: target.clone(),
                        weight,
                    });
                }
                let relation = Relation::DependsOn {
                    dependency_type,
                    weight,
                };
                match existing {
                    Some(idx) => {
                        let edge = &mut self.inner[idx];
                        edge.relation = relation;
                        edge.updated_at = now;
                        idx
                    }
                    None => self.inner.add_edge(
                        source_idx,
                        target_idx,
                        Edge::new(source.clone(), target.clone(), relation),
                    ),
                }
            }
            EdgeMerge::Calls { call_type } => {
                let idx = existing.unwrap_or_else(|| {
                    self.inner.add_edge(
                        source_idx,
                        target_idx,
                        Edge::new(
                            source.clone(),
                            target.clone(),
                            Relation::Calls {
                                frequency: 0,
                                call_type: call_type.clone(),
                            },
                        ),
                    )
                });
                let edge = &mut self.inner[idx];
                if let Relation::Calls {
                    frequency,
                    call_type: stored,
                } = &mut edge.relation
                {
                    *frequency = frequency.saturating_add(1);
                    *stored = call_type;
                }
                edge.updated_at = now;
                idx
            }
        };

        self.metadata.modified_at = now;
        Ok(&self.inner[edge_idx])
    }

    /// Append a VIOLATES edge. Violations are a log and are never merged.
    pub fn record_violation(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        violation: Violation,
    ) -> Result<&Edge, GraphError> {
        let (source_idx, target_idx) =
            self.resolve_endpoints(source, target, EdgeKind::Violates)?;

        let edge = Edge::new(
            source.clone(),
            target.clone(),
            Relation::Violates {
                violation_type: violation.violation_type,
                severity: violation.severity,
                description: violation.description,
                detected_at: violation.detected_at,
            },
        );
        let idx = self.inner.add_edge(source_idx, target_idx, edge);
        self.metadata.modified_at = Utc::now();
        Ok(&self.inner[idx])
    }

    fn resolve_endpoints(
        &self,
        source: &NodeId,
        target: &NodeId,
        kind: EdgeKind,
    ) -> Result<(NodeIndex, NodeIndex), GraphError> {
        let source_idx =
            *self
                .node_index
                .get(source)
                .ok_or_else(|| GraphError::EndpointNotFound {
                    edge_kind: kind,
                    role: EndpointRole::Source,
                    id: source.clone(),
                })?;
        let target_idx =
            *self
                .node_index
                .get(target)
                .ok_or_else(|| GraphError::EndpointNotFound {
                    edge_kind: kind,
                    role: EndpointRole::Target,
                    id: target.clone(),
                })?;

        kind.validate_endpoints(self.inner[source_idx].kind, self.inner[target_idx].kind)?;
        Ok((source_idx, target_idx))
    }

    fn find_edge(&self, source: NodeIndex, target: NodeIndex, kind: EdgeKind) -> Option<EdgeIndex> {
        self.inner
            .edges_connecting(source, target)
            .find(|e| e.weight().kind() == kind)
            .map(|e| e.id())
    }

    /// Whether `ancestor` is `node` or contains it through CONTAINS links.
    fn is_ancestor_or_self(&self, ancestor: NodeIndex, node: NodeIndex) -> bool {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(idx) = current {
            if idx == ancestor {
                return true;
            }
            // a well-formed forest never needs more hops than nodes
            steps += 1;
            if steps > self.inner.node_count() {
                return false;
            }
            current = self.parent_index(idx);
        }
        false
    }

    /// Get all edges from a node.
    pub fn edges_from(&self, id: &NodeId) -> Vec<&Edge> {
        self.node_index
            .get(id)
            .map(|&idx| {
                self.inner
                    .edges_directed(idx, Direction::Outgoing)
                    .map(|e| e.weight())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all edges to a node.
    pub fn edges_to(&self, id: &NodeId) -> Vec<&Edge> {
        self.node_index
            .get(id)
            .map(|&idx| {
                self.inner
                    .edges_directed(idx, Direction::Incoming)
                    .map(|e| e.weight())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all edges of a specific kind from a node.
    pub fn edges_from_by_kind(&self, id: &NodeId, kind: EdgeKind) -> Vec<&Edge> {
        self.edges_from(id)
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Get all edges of a specific kind to a node.
    pub fn edges_to_by_kind(&self, id: &NodeId, kind: EdgeKind) -> Vec<&Edge> {
        self.edges_to(id)
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Get the edge of `kind` between two nodes, if any.
    pub fn get_edge(&self, source: &NodeId, target: &NodeId, kind: EdgeKind) -> Option<&Edge> {
        let s = *self.node_index.get(source)?;
        let t = *self.node_index.get(target)?;
        self.find_edge(s, t, kind).map(|idx| &self.inner[idx])
    }

    /// Get edge count.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner.edge_weights()
    }

    /// Get all edges of a specific kind.
    pub fn edges_by_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.inner.edge_weights().filter(move |e| e.kind() == kind)
    }

    // === Serialization ===

    /// Capture every node and edge.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            metadata: self.metadata.clone(),
            nodes: self.inner.node_weights().cloned().collect(),
            edges: self.inner.edge_weights().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot, preserving stored edge values.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        // Add all nodes first
        for node in snapshot.nodes {
            graph.upsert_node(node)?;
        }

        // Then add all edges verbatim
        for edge in snapshot.edges {
            let (s, t) = graph.resolve_endpoints(&edge.source, &edge.target, edge.kind())?;
            graph.inner.add_edge(s, t, edge);
        }

        graph.metadata = snapshot.metadata;
        Ok(graph)
    }

    /// Serialize the graph to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.to_snapshot())
            .map_err(|e| GraphError::SerializationError(e.to_string()))?;

        Ok(())
    }

    /// Load a graph from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)
            .map_err(|e| GraphError::DeserializationError(e.to_string()))?;

        Self::from_snapshot(snapshot)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(&self.to_snapshot())
            .map_err(|e| GraphError::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)
            .map_err(|e| GraphError::DeserializationError(e.to_string()))?;

        Self::from_snapshot(snapshot)
    }

    /// Get the internal petgraph for advanced operations.
    pub fn inner(&self) -> &DiGraph<Node, Edge> {
        &self.inner
    }

    /// Get the node index map for advanced operations.
    pub fn node_index_map(&self) -> &HashMap<NodeId, NodeIndex> {
        &self.node_index
    }
}

impl std::fmt::Debug for ProjectGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectGraph")
            .field("node_count", &self.node_count())
            .field("edge_count", &self.edge_count())
            .field("metadata", &self.metadata)
            .finish()
    }
}
