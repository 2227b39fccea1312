//! Ingestion pipeline - replays fact batches into the graph store.
//!
//! A batch is applied in a fixed order so that every edge finds its
//! endpoints already present:
//!
//! 1. **Project**: the batch's project node
//! 2. **Modules**
//! 3. **Files and classes**: files first, then classes
//! 4. **Functions**
//! 5. **Dependencies**: DEPENDS_ON edges
//! 6. **Calls**: CALLS edges
//!
//! Facts keep their input order within a stage. Containment edges are
//! linked after all nodes of a stage are upserted, so a parent may appear
//! after its child inside the same stage.
//!
//! The whole batch runs inside one store transaction: any failure leaves
//! the project exactly as it was before the batch.
//!
//! Node upserts and DEPENDS_ON merges are idempotent. CALLS frequency is
//! cumulative, so replaying a batch adds one per call fact each time.

use crate::facts::{
    DEFAULT_CALL_TYPE, DEFAULT_DEPENDENCY_TYPE, EdgeFact, FactBatch, NodeFact, edge_attr,
};
use archlens_graph::{
    AttributeValue, ContainmentLevel, EdgeKind, EdgeMerge, EndpointRole, GraphError, GraphStore,
    LayerType, Node, NodeBuilder, NodeId, NodeKind, ProjectGraph, ProjectId, attr,
};
use serde::Serialize;
use thiserror::Error;

/// Ordering stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Project,
    Modules,
    FilesAndClasses,
    Functions,
    Dependencies,
    Calls,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestStage::Project => write!(f, "project"),
            IngestStage::Modules => write!(f, "modules"),
            IngestStage::FilesAndClasses => write!(f, "files/classes"),
            IngestStage::Functions => write!(f, "functions"),
            IngestStage::Dependencies => write!(f, "dependencies"),
            IngestStage::Calls => write!(f, "calls"),
        }
    }
}

/// Which fact of a batch an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactRef {
    /// The batch header (`projectId`)
    Batch,
    /// `nodes[index]`
    Node { index: usize, id: String },
    /// `edges[index]`
    Edge {
        index: usize,
        source: String,
        target: String,
    },
}

impl std::fmt::Display for FactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactRef::Batch => write!(f, "batch header"),
            FactRef::Node { index, id } => write!(f, "node fact #{} ({})", index, id),
            FactRef::Edge {
                index,
                source,
                target,
            } => write!(f, "edge fact #{} ({} -> {})", index, source, target),
        }
    }
}

/// Errors that abort a batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A fact is missing a required attribute or carries an invalid one.
    #[error("Malformed {fact} at {stage} stage: {reason}")]
    MalformedFact {
        stage: IngestStage,
        fact: FactRef,
        reason: String,
    },

    /// A fact references a node that does not exist at its stage.
    #[error("{fact} at {stage} stage references missing {role} node {id}")]
    EndpointNotFound {
        stage: IngestStage,
        fact: FactRef,
        role: EndpointRole,
        id: NodeId,
    },

    /// The graph rejected a write (kind mismatch, second parent, ...).
    #[error("{fact} rejected at {stage} stage: {source}")]
    Graph {
        stage: IngestStage,
        fact: FactRef,
        #[source]
        source: GraphError,
    },
}

impl IngestError {
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestError::MalformedFact { stage, .. }
            | IngestError::EndpointNotFound { stage, .. }
            | IngestError::Graph { stage, .. } => *stage,
        }
    }

    pub fn fact(&self) -> &FactRef {
        match self {
            IngestError::MalformedFact { fact, .. }
            | IngestError::EndpointNotFound { fact, .. }
            | IngestError::Graph { fact, .. } => fact,
        }
    }

    fn malformed(stage: IngestStage, fact: FactRef, reason: impl Into<String>) -> Self {
        IngestError::MalformedFact {
            stage,
            fact,
            reason: reason.into(),
        }
    }

    fn from_graph(stage: IngestStage, fact: FactRef, error: GraphError) -> Self {
        match error {
            GraphError::EndpointNotFound { role, id, .. } => IngestError::EndpointNotFound {
                stage,
                fact,
                role,
                id,
            },
            source => IngestError::Graph {
                stage,
                fact,
                source,
            },
        }
    }
}

/// Counts of what a committed batch wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub project_id: Option<ProjectId>,
    pub commit: Option<String>,
    pub modules: usize,
    pub files: usize,
    pub classes: usize,
    pub functions: usize,
    pub containment_edges: usize,
    pub dependency_edges: usize,
    pub call_edges: usize,
    /// Batches committed into the project so far, including this one
    pub ingestion_count: u32,
}

impl IngestReport {
    /// Number of nodes upserted, project node excluded.
    pub fn node_count(&self) -> usize {
        self.modules + self.files + self.classes + self.functions
    }

    pub fn edge_count(&self) -> usize {
        self.containment_edges + self.dependency_edges + self.call_edges
    }
}

/// Replays fact batches into a [`GraphStore`].
pub struct Ingestor<'a> {
    store: &'a GraphStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Apply a batch all-or-nothing.
    ///
    /// Batches for the same project are serialized by the store; batches for
    /// different projects proceed in parallel.
    pub fn ingest(&self, batch: &FactBatch) -> Result<IngestReport, IngestError> {
        let project_id = NodeId::new(batch.project_id.as_str()).map_err(|e| {
            IngestError::malformed(IngestStage::Project, FactRef::Batch, e.to_string())
        })?;

        tracing::info!(
            "Ingesting batch for {}: {} node facts, {} edge facts",
            project_id,
            batch.nodes.len(),
            batch.edges.len()
        );

        let result = self
            .store
            .transaction(&project_id, |graph| apply_batch(graph, &project_id, batch));

        match &result {
            Ok(report) => tracing::info!(
                "Committed batch for {}: {} nodes, {} edges (ingestion #{})",
                project_id,
                report.node_count(),
                report.edge_count(),
                report.ingestion_count
            ),
            Err(e) => tracing::warn!("Rejected batch for {}: {}", project_id, e),
        }

        result
    }
}

/// Node facts of one stage, with their batch index.
fn nodes_of<'b>(batch: &'b FactBatch, kinds: &[NodeKind]) -> Vec<(usize, &'b NodeFact)> {
    // Preserve the order of `kinds` first, then input order within a kind.
    kinds
        .iter()
        .flat_map(|kind| {
            batch
                .nodes
                .iter()
                .enumerate()
                .filter(move |(_, fact)| fact.kind == *kind)
        })
        .collect()
}

fn apply_batch(
    graph: &mut ProjectGraph,
    project_id: &ProjectId,
    batch: &FactBatch,
) -> Result<IngestReport, IngestError> {
    let commit = batch.commit.as_deref();
    let mut report = IngestReport {
        project_id: Some(project_id.clone()),
        commit: batch.commit.clone(),
        ..Default::default()
    };

    // Stage 1: project. The root is created from the header on first
    // ingestion; explicit project facts then merge over it.
    let stage = IngestStage::Project;
    if !graph.contains_node(project_id) {
        let mut project_node = NodeBuilder::new().id(project_id.clone()).kind(NodeKind::Project);
        if let Some(commit) = commit {
            project_node = project_node.commit(commit);
        }
        let project_node = project_node
            .build()
            .map_err(|e| IngestError::malformed(stage, FactRef::Batch, e.to_string()))?;
        graph
            .upsert_node(project_node)
            .map_err(|e| IngestError::from_graph(stage, FactRef::Batch, e))?;
    }

    for (index, fact) in nodes_of(batch, &[NodeKind::Project]) {
        let fact_ref = node_ref(index, fact);
        if fact.id != project_id.as_str() {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                format!("project fact does not match batch project {}", project_id),
            ));
        }
        if fact.parent_id.is_some() {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                "project fact cannot have a parent",
            ));
        }
        let node = build_node(stage, index, fact, commit)?;
        graph
            .upsert_node(node)
            .map_err(|e| IngestError::from_graph(stage, fact_ref, e))?;
    }

    // Stages 2-4: contained nodes
    let node_stages: [(IngestStage, &[NodeKind]); 3] = [
        (IngestStage::Modules, &[NodeKind::Module]),
        (IngestStage::FilesAndClasses, &[NodeKind::File, NodeKind::Class]),
        (IngestStage::Functions, &[NodeKind::Function]),
    ];

    for (stage, kinds) in node_stages {
        let facts = nodes_of(batch, kinds);
        report.containment_edges += apply_node_stage(graph, stage, &facts, commit)?;
        for (_, fact) in &facts {
            match fact.kind {
                NodeKind::Module => report.modules += 1,
                NodeKind::File => report.files += 1,
                NodeKind::Class => report.classes += 1,
                NodeKind::Function => report.functions += 1,
                NodeKind::Project => {}
            }
        }
        tracing::debug!("{} stage: {} nodes", stage, facts.len());
    }

    // Edge facts are only dependencies and calls; containment comes from parent ids.
    for (index, fact) in batch.edges.iter().enumerate() {
        if !matches!(fact.kind, EdgeKind::DependsOn | EdgeKind::Calls) {
            return Err(IngestError::malformed(
                IngestStage::Dependencies,
                edge_ref(index, fact),
                format!("{} edges cannot be ingested", fact.kind),
            ));
        }
    }

    // Stage 5: dependencies
    let stage = IngestStage::Dependencies;
    for (index, fact) in batch
        .edges
        .iter()
        .enumerate()
        .filter(|(_, f)| f.kind == EdgeKind::DependsOn)
    {
        let fact_ref = edge_ref(index, fact);
        let (source, target) = edge_endpoints(stage, &fact_ref, fact)?;

        let weight = match fact.attrs.get(edge_attr::WEIGHT) {
            Some(value) => value.as_f64().ok_or_else(|| {
                IngestError::malformed(stage, fact_ref.clone(), "weight must be a number")
            })?,
            None => {
                return Err(IngestError::malformed(
                    stage,
                    fact_ref,
                    "missing required attribute weight",
                ));
            }
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                format!("weight must be a non-negative number, got {}", weight),
            ));
        }
        let dependency_type =
            string_attr(stage, &fact_ref, fact, edge_attr::TYPE, DEFAULT_DEPENDENCY_TYPE)?;

        graph
            .merge_edge(&source, &target, EdgeMerge::depends_on(dependency_type, weight))
            .map_err(|e| IngestError::from_graph(stage, fact_ref, e))?;
        report.dependency_edges += 1;
    }
    tracing::debug!("{} stage: {} edges", stage, report.dependency_edges);

    // Stage 6: calls
    let stage = IngestStage::Calls;
    for (index, fact) in batch
        .edges
        .iter()
        .enumerate()
        .filter(|(_, f)| f.kind == EdgeKind::Calls)
    {
        let fact_ref = edge_ref(index, fact);
        let (source, target) = edge_endpoints(stage, &fact_ref, fact)?;
        let call_type = string_attr(stage, &fact_ref, fact, edge_attr::CALL_TYPE, DEFAULT_CALL_TYPE)?;

        graph
            .merge_edge(&source, &target, EdgeMerge::calls(call_type))
            .map_err(|e| IngestError::from_graph(stage, fact_ref, e))?;
        report.call_edges += 1;
    }
    tracing::debug!("{} stage: {} edges", stage, report.call_edges);

    graph.metadata.ingestion_count = graph.metadata.ingestion_count.saturating_add(1);
    if let Some(commit) = commit {
        graph.metadata.last_commit = Some(commit.to_string());
    }
    report.ingestion_count = graph.metadata.ingestion_count;

    Ok(report)
}

/// Upsert every node of a stage, then link each to its parent.
/// Returns the number of containment edges merged.
fn apply_node_stage(
    graph: &mut ProjectGraph,
    stage: IngestStage,
    facts: &[(usize, &NodeFact)],
    commit: Option<&str>,
) -> Result<usize, IngestError> {
    let mut links = Vec::with_capacity(facts.len());

    for &(index, fact) in facts {
        let fact_ref = node_ref(index, fact);
        let parent = match fact.parent_id.as_deref() {
            Some(parent) => NodeId::new(parent).map_err(|e| {
                IngestError::malformed(stage, fact_ref.clone(), format!("invalid parentId: {}", e))
            })?,
            None => {
                return Err(IngestError::malformed(
                    stage,
                    fact_ref,
                    "missing required attribute parentId",
                ));
            }
        };

        let node = build_node(stage, index, fact, commit)?;
        let child = node.id.clone();
        graph
            .upsert_node(node)
            .map_err(|e| IngestError::from_graph(stage, fact_ref.clone(), e))?;
        links.push((fact_ref, parent, child, fact.kind));
    }

    for (fact_ref, parent, child, kind) in links {
        let Some(level) = ContainmentLevel::for_child(kind) else {
            continue;
        };
        graph
            .merge_edge(&parent, &child, EdgeMerge::Contains { level })
            .map_err(|e| IngestError::from_graph(stage, fact_ref, e))?;
    }

    Ok(facts.len())
}

fn node_ref(index: usize, fact: &NodeFact) -> FactRef {
    FactRef::Node {
        index,
        id: fact.id.clone(),
    }
}

fn edge_ref(index: usize, fact: &EdgeFact) -> FactRef {
    FactRef::Edge {
        index,
        source: fact.source_id.clone(),
        target: fact.target_id.clone(),
    }
}

/// Validate a node fact and turn it into a node.
fn build_node(
    stage: IngestStage,
    index: usize,
    fact: &NodeFact,
    commit: Option<&str>,
) -> Result<Node, IngestError> {
    let fact_ref = node_ref(index, fact);
    let id = NodeId::new(fact.id.as_str())
        .map_err(|e| IngestError::malformed(stage, fact_ref.clone(), e.to_string()))?;

    if let Some(layer) = fact.attrs.get(attr::LAYER) {
        let valid = layer
            .as_str()
            .is_some_and(|s| s.parse::<LayerType>().is_ok());
        if !valid {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                format!("invalid layer {:?}", layer),
            ));
        }
    }

    if let Some(complexity) = fact.attrs.get(attr::COMPLEXITY) {
        if !complexity.as_i64().is_some_and(|n| n >= 0) {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                format!("complexity must be a non-negative integer, got {:?}", complexity),
            ));
        }
    }

    if let Some(AttributeValue::List(params)) = fact.attrs.get(attr::PARAMETERS) {
        if params.iter().any(|p| p.as_str().is_none()) {
            return Err(IngestError::malformed(
                stage,
                fact_ref,
                "parameters must be a list of strings",
            ));
        }
    }

    let mut builder = NodeBuilder::new()
        .id(id)
        .kind(fact.kind)
        .attributes(fact.attrs.clone());
    if let Some(name) = &fact.name {
        builder = builder.name(name.clone());
    }
    if let Some(commit) = commit {
        builder = builder.commit(commit);
    }

    builder
        .build()
        .map_err(|e| IngestError::malformed(stage, fact_ref, e.to_string()))
}

fn edge_endpoints(
    stage: IngestStage,
    fact_ref: &FactRef,
    fact: &EdgeFact,
) -> Result<(NodeId, NodeId), IngestError> {
    let source = NodeId::new(fact.source_id.as_str()).map_err(|e| {
        IngestError::malformed(stage, fact_ref.clone(), format!("invalid sourceId: {}", e))
    })?;
    let target = NodeId::new(fact.target_id.as_str()).map_err(|e| {
        IngestError::malformed(stage, fact_ref.clone(), format!("invalid targetId: {}", e))
    })?;
    Ok((source, target))
}

fn string_attr(
    stage: IngestStage,
    fact_ref: &FactRef,
    fact: &EdgeFact,
    key: &str,
    default: &str,
) -> Result<String, IngestError> {
    match fact.attrs.get(key) {
        None => Ok(default.to_string()),
        Some(value) => value.as_str().map(str::to_string).ok_or_else(|| {
            IngestError::malformed(stage, fact_ref.clone(), format!("{} must be a string", key))
        }),
    }
}
