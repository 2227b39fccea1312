//! Error types for the archlens-graph crate.

use crate::edge::EdgeKind;
use crate::node::{NodeBuilderError, NodeId, NodeKind};
use thiserror::Error;

/// Errors related to Edge operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdgeError {
    #[error("Invalid source kind for {edge_kind}: got {actual}, expected one of {expected:?}")]
    InvalidSourceKind {
        edge_kind: EdgeKind,
        actual: NodeKind,
        expected: Vec<NodeKind>,
    },

    #[error("Invalid target kind for {edge_kind}: got {actual}, expected one of {expected:?}")]
    InvalidTargetKind {
        edge_kind: EdgeKind,
        actual: NodeKind,
        expected: Vec<NodeKind>,
    },
}

/// Which end of an edge a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Source,
    Target,
}

impl std::fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointRole::Source => write!(f, "source"),
            EndpointRole::Target => write!(f, "target"),
        }
    }
}

/// Errors related to Graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{edge_kind} {role} endpoint not found: {id}")]
    EndpointNotFound {
        edge_kind: EdgeKind,
        role: EndpointRole,
        id: NodeId,
    },

    #[error("Node {id} already exists as {existing}, cannot upsert as {requested}")]
    KindMismatch {
        id: NodeId,
        existing: NodeKind,
        requested: NodeKind,
    },

    #[error("Node {child} is already contained by {existing_parent}, cannot move under {parent}")]
    MultipleParents {
        child: NodeId,
        existing_parent: NodeId,
        parent: NodeId,
    },

    #[error("Containing {child} under {parent} would create a containment cycle")]
    ContainmentCycle { parent: NodeId, child: NodeId },

    #[error("Invalid dependency weight {weight} on {source_node} -> {target_node}")]
    InvalidWeight {
        source_node: NodeId,
        target_node: NodeId,
        weight: f64,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Edge error: {0}")]
    EdgeError(#[from] EdgeError),

    #[error("Node builder error: {0}")]
    NodeBuilderError(#[from] NodeBuilderError),
}
