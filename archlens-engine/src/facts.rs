//! Structural fact batches produced by an upstream parser.
//!
//! A batch describes one project at one commit. It is plain data; nothing
//! here is validated until the batch is handed to the
//! [`Ingestor`](crate::ingest::Ingestor).
//!
//! ```json
//! {
//!   "projectId": "shop",
//!   "commit": "9f2c1e",
//!   "nodes": [
//!     { "kind": "module", "id": "orders", "parentId": "shop", "attrs": { "layer": "business" } }
//!   ],
//!   "edges": [
//!     { "kind": "DEPENDS_ON", "sourceId": "orders", "targetId": "billing", "attrs": { "weight": 0.4 } }
//!   ]
//! }
//! ```

use archlens_graph::{AttributeValue, EdgeKind, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known edge fact attribute keys.
pub mod edge_attr {
    /// DEPENDS_ON strength, required, non-negative number.
    pub const WEIGHT: &str = "weight";
    /// DEPENDS_ON dependency type, defaults to `import`.
    pub const TYPE: &str = "type";
    /// CALLS call type, defaults to `direct`.
    pub const CALL_TYPE: &str = "callType";
}

pub const DEFAULT_DEPENDENCY_TYPE: &str = "import";
pub const DEFAULT_CALL_TYPE: &str = "direct";

/// One project's structural facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactBatch {
    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default)]
    pub nodes: Vec<NodeFact>,

    #[serde(default)]
    pub edges: Vec<EdgeFact>,
}

/// A node observed by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFact {
    pub kind: NodeKind,
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Containing node. Required for everything except the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub attrs: HashMap<String, AttributeValue>,
}

/// A relationship observed by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFact {
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,

    #[serde(default)]
    pub attrs: HashMap<String, AttributeValue>,
}

impl FactBatch {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            commit: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn node(mut self, fact: NodeFact) -> Self {
        self.nodes.push(fact);
        self
    }

    pub fn edge(mut self, fact: EdgeFact) -> Self {
        self.edges.push(fact);
        self
    }
}

impl NodeFact {
    pub fn new(kind: NodeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            parent_id: None,
            attrs: HashMap::new(),
        }
    }

    /// A module fact with a layer tag.
    pub fn module(id: impl Into<String>, parent: impl Into<String>, layer: &str) -> Self {
        Self::new(NodeKind::Module, id)
            .parent(parent)
            .attr(archlens_graph::attr::LAYER, layer)
    }

    /// A function fact with a complexity score.
    pub fn function(id: impl Into<String>, parent: impl Into<String>, complexity: i64) -> Self {
        Self::new(NodeKind::Function, id)
            .parent(parent)
            .attr(archlens_graph::attr::COMPLEXITY, complexity)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

impl EdgeFact {
    pub fn new(kind: EdgeKind, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source.into(),
            target_id: target.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn depends_on(source: impl Into<String>, target: impl Into<String>, weight: f64) -> Self {
        Self::new(EdgeKind::DependsOn, source, target).attr(edge_attr::WEIGHT, weight)
    }

    pub fn calls(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        Self::new(EdgeKind::Calls, caller, callee)
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_batch_from_json() {
        let json = r#"{
            "projectId": "shop",
            "commit": "9f2c1e",
            "nodes": [
                { "kind": "project", "id": "shop" },
                { "kind": "module", "id": "orders", "parentId": "shop", "attrs": { "layer": "business" } },
                { "kind": "function", "id": "orders::place", "parentId": "orders", "attrs": { "complexity": 4 } }
            ],
            "edges": [
                { "kind": "DEPENDS_ON", "sourceId": "orders", "targetId": "billing", "attrs": { "weight": 0.4 } },
                { "kind": "CALLS", "sourceId": "orders::place", "targetId": "billing::charge" }
            ]
        }"#;

        let batch = FactBatch::from_json(json).unwrap();
        assert_eq!(batch.project_id, "shop");
        assert_eq!(batch.commit.as_deref(), Some("9f2c1e"));
        assert_eq!(batch.nodes.len(), 3);
        assert_eq!(batch.nodes[1].parent_id.as_deref(), Some("shop"));
        assert_eq!(
            batch.nodes[2].attrs.get("complexity"),
            Some(&AttributeValue::Integer(4))
        );
        assert_eq!(batch.edges[0].kind, EdgeKind::DependsOn);
        assert_eq!(
            batch.edges[0].attrs.get(edge_attr::WEIGHT).and_then(AttributeValue::as_f64),
            Some(0.4)
        );
        assert!(batch.edges[1].attrs.is_empty());
    }

    #[test]
    fn test_builder_matches_json_shape() {
        let batch = FactBatch::new("shop")
            .node(NodeFact::module("orders", "shop", "business"))
            .edge(EdgeFact::depends_on("orders", "billing", 1.0));

        let json = batch.to_json().unwrap();
        assert!(json.contains("\"projectId\""));
        assert!(json.contains("\"parentId\""));
        assert!(json.contains("\"sourceId\""));
        assert!(!json.contains("\"commit\""));
    }
}
