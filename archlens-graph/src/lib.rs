//! # archlens-graph
//!
//! Property-graph storage for Archlens.
//!
//! This crate holds the architecture graph of every analyzed project:
//!
//! - **Node kinds**: Project, Module, File, Class, Function
//! - **Edge kinds**: CONTAINS, DEPENDS_ON, CALLS, VIOLATES
//! - **ProjectGraph**: arena-backed graph of a single project with merge semantics
//! - **GraphStore**: concurrent multi-project store with transactional batches
//! - **Query interface**: pattern matching, traversal, reachability
//! - **Serialization**: JSON snapshots for persistence and baselines
//!
//! ## Example
//!
//! ```rust
//! use archlens_graph::{EdgeMerge, GraphStore, NodeBuilder, NodeId, NodeKind, NodePattern};
//!
//! let store = GraphStore::new();
//! let project = NodeId::new("shop").unwrap();
//!
//! for name in ["billing", "orders"] {
//!     let module = NodeBuilder::new()
//!         .id(NodeId::new(name).unwrap())
//!         .kind(NodeKind::Module)
//!         .attribute("layer", "business")
//!         .build()
//!         .unwrap();
//!     store.upsert_node(&project, module).unwrap();
//! }
//!
//! store
//!     .merge_edge(
//!         &project,
//!         &NodeId::new("orders").unwrap(),
//!         &NodeId::new("billing").unwrap(),
//!         EdgeMerge::depends_on("import", 1.0),
//!     )
//!     .unwrap();
//!
//! let modules = store.query(&project, NodePattern::kind(NodeKind::Module));
//! assert_eq!(modules.count(), 2);
//! assert_eq!(store.view(&project).edge_count(), 1);
//! ```

pub mod edge;
pub mod error;
pub mod graph;
pub mod node;
pub mod query;
pub mod store;

// Re-exports for convenient access
pub use edge::{ContainmentLevel, Edge, EdgeKind, EdgeMerge, Relation, Severity, Violation};
pub use error::{EdgeError, EndpointRole, GraphError};
pub use graph::{GraphMetadata, GraphSnapshot, ProjectGraph};
pub use node::{
    AttributeValue, LayerType, Node, NodeBuilder, NodeBuilderError, NodeId, NodeIdError,
    NodeKind, NodeMetadata, ProjectId, attr,
};
pub use query::{EdgePattern, Match, Matches, NodePattern, Pattern, TraversalDirection};
pub use store::{DeletionSummary, GraphStore};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn node(kind: NodeKind, name: &str) -> Node {
        NodeBuilder::new().id(id(name)).kind(kind).build().unwrap()
    }

    /// Builds a small hierarchy and checks merge, query and persistence together.
    #[test]
    fn test_complete_workflow() {
        let store = GraphStore::new();
        let project = id("shop");

        store
            .transaction(&project, |graph| {
                graph.upsert_node(node(NodeKind::Project, "shop"))?;
                graph.upsert_node(node(NodeKind::Module, "orders"))?;
                graph.upsert_node(node(NodeKind::Module, "billing"))?;
                graph.upsert_node(node(NodeKind::Function, "orders::place"))?;
                graph.upsert_node(node(NodeKind::Function, "billing::charge"))?;

                let module = EdgeMerge::Contains {
                    level: ContainmentLevel::Module,
                };
                graph.merge_edge(&id("shop"), &id("orders"), module.clone())?;
                graph.merge_edge(&id("shop"), &id("billing"), module)?;

                let method = EdgeMerge::Contains {
                    level: ContainmentLevel::Method,
                };
                graph.merge_edge(&id("orders"), &id("orders::place"), method.clone())?;
                graph.merge_edge(&id("billing"), &id("billing::charge"), method)?;

                graph.merge_edge(
                    &id("orders"),
                    &id("billing"),
                    EdgeMerge::depends_on("import", 2.0),
                )?;
                graph.merge_edge(
                    &id("orders::place"),
                    &id("billing::charge"),
                    EdgeMerge::calls("direct"),
                )?;
                Ok::<_, GraphError>(())
            })
            .unwrap();

        let view = store.view(&project);
        assert_eq!(view.node_count(), 5);
        assert_eq!(view.edge_count(), 6);
        assert_eq!(view.parent_of(&id("orders::place")).unwrap().id, id("orders"));

        let deps = store.query(
            &project,
            EdgePattern::kind(EdgeKind::DependsOn).from_kind(NodeKind::Module),
        );
        let pairs: Vec<_> = deps
            .iter()
            .filter_map(|m| match m {
                Match::Edge { source, target, .. } => {
                    Some((source.id.to_string(), target.id.to_string()))
                }
                Match::Node(_) => None,
            })
            .collect();
        assert_eq!(pairs, vec![("orders".to_string(), "billing".to_string())]);

        let calls = view
            .get_edge(&id("orders::place"), &id("billing::charge"), EdgeKind::Calls)
            .unwrap();
        assert_eq!(calls.frequency(), Some(1));

        let json = view.to_json().unwrap();
        let restored = ProjectGraph::from_json(&json).unwrap();
        assert_eq!(restored.node_count(), 5);
        assert_eq!(restored.edge_count(), 6);

        let summary = store.delete_project_subgraph(&project);
        assert_eq!(summary.nodes_removed, 5);
        assert!(store.query(&project, NodePattern::any()).is_empty());
    }
}
