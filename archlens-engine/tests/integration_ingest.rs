//! Integration tests for the ingestion pipeline.
//!
//! These tests verify that:
//! - Replaying a batch leaves nodes and dependencies unchanged
//! - CALLS frequencies accumulate across replays
//! - Failed batches leave no trace
//! - JSON batches go through the same path

mod common;

use archlens_engine::{Engine, EngineError, FactBatch, IngestError, IngestStage, NodeFact};
use archlens_graph::{
    EdgeKind, EdgePattern, LayerType, NodeKind, NodePattern, Relation, attr,
};
use common::{id, shop_batch};
use pretty_assertions::assert_eq;

fn dependency_edges(engine: &Engine) -> Vec<(String, String, String, f64)> {
    let view = engine.store().view(&id("shop"));
    let mut edges: Vec<_> = view
        .edges_by_kind(EdgeKind::DependsOn)
        .map(|e| match &e.relation {
            Relation::DependsOn {
                dependency_type,
                weight,
            } => (
                e.source.to_string(),
                e.target.to_string(),
                dependency_type.clone(),
                *weight,
            ),
            _ => unreachable!(),
        })
        .collect();
    edges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    edges
}

#[test]
fn test_ingest_builds_hierarchy() {
    let engine = Engine::default();
    let report = engine.ingest(&shop_batch()).unwrap();

    assert_eq!(report.modules, 3);
    assert_eq!(report.files, 2);
    assert_eq!(report.classes, 1);
    assert_eq!(report.functions, 2);
    assert_eq!(report.containment_edges, 8);
    assert_eq!(report.dependency_edges, 3);
    assert_eq!(report.call_edges, 2);

    let view = engine.store().view(&id("shop"));
    assert_eq!(view.node_count(), 9);
    assert_eq!(view.get_node(&id("shop")).unwrap().name, "Web Shop");

    let place = view.get_node(&id("orders::place")).unwrap();
    assert_eq!(place.complexity(), 7);
    assert_eq!(place.parameters(), vec!["order", "customer"]);
    assert_eq!(place.return_type(), Some("Result<OrderId>"));
    assert_eq!(place.metadata.commit.as_deref(), Some("a1b2c3"));
    assert_eq!(view.parent_of(&id("orders::place")).unwrap().id, id("OrderService"));

    assert_eq!(view.get_node(&id("store")).unwrap().layer(), LayerType::Data);
    assert_eq!(view.get_node(&id("ui")).unwrap().path(), Some("src/ui"));

    let modules = engine.query(&id("shop"), NodePattern::kind(NodeKind::Module));
    assert_eq!(modules.count(), 3);
}

#[test]
fn test_replay_is_idempotent_except_calls() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();

    let view = engine.store().view(&id("shop"));
    let nodes_before: Vec<_> = {
        let mut nodes: Vec<_> = view
            .nodes()
            .map(|n| (n.id.clone(), n.kind, n.name.clone(), n.attributes.clone()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        nodes
    };
    let deps_before = dependency_edges(&engine);
    let contains_before = view.edges_by_kind(EdgeKind::Contains).count();

    let calls = |engine: &Engine| {
        engine
            .store()
            .view(&id("shop"))
            .get_edge(&id("orders::place"), &id("store::save"), EdgeKind::Calls)
            .and_then(|e| e.frequency())
    };
    // Two call facts in one pass.
    assert_eq!(calls(&engine), Some(2));

    let report = engine.ingest(&shop_batch()).unwrap();
    assert_eq!(report.ingestion_count, 2);

    let view = engine.store().view(&id("shop"));
    let nodes_after: Vec<_> = {
        let mut nodes: Vec<_> = view
            .nodes()
            .map(|n| (n.id.clone(), n.kind, n.name.clone(), n.attributes.clone()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        nodes
    };

    assert_eq!(nodes_after, nodes_before);
    assert_eq!(dependency_edges(&engine), deps_before);
    assert_eq!(view.edges_by_kind(EdgeKind::Contains).count(), contains_before);
    assert_eq!(view.edges_by_kind(EdgeKind::Calls).count(), 1);

    // Frequency doubles on replay.
    assert_eq!(calls(&engine), Some(4));

    let call_type = view
        .get_edge(&id("orders::place"), &id("store::save"), EdgeKind::Calls)
        .map(|e| match &e.relation {
            Relation::Calls { call_type, .. } => call_type.clone(),
            _ => unreachable!(),
        });
    assert_eq!(call_type.as_deref(), Some("async"));
}

#[test]
fn test_weight_is_overwritten_not_summed() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();

    let mut batch = shop_batch();
    let edge = batch
        .edges
        .iter_mut()
        .find(|e| e.source_id == "ui" && e.target_id == "orders")
        .unwrap();
    edge.attrs.insert("weight".into(), 0.1_f64.into());
    engine.ingest(&batch).unwrap();

    let deps = dependency_edges(&engine);
    let ui_orders = deps.iter().find(|d| d.0 == "ui").unwrap();
    assert_eq!(ui_orders.3, 0.1);
    assert_eq!(ui_orders.2, "import");
}

#[test]
fn test_attributes_merge_over_existing() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();

    let update = FactBatch::new("shop").node(
        NodeFact::new(NodeKind::Module, "ui")
            .parent("shop")
            .attr(attr::LAYER, "business"),
    );
    engine.ingest(&update).unwrap();

    let view = engine.store().view(&id("shop"));
    let ui = view.get_node(&id("ui")).unwrap();
    assert_eq!(ui.layer(), LayerType::Business);
    assert_eq!(ui.path(), Some("src/ui"));
}

#[test]
fn test_failed_batch_leaves_no_partial_state() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();
    let before = engine.store().view(&id("shop"));

    let broken = shop_batch()
        .node(NodeFact::module("billing", "shop", "business"))
        .node(NodeFact::function("billing::charge", "ghost-file", 2));
    let err = engine.ingest(&broken).unwrap_err();

    assert_eq!(err.stage(), IngestStage::Functions);
    assert!(matches!(err, IngestError::EndpointNotFound { .. }));
    assert!(err.to_string().contains("billing::charge"));

    let after = engine.store().view(&id("shop"));
    assert_eq!(after.node_count(), before.node_count());
    assert!(!after.contains_node(&id("billing")));
    assert_eq!(
        after
            .get_edge(&id("orders::place"), &id("store::save"), EdgeKind::Calls)
            .and_then(|e| e.frequency()),
        Some(2)
    );
}

#[test]
fn test_second_parent_rejected() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();

    let moved = FactBatch::new("shop")
        .node(NodeFact::new(NodeKind::File, "src/orders/place.rs").parent("store"));
    let err = engine.ingest(&moved).unwrap_err();
    assert!(matches!(err, IngestError::Graph { .. }));
    assert_eq!(err.stage(), IngestStage::FilesAndClasses);
}

#[test]
fn test_ingest_json() {
    let engine = Engine::default();
    let json = r#"{
        "projectId": "tiny",
        "nodes": [
            { "kind": "module", "id": "a", "parentId": "tiny", "attrs": { "layer": "data" } },
            { "kind": "module", "id": "b", "parentId": "tiny", "attrs": { "layer": "presentation" } }
        ],
        "edges": [
            { "kind": "DEPENDS_ON", "sourceId": "a", "targetId": "b", "attrs": { "weight": 1 } }
        ]
    }"#;

    let report = engine.ingest_json(json).unwrap();
    assert_eq!(report.modules, 2);
    assert_eq!(
        engine
            .query(&id("tiny"), EdgePattern::kind(EdgeKind::DependsOn))
            .count(),
        1
    );

    let err = engine.ingest_json("{ not json").unwrap_err();
    assert!(matches!(err, EngineError::ParseError(_)));
}

#[test]
fn test_delete_resets_call_frequency() {
    let engine = Engine::default();
    engine.ingest(&shop_batch()).unwrap();
    engine.ingest(&shop_batch()).unwrap();

    let summary = engine.delete_project(&id("shop"));
    assert_eq!(summary.nodes_removed, 9);

    engine.ingest(&shop_batch()).unwrap();
    let view = engine.store().view(&id("shop"));
    assert_eq!(
        view.get_edge(&id("orders::place"), &id("store::save"), EdgeKind::Calls)
            .and_then(|e| e.frequency()),
        Some(2)
    );
    assert_eq!(view.metadata.ingestion_count, 1);
}

#[test]
fn test_replay_without_name_keeps_name() {
    let engine = Engine::default();
    engine
        .ingest(
            &FactBatch::new("named")
                .node(NodeFact::module("m", "named", "business").name("Orders Module")),
        )
        .unwrap();
    engine
        .ingest(&FactBatch::new("named").node(NodeFact::module("m", "named", "business")))
        .unwrap();

    let view = engine.store().view(&id("named"));
    assert_eq!(view.get_node(&id("m")).unwrap().name, "Orders Module");
    // The header-created project node keeps its id as name.
    assert_eq!(view.get_node(&id("named")).unwrap().name, "named");
}
