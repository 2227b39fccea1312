//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use archlens_engine::{EdgeFact, FactBatch, NodeFact};
use archlens_graph::{NodeId, NodeKind};
use std::collections::BTreeSet;

pub fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

/// A small layered web shop.
///
/// - `ui` (presentation) -> `orders` (business) -> `store` (data)
/// - `store` -> `ui`: the data layer reaching into presentation
/// - `orders::place` calls `store::save` twice per pass (two call facts)
pub fn shop_batch() -> FactBatch {
    FactBatch::new("shop")
        .with_commit("a1b2c3")
        .node(NodeFact::new(NodeKind::Project, "shop").name("Web Shop"))
        .node(NodeFact::module("ui", "shop", "presentation").attr("path", "src/ui"))
        .node(NodeFact::module("orders", "shop", "business").attr("path", "src/orders"))
        .node(NodeFact::module("store", "shop", "data").attr("path", "src/store"))
        .node(NodeFact::new(NodeKind::File, "src/orders/place.rs").parent("orders"))
        .node(NodeFact::new(NodeKind::Class, "OrderService").parent("src/orders/place.rs"))
        .node(
            NodeFact::function("orders::place", "OrderService", 7)
                .attr("parameters", vec!["order", "customer"])
                .attr("return_type", "Result<OrderId>"),
        )
        .node(NodeFact::new(NodeKind::File, "src/store/db.rs").parent("store"))
        .node(NodeFact::function("store::save", "src/store/db.rs", 3))
        .edge(EdgeFact::depends_on("ui", "orders", 0.6))
        .edge(EdgeFact::depends_on("orders", "store", 0.9).attr("type", "runtime"))
        .edge(EdgeFact::depends_on("store", "ui", 0.2))
        .edge(EdgeFact::calls("orders::place", "store::save"))
        .edge(EdgeFact::calls("orders::place", "store::save").attr("callType", "async"))
}

/// A batch of modules under `project` wired by DEPENDS_ON edges. Every
/// endpoint becomes a module with an unspecified layer.
pub fn dependency_batch(project: &str, edges: &[(&str, &str, f64)]) -> FactBatch {
    let modules: BTreeSet<&str> = edges.iter().flat_map(|(s, t, _)| [*s, *t]).collect();

    let mut batch = FactBatch::new(project);
    for module in modules {
        batch = batch.node(NodeFact::new(NodeKind::Module, module).parent(project));
    }
    for (s, t, w) in edges {
        batch = batch.edge(EdgeFact::depends_on(*s, *t, *w));
    }
    batch
}

/// Every ordered pair of distinct modules `m0..m{n}` depends on each other.
pub fn complete_batch(project: &str, n: usize) -> FactBatch {
    let names: Vec<String> = (0..n).map(|i| format!("m{i:02}")).collect();
    let mut edges = Vec::new();
    for s in &names {
        for t in &names {
            if s != t {
                edges.push((s.as_str(), t.as_str(), 1.0));
            }
        }
    }
    dependency_batch(project, &edges)
}
