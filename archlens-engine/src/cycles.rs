//! Circular dependency detection among modules.
//!
//! Cycles are simple cycles over DEPENDS_ON edges between Module nodes.
//! Modules are indexed in id order and every search rooted at module `r`
//! only walks through modules with a larger index. A cycle is therefore
//! found exactly once, from its smallest member, and its node sequence
//! always starts with its lowest id. Self-dependencies are ignored.
//!
//! # Example
//!
//! ```rust,ignore
//! let detector = CycleDetector::new(&graph);
//! for cycle in detector.bounded_cycles(5) {
//!     println!("{} ({})", cycle, cycle.severity());
//! }
//! ```

use archlens_graph::{EdgeKind, NodeId, NodeKind, ProjectGraph, Severity};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Longest cycle returned by bounded search unless configured otherwise.
pub const DEFAULT_MAX_CYCLE_LENGTH: usize = 5;

/// A circular dependency chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    /// Modules in traversal order; the closing edge returns to the first
    pub node_sequence: Vec<NodeId>,

    /// Number of edges in the cycle
    pub length: usize,

    /// Sum of the DEPENDS_ON weights along the cycle
    pub total_weight: f64,
}

impl Cycle {
    /// Severity of the cycle: shorter cycles couple modules more tightly.
    pub fn severity(&self) -> Severity {
        match self.length {
            0..=2 => Severity::Critical,
            3 => Severity::High,
            4 | 5 => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_sequence.contains(id)
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for id in &self.node_sequence {
            write!(f, "{} -> ", id)?;
        }
        match self.node_sequence.first() {
            Some(first) => write!(f, "{}", first),
            None => Ok(()),
        }
    }
}

/// Result of an unbounded search.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleSearchOutcome {
    Complete(Vec<Cycle>),
    /// The token fired; `partial` holds the cycles found so far, sorted.
    Cancelled { partial: Vec<Cycle> },
}

impl CycleSearchOutcome {
    pub fn cycles(&self) -> &[Cycle] {
        match self {
            CycleSearchOutcome::Complete(cycles) => cycles,
            CycleSearchOutcome::Cancelled { partial } => partial,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CycleSearchOutcome::Cancelled { .. })
    }

    pub fn into_cycles(self) -> Vec<Cycle> {
        match self {
            CycleSearchOutcome::Complete(cycles) => cycles,
            CycleSearchOutcome::Cancelled { partial } => partial,
        }
    }
}

/// Finds dependency cycles in one graph view.
pub struct CycleDetector<'a> {
    modules: Vec<&'a NodeId>,
    /// Outgoing (target index, weight) per module, sorted by target
    adjacency: Vec<Vec<(usize, f64)>>,
}

impl<'a> CycleDetector<'a> {
    pub fn new(graph: &'a ProjectGraph) -> Self {
        let mut modules: Vec<&NodeId> = graph
            .nodes_by_kind(NodeKind::Module)
            .map(|n| &n.id)
            .collect();
        modules.sort();

        let index: HashMap<&NodeId, usize> =
            modules.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut adjacency = vec![Vec::new(); modules.len()];
        for edge in graph.edges_by_kind(EdgeKind::DependsOn) {
            let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) else {
                continue;
            };
            if s != t {
                adjacency[s].push((t, edge.weight().unwrap_or(0.0)));
            }
        }
        // Only edges inside a strongly connected component can lie on a cycle.
        let component = component_ids(&adjacency);
        for (s, targets) in adjacency.iter_mut().enumerate() {
            targets.retain(|&(t, _)| component[s] == component[t]);
            targets.sort_by(|a, b| a.0.cmp(&b.0));
        }

        Self { modules, adjacency }
    }

    /// Bidirectional pairs (A -> B and B -> A), once per pair, lower id first.
    pub fn direct_cycles(&self) -> Vec<Cycle> {
        let mut cycles = Vec::new();
        for (a, targets) in self.adjacency.iter().enumerate() {
            for &(b, forward) in targets {
                if b <= a {
                    continue;
                }
                if let Some(&(_, back)) = self.adjacency[b].iter().find(|(t, _)| *t == a) {
                    cycles.push(Cycle {
                        node_sequence: vec![self.modules[a].clone(), self.modules[b].clone()],
                        length: 2,
                        total_weight: forward + back,
                    });
                }
            }
        }
        cycles
    }

    /// All simple cycles of length 2 to `max_length`, shortest first, then
    /// heaviest first.
    pub fn bounded_cycles(&self, max_length: usize) -> Vec<Cycle> {
        if max_length < 2 {
            return Vec::new();
        }
        let mut search = Search::new(&self.adjacency, Some(max_length), None);
        search.run();
        let mut cycles = self.materialize(search.found);
        cycles.sort_by(|a, b| {
            a.length
                .cmp(&b.length)
                .then(b.total_weight.total_cmp(&a.total_weight))
                .then_with(|| a.node_sequence.cmp(&b.node_sequence))
        });
        cycles
    }

    /// All simple cycles of any length, longest first, then heaviest first.
    ///
    /// The token is checked before every DFS expansion.
    pub fn all_cycles(&self, cancel: &CancellationToken) -> CycleSearchOutcome {
        let mut search = Search::new(&self.adjacency, None, Some(cancel));
        search.run();
        let cancelled = search.cancelled;

        let mut cycles = self.materialize(search.found);
        cycles.sort_by(|a, b| {
            b.length
                .cmp(&a.length)
                .then(b.total_weight.total_cmp(&a.total_weight))
                .then_with(|| a.node_sequence.cmp(&b.node_sequence))
        });

        if cancelled {
            tracing::debug!("Cycle search cancelled after {} cycles", cycles.len());
            CycleSearchOutcome::Cancelled { partial: cycles }
        } else {
            CycleSearchOutcome::Complete(cycles)
        }
    }

    fn materialize(&self, found: Vec<(Vec<usize>, f64)>) -> Vec<Cycle> {
        found
            .into_iter()
            .map(|(path, total_weight)| Cycle {
                length: path.len(),
                node_sequence: path.into_iter().map(|i| self.modules[i].clone()).collect(),
                total_weight,
            })
            .collect()
    }
}

/// Strongly connected component of every module index.
fn component_ids(adjacency: &[Vec<(usize, f64)>]) -> Vec<usize> {
    let edge_count = adjacency.iter().map(Vec::len).sum();
    let mut graph = DiGraph::<(), ()>::with_capacity(adjacency.len(), edge_count);
    for _ in adjacency {
        graph.add_node(());
    }
    for (s, targets) in adjacency.iter().enumerate() {
        for &(t, _) in targets {
            graph.add_edge(NodeIndex::new(s), NodeIndex::new(t), ());
        }
    }

    let mut component = vec![0; adjacency.len()];
    for (c, members) in kosaraju_scc(&graph).into_iter().enumerate() {
        for idx in members {
            component[idx.index()] = c;
        }
    }
    component
}

/// One module on the current DFS path.
struct Frame {
    node: usize,
    /// Position of the next outgoing edge to try
    next: usize,
    /// Weight accumulated from the root up to `node`
    weight: f64,
}

/// Depth-first enumeration state. The path lives on an explicit frame
/// stack, so path length is bounded by memory rather than the call stack.
struct Search<'s> {
    adjacency: &'s [Vec<(usize, f64)>],
    max_length: Option<usize>,
    cancel: Option<&'s CancellationToken>,
    path: Vec<usize>,
    on_path: Vec<bool>,
    found: Vec<(Vec<usize>, f64)>,
    cancelled: bool,
}

impl<'s> Search<'s> {
    fn new(
        adjacency: &'s [Vec<(usize, f64)>],
        max_length: Option<usize>,
        cancel: Option<&'s CancellationToken>,
    ) -> Self {
        Self {
            adjacency,
            max_length,
            cancel,
            path: Vec::new(),
            on_path: vec![false; adjacency.len()],
            found: Vec::new(),
            cancelled: false,
        }
    }

    fn run(&mut self) {
        for root in 0..self.adjacency.len() {
            if self.cancelled {
                break;
            }
            // Modules without outgoing edges inside their component close no cycle.
            if self.adjacency[root].is_empty() {
                continue;
            }
            self.search_from(root);
        }
    }

    /// Check the token; once it fired the search stays cancelled.
    fn poll(&mut self) -> bool {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            self.cancelled = true;
        }
        self.cancelled
    }

    fn push(&mut self, stack: &mut Vec<Frame>, node: usize, weight: f64) {
        stack.push(Frame {
            node,
            next: 0,
            weight,
        });
        self.path.push(node);
        self.on_path[node] = true;
    }

    fn search_from(&mut self, root: usize) {
        if self.poll() {
            return;
        }

        let adjacency = self.adjacency;
        let mut stack = Vec::new();
        self.push(&mut stack, root, 0.0);

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            let Some(&(next, w)) = adjacency[node].get(frame.next) else {
                stack.pop();
                self.on_path[node] = false;
                self.path.pop();
                continue;
            };
            frame.next += 1;
            let weight = frame.weight + w;

            if next == root {
                if self.path.len() >= 2 {
                    self.found.push((self.path.clone(), weight));
                }
                continue;
            }
            // Smaller modules were roots already; on-path modules would not
            // give a simple cycle through the root.
            if next < root || self.on_path[next] {
                continue;
            }
            if self.max_length.is_some_and(|max| self.path.len() >= max) {
                continue;
            }
            if self.poll() {
                break;
            }
            self.push(&mut stack, next, weight);
        }

        for node in self.path.drain(..) {
            self.on_path[node] = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archlens_graph::{EdgeMerge, NodeBuilder};
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn graph_with(edges: &[(&str, &str, f64)]) -> ProjectGraph {
        let mut graph = ProjectGraph::new();
        for (s, t, _) in edges {
            for name in [s, t] {
                graph
                    .upsert_node(
                        NodeBuilder::new()
                            .id(id(name))
                            .kind(NodeKind::Module)
                            .build()
                            .unwrap(),
                    )
                    .unwrap();
            }
        }
        for (s, t, w) in edges {
            graph
                .merge_edge(&id(s), &id(t), EdgeMerge::depends_on("import", *w))
                .unwrap();
        }
        graph
    }

    fn sequences(cycles: &[Cycle]) -> Vec<Vec<&str>> {
        cycles
            .iter()
            .map(|c| c.node_sequence.iter().map(NodeId::as_str).collect())
            .collect()
    }

    #[test]
    fn test_two_cycle_reported_once() {
        let graph = graph_with(&[("b", "a", 0.5), ("a", "b", 0.25)]);
        let detector = CycleDetector::new(&graph);

        let direct = detector.direct_cycles();
        assert_eq!(sequences(&direct), vec![vec!["a", "b"]]);
        assert_eq!(direct[0].total_weight, 0.75);

        assert_eq!(detector.bounded_cycles(5).len(), 1);
    }

    #[test]
    fn test_triangle() {
        let graph = graph_with(&[("a", "b", 0.1), ("b", "c", 0.2), ("c", "a", 0.3)]);
        let cycles = CycleDetector::new(&graph).bounded_cycles(5);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].length, 3);
        assert_eq!(sequences(&cycles), vec![vec!["a", "b", "c"]]);
        assert!((cycles[0].total_weight - 0.6).abs() < 1e-9);
        assert_eq!(cycles[0].severity(), Severity::High);
        assert!(CycleDetector::new(&graph).direct_cycles().is_empty());
    }

    #[test]
    fn test_shared_nodes_find_every_cycle() {
        // a <-> b, b -> c -> a, and a <-> c
        let graph = graph_with(&[
            ("a", "b", 1.0),
            ("b", "a", 1.0),
            ("b", "c", 1.0),
            ("c", "a", 1.0),
            ("a", "c", 1.0),
        ]);
        let cycles = CycleDetector::new(&graph).bounded_cycles(5);

        assert_eq!(
            sequences(&cycles),
            vec![vec!["a", "b"], vec!["a", "c"], vec!["a", "b", "c"]]
        );
    }

    #[test]
    fn test_bounded_ordering() {
        let graph = graph_with(&[
            ("a", "b", 1.0),
            ("b", "a", 1.0),
            ("c", "d", 3.0),
            ("d", "c", 3.0),
            ("e", "f", 1.0),
            ("f", "g", 1.0),
            ("g", "e", 1.0),
        ]);
        let cycles = CycleDetector::new(&graph).bounded_cycles(5);

        assert_eq!(
            sequences(&cycles),
            vec![vec!["c", "d"], vec!["a", "b"], vec!["e", "f", "g"]]
        );
    }

    #[test]
    fn test_length_cap() {
        let graph = graph_with(&[
            ("a", "b", 1.0),
            ("b", "c", 1.0),
            ("c", "d", 1.0),
            ("d", "e", 1.0),
            ("e", "f", 1.0),
            ("f", "a", 1.0),
        ]);
        let detector = CycleDetector::new(&graph);

        assert!(detector.bounded_cycles(5).is_empty());
        assert_eq!(detector.bounded_cycles(6).len(), 1);
        assert!(detector.bounded_cycles(1).is_empty());

        let all = detector.all_cycles(&CancellationToken::new());
        assert!(!all.is_cancelled());
        assert_eq!(all.cycles()[0].length, 6);
        assert_eq!(all.cycles()[0].severity(), Severity::Low);
    }

    #[test]
    fn test_unbounded_orders_longest_first() {
        let graph = graph_with(&[
            ("a", "b", 1.0),
            ("b", "a", 1.0),
            ("b", "c", 1.0),
            ("c", "d", 1.0),
            ("d", "a", 1.0),
        ]);
        let outcome = CycleDetector::new(&graph).all_cycles(&CancellationToken::new());
        let lengths: Vec<_> = outcome.cycles().iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![4, 2]);
    }

    fn chain_names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{i:05}")).collect()
    }

    #[test]
    fn test_unbounded_long_chain() {
        let names = chain_names(50_000);
        let edges: Vec<(&str, &str, f64)> = names
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str(), 1.0))
            .collect();
        let graph = graph_with(&edges);

        let outcome = CycleDetector::new(&graph).all_cycles(&CancellationToken::new());
        assert_eq!(outcome, CycleSearchOutcome::Complete(vec![]));
    }

    #[test]
    fn test_unbounded_deep_cycle() {
        // m49999 -> m49998 -> ... -> m00000 -> m49999
        const N: usize = 50_000;
        let names = chain_names(N);
        let mut edges: Vec<(&str, &str, f64)> = names
            .windows(2)
            .map(|w| (w[1].as_str(), w[0].as_str(), 1.0))
            .collect();
        edges.push((names[0].as_str(), names[N - 1].as_str(), 1.0));
        let graph = graph_with(&edges);

        let cycles = CycleDetector::new(&graph)
            .all_cycles(&CancellationToken::new())
            .into_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].length, N);
        assert_eq!(cycles[0].node_sequence[0], id("m00000"));
        assert_eq!(cycles[0].node_sequence[1], id("m49999"));
        assert_eq!(cycles[0].total_weight, N as f64);
        assert!(CycleDetector::new(&graph).bounded_cycles(5).is_empty());
    }

    #[test]
    fn test_self_dependency_ignored() {
        let graph = graph_with(&[("a", "a", 1.0), ("a", "b", 1.0)]);
        let detector = CycleDetector::new(&graph);
        assert!(detector.bounded_cycles(5).is_empty());
        assert!(detector.direct_cycles().is_empty());
    }

    #[test]
    fn test_cancelled_search() {
        let graph = graph_with(&[("a", "b", 1.0), ("b", "a", 1.0)]);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = CycleDetector::new(&graph).all_cycles(&token);
        assert!(outcome.is_cancelled());
        assert!(outcome.cycles().is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = ProjectGraph::new();
        let detector = CycleDetector::new(&graph);
        assert!(detector.direct_cycles().is_empty());
        assert!(detector.bounded_cycles(5).is_empty());
        assert_eq!(
            detector.all_cycles(&CancellationToken::new()),
            CycleSearchOutcome::Complete(vec![])
        );
    }

    #[test]
    fn test_cycle_display() {
        let cycle = Cycle {
            node_sequence: vec![id("a"), id("b")],
            length: 2,
            total_weight: 1.0,
        };
        assert_eq!(cycle.to_string(), "a -> b -> a");
        assert_eq!(cycle.severity(), Severity::Critical);
    }
}
