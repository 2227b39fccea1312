//! Query interface for the architecture graph.

use crate::edge::{Edge, EdgeKind};
use crate::graph::ProjectGraph;
use crate::node::{AttributeValue, Node, NodeId, NodeKind};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Direction for edge traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Follow outgoing edges only
    Outgoing,
    /// Follow incoming edges only
    Incoming,
    /// Follow both directions
    Both,
}

impl TraversalDirection {
    fn directions(self) -> &'static [Direction] {
        match self {
            TraversalDirection::Outgoing => &[Direction::Outgoing],
            TraversalDirection::Incoming => &[Direction::Incoming],
            TraversalDirection::Both => &[Direction::Outgoing, Direction::Incoming],
        }
    }
}

/// Matches nodes by kind and attribute equality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePattern {
    pub kind: Option<NodeKind>,
    pub attributes: Vec<(String, AttributeValue)>,
}

impl NodePattern {
    /// Match every node.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match nodes of one kind.
    pub fn kind(kind: NodeKind) -> Self {
        Self {
            kind: Some(kind),
            attributes: Vec::new(),
        }
    }

    /// Additionally require `key == value`.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.kind.is_none_or(|k| node.kind == k)
            && self
                .attributes
                .iter()
                .all(|(k, v)| node.attributes.get(k) == Some(v))
    }
}

/// Matches `(source)-[edge]->(target)` triples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgePattern {
    pub kind: Option<EdgeKind>,
    pub source_kind: Option<NodeKind>,
    pub target_kind: Option<NodeKind>,
}

impl EdgePattern {
    /// Match every edge.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match edges of one kind.
    pub fn kind(kind: EdgeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn from_kind(mut self, kind: NodeKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    pub fn to_kind(mut self, kind: NodeKind) -> Self {
        self.target_kind = Some(kind);
        self
    }

    pub fn matches(&self, source: &Node, edge: &Edge, target: &Node) -> bool {
        self.kind.is_none_or(|k| edge.kind() == k)
            && self.source_kind.is_none_or(|k| source.kind == k)
            && self.target_kind.is_none_or(|k| target.kind == k)
    }
}

/// A read-only graph query.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Nodes(NodePattern),
    Edges(EdgePattern),
}

impl From<NodePattern> for Pattern {
    fn from(p: NodePattern) -> Self {
        Pattern::Nodes(p)
    }
}

impl From<EdgePattern> for Pattern {
    fn from(p: EdgePattern) -> Self {
        Pattern::Edges(p)
    }
}

/// One query result.
#[derive(Debug, Clone, Copy)]
pub enum Match<'a> {
    Node(&'a Node),
    Edge {
        source: &'a Node,
        edge: &'a Edge,
        target: &'a Node,
    },
}

/// Results of a query against a committed graph view.
///
/// Holds the view it was taken from, so iteration never blocks writers
/// and can be restarted any number of times.
#[derive(Debug, Clone)]
pub struct Matches {
    graph: Arc<ProjectGraph>,
    pattern: Pattern,
}

impl Matches {
    pub fn new(graph: Arc<ProjectGraph>, pattern: impl Into<Pattern>) -> Self {
        Self {
            graph,
            pattern: pattern.into(),
        }
    }

    /// Lazily iterate the matches.
    pub fn iter(&self) -> impl Iterator<Item = Match<'_>> + '_ {
        let graph = &*self.graph;

        let nodes = match &self.pattern {
            Pattern::Nodes(p) => Some(graph.nodes().filter(move |n| p.matches(n)).map(Match::Node)),
            Pattern::Edges(_) => None,
        };

        let edges = match &self.pattern {
            Pattern::Edges(p) => Some(graph.inner().edge_references().filter_map(move |e| {
                let source = &graph.inner()[e.source()];
                let target = &graph.inner()[e.target()];
                p.matches(source, e.weight(), target).then_some(Match::Edge {
                    source,
                    edge: e.weight(),
                    target,
                })
            })),
            Pattern::Nodes(_) => None,
        };

        nodes.into_iter().flatten().chain(edges.into_iter().flatten())
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// The graph view the matches come from.
    pub fn graph(&self) -> &ProjectGraph {
        &self.graph
    }
}

impl ProjectGraph {
    /// Find all nodes connected to a given node via specific edge kinds.
    ///
    /// # Arguments
    /// * `node_id` - Starting node
    /// * `edge_kinds` - Edge kinds to follow (None = all kinds)
    /// * `direction` - Outgoing, Incoming, or Both
    pub fn traverse_edges(
        &self,
        node_id: &NodeId,
        edge_kinds: Option<&[EdgeKind]>,
        direction: TraversalDirection,
    ) -> Vec<&Node> {
        let Some(&idx) = self.node_index_map().get(node_id) else {
            return vec![];
        };

        let mut result = Vec::new();

        for &dir in direction.directions() {
            for edge_ref in self.inner().edges_directed(idx, dir) {
                let edge = edge_ref.weight();

                if let Some(kinds) = edge_kinds {
                    if !kinds.contains(&edge.kind()) {
                        continue;
                    }
                }

                let connected_idx = match dir {
                    Direction::Outgoing => edge_ref.target(),
                    Direction::Incoming => edge_ref.source(),
                };

                result.push(&self.inner()[connected_idx]);
            }
        }

        result
    }

    /// Modules this module depends on.
    pub fn dependencies(&self, module_id: &NodeId) -> Vec<&Node> {
        self.traverse_edges(
            module_id,
            Some(&[EdgeKind::DependsOn]),
            TraversalDirection::Outgoing,
        )
    }

    /// Modules that depend on this module.
    pub fn dependents(&self, module_id: &NodeId) -> Vec<&Node> {
        self.traverse_edges(
            module_id,
            Some(&[EdgeKind::DependsOn]),
            TraversalDirection::Incoming,
        )
    }

    /// Functions calling this function.
    pub fn callers(&self, function_id: &NodeId) -> Vec<&Node> {
        self.traverse_edges(
            function_id,
            Some(&[EdgeKind::Calls]),
            TraversalDirection::Incoming,
        )
    }

    /// Every node reachable from `start` over `kind` edges, any path length.
    /// The start node itself is excluded even when it sits on a cycle.
    pub fn reachable(
        &self,
        start: &NodeId,
        kind: EdgeKind,
        direction: TraversalDirection,
    ) -> Vec<&Node> {
        let Some(&start_idx) = self.node_index_map().get(start) else {
            return vec![];
        };

        let mut visited: HashSet<NodeIndex> = HashSet::from([start_idx]);
        let mut queue = VecDeque::from([start_idx]);
        let mut result = Vec::new();

        while let Some(idx) = queue.pop_front() {
            for &dir in direction.directions() {
                for edge_ref in self.inner().edges_directed(idx, dir) {
                    if edge_ref.weight().kind() != kind {
                        continue;
                    }
                    let next = match dir {
                        Direction::Outgoing => edge_ref.target(),
                        Direction::Incoming => edge_ref.source(),
                    };
                    if visited.insert(next) {
                        result.push(&self.inner()[next]);
                        queue.push_back(next);
                    }
                }
            }
        }

        result
    }

    /// Shortest DEPENDS_ON chain from one module to another, inclusive.
    /// Returns None if no chain exists.
    pub fn dependency_path(&self, from: &NodeId, to: &NodeId) -> Option<Vec<&Node>> {
        let start = *self.node_index_map().get(from)?;
        let goal = *self.node_index_map().get(to)?;

        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(idx) = queue.pop_front() {
            if idx == goal {
                let mut path = vec![&self.inner()[goal]];
                let mut current = goal;
                while let Some(&prev) = previous.get(&current) {
                    path.push(&self.inner()[prev]);
                    current = prev;
                }
                path.reverse();
                return Some(path);
            }

            for edge_ref in self.inner().edges_directed(idx, Direction::Outgoing) {
                if edge_ref.weight().kind() != EdgeKind::DependsOn {
                    continue;
                }
                let next = edge_ref.target();
                if visited.insert(next) {
                    previous.insert(next, idx);
                    queue.push_back(next);
                }
            }
        }

        None
    }

    /// Search nodes by attribute value.
    pub fn find_nodes_by_attribute(&self, key: &str, value: &AttributeValue) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.attributes.get(key) == Some(value))
            .collect()
    }

    /// Search nodes by display name (case-insensitive substring).
    pub fn find_nodes_by_name(&self, query: &str) -> Vec<&Node> {
        let query_lower = query.to_lowercase();
        self.nodes()
            .filter(|n| n.name.to_lowercase().contains(&query_lower))
            .collect()
    }
}
