//! Multi-project graph store.
//!
//! Each project lives in its own slot. Readers take an `Arc` of the last
//! committed graph and never wait on an in-progress write; writers to the
//! same project are serialized by a per-project mutex. Writers to different
//! projects never contend.

use crate::edge::{Edge, EdgeMerge, Violation};
use crate::error::GraphError;
use crate::graph::{GraphSnapshot, ProjectGraph};
use crate::node::{Node, NodeId, ProjectId};
use crate::query::{Matches, Pattern};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SlotState {
    /// Set once the slot has been removed from the store. A writer that
    /// wins the lock on a retired slot must look the project up again.
    retired: bool,
}

#[derive(Debug, Default)]
struct ProjectSlot {
    graph: RwLock<Arc<ProjectGraph>>,
    writer: Mutex<SlotState>,
}

/// Counts reported by [`GraphStore::delete_project_subgraph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

/// Concurrent store of per-project architecture graphs.
#[derive(Debug, Default)]
pub struct GraphStore {
    projects: DashMap<ProjectId, Arc<ProjectSlot>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, project: &ProjectId) -> Arc<ProjectSlot> {
        self.projects
            .entry(project.clone())
            .or_default()
            .value()
            .clone()
    }

    fn existing_slot(&self, project: &ProjectId) -> Option<Arc<ProjectSlot>> {
        self.projects.get(project).map(|s| s.value().clone())
    }

    /// Drop a slot that a failed write left without any nodes.
    fn discard_if_empty(&self, project: &ProjectId, slot: &Arc<ProjectSlot>, state: &mut SlotState) {
        if slot.graph.read().node_count() == 0 {
            state.retired = true;
            self.projects
                .remove_if(project, |_, current| Arc::ptr_eq(current, slot));
        }
    }

    /// Apply a single in-place mutation under the project's writer lock.
    fn mutate<T>(
        &self,
        project: &ProjectId,
        f: impl FnOnce(&mut ProjectGraph) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        loop {
            let slot = self.slot(project);
            let mut state = slot.writer.lock();
            if state.retired {
                continue;
            }

            let result = {
                let mut guard = slot.graph.write();
                f(Arc::make_mut(&mut guard))
            };
            if result.is_err() {
                self.discard_if_empty(project, &slot, &mut state);
            }
            return result;
        }
    }

    /// Insert or update a node in a project, creating the project on first write.
    pub fn upsert_node(&self, project: &ProjectId, node: Node) -> Result<(), GraphError> {
        self.mutate(project, |graph| graph.upsert_node(node).map(|_| ()))
    }

    /// Merge a CONTAINS, DEPENDS_ON or CALLS edge into a project.
    pub fn merge_edge(
        &self,
        project: &ProjectId,
        source: &NodeId,
        target: &NodeId,
        merge: EdgeMerge,
    ) -> Result<Edge, GraphError> {
        self.mutate(project, |graph| {
            graph.merge_edge(source, target, merge).map(Edge::clone)
        })
    }

    /// Append a VIOLATES edge to a project.
    pub fn record_violation(
        &self,
        project: &ProjectId,
        source: &NodeId,
        target: &NodeId,
        violation: Violation,
    ) -> Result<Edge, GraphError> {
        self.mutate(project, |graph| {
            graph
                .record_violation(source, target, violation)
                .map(Edge::clone)
        })
    }

    /// Run `f` against a working copy of the project graph.
    ///
    /// The copy replaces the committed graph only if `f` returns `Ok`.
    /// Readers keep seeing the previous graph until then, and never see a
    /// partially applied transaction.
    pub fn transaction<T, E>(
        &self,
        project: &ProjectId,
        f: impl FnOnce(&mut ProjectGraph) -> Result<T, E>,
    ) -> Result<T, E> {
        loop {
            let slot = self.slot(project);
            let mut state = slot.writer.lock();
            if state.retired {
                continue;
            }

            let mut working = ProjectGraph::clone(&slot.graph.read());
            return match f(&mut working) {
                Ok(value) => {
                    tracing::debug!(
                        "Committed transaction on {}: {} nodes, {} edges",
                        project,
                        working.node_count(),
                        working.edge_count()
                    );
                    *slot.graph.write() = Arc::new(working);
                    Ok(value)
                }
                Err(e) => {
                    tracing::debug!("Rolled back transaction on {}", project);
                    self.discard_if_empty(project, &slot, &mut state);
                    Err(e)
                }
            };
        }
    }

    /// The last committed graph of a project. Unknown projects yield an empty graph.
    pub fn view(&self, project: &ProjectId) -> Arc<ProjectGraph> {
        match self.existing_slot(project) {
            Some(slot) => Arc::clone(&slot.graph.read()),
            None => Arc::new(ProjectGraph::new()),
        }
    }

    /// Serializable copy of a project's committed graph.
    pub fn snapshot(&self, project: &ProjectId) -> GraphSnapshot {
        self.view(project).to_snapshot()
    }

    /// Evaluate a read-only pattern against a project's committed graph.
    pub fn query(&self, project: &ProjectId, pattern: impl Into<Pattern>) -> Matches {
        Matches::new(self.view(project), pattern)
    }

    /// Remove every node and edge belonging to a project.
    ///
    /// Waits for an in-flight write on the project to finish. Views taken
    /// before the deletion stay valid; later views are empty.
    pub fn delete_project_subgraph(&self, project: &ProjectId) -> DeletionSummary {
        let Some(slot) = self.existing_slot(project) else {
            return DeletionSummary::default();
        };

        let mut state = slot.writer.lock();
        if state.retired {
            return DeletionSummary::default();
        }
        state.retired = true;
        self.projects
            .remove_if(project, |_, current| Arc::ptr_eq(current, &slot));

        let graph = slot.graph.read();
        let summary = DeletionSummary {
            nodes_removed: graph.node_count(),
            edges_removed: graph.edge_count(),
        };

        tracing::info!(
            "Deleted project {}: {} nodes, {} edges",
            project,
            summary.nodes_removed,
            summary.edges_removed
        );

        summary
    }

    pub fn contains_project(&self, project: &ProjectId) -> bool {
        self.projects.contains_key(project)
    }

    /// Ids of all projects currently stored, sorted.
    pub fn project_ids(&self) -> Vec<ProjectId> {
        let mut ids: Vec<_> = self.projects.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
