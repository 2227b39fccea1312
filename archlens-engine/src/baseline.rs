//! Architecture baselines.
//!
//! A baseline freezes a project's graph and metrics at one version. Baselines
//! are immutable once saved; the only mutable bit is which single baseline of
//! a project is flagged current. [`BaselineStore`] is the seam to whatever
//! persists them; [`BaselineRegistry`] keeps them in memory and can dump to
//! and restore from a JSON file.

use crate::metrics::{ModuleCoupling, ProjectMetrics};
use archlens_graph::{GraphSnapshot, NodeId, ProjectId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors from baseline storage.
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("Baseline {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Baseline {id} not found for project {project}")]
    NotFound { project: ProjectId, id: Uuid },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Coupling of one module at baseline time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetricSnapshot {
    pub id: NodeId,
    pub ca: usize,
    pub ce: usize,
    pub instability: f64,
}

impl From<&ModuleCoupling> for ModuleMetricSnapshot {
    fn from(m: &ModuleCoupling) -> Self {
        Self {
            id: m.id.clone(),
            ca: m.ca,
            ce: m.ce,
            instability: m.instability,
        }
    }
}

/// Metrics recorded alongside a baseline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub modules: Vec<ModuleMetricSnapshot>,
    pub project: ProjectMetrics,
}

impl MetricsSnapshot {
    pub fn module(&self, id: &NodeId) -> Option<&ModuleMetricSnapshot> {
        self.modules.iter().find(|m| &m.id == id)
    }
}

/// A saved architecture baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub id: Uuid,
    pub project_id: ProjectId,
    /// Version label chosen by the caller
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub snapshot: GraphSnapshot,
    pub module_count: usize,
    pub dependency_count: usize,
    pub metrics: MetricsSnapshot,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

/// Whether a project can be compared against a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    NoBaseline,
    HasBaseline,
}

/// Persistence seam for baselines.
pub trait BaselineStore: Send + Sync {
    /// Save a new baseline. The first baseline of a project, or one saved
    /// with `is_current`, becomes the current one.
    fn save(&self, baseline: Baseline) -> Result<Baseline, BaselineError>;

    /// Flag one baseline current and clear the flag on every other
    /// baseline of the project, as a single update.
    fn set_current(&self, project: &ProjectId, id: Uuid) -> Result<(), BaselineError>;

    fn current(&self, project: &ProjectId) -> Option<Baseline>;

    fn get(&self, project: &ProjectId, id: Uuid) -> Option<Baseline>;

    /// Baselines of a project, oldest first.
    fn list(&self, project: &ProjectId) -> Vec<Baseline>;

    /// Drop all baselines of a project, returning how many there were.
    fn remove_project(&self, project: &ProjectId) -> usize;

    fn state(&self, project: &ProjectId) -> BaselineState {
        match self.current(project) {
            Some(_) => BaselineState::HasBaseline,
            None => BaselineState::NoBaseline,
        }
    }
}

/// In-memory baseline store.
#[derive(Debug, Default)]
pub struct BaselineRegistry {
    baselines: RwLock<HashMap<ProjectId, Vec<Baseline>>>,
}

impl BaselineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every baseline to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), BaselineError> {
        let all: Vec<Baseline> = {
            let baselines = self.baselines.read();
            let mut projects: Vec<_> = baselines.keys().collect();
            projects.sort();
            projects
                .into_iter()
                .flat_map(|p| baselines[p].iter().cloned())
                .collect()
        };
        let json = serde_json::to_string_pretty(&all)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Restore a registry written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, BaselineError> {
        let json = fs::read_to_string(path)?;
        let all: Vec<Baseline> = serde_json::from_str(&json)?;

        let mut baselines: HashMap<ProjectId, Vec<Baseline>> = HashMap::new();
        for baseline in all {
            baselines
                .entry(baseline.project_id.clone())
                .or_default()
                .push(baseline);
        }
        for list in baselines.values_mut() {
            list.sort_by_key(|b| b.created_at);
        }

        Ok(Self {
            baselines: RwLock::new(baselines),
        })
    }
}

impl BaselineStore for BaselineRegistry {
    fn save(&self, mut baseline: Baseline) -> Result<Baseline, BaselineError> {
        let mut baselines = self.baselines.write();
        let list = baselines.entry(baseline.project_id.clone()).or_default();

        if list.iter().any(|b| b.id == baseline.id) {
            return Err(BaselineError::AlreadyExists(baseline.id));
        }

        if list.iter().all(|b| !b.is_current) {
            baseline.is_current = true;
        }
        if baseline.is_current {
            for b in list.iter_mut() {
                b.is_current = false;
            }
        }

        tracing::info!(
            "Saved baseline {} ({}) for {}{}",
            baseline.id,
            baseline.version,
            baseline.project_id,
            if baseline.is_current { " as current" } else { "" }
        );

        list.push(baseline.clone());
        Ok(baseline)
    }

    fn set_current(&self, project: &ProjectId, id: Uuid) -> Result<(), BaselineError> {
        let mut baselines = self.baselines.write();
        let not_found = || BaselineError::NotFound {
            project: project.clone(),
            id,
        };

        let list = baselines.get_mut(project).ok_or_else(not_found)?;
        if !list.iter().any(|b| b.id == id) {
            return Err(not_found());
        }

        for b in list.iter_mut() {
            b.is_current = b.id == id;
        }
        tracing::info!("Baseline {} is now current for {}", id, project);
        Ok(())
    }

    fn current(&self, project: &ProjectId) -> Option<Baseline> {
        self.baselines
            .read()
            .get(project)?
            .iter()
            .find(|b| b.is_current)
            .cloned()
    }

    fn get(&self, project: &ProjectId, id: Uuid) -> Option<Baseline> {
        self.baselines
            .read()
            .get(project)?
            .iter()
            .find(|b| b.id == id)
            .cloned()
    }

    fn list(&self, project: &ProjectId) -> Vec<Baseline> {
        self.baselines
            .read()
            .get(project)
            .cloned()
            .unwrap_or_default()
    }

    fn remove_project(&self, project: &ProjectId) -> usize {
        self.baselines
            .write()
            .remove(project)
            .map_or(0, |list| list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Density;
    use archlens_graph::ProjectGraph;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn baseline(project: &str, version: &str, is_current: bool) -> Baseline {
        Baseline {
            id: Uuid::new_v4(),
            project_id: id(project),
            version: version.to_string(),
            commit: None,
            snapshot: ProjectGraph::new().to_snapshot(),
            module_count: 0,
            dependency_count: 0,
            metrics: MetricsSnapshot {
                modules: vec![],
                project: ProjectMetrics {
                    module_count: 0,
                    total_dependencies: 0,
                    avg_weight: 0.0,
                    density: Density::Undefined,
                    avg_instability: 0.0,
                },
            },
            is_current,
            created_at: Utc::now(),
        }
    }

    fn current_versions(registry: &BaselineRegistry, project: &str) -> Vec<String> {
        registry
            .list(&id(project))
            .into_iter()
            .filter(|b| b.is_current)
            .map(|b| b.version)
            .collect()
    }

    #[test]
    fn test_first_baseline_becomes_current() {
        let registry = BaselineRegistry::new();
        assert_eq!(registry.state(&id("p")), BaselineState::NoBaseline);

        let saved = registry.save(baseline("p", "v1", false)).unwrap();
        assert!(saved.is_current);
        assert_eq!(registry.state(&id("p")), BaselineState::HasBaseline);

        registry.save(baseline("p", "v2", false)).unwrap();
        assert_eq!(current_versions(&registry, "p"), vec!["v1"]);
    }

    #[test]
    fn test_single_current_per_project() {
        let registry = BaselineRegistry::new();
        registry.save(baseline("p", "v1", true)).unwrap();
        let v2 = registry.save(baseline("p", "v2", true)).unwrap();
        registry.save(baseline("q", "v1", true)).unwrap();

        assert_eq!(current_versions(&registry, "p"), vec!["v2"]);
        assert_eq!(current_versions(&registry, "q"), vec!["v1"]);

        let v1 = &registry.list(&id("p"))[0];
        registry.set_current(&id("p"), v1.id).unwrap();
        assert_eq!(current_versions(&registry, "p"), vec!["v1"]);
        assert!(!registry.get(&id("p"), v2.id).unwrap().is_current);
    }

    #[test]
    fn test_set_current_unknown_leaves_flags() {
        let registry = BaselineRegistry::new();
        registry.save(baseline("p", "v1", true)).unwrap();

        let result = registry.set_current(&id("p"), Uuid::new_v4());
        assert!(matches!(result, Err(BaselineError::NotFound { .. })));
        assert_eq!(current_versions(&registry, "p"), vec!["v1"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = BaselineRegistry::new();
        let saved = registry.save(baseline("p", "v1", true)).unwrap();
        let result = registry.save(saved);
        assert!(matches!(result, Err(BaselineError::AlreadyExists(_))));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("baselines.json");

        let registry = BaselineRegistry::new();
        registry.save(baseline("p", "v1", true)).unwrap();
        registry.save(baseline("p", "v2", false)).unwrap();
        registry.save_to_file(&path).unwrap();

        let loaded = BaselineRegistry::load_from_file(&path).unwrap();
        assert_eq!(loaded.list(&id("p")).len(), 2);
        assert_eq!(loaded.current(&id("p")).unwrap().version, "v1");
    }

    #[test]
    fn test_remove_project() {
        let registry = BaselineRegistry::new();
        registry.save(baseline("p", "v1", true)).unwrap();
        assert_eq!(registry.remove_project(&id("p")), 1);
        assert_eq!(registry.state(&id("p")), BaselineState::NoBaseline);
        assert_eq!(registry.remove_project(&id("p")), 0);
    }
}
