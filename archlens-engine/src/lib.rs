//! Ingestion and architectural analyses for Archlens.
//!
//! This crate turns structural facts about a codebase into an architecture
//! graph and analyzes it.
//!
//! # Overview
//!
//! The archlens-engine crate is responsible for:
//!
//! - **Ingestion**: Replaying parser fact batches into the graph, all-or-nothing
//! - **Cycles**: Finding circular dependencies among modules
//! - **Metrics**: Coupling, instability, density, hot paths, bottlenecks
//! - **Drift**: Comparing the live graph to a saved baseline
//!
//! # Architecture
//!
//! Analyses only read committed graph views, so they can run while an
//! ingestion for the same project is in flight. The drift detector is the
//! only analysis that writes, and it only appends VIOLATES edges.
//!
//! # Modules
//!
//! - [`facts`]: Fact batch format
//! - [`ingest`]: Ingestion pipeline
//! - [`cycles`]: Cycle detector
//! - [`metrics`]: Coupling and risk metrics
//! - [`baseline`]: Baseline storage
//! - [`drift`]: Drift detector
//! - [`config`]: `archlens.yaml` configuration
//! - [`engine`]: Facade over all of the above

pub mod baseline;
pub mod config;
pub mod cycles;
pub mod drift;
pub mod engine;
pub mod facts;
pub mod ingest;
pub mod metrics;

pub use baseline::{
    Baseline, BaselineError, BaselineRegistry, BaselineState, BaselineStore, MetricsSnapshot,
    ModuleMetricSnapshot,
};
pub use config::{ConfigError, CycleConfig, DriftConfig, EngineConfig, MetricsConfig};
pub use cycles::{Cycle, CycleDetector, CycleSearchOutcome};
pub use drift::{DriftDetector, DriftEntry, DriftOutcome, DriftReport, DriftType, ViolationRecord};
pub use engine::{Engine, EngineError};
pub use facts::{EdgeFact, FactBatch, NodeFact};
pub use ingest::{FactRef, IngestError, IngestReport, IngestStage, Ingestor};
pub use metrics::{
    Bottleneck, CouplingLevel, CouplingReport, CriticalModule, Density, HotPath, MetricsEngine,
    ModuleCoupling, ProjectMetrics,
};
