//! Core logic.
//!
//! This module contains:
//! - Catalog: list/search/id reads over a catalog tool
//! - Gate: the content-hash skip-or-recompute decision
//! - Analysis: heuristic text analysis
//! - Workspace: per-book export directory and lock
//! - Pipeline: the end-to-end analysis run

pub mod analysis;
pub mod catalog;
pub mod gate;
pub mod pipeline;
pub mod workspace;

// Re-export commonly used types
pub use analysis::{analyze, load_analysis};
pub use catalog::{CatalogReader, DEFAULT_LIMIT};
pub use gate::{GateDecision, RecomputeReason};
pub use pipeline::{AnalysisJob, AnalysisPipeline, PipelineError, PipelineOutcome};
pub use workspace::{BookWorkspace, WorkspaceLock};
