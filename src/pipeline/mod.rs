// pipeline/mod.rs
// Pipeline module declarations
// Each phase is a separate module for clean separation

pub mod ingest;      // Phase 1: Load region feature tables
pub mod features;    // Phase 1b: Rates, imputation, standardization, PCA
pub mod cluster;     // Phase 3: Community detection (two strategies)
pub mod analyze;     // Phase 4: Weak boundary analysis
pub mod orchestrate; // Phase 5: Runs the phases per year

pub use orchestrate::{
    BoundaryEdge, Pipeline, PipelineOutcome, PipelineResult, RegionAssignment, Warning,
    YearReport,
};
