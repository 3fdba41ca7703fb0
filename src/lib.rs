// lib.rs
// Library root: census block-group communities and weak boundaries

//! Data-driven neighborhood communities for census block groups.
//!
//! Regions are linked into a k-nearest-neighbor similarity graph, partitioned
//! with two modularity strategies (Louvain and Leiden by default), and strong
//! similarity edges that a detected split cuts through are reported as weak
//! boundaries.
//!
//! ```no_run
//! use community_boundaries::config::DetectionConfig;
//! use community_boundaries::pipeline::ingest::{InMemorySource, RegionFeatures};
//! use community_boundaries::pipeline::Pipeline;
//!
//! let features = RegionFeatures::new(
//!     vec!["a".into(), "b".into(), "c".into()],
//!     vec![vec![1.0, 0.2], vec![0.9, 0.3], vec![-1.0, 0.1]],
//! );
//! let source = InMemorySource::new().with_year(2019, features);
//! let pipeline = Pipeline::new(source, DetectionConfig::default())?;
//! let outcome = pipeline.run(2019)?;
//! # Ok::<(), community_boundaries::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;

pub use config::{AppConfig, DetectionConfig};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineResult, Warning};
