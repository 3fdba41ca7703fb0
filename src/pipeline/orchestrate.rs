// pipeline/orchestrate.rs
// Phase 5: Orchestration, features -> graph -> communities -> boundaries,
// once per analysis year

use super::analyze::{find_weak_boundaries, summarize};
use super::cluster::{CommunityDetector, StrategyKind};
use super::ingest::{FeatureSource, RegionFeatures};
use crate::config::{BoundaryPartition, DetectionConfig};
use crate::error::{Error, Result};
use crate::graph::builder::build_graph;
use crate::graph::matrix::FeatureMatrix;
use crate::graph::similarity::SimilarityMetric;
use crate::graph::GraphStats;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Non-fatal condition attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The requested similarity metric failed and cosine was used instead
    NumericalDegradation {
        requested: SimilarityMetric,
        used: SimilarityMetric,
        reason: String,
    },
}

/// Community ids of one region under both strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionAssignment {
    pub region_id: String,
    pub community_a: usize,
    pub community_b: usize,
}

/// Weak boundary expressed with external identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEdge {
    pub source_region: String,
    pub target_region: String,
    pub weight: f64,
}

/// Everything a reporting collaborator needs for one year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub year: u16,
    pub strategy_a: StrategyKind,
    pub strategy_b: StrategyKind,
    pub score_a: f64,
    pub score_b: f64,
    /// One entry per input row, in input order
    pub regions: Vec<RegionAssignment>,
    pub weak_boundaries: Vec<BoundaryEdge>,
    pub boundary_partition: BoundaryPartition,
    pub warnings: Vec<Warning>,
    pub graph: GraphStats,
    /// Source feature columns used, empty when the caller supplied bare rows
    pub feature_columns: Vec<String>,
    /// Principal components kept by feature preparation
    pub pca_components: Option<usize>,
    pub input_fingerprint: String,
    pub generated_at: String,
}

impl PipelineResult {
    pub fn community_count_a(&self) -> usize {
        self.regions.iter().map(|r| r.community_a + 1).max().unwrap_or(0)
    }

    pub fn community_count_b(&self) -> usize {
        self.regions.iter().map(|r| r.community_b + 1).max().unwrap_or(0)
    }

    /// Write as pretty JSON
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Result of running one year
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed(Box<PipelineResult>),
    /// Nothing to analyze for this year
    Skipped { year: u16, reason: String },
}

impl PipelineOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, PipelineOutcome::Skipped { .. })
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            PipelineOutcome::Completed(result) => Some(result),
            PipelineOutcome::Skipped { .. } => None,
        }
    }
}

/// Per-year entry of a multi-year run
#[derive(Debug)]
pub struct YearReport {
    pub year: u16,
    pub outcome: Result<PipelineOutcome>,
}

pub struct Pipeline<S> {
    source: S,
    config: DetectionConfig,
    detector: CommunityDetector,
}

impl<S: FeatureSource> Pipeline<S> {
    /// Validate `config` and set up both partitioners
    pub fn new(source: S, config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        let detector =
            CommunityDetector::from_kinds(config.strategy_a, config.strategy_b, config.resolution)
                .with_parallel(config.parallel_detection);
        Ok(Self {
            source,
            config,
            detector,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Load the year's features and analyze them
    pub fn run(&self, year: u16) -> Result<PipelineOutcome> {
        info!("Starting pipeline for {}", year);
        match self.source.load(year)? {
            Some(features) => self.analyze(year, features),
            None => {
                warn!("Skipping {} due to missing data", year);
                Ok(PipelineOutcome::Skipped {
                    year,
                    reason: "no feature table available".to_string(),
                })
            }
        }
    }

    /// Run each year independently; a failure only affects its own year
    pub fn run_all(&self, years: &[u16]) -> Vec<YearReport> {
        years
            .iter()
            .map(|&year| {
                let outcome = self.run(year);
                if let Err(e) = &outcome {
                    warn!("Analysis for {} failed: {}", year, e);
                }
                YearReport { year, outcome }
            })
            .collect()
    }

    /// Graph, communities and boundaries for already-loaded features
    pub fn analyze(&self, year: u16, features: RegionFeatures) -> Result<PipelineOutcome> {
        let RegionFeatures {
            region_ids,
            rows,
            columns,
            components,
        } = features;

        if rows.len() != region_ids.len() {
            return Err(Error::DataContract(format!(
                "{} feature rows but {} region identifiers",
                rows.len(),
                region_ids.len()
            )));
        }
        if rows.len() < 2 {
            info!("Skipping {}: {} region(s) available", year, rows.len());
            return Ok(PipelineOutcome::Skipped {
                year,
                reason: format!("{} region(s), need at least 2", rows.len()),
            });
        }

        let matrix = FeatureMatrix::from_rows(&rows)?;

        info!("Constructing network graph...");
        let built = build_graph(&matrix, self.config.knn_k, self.config.similarity_metric)?;
        let mut graph = built.graph;
        graph.set_region_ids(&region_ids);

        let mut warnings = Vec::new();
        if let Some(reason) = built.similarity.fallback_reason {
            warnings.push(Warning::NumericalDegradation {
                requested: built.similarity.requested,
                used: built.similarity.used,
                reason,
            });
        }

        let stats = graph.stats();
        info!(
            "Graph: {} nodes, {} edges, {} components, {} isolated",
            stats.total_nodes, stats.total_edges, stats.components, stats.isolated_nodes
        );

        info!("Detecting communities...");
        let detection = self.detector.detect(&graph, self.config.random_seed);

        let scanned = match self.config.boundary_partition {
            BoundaryPartition::A => &detection.partition_a,
            BoundaryPartition::B => &detection.partition_b,
        };
        let weak = find_weak_boundaries(&graph, scanned, self.config.weak_boundary_threshold);
        let summary = summarize(&graph, scanned, &weak);
        info!(
            "Identified {} weak boundary segments ({} crossing edges)",
            summary.weak_boundaries, summary.crossing_edges
        );

        let regions = region_ids
            .iter()
            .enumerate()
            .map(|(node, region_id)| RegionAssignment {
                region_id: region_id.clone(),
                community_a: detection.partition_a.membership()[node],
                community_b: detection.partition_b.membership()[node],
            })
            .collect();

        let weak_boundaries = weak
            .iter()
            .map(|b| BoundaryEdge {
                source_region: region_ids[b.source].clone(),
                target_region: region_ids[b.target].clone(),
                weight: b.weight,
            })
            .collect();

        Ok(PipelineOutcome::Completed(Box::new(PipelineResult {
            year,
            strategy_a: self.config.strategy_a,
            strategy_b: self.config.strategy_b,
            score_a: detection.score_a,
            score_b: detection.score_b,
            regions,
            weak_boundaries,
            boundary_partition: self.config.boundary_partition,
            warnings,
            graph: stats,
            feature_columns: columns,
            pca_components: components,
            input_fingerprint: matrix.fingerprint(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::InMemorySource;

    fn features(n: usize) -> RegionFeatures {
        let rows = (0..n)
            .map(|i| vec![(i as f64).sin() + 1.5, (i as f64 * 0.7).cos() + 1.5])
            .collect();
        let ids = (0..n).map(|i| format!("bg{:03}", i)).collect();
        RegionFeatures::new(ids, rows)
    }

    fn pipeline(source: InMemorySource) -> Pipeline<InMemorySource> {
        Pipeline::new(source, DetectionConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = DetectionConfig {
            knn_k: 0,
            ..DetectionConfig::default()
        };
        assert!(matches!(
            Pipeline::new(InMemorySource::new(), config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_year_is_skipped() {
        let outcome = pipeline(InMemorySource::new()).run(2019).unwrap();
        assert!(outcome.is_skipped());
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_empty_and_single_region_are_skipped() {
        let p = pipeline(InMemorySource::new());
        assert!(p.analyze(2019, features(0)).unwrap().is_skipped());
        assert!(p.analyze(2019, features(1)).unwrap().is_skipped());
    }

    #[test]
    fn test_row_count_mismatch_is_contract_violation() {
        let p = pipeline(InMemorySource::new());
        let mut f = features(4);
        f.region_ids.pop();
        assert!(matches!(p.analyze(2019, f), Err(Error::DataContract(_))));
    }

    #[test]
    fn test_non_finite_is_contract_violation() {
        let p = pipeline(InMemorySource::new());
        let mut f = features(4);
        f.rows[2][1] = f64::NAN;
        assert!(matches!(p.analyze(2019, f), Err(Error::DataContract(_))));
    }

    #[test]
    fn test_result_preserves_row_order() {
        let p = pipeline(InMemorySource::new());
        let outcome = p.analyze(2022, features(12)).unwrap();
        let result = outcome.result().unwrap();

        assert_eq!(result.regions.len(), 12);
        for (i, region) in result.regions.iter().enumerate() {
            assert_eq!(region.region_id, format!("bg{:03}", i));
        }
        assert_eq!(result.graph.total_nodes, 12);
        assert!(result.warnings.is_empty());
        assert_eq!(result.input_fingerprint.len(), 64);
    }

    #[test]
    fn test_result_written_as_json() {
        let p = pipeline(InMemorySource::new());
        let outcome = p.analyze(2019, features(6)).unwrap();
        let result = outcome.result().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results_2019.json");
        result.save_to_file(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let back: PipelineResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.regions, result.regions);
        assert_eq!(back.strategy_b, StrategyKind::Leiden);
        assert!(json.contains("\"generated_at\""));
    }

    #[test]
    fn test_failed_year_does_not_stop_others() {
        let mut bad = features(4);
        bad.rows[0][0] = f64::INFINITY;
        let source = InMemorySource::new()
            .with_year(2019, bad)
            .with_year(2022, features(10));

        let reports = pipeline(source).run_all(&[2019, 2020, 2022]);
        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[0].outcome, Err(Error::DataContract(_))));
        assert!(reports[1].outcome.as_ref().unwrap().is_skipped());
        assert!(reports[2].outcome.as_ref().unwrap().result().is_some());
    }

    #[test]
    fn test_fallback_is_reported_as_warning() {
        let config = DetectionConfig {
            similarity_metric: SimilarityMetric::Mahalanobis,
            knn_k: 2,
            ..DetectionConfig::default()
        };
        let p = Pipeline::new(InMemorySource::new(), config).unwrap();
        let f = RegionFeatures::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![1e200, 1.0], vec![-1e200, 2.0], vec![1e200, 3.0]],
        );

        let outcome = p.analyze(2019, f).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(
            result.warnings[0],
            Warning::NumericalDegradation {
                requested: SimilarityMetric::Mahalanobis,
                used: SimilarityMetric::Cosine,
                ..
            }
        ));
    }
}
