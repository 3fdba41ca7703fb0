// config.rs
// Configuration: detection parameters, feature preparation and runner settings
//
// Everything the pipeline needs is passed in explicitly; there is no global
// state. `DetectionConfig` drives the core graph/community stages and
// `AppConfig` wraps it with the settings the binary needs to find input
// tables and write results.

use crate::error::{Error, Result};
use crate::graph::similarity::SimilarityMetric;
use crate::pipeline::cluster::StrategyKind;
use crate::pipeline::features::RateRule;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which detected partition the boundary analyzer scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPartition {
    A,
    B,
}

/// Parameters for graph construction, community detection and boundary analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Neighbors selected per node in the k-NN graph
    pub knn_k: usize,
    /// Seed shared by both partitioning strategies
    pub random_seed: u64,
    /// Cross-community edges heavier than this are weak boundaries
    pub weak_boundary_threshold: f64,
    /// Similarity metric used to weight the graph
    pub similarity_metric: SimilarityMetric,
    /// First partitioning strategy
    pub strategy_a: StrategyKind,
    /// Second partitioning strategy
    pub strategy_b: StrategyKind,
    /// Partition used for weak-boundary detection
    pub boundary_partition: BoundaryPartition,
    /// Modularity resolution (gamma)
    pub resolution: f64,
    /// Run both strategies concurrently on the shared graph
    pub parallel_detection: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            knn_k: 8,
            random_seed: 42,
            weak_boundary_threshold: 0.8,
            similarity_metric: SimilarityMetric::Cosine,
            strategy_a: StrategyKind::Louvain,
            strategy_b: StrategyKind::Leiden,
            boundary_partition: BoundaryPartition::B,
            resolution: 1.0,
            parallel_detection: false,
        }
    }
}

impl DetectionConfig {
    /// Reject parameters the stages cannot work with.
    ///
    /// The threshold is expected in (0, 1] but only non-finite and negative
    /// values are rejected.
    pub fn validate(&self) -> Result<()> {
        if self.knn_k == 0 {
            return Err(Error::Configuration(
                "knn_k must be at least 1".to_string(),
            ));
        }
        if !self.weak_boundary_threshold.is_finite() || self.weak_boundary_threshold < 0.0 {
            return Err(Error::Configuration(format!(
                "weak_boundary_threshold must be a finite non-negative number, got {}",
                self.weak_boundary_threshold
            )));
        }
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(Error::Configuration(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// Feature preparation settings for the region tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Columns used for clustering, in order
    pub columns: Vec<String>,
    /// Derived rate columns computed before selection
    pub rate_rules: Vec<RateRule>,
    /// Explained variance kept by PCA; `None` disables the reduction
    pub pca_variance: Option<f64>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            columns: [
                "median_household_income",
                "median_housing_value",
                "median_age",
                "pct_unemployed",
                "pct_transit",
                "pct_bachelors",
                "pct_white",
                "pct_black",
                "pct_hispanic",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rate_rules: RateRule::census_defaults(),
            pca_variance: Some(0.90),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Configuration(
                "at least one feature column is required".to_string(),
            ));
        }
        if let Some(variance) = self.pca_variance {
            if !(variance > 0.0 && variance <= 1.0) {
                return Err(Error::Configuration(format!(
                    "pca_variance must be in (0, 1], got {}",
                    variance
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration for the command line runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Analysis years, run independently
    pub years: Vec<u16>,
    /// Directory holding `features_{year}.json`
    pub data_dir: String,
    /// Directory receiving `results_{year}.json`
    pub output_dir: String,
    pub features: FeatureConfig,
    pub detection: DetectionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            years: vec![2019, 2022],
            data_dir: "data".to_string(),
            output_dir: "output".to_string(),
            features: FeatureConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.detection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.knn_k, 8);
        assert_eq!(config.detection.random_seed, 42);
        assert!((config.detection.weak_boundary_threshold - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_zero_k_rejected() {
        let config = DetectionConfig {
            knn_k: 0,
            ..DetectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_threshold_range() {
        let nan = DetectionConfig {
            weak_boundary_threshold: f64::NAN,
            ..DetectionConfig::default()
        };
        assert!(nan.validate().is_err());

        // Above 1 is pointless but tolerated
        let high = DetectionConfig {
            weak_boundary_threshold: 1.5,
            ..DetectionConfig::default()
        };
        assert!(high.validate().is_ok());
    }

    #[test]
    fn test_empty_columns_rejected() {
        let features = FeatureConfig {
            columns: Vec::new(),
            ..FeatureConfig::default()
        };
        assert!(matches!(features.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
years = [2021]

[detection]
knn_k = 4
similarity_metric = "mahalanobis"
strategy_a = "leiden"
boundary_partition = "a"
"#,
        )
        .unwrap();

        assert_eq!(config.years, vec![2021]);
        assert_eq!(config.detection.knn_k, 4);
        assert_eq!(config.detection.similarity_metric, SimilarityMetric::Mahalanobis);
        assert_eq!(config.detection.strategy_a, StrategyKind::Leiden);
        assert_eq!(config.detection.strategy_b, StrategyKind::Leiden);
        assert_eq!(config.detection.boundary_partition, BoundaryPartition::A);
        assert_eq!(config.data_dir, "data");
    }

    #[test]
    fn test_invalid_toml_value_rejected() {
        let result = AppConfig::from_toml("[detection]\nknn_k = 0\n");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
