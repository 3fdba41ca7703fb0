// pipeline/features.rs
// Phase 1b: Feature preparation
// Derived rates, column selection, median imputation, standardization and PCA

use crate::config::FeatureConfig;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One region's raw attributes; `None` marks a missing value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub region_id: String,
    pub values: BTreeMap<String, Option<f64>>,
}

/// `output = numerator / denominator`, or 0 when the denominator is not positive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    pub numerator: String,
    pub denominator: String,
    pub output: String,
}

impl RateRule {
    pub fn new(numerator: &str, denominator: &str, output: &str) -> Self {
        Self {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            output: output.to_string(),
        }
    }

    /// Rates derived from the ACS block-group counts
    pub fn census_defaults() -> Vec<Self> {
        vec![
            Self::new("emp_unemployed", "emp_labor_force", "pct_unemployed"),
            Self::new("commute_public_transit", "commute_total", "pct_transit"),
            Self::new("edu_bachelors", "edu_total_over_25", "pct_bachelors"),
            Self::new("race_white", "total_population", "pct_white"),
            Self::new("race_black", "total_population", "pct_black"),
            Self::new("race_hispanic", "total_population", "pct_hispanic"),
        ]
    }

    fn rate(&self, values: &BTreeMap<String, Option<f64>>) -> Option<f64> {
        let denominator = values.get(&self.denominator).copied().flatten();
        match denominator {
            Some(d) if d > 0.0 => values
                .get(&self.numerator)
                .copied()
                .flatten()
                .map(|n| n / d),
            _ => Some(0.0),
        }
    }
}

/// Apply every rule whose input columns appear somewhere in the table
pub fn derive_rates(records: &mut [RegionRecord], rules: &[RateRule]) {
    for rule in rules {
        let has_column = |name: &str| records.iter().any(|r| r.values.contains_key(name));
        if !has_column(&rule.numerator) || !has_column(&rule.denominator) {
            debug!(output = %rule.output, "rate rule skipped, input column absent");
            continue;
        }
        for record in records.iter_mut() {
            let rate = rule.rate(&record.values);
            record.values.insert(rule.output.clone(), rate);
        }
    }
}

/// Feature matrix rows ready for the graph stage, with the row identifiers
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub region_ids: Vec<String>,
    /// Source columns that survived selection
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Principal components kept, when PCA ran
    pub components: Option<usize>,
}

/// Run the whole preparation chain. Row order is preserved throughout.
pub fn prepare(records: &[RegionRecord], config: &FeatureConfig) -> Result<PreparedFeatures> {
    let mut records = records.to_vec();
    derive_rates(&mut records, &config.rate_rules);

    let columns: Vec<String> = config
        .columns
        .iter()
        .filter(|col| {
            records
                .iter()
                .any(|r| r.values.get(col.as_str()).copied().flatten().is_some())
        })
        .cloned()
        .collect();

    if columns.is_empty() {
        return Err(Error::Configuration(
            "no valid features found for clustering".to_string(),
        ));
    }
    info!("Using features: {:?}", columns);

    let raw: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|col| {
            records
                .iter()
                .map(|r| r.values.get(col).copied().flatten())
                .collect()
        })
        .collect();

    let n = records.len();
    let d = columns.len();
    let imputed = impute_median(&raw);
    let mut data = Array2::from_shape_fn((n, d), |(i, j)| imputed[j][i]);
    if let Some((row, col)) = data
        .indexed_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(idx, _)| idx)
    {
        return Err(Error::DataContract(format!(
            "non-finite value in region {} column {}",
            records[row].region_id, columns[col]
        )));
    }

    standardize(&mut data);

    let mut components = None;
    if let Some(variance) = config.pca_variance {
        if n >= 2 {
            data = pca_reduce(&data, variance);
            components = Some(data.ncols());
            info!(
                "PCA reduced dimensions to {} components (retaining {:.0}% variance)",
                data.ncols(),
                variance * 100.0
            );
        }
    }

    Ok(PreparedFeatures {
        region_ids: records.iter().map(|r| r.region_id.clone()).collect(),
        columns,
        rows: data.outer_iter().map(|row| row.to_vec()).collect(),
        components,
    })
}

/// Replace missing values with the column median
pub fn impute_median(columns: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
    columns
        .iter()
        .map(|column| {
            let mut present: Vec<f64> = column.iter().flatten().copied().collect();
            present.sort_by(|a, b| a.total_cmp(b));
            let median = match present.len() {
                0 => 0.0,
                len if len % 2 == 1 => present[len / 2],
                len => (present[len / 2 - 1] + present[len / 2]) / 2.0,
            };
            column.iter().map(|v| v.unwrap_or(median)).collect()
        })
        .collect()
}

/// Zero mean and unit population variance per column; constant columns
/// become all zero.
pub fn standardize(data: &mut Array2<f64>) {
    if data.nrows() == 0 {
        return;
    }
    for mut column in data.axis_iter_mut(Axis(1)) {
        let n = column.len() as f64;
        let mean = column.sum() / n;
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        column.mapv_inplace(|v| if std > 0.0 { (v - mean) / std } else { 0.0 });
    }
}

/// Project centered data onto the fewest principal components whose
/// cumulative explained variance ratio exceeds `variance`, or all of them
/// when none does.
///
/// Each component is sign-normalized so its largest loading is positive.
pub fn pca_reduce(data: &Array2<f64>, variance: f64) -> Array2<f64> {
    let n = data.nrows();
    let d = data.ncols();
    let means = data.mean_axis(Axis(0)).unwrap_or_else(|| ndarray::Array1::zeros(d));
    let centered = data - &means;
    let covariance = centered.t().dot(&centered) / (n.max(2) as f64 - 1.0);

    let eigen = SymmetricEigen::new(DMatrix::from_fn(d, d, |r, c| covariance[[r, c]]));
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let explained: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect();
    let total: f64 = explained.iter().sum();

    let mut keep = 1;
    if total > 0.0 {
        let mut cumulative = 0.0;
        for (idx, value) in explained.iter().enumerate() {
            cumulative += value / total;
            keep = idx + 1;
            if cumulative > variance {
                break;
            }
        }
    }

    let mut basis = Array2::zeros((d, keep));
    for (k, &i) in order.iter().take(keep).enumerate() {
        let vector = eigen.eigenvectors.column(i);
        let pivot = vector
            .iter()
            .copied()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for r in 0..d {
            basis[[r, k]] = sign * vector[r];
        }
    }

    debug!(kept = keep, of = d, "principal components selected");
    centered.dot(&basis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: &[(&str, Option<f64>)]) -> RegionRecord {
        RegionRecord {
            region_id: id.to_string(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_rate_rules_default_zero_denominator() {
        let mut records = vec![
            record("a", &[("emp_unemployed", Some(5.0)), ("emp_labor_force", Some(50.0))]),
            record("b", &[("emp_unemployed", Some(5.0)), ("emp_labor_force", Some(0.0))]),
            record("c", &[("emp_unemployed", None), ("emp_labor_force", Some(10.0))]),
        ];
        derive_rates(&mut records, &RateRule::census_defaults());

        assert_eq!(records[0].values["pct_unemployed"], Some(0.1));
        assert_eq!(records[1].values["pct_unemployed"], Some(0.0));
        assert_eq!(records[2].values["pct_unemployed"], None);
        // Transit inputs are absent, so no transit column is created
        assert!(!records[0].values.contains_key("pct_transit"));
    }

    #[test]
    fn test_impute_median() {
        let columns = vec![
            vec![Some(1.0), None, Some(3.0), Some(10.0)],
            vec![Some(2.0), Some(4.0), None],
        ];
        let imputed = impute_median(&columns);
        assert_eq!(imputed[0], vec![1.0, 3.0, 3.0, 10.0]);
        assert_eq!(imputed[1], vec![2.0, 4.0, 3.0]);
    }

    #[test]
    fn test_standardize() {
        let mut data = Array2::from_shape_vec((4, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0, 5.0])
            .unwrap();
        standardize(&mut data);

        let col0 = data.column(0);
        assert!(col0.sum().abs() < 1e-12);
        let var: f64 = col0.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!((var - 1.0).abs() < 1e-12);
        assert!(data.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pca_keeps_dominant_direction() {
        // Points spread along (1, 1) with a little noise
        let data = Array2::from_shape_vec(
            (5, 2),
            vec![-2.0, -2.1, -1.0, -0.9, 0.0, 0.05, 1.0, 1.0, 2.0, 1.95],
        )
        .unwrap();
        let reduced = pca_reduce(&data, 0.9);
        assert_eq!(reduced.ncols(), 1);
        // Ordering along the main axis is preserved
        assert!(reduced[[0, 0]] < reduced[[2, 0]]);
        assert!(reduced[[2, 0]] < reduced[[4, 0]]);

        let full = pca_reduce(&data, 1.0);
        assert_eq!(full.ncols(), 2);
    }

    #[test]
    fn test_pca_target_must_be_exceeded() {
        // Equal spread on both axes, each component explains exactly half
        let data = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, 0.0, -1.0, 0.0, 0.0, 1.0, 0.0, -1.0],
        )
        .unwrap();
        assert_eq!(pca_reduce(&data, 0.4).ncols(), 1);
        assert_eq!(pca_reduce(&data, 0.5).ncols(), 2);
    }

    #[test]
    fn test_prepare_end_to_end() {
        let records = vec![
            record("r1", &[("median_age", Some(30.0)), ("median_household_income", Some(40_000.0))]),
            record("r2", &[("median_age", None), ("median_household_income", Some(60_000.0))]),
            record("r3", &[("median_age", Some(50.0)), ("median_household_income", None)]),
        ];
        let config = FeatureConfig {
            pca_variance: None,
            ..FeatureConfig::default()
        };
        let prepared = prepare(&records, &config).unwrap();

        assert_eq!(prepared.region_ids, vec!["r1", "r2", "r3"]);
        assert_eq!(
            prepared.columns,
            vec!["median_household_income".to_string(), "median_age".to_string()]
        );
        assert_eq!(prepared.rows.len(), 3);
        assert!(prepared.rows.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(prepared.components, None);
    }

    #[test]
    fn test_prepare_without_usable_columns() {
        let records = vec![record("r1", &[("unrelated", Some(1.0))])];
        let result = prepare(&records, &FeatureConfig::default());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
