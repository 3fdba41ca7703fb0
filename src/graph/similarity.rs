// graph/similarity.rs
// Phase 2: Pairwise similarity between region feature vectors

use super::matrix::FeatureMatrix;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Tolerance below which singular values are treated as zero in the
/// covariance pseudo-inverse.
const PINV_EPSILON: f64 = 1e-10;

/// Similarity metric used to weight graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine of the angle between rows, in [-1, 1]
    Cosine,
    /// `1 / (1 + d)` with `d` the Mahalanobis distance under the
    /// pseudo-inverse of the column covariance
    Mahalanobis,
}

/// Square symmetric matrix of pairwise similarities.
///
/// The diagonal carries no meaning and is skipped by neighbor selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    values: Array2<f64>,
}

impl SimilarityMatrix {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[[i, j]]
    }

    /// Row `i`, self included.
    pub fn row(&self, i: usize) -> ndarray::ArrayView1<'_, f64> {
        self.values.row(i)
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.values
    }

    /// Largest `|s[i][j] - s[j][i]|` over the matrix.
    pub fn max_asymmetry(&self) -> f64 {
        let n = self.len();
        let mut worst = 0.0f64;
        for i in 0..n {
            for j in (i + 1)..n {
                worst = worst.max((self.values[[i, j]] - self.values[[j, i]]).abs());
            }
        }
        worst
    }
}

/// Similarity matrix plus the metric that actually produced it.
#[derive(Debug, Clone)]
pub struct SimilarityOutcome {
    pub matrix: SimilarityMatrix,
    pub requested: SimilarityMetric,
    pub used: SimilarityMetric,
    /// Why the requested metric was abandoned, if it was
    pub fallback_reason: Option<String>,
}

impl SimilarityOutcome {
    pub fn fell_back(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Compute pairwise similarity under `metric`.
///
/// The Mahalanobis path never fails outward: any numerical problem switches
/// to cosine and is recorded in `fallback_reason`.
pub fn similarity(features: &FeatureMatrix, metric: SimilarityMetric) -> SimilarityOutcome {
    match metric {
        SimilarityMetric::Cosine => SimilarityOutcome {
            matrix: cosine_similarity(features),
            requested: metric,
            used: SimilarityMetric::Cosine,
            fallback_reason: None,
        },
        SimilarityMetric::Mahalanobis => match mahalanobis_similarity(features) {
            Ok(matrix) => SimilarityOutcome {
                matrix,
                requested: metric,
                used: SimilarityMetric::Mahalanobis,
                fallback_reason: None,
            },
            Err(reason) => {
                warn!(%reason, "Mahalanobis similarity failed, falling back to cosine");
                SimilarityOutcome {
                    matrix: cosine_similarity(features),
                    requested: metric,
                    used: SimilarityMetric::Cosine,
                    fallback_reason: Some(reason),
                }
            }
        },
    }
}

/// Cosine similarity between every pair of rows.
///
/// Rows are normalized with a max-abs rescale first so that large magnitudes
/// do not overflow the dot products. A zero row is dissimilar to everything.
pub fn cosine_similarity(features: &FeatureMatrix) -> SimilarityMatrix {
    let n = features.nrows();
    let units: Vec<Option<Array1<f64>>> = (0..n).map(|i| unit_vector(features, i)).collect();

    let mut values = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let sim = match (&units[i], &units[j]) {
                (Some(a), Some(b)) => a.dot(b),
                _ => 0.0,
            };
            values[[i, j]] = sim;
            values[[j, i]] = sim;
        }
    }

    SimilarityMatrix { values }
}

fn unit_vector(features: &FeatureMatrix, i: usize) -> Option<Array1<f64>> {
    let row = features.row(i);
    let scale = row.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return None;
    }
    let scaled = row.mapv(|v| v / scale);
    let norm = scaled.dot(&scaled).sqrt();
    Some(scaled / norm)
}

/// `1 / (1 + d(i, j))` with Mahalanobis distance under the pseudo-inverse of
/// the sample covariance.
pub fn mahalanobis_similarity(features: &FeatureMatrix) -> Result<SimilarityMatrix, String> {
    let n = features.nrows();
    let d = features.ncols();
    if n < 2 {
        return Err(format!("covariance needs at least 2 rows, got {}", n));
    }

    let data = features.as_array();
    let means = data
        .mean_axis(ndarray::Axis(0))
        .ok_or_else(|| "cannot compute column means".to_string())?;
    let centered = data - &means;
    let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

    if covariance.iter().any(|v| !v.is_finite()) {
        return Err("covariance matrix is not finite".to_string());
    }

    let cov = DMatrix::from_fn(d, d, |r, c| covariance[[r, c]]);
    let inverse = cov
        .pseudo_inverse(PINV_EPSILON)
        .map_err(|e| format!("pseudo-inverse failed: {}", e))?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err("pseudo-inverse is not finite".to_string());
    }
    debug!(dimensions = d, "covariance pseudo-inverse computed");

    let vi = Array2::from_shape_fn((d, d), |(r, c)| inverse[(r, c)]);
    let mut values = Array2::zeros((n, n));
    for i in 0..n {
        values[[i, i]] = 1.0;
        for j in (i + 1)..n {
            let delta = &data.row(i) - &data.row(j);
            let mut quad = delta.dot(&vi.dot(&delta));
            // Rounding can push a PSD form slightly negative
            if quad < 0.0 && quad > -1e-9 {
                quad = 0.0;
            }
            if !quad.is_finite() || quad < 0.0 {
                return Err(format!(
                    "invalid squared distance {} between rows {} and {}",
                    quad, i, j
                ));
            }
            let sim = 1.0 / (1.0 + quad.sqrt());
            values[[i, j]] = sim;
            values[[j, i]] = sim;
        }
    }

    Ok(SimilarityMatrix { values })
}
