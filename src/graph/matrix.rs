// graph/matrix.rs
// Phase 2: Feature matrix - one validated row of standardized attributes per region

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};
use sha2::{Digest, Sha256};

/// N regions × D attributes, every value finite.
///
/// Row order is the canonical region index used by every later stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f64>,
}

impl FeatureMatrix {
    /// Build from row vectors, rejecting ragged rows and non-finite values.
    ///
    /// An empty row set is allowed (the orchestrator turns it into a skip), but
    /// rows without any column are a configuration error.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        let d = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut flat = Vec::with_capacity(n * d);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != d {
                return Err(Error::DataContract(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    d
                )));
            }
            flat.extend_from_slice(row);
        }

        let data = Array2::from_shape_vec((n, d), flat)
            .map_err(|e| Error::DataContract(format!("bad matrix shape: {}", e)))?;
        Self::from_array(data)
    }

    /// Wrap an existing array after checking it has columns and every value
    /// is finite.
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        if data.nrows() > 0 && data.ncols() == 0 {
            return Err(Error::Configuration(
                "feature matrix has no columns".to_string(),
            ));
        }
        if let Some(((row, col), value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::DataContract(format!(
                "non-finite value {} at row {}, column {}",
                value, row, col
            )));
        }
        Ok(Self { data })
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    /// SHA-256 over the shape and the raw value bits, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.nrows() as u64).to_le_bytes());
        hasher.update((self.ncols() as u64).to_le_bytes());
        for value in self.data.iter() {
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_finite() {
        let result = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![f64::NAN, 0.0]]);
        match result {
            Err(Error::DataContract(msg)) => assert!(msg.contains("row 1")),
            other => panic!("expected data contract error, got {:?}", other),
        }

        let result = FeatureMatrix::from_rows(&[vec![f64::INFINITY]]);
        assert!(matches!(result, Err(Error::DataContract(_))));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let result = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![1.0]]);
        assert!(matches!(result, Err(Error::DataContract(_))));
    }

    #[test]
    fn test_rejects_zero_columns() {
        let result = FeatureMatrix::from_rows(&[vec![], vec![]]);
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = FeatureMatrix::from_array(Array2::zeros((3, 0)));
        assert!(matches!(result, Err(Error::Configuration(_))));

        assert!(FeatureMatrix::from_array(Array2::zeros((0, 0))).is_ok());
    }

    #[test]
    fn test_empty_is_allowed() {
        let matrix = FeatureMatrix::from_rows(&[]).unwrap();
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let c = FeatureMatrix::from_rows(&[vec![3.0, 4.0], vec![1.0, 2.0]]).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
