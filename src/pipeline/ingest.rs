// pipeline/ingest.rs
// Phase 1: Load per-year region features from the data-loading collaborator

use super::features::{prepare, RegionRecord};
use crate::config::FeatureConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Feature rows plus the parallel external identifiers, same order
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFeatures {
    pub region_ids: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    /// Source columns the rows were derived from, when known
    pub columns: Vec<String>,
    /// Principal components in each row, when PCA ran
    pub components: Option<usize>,
}

impl RegionFeatures {
    pub fn new(region_ids: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            region_ids,
            rows,
            columns: Vec::new(),
            components: None,
        }
    }

    pub fn with_provenance(mut self, columns: Vec<String>, components: Option<usize>) -> Self {
        self.columns = columns;
        self.components = components;
        self
    }
}

/// Supplies standardized feature rows per analysis year.
///
/// `Ok(None)` means there is no data for the year; the orchestrator turns it
/// into a skip.
pub trait FeatureSource {
    fn load(&self, year: u16) -> Result<Option<RegionFeatures>>;
}

/// Fixed tables held in memory, keyed by year
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: HashMap<u16, RegionFeatures>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: u16, features: RegionFeatures) -> Self {
        self.tables.insert(year, features);
        self
    }
}

impl FeatureSource for InMemorySource {
    fn load(&self, year: u16) -> Result<Option<RegionFeatures>> {
        Ok(self.tables.get(&year).cloned())
    }
}

/// Reads `features_{year}.json` (an array of [`RegionRecord`]) from a data
/// directory and runs feature preparation on it.
#[derive(Debug, Clone)]
pub struct JsonFeatureSource {
    data_dir: PathBuf,
    features: FeatureConfig,
}

impl JsonFeatureSource {
    pub fn new(data_dir: impl AsRef<Path>, features: FeatureConfig) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            features,
        }
    }

    pub fn path_for(&self, year: u16) -> PathBuf {
        self.data_dir.join(format!("features_{}.json", year))
    }

    pub fn load_records(&self, year: u16) -> Result<Option<Vec<RegionRecord>>> {
        let path = self.path_for(year);
        if !path.exists() {
            warn!("Feature table not found at {}", path.display());
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)?;
        let records: Vec<RegionRecord> = serde_json::from_str(&json)?;
        info!("[{}] Loaded {} regions from {}", year, records.len(), path.display());
        Ok(Some(records))
    }
}

impl FeatureSource for JsonFeatureSource {
    fn load(&self, year: u16) -> Result<Option<RegionFeatures>> {
        let Some(records) = self.load_records(year)? else {
            return Ok(None);
        };
        if records.is_empty() {
            return Ok(Some(RegionFeatures::new(Vec::new(), Vec::new())));
        }

        let prepared = prepare(&records, &self.features)?;
        Ok(Some(
            RegionFeatures::new(prepared.region_ids, prepared.rows)
                .with_provenance(prepared.columns, prepared.components),
        ))
    }
}
