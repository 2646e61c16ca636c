//! Engine configuration, loadable from a TOML file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SegmentationError;

/// What to do with a categorical value that was not seen during fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnseenCategoryPolicy {
    /// Map to the reserved code one past the last fitted class
    #[default]
    Unknown,
    /// Fail with `UnseenCategory`
    Reject,
}

/// K-Means fitting parameters shared by the selector and the final fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    /// Seed for centroid initialisation; every fit reseeds from it
    pub seed: u64,
    /// Independent restarts per fit, best inertia wins
    pub n_runs: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_runs: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Full configuration of a segmentation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub clustering: ClusteringParams,
    /// Smallest cluster count tried by the selector
    pub min_clusters: usize,
    /// Largest cluster count tried by the selector
    pub max_clusters: usize,
    /// Used when no candidate beats the sentinel score
    pub default_clusters: usize,
    pub unseen_category: UnseenCategoryPolicy,
    /// Directory holding persisted artifacts
    pub model_dir: PathBuf,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            clustering: ClusteringParams::default(),
            min_clusters: 3,
            max_clusters: 8,
            default_clusters: 4,
            unseen_category: UnseenCategoryPolicy::Unknown,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl SegmentationConfig {
    /// Read a TOML config file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SegmentationError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SegmentationError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded segmentation config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.min_clusters < 2 {
            return Err(SegmentationError::Config(
                "min_clusters must be at least 2".to_string(),
            ));
        }
        if self.max_clusters < self.min_clusters {
            return Err(SegmentationError::Config(format!(
                "max_clusters ({}) is below min_clusters ({})",
                self.max_clusters, self.min_clusters
            )));
        }
        if self.default_clusters < 2 {
            return Err(SegmentationError::Config(
                "default_clusters must be at least 2".to_string(),
            ));
        }
        if self.clustering.n_runs == 0 {
            return Err(SegmentationError::Config("n_runs must be positive".to_string()));
        }
        Ok(())
    }
}
