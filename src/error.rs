//! Error types for the segmentation engine

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fitting, describing, persisting or predicting segments
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("missing required columns: {}", .0.join(", "))]
    Schema(Vec<String>),

    #[error("column `{0}` has no values to compute a median from")]
    ImputationGap(String),

    #[error("category `{value}` was not seen for `{feature}` during fitting")]
    UnseenCategory { feature: String, value: String },

    #[error("{rows} rows cannot be partitioned into {clusters} clusters")]
    InsufficientData { rows: usize, clusters: usize },

    #[error("no segmentation model has been fitted or loaded; run segmentation first")]
    ModelNotFitted,

    #[error("failed to {action} artifact {}: {message}", path.display())]
    Persistence {
        action: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("non-finite value in feature `{feature}` at row {row}")]
    NonFiniteFeature { feature: String, row: usize },

    #[error("invalid value for `{column}`: {message}")]
    InvalidValue { column: String, message: String },

    #[error("clustering failed: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    #[error("dataframe operation failed: {0}")]
    DataFrame(#[from] polars::prelude::PolarsError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SegmentationError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SegmentationError::Schema(_) => "SchemaError",
            SegmentationError::ImputationGap(_) => "ImputationGap",
            SegmentationError::UnseenCategory { .. } => "UnseenCategoryError",
            SegmentationError::InsufficientData { .. } => "InsufficientDataError",
            SegmentationError::ModelNotFitted => "ModelNotFittedError",
            SegmentationError::Persistence { .. } => "PersistenceError",
            SegmentationError::NonFiniteFeature { .. } => "NonFiniteFeature",
            SegmentationError::InvalidValue { .. } => "InvalidValue",
            SegmentationError::Clustering(_) => "ClusteringError",
            SegmentationError::DataFrame(_) => "DataFrameError",
            SegmentationError::Config(_) => "ConfigError",
        }
    }

    pub(crate) fn persistence(
        action: &'static str,
        path: impl Into<PathBuf>,
        err: impl std::fmt::Display,
    ) -> Self {
        SegmentationError::Persistence {
            action,
            path: path.into(),
            message: err.to_string(),
        }
    }
}
