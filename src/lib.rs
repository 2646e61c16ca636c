//! SegForge: customer segmentation using K-Means clustering
//!
//! Imputes, encodes, engineers and scales demographic and behavioral customer
//! attributes, picks a cluster count by silhouette score, fits K-Means and
//! describes every segment with aggregate statistics and a readable label.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod persistence;
pub mod preprocessing;
pub mod profile;
pub mod segmenter;
pub mod selection;
pub mod summary;

// Re-export public items for easier access
pub use config::{ClusteringParams, SegmentationConfig, UnseenCategoryPolicy};
pub use data::{load_customer_csv, write_csv, CustomerRecord, CustomerTable};
pub use error::SegmentationError;
pub use model::{fit_kmeans, silhouette_score, ClusterModel};
pub use persistence::ArtifactStore;
pub use preprocessing::FeatureTransform;
pub use profile::{describe, SegmentProfile, SegmentationInsights};
pub use segmenter::{
    fit_and_describe, fit_table, FittedSegmentation, Prediction, SegmentationOutcome,
    SegmentationService,
};
pub use selection::select_cluster_count;
pub use summary::{summarize, DataSummary};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentationError>;
