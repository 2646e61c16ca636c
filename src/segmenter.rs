//! End-to-end segmentation: fit, describe and predict

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SegmentationConfig;
use crate::data::{attach_segments, CustomerRecord, CustomerTable};
use crate::error::SegmentationError;
use crate::model::{fit_kmeans, silhouette_score, ClusterModel};
use crate::persistence::ArtifactStore;
use crate::preprocessing::FeatureTransform;
use crate::profile::{describe, SegmentationInsights};
use crate::selection::select_cluster_count;

/// Label returned for a cluster that received no training rows
pub const UNPROFILED_LABEL: &str = "Unprofiled segment";

/// Everything learned by one fit, threaded explicitly into predictions
#[derive(Debug, Clone, PartialEq)]
pub struct FittedSegmentation {
    pub transform: FeatureTransform,
    pub model: ClusterModel,
    pub insights: SegmentationInsights,
}

/// Segment assigned to a single customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub segment_id: usize,
    pub segment_label: String,
}

impl FittedSegmentation {
    /// Assign one record using the fitted transform and centroids; nothing is refitted
    pub fn predict_one(
        &self,
        record: &CustomerRecord,
        config: &SegmentationConfig,
    ) -> crate::Result<Prediction> {
        let features = self.transform.transform_record(record, config.unseen_category)?;
        let segment_id = self.model.assign(features.view())?;
        let segment_label = self
            .insights
            .label_for(segment_id)
            .unwrap_or(UNPROFILED_LABEL)
            .to_string();

        Ok(Prediction {
            segment_id,
            segment_label,
        })
    }
}

/// Result of segmenting a dataset
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    /// Input dataset with a `segment` column appended
    pub labeled: DataFrame,
    /// Segment of every input row
    pub labels: Vec<usize>,
    pub fitted: FittedSegmentation,
}

impl SegmentationOutcome {
    pub fn insights(&self) -> &SegmentationInsights {
        &self.fitted.insights
    }
}

/// Fit the whole pipeline on a typed customer table.
///
/// Returns the training assignments and the fitted state.
pub fn fit_table(
    table: &CustomerTable,
    config: &SegmentationConfig,
) -> crate::Result<(Vec<usize>, FittedSegmentation)> {
    config.validate()?;
    if table.n_rows() == 0 {
        return Err(SegmentationError::InsufficientData {
            rows: 0,
            clusters: config.min_clusters,
        });
    }

    let (transform, prepared) = FeatureTransform::fit(table)?;
    let selection = select_cluster_count(&prepared.scaled, config)?;

    let fitted = fit_kmeans(&prepared.scaled, selection.n_clusters, &config.clustering)?;
    let score = silhouette_score(&prepared.scaled, &fitted.labels, selection.n_clusters);

    let insights = describe(
        &prepared.engineered,
        &fitted.labels,
        selection.n_clusters,
        score,
        &selection.candidates,
    );

    Ok((
        fitted.labels,
        FittedSegmentation {
            transform,
            model: fitted.model,
            insights,
        },
    ))
}

/// Validate, fit and describe a customer DataFrame
pub fn fit_and_describe(
    df: &DataFrame,
    config: &SegmentationConfig,
) -> crate::Result<SegmentationOutcome> {
    let start_time = Instant::now();
    let table = CustomerTable::from_dataframe(df)?;

    let (labels, fitted) = fit_table(&table, config)?;
    let labeled = attach_segments(df, &labels)?;

    info!(
        customers = labels.len(),
        segments = fitted.insights.segment_sizes.len(),
        silhouette_score = fitted.insights.model_info.silhouette_score,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Segmentation completed"
    );

    Ok(SegmentationOutcome {
        labeled,
        labels,
        fitted,
    })
}

/// Holder of the current fitted state for callers that fit and predict concurrently.
///
/// Fits run outside the lock; the new state is swapped in with one write so a
/// prediction sees either the previous model or the new one, never a mix.
#[derive(Debug)]
pub struct SegmentationService {
    config: SegmentationConfig,
    store: Option<ArtifactStore>,
    fitted: RwLock<Option<Arc<FittedSegmentation>>>,
}

impl SegmentationService {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            store: None,
            fitted: RwLock::new(None),
        }
    }

    /// Persist every fit to `store` and allow reloading from it
    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Current fitted state, if any
    pub fn current(&self) -> Option<Arc<FittedSegmentation>> {
        self.fitted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fit on `df`, replace the current state and return the labeled dataset with its insights.
    ///
    /// A failed save is logged and does not fail the fit.
    pub fn fit_and_describe(
        &self,
        df: &DataFrame,
    ) -> crate::Result<(DataFrame, SegmentationInsights)> {
        let outcome = fit_and_describe(df, &self.config)?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&outcome.fitted) {
                warn!("Could not save segmentation artifacts: {}", e);
            }
        }

        let insights = outcome.fitted.insights.clone();
        self.replace(outcome.fitted);
        Ok((outcome.labeled, insights))
    }

    /// Load the persisted state from the configured store
    pub fn load(&self) -> crate::Result<()> {
        let store = self.store.as_ref().ok_or(SegmentationError::ModelNotFitted)?;
        let fitted = store.load()?;
        self.replace(fitted);
        Ok(())
    }

    pub fn predict_one(&self, record: &CustomerRecord) -> crate::Result<Prediction> {
        let fitted = self.current().ok_or(SegmentationError::ModelNotFitted)?;
        let prediction = fitted.predict_one(record, &self.config)?;
        info!(
            segment = prediction.segment_id,
            label = %prediction.segment_label,
            "Predicted segment"
        );
        Ok(prediction)
    }

    fn replace(&self, fitted: FittedSegmentation) {
        let mut guard = self.fitted.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(fitted));
    }
}
