//! On-disk storage of fitted artifacts

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::data::{CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use crate::error::SegmentationError;
use crate::model::ClusterModel;
use crate::preprocessing::{
    CategoricalEncoder, FeatureTransform, MedianImputer, StandardScaler, N_FEATURES,
};
use crate::profile::SegmentationInsights;
use crate::segmenter::FittedSegmentation;

pub const MODEL_FILE: &str = "kmeans_model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODERS_FILE: &str = "label_encoders.json";
pub const IMPUTER_FILE: &str = "imputer.json";
pub const INSIGHTS_FILE: &str = "segment_insights.json";

/// Directory of JSON artifacts, one file per fitted component
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when every artifact file is present
    pub fn exists(&self) -> bool {
        [MODEL_FILE, SCALER_FILE, ENCODERS_FILE, IMPUTER_FILE, INSIGHTS_FILE]
            .iter()
            .all(|name| self.dir.join(name).is_file())
    }

    pub fn save(&self, fitted: &FittedSegmentation) -> crate::Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SegmentationError::persistence("create", &self.dir, e))?;

        self.write(MODEL_FILE, &fitted.model)?;
        self.write(SCALER_FILE, &fitted.transform.scaler)?;
        self.write(ENCODERS_FILE, &fitted.transform.encoders)?;
        self.write(IMPUTER_FILE, &fitted.transform.imputer)?;
        self.write(INSIGHTS_FILE, &fitted.insights)?;

        info!(dir = %self.dir.display(), "Saved segmentation artifacts");
        Ok(())
    }

    pub fn load(&self) -> crate::Result<FittedSegmentation> {
        let model: ClusterModel = self.read(MODEL_FILE)?;
        let scaler: StandardScaler = self.read(SCALER_FILE)?;
        let encoders: Vec<CategoricalEncoder> = self.read(ENCODERS_FILE)?;
        let imputer: MedianImputer = self.read(IMPUTER_FILE)?;
        let insights: SegmentationInsights = self.read(INSIGHTS_FILE)?;

        let fitted = FittedSegmentation {
            transform: FeatureTransform {
                imputer,
                encoders,
                scaler,
            },
            model,
            insights,
        };
        self.check_consistent(&fitted)?;

        info!(
            dir = %self.dir.display(),
            n_clusters = fitted.model.n_clusters,
            "Loaded segmentation artifacts"
        );
        Ok(fitted)
    }

    /// Reject artifact sets whose shapes disagree, e.g. files from different fits
    fn check_consistent(&self, fitted: &FittedSegmentation) -> crate::Result<()> {
        let transform = &fitted.transform;
        let model = &fitted.model;
        let mismatch = |name: &str, message: String| {
            Err(SegmentationError::persistence("load", self.dir.join(name), message))
        };

        if transform.encoders.len() != CATEGORICAL_FEATURES.len() {
            return mismatch(
                ENCODERS_FILE,
                format!(
                    "expected {} encoders, found {}",
                    CATEGORICAL_FEATURES.len(),
                    transform.encoders.len()
                ),
            );
        }
        if transform.imputer.medians.len() != NUMERIC_FEATURES.len() {
            return mismatch(
                IMPUTER_FILE,
                format!(
                    "expected {} medians, found {}",
                    NUMERIC_FEATURES.len(),
                    transform.imputer.medians.len()
                ),
            );
        }
        if model.centroids.ncols() != N_FEATURES || model.centroids.nrows() != model.n_clusters {
            return mismatch(
                MODEL_FILE,
                format!(
                    "centroid matrix is {}x{}, expected {}x{}",
                    model.centroids.nrows(),
                    model.centroids.ncols(),
                    model.n_clusters,
                    N_FEATURES
                ),
            );
        }
        let scaler = &transform.scaler;
        if scaler.mean.len() != N_FEATURES || scaler.scale.len() != N_FEATURES {
            return mismatch(
                SCALER_FILE,
                format!(
                    "scaler covers {} features, model has {}",
                    scaler.mean.len(),
                    model.centroids.ncols()
                ),
            );
        }
        if fitted.insights.model_info.n_clusters != model.n_clusters {
            return mismatch(
                INSIGHTS_FILE,
                format!(
                    "insights describe {} segments, model has {}",
                    fitted.insights.model_info.n_clusters, model.n_clusters
                ),
            );
        }
        Ok(())
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> crate::Result<()> {
        let path = self.dir.join(name);
        let file = File::create(&path).map_err(|e| SegmentationError::persistence("save", &path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| SegmentationError::persistence("save", &path, e))?;
        writer
            .flush()
            .map_err(|e| SegmentationError::persistence("save", &path, e))?;
        debug!(path = %path.display(), "Wrote artifact");
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> crate::Result<T> {
        let path = self.dir.join(name);
        let file = File::open(&path).map_err(|e| SegmentationError::persistence("load", &path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SegmentationError::persistence("load", &path, e))
    }
}
