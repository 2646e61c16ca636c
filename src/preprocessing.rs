//! Feature processing: median imputation, categorical encoding, derived
//! features and standard scaling.
//!
//! Everything learned from the training dataset lives in [`FeatureTransform`]
//! so that later transforms, including single-record prediction, reuse the
//! exact same parameters.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::UnseenCategoryPolicy;
use crate::data::{
    CustomerRecord, CustomerTable, AVG_ORDER_VALUE, AVG_TIME_SPENT, CATEGORICAL_FEATURES,
    CUSTOMER_LIFETIME_VALUE, NUMERIC_FEATURES, PURCHASE_FREQUENCY, VISITS_PER_MONTH,
};
use crate::error::SegmentationError;

/// Features derived from the imputed numeric attributes
pub const ENGINEERED_FEATURES: [&str; 3] =
    ["avg_value_per_visit", "engagement_score", "value_score"];

/// Number of columns fed to the clustering engine
pub const N_FEATURES: usize = NUMERIC_FEATURES.len() + CATEGORICAL_FEATURES.len() + ENGINEERED_FEATURES.len();

// Column positions inside the clustering matrix
pub const GENDER_CODE: usize = 7;
pub const CATEGORY_CODE: usize = 8;
pub const AVG_VALUE_PER_VISIT: usize = 9;
pub const ENGAGEMENT_SCORE: usize = 10;
pub const VALUE_SCORE: usize = 11;

/// Names of the clustering features in column order
pub fn clustering_features() -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .chain(CATEGORICAL_FEATURES.iter())
        .chain(ENGINEERED_FEATURES.iter())
        .map(|name| name.to_string())
        .collect()
}

/// Median of the present values, averaging the two middle values for even counts
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(f64::total_cmp);

    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Per-column medians used to fill missing numeric values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    pub medians: Vec<f64>,
}

impl MedianImputer {
    /// Learn the median of every numeric column
    pub fn fit(table: &CustomerTable) -> crate::Result<Self> {
        let medians = table
            .numeric
            .iter()
            .zip(NUMERIC_FEATURES)
            .map(|(column, name)| {
                median(column).ok_or_else(|| SegmentationError::ImputationGap(name.to_string()))
            })
            .collect::<crate::Result<Vec<f64>>>()?;
        Ok(Self { medians })
    }

    /// Fill every missing cell with the fitted median of its column
    pub fn transform(&self, table: &CustomerTable) -> Vec<Vec<f64>> {
        table
            .numeric
            .iter()
            .zip(&self.medians)
            .map(|(column, &median)| column.iter().map(|v| v.unwrap_or(median)).collect())
            .collect()
    }
}

/// Maps category strings to integer codes, classes sorted lexicographically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub feature: String,
    pub classes: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit(feature: &str, values: &[String]) -> Self {
        let mut classes: Vec<String> = values.to_vec();
        classes.sort();
        classes.dedup();
        Self {
            feature: feature.to_string(),
            classes,
        }
    }

    /// Code reserved for categories absent from the fitted classes
    pub fn unknown_code(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, value: &str, policy: UnseenCategoryPolicy) -> crate::Result<usize> {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(code) => Ok(code),
            Err(_) => match policy {
                UnseenCategoryPolicy::Unknown => {
                    warn!(
                        feature = %self.feature,
                        value,
                        "Unseen category mapped to reserved unknown code"
                    );
                    Ok(self.unknown_code())
                }
                UnseenCategoryPolicy::Reject => Err(SegmentationError::UnseenCategory {
                    feature: self.feature.clone(),
                    value: value.to_string(),
                }),
            },
        }
    }
}

/// Standardizes columns to zero mean and unit variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation; zero-variance columns hold 1.0
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Self {
        let n_features = data.ncols();
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, data: Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }
}

/// Unscaled per-row features kept for human-readable profile statistics
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredTable {
    /// `N_FEATURES` columns in `clustering_features()` order, before scaling
    pub features: Array2<f64>,
    pub genders: Vec<String>,
    pub categories: Vec<String>,
}

impl EngineeredTable {
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn column(&self, index: usize) -> ndarray::ArrayView1<'_, f64> {
        self.features.column(index)
    }
}

/// Output of a preprocessing pass
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    /// Standardized clustering input
    pub scaled: Array2<f64>,
    pub engineered: EngineeredTable,
}

/// Compute the derived features from imputed numeric values
fn engineer(numeric: &[f64]) -> [f64; 3] {
    let visits = numeric[VISITS_PER_MONTH];
    let time_spent = numeric[AVG_TIME_SPENT];
    let frequency = numeric[PURCHASE_FREQUENCY];
    let order_value = numeric[AVG_ORDER_VALUE];
    let lifetime_value = numeric[CUSTOMER_LIFETIME_VALUE];

    // +1 keeps customers with zero visits finite
    let avg_value_per_visit = lifetime_value / (visits + 1.0);
    let engagement_score = 0.3 * visits + 0.3 * time_spent + 0.4 * frequency;
    let value_score = 0.4 * order_value + 0.6 * lifetime_value;

    [avg_value_per_visit, engagement_score, value_score]
}

/// Parameters learned on the training dataset
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTransform {
    pub imputer: MedianImputer,
    pub encoders: Vec<CategoricalEncoder>,
    pub scaler: StandardScaler,
}

impl FeatureTransform {
    /// Fit imputer, encoders and scaler on `table` and transform it
    pub fn fit(table: &CustomerTable) -> crate::Result<(Self, PreparedFeatures)> {
        let imputer = MedianImputer::fit(table)?;
        let encoders: Vec<CategoricalEncoder> = table
            .categorical
            .iter()
            .zip(CATEGORICAL_FEATURES)
            .map(|(values, name)| CategoricalEncoder::fit(name, values))
            .collect();

        let engineered = build_engineered(table, &imputer, &encoders, UnseenCategoryPolicy::Reject)?;
        let scaler = StandardScaler::fit(&engineered.features);
        let scaled = scaler.transform(engineered.features.clone());
        ensure_finite(&scaled)?;

        debug!(
            rows = table.n_rows(),
            genders = encoders[0].classes.len(),
            categories = encoders[1].classes.len(),
            "Fitted feature transform"
        );

        let transform = Self {
            imputer,
            encoders,
            scaler,
        };
        Ok((transform, PreparedFeatures { scaled, engineered }))
    }

    /// Transform a table with the already-fitted parameters
    pub fn transform(
        &self,
        table: &CustomerTable,
        policy: UnseenCategoryPolicy,
    ) -> crate::Result<PreparedFeatures> {
        let engineered = build_engineered(table, &self.imputer, &self.encoders, policy)?;
        let scaled = self.scaler.transform(engineered.features.clone());
        ensure_finite(&scaled)?;
        Ok(PreparedFeatures { scaled, engineered })
    }

    /// Scaled clustering vector for a single record
    pub fn transform_record(
        &self,
        record: &CustomerRecord,
        policy: UnseenCategoryPolicy,
    ) -> crate::Result<Array1<f64>> {
        let prepared = self.transform(&CustomerTable::from_record(record), policy)?;
        Ok(prepared.scaled.row(0).to_owned())
    }
}

fn build_engineered(
    table: &CustomerTable,
    imputer: &MedianImputer,
    encoders: &[CategoricalEncoder],
    policy: UnseenCategoryPolicy,
) -> crate::Result<EngineeredTable> {
    let n_rows = table.n_rows();
    let numeric = imputer.transform(table);

    let mut features = Array2::<f64>::zeros((n_rows, N_FEATURES));
    let mut row_values = vec![0.0; NUMERIC_FEATURES.len()];
    for (i, mut row) in features.outer_iter_mut().enumerate() {
        for (j, column) in numeric.iter().enumerate() {
            row_values[j] = column[i];
            row[j] = column[i];
        }
        for (j, (encoder, values)) in encoders.iter().zip(&table.categorical).enumerate() {
            row[NUMERIC_FEATURES.len() + j] = encoder.encode(&values[i], policy)? as f64;
        }
        let [per_visit, engagement, value] = engineer(&row_values);
        row[AVG_VALUE_PER_VISIT] = per_visit;
        row[ENGAGEMENT_SCORE] = engagement;
        row[VALUE_SCORE] = value;
    }

    Ok(EngineeredTable {
        features,
        genders: table.categorical[0].clone(),
        categories: table.categorical[1].clone(),
    })
}

fn ensure_finite(scaled: &Array2<f64>) -> crate::Result<()> {
    for ((row, col), value) in scaled.indexed_iter() {
        if !value.is_finite() {
            return Err(SegmentationError::NonFiniteFeature {
                feature: clustering_features()[col].clone(),
                row,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CustomerTable {
        CustomerTable {
            numeric: vec![
                vec![Some(25.0), Some(40.0), None, Some(60.0)],
                vec![Some(30000.0), None, Some(50000.0), Some(90000.0)],
                vec![Some(2.0), Some(4.0), Some(0.0), Some(8.0)],
                vec![Some(10.0), Some(12.0), Some(5.0), Some(30.0)],
                vec![Some(1.0), Some(3.0), Some(2.0), Some(9.0)],
                vec![Some(20.0), Some(40.0), Some(35.0), Some(120.0)],
                vec![Some(300.0), Some(800.0), Some(500.0), Some(2500.0)],
            ],
            categorical: vec![
                vec!["F".into(), "M".into(), "F".into(), "O".into()],
                vec!["Books".into(), "Home".into(), "Books".into(), "Electronics".into()],
            ],
        }
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[Some(3.0), None, Some(1.0), Some(2.0)]), Some(2.0));
        assert_eq!(median(&[Some(4.0), Some(1.0), Some(3.0), Some(2.0)]), Some(2.5));
        assert_eq!(median(&[None, None]), None);
    }

    #[test]
    fn test_imputation_uses_column_median() {
        let (_, prepared) = FeatureTransform::fit(&table()).unwrap();
        // age median of 25, 40, 60 is 40; income median of 30k, 50k, 90k is 50k
        assert_eq!(prepared.engineered.features[[2, 0]], 40.0);
        assert_eq!(prepared.engineered.features[[1, 1]], 50000.0);
    }

    #[test]
    fn test_all_missing_column_is_imputation_gap() {
        let mut t = table();
        t.numeric[3] = vec![None; 4];
        match FeatureTransform::fit(&t) {
            Err(SegmentationError::ImputationGap(column)) => assert_eq!(column, "avg_time_spent"),
            other => panic!("expected imputation gap, got {:?}", other),
        }
    }

    #[test]
    fn test_engineered_features() {
        let (_, prepared) = FeatureTransform::fit(&table()).unwrap();
        let row = prepared.engineered.features.row(0);
        assert!((row[AVG_VALUE_PER_VISIT] - 100.0).abs() < 1e-9);
        assert!((row[ENGAGEMENT_SCORE] - (0.6 + 3.0 + 0.4)).abs() < 1e-9);
        assert!((row[VALUE_SCORE] - (8.0 + 180.0)).abs() < 1e-9);
        // zero visits divides by one
        assert!((prepared.engineered.features[[2, AVG_VALUE_PER_VISIT]] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_encoder_codes_sorted_classes() {
        let (transform, prepared) = FeatureTransform::fit(&table()).unwrap();
        assert_eq!(transform.encoders[1].classes, vec!["Books", "Electronics", "Home"]);
        assert_eq!(prepared.engineered.features[[1, CATEGORY_CODE]], 2.0);
        assert_eq!(prepared.engineered.features[[3, GENDER_CODE]], 2.0);
    }

    #[test]
    fn test_unseen_category_policy() {
        let encoder = CategoricalEncoder::fit("gender", &["F".to_string(), "M".to_string()]);
        assert_eq!(encoder.encode("M", UnseenCategoryPolicy::Reject).unwrap(), 1);
        assert_eq!(encoder.encode("X", UnseenCategoryPolicy::Unknown).unwrap(), 2);
        let err = encoder.encode("X", UnseenCategoryPolicy::Reject).unwrap_err();
        assert_eq!(err.kind(), "UnseenCategoryError");
    }

    #[test]
    fn test_scaled_columns_are_standardized() {
        let (_, prepared) = FeatureTransform::fit(&table()).unwrap();
        assert_eq!(prepared.scaled.ncols(), N_FEATURES);
        for column in prepared.scaled.columns() {
            let mean = column.mean().unwrap();
            let std = column.std(0.0);
            assert!(mean.abs() < 1e-9);
            assert!((std - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let data = Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let scaler = StandardScaler::fit(&data);
        assert_eq!(scaler.scale[1], 1.0);
        let scaled = scaler.transform(data);
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_record_reuses_fitted_parameters() {
        let t = table();
        let (transform, prepared) = FeatureTransform::fit(&t).unwrap();
        let record = CustomerRecord {
            age: Some(25.0),
            income: Some(30000.0),
            visits_per_month: Some(2.0),
            avg_time_spent: Some(10.0),
            purchase_frequency: Some(1.0),
            avg_order_value: Some(20.0),
            customer_lifetime_value: Some(300.0),
            gender: "F".to_string(),
            preferred_category: "Books".to_string(),
        };
        let vector = transform
            .transform_record(&record, UnseenCategoryPolicy::Unknown)
            .unwrap();
        for (a, b) in vector.iter().zip(prepared.scaled.row(0).iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transform_record_imputes_with_training_median() {
        let (transform, _) = FeatureTransform::fit(&table()).unwrap();
        let record = CustomerRecord {
            age: None,
            income: None,
            visits_per_month: Some(1.0),
            avg_time_spent: Some(1.0),
            purchase_frequency: Some(1.0),
            avg_order_value: Some(1.0),
            customer_lifetime_value: Some(1.0),
            gender: "M".to_string(),
            preferred_category: "Garden".to_string(),
        };
        let prepared = transform
            .transform(&CustomerTable::from_record(&record), UnseenCategoryPolicy::Unknown)
            .unwrap();
        assert_eq!(prepared.engineered.features[[0, 0]], 40.0);
        assert_eq!(prepared.engineered.features[[0, CATEGORY_CODE]], 3.0);
    }
}
