//! K-Means clustering model implementation

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClusteringParams;
use crate::error::SegmentationError;
use crate::preprocessing::{clustering_features, N_FEATURES};

/// Fitted cluster centroids in scaled feature space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster centroids, one row per cluster
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares over the training rows
    pub inertia: f64,
}

impl ClusterModel {
    /// Assign a scaled feature vector to the nearest centroid.
    ///
    /// Ties resolve to the lowest cluster id.
    pub fn assign(&self, features: ArrayView1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(SegmentationError::InvalidValue {
                column: "features".to_string(),
                message: format!(
                    "expected {} dimensions, got {}",
                    self.centroids.ncols(),
                    features.len()
                ),
            });
        }
        Ok(self.nearest(features))
    }

    /// Assign every row of a scaled matrix
    pub fn assign_all(&self, features: &Array2<f64>) -> crate::Result<Vec<usize>> {
        features.outer_iter().map(|row| self.assign(row)).collect()
    }

    fn nearest(&self, features: ArrayView1<f64>) -> usize {
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        closest_cluster
    }
}

/// A fitted model together with the training assignments
#[derive(Debug, Clone)]
pub struct FittedClusters {
    pub model: ClusterModel,
    /// Cluster id of every training row
    pub labels: Vec<usize>,
}

impl FittedClusters {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        cluster_sizes(&self.labels, self.model.n_clusters)
    }
}

/// Fit K-Means on a scaled feature matrix.
///
/// Every call reseeds the generator from `params.seed`, so identical input
/// yields identical centroids and assignments.
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    params: &ClusteringParams,
) -> crate::Result<FittedClusters> {
    if n_clusters == 0 || features.nrows() < n_clusters {
        return Err(SegmentationError::InsufficientData {
            rows: features.nrows(),
            clusters: n_clusters,
        });
    }
    ensure_finite(features)?;

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(params.seed);
    let kmeans = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iterations)
        .tolerance(params.tolerance)
        .fit(&dataset)?;

    let centroids = kmeans.centroids().clone();
    let mut model = ClusterModel {
        n_clusters,
        centroids,
        inertia: 0.0,
    };
    let labels = model.assign_all(features)?;
    model.inertia = compute_inertia(features, &labels, &model.centroids);

    debug!(
        n_clusters,
        inertia = model.inertia,
        "Fitted K-Means model"
    );

    Ok(FittedClusters { model, labels })
}

/// Number of rows assigned to each cluster id
pub fn cluster_sizes(labels: &[usize], n_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_clusters];
    for &label in labels {
        if label < n_clusters {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Mean silhouette coefficient over all rows.
///
/// Rows in singleton clusters score 0. Returns 0 when fewer than two clusters
/// are populated.
pub fn silhouette_score(features: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    let sizes = cluster_sizes(labels, n_clusters);
    if n_samples < 2 || sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;
    let mut distance_sums = vec![0.0; n_clusters];

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];
        if sizes[cluster_label] <= 1 {
            continue;
        }

        distance_sums.iter_mut().for_each(|d| *d = 0.0);
        for j in 0..n_samples {
            if i != j {
                distance_sums[labels[j]] += euclidean_distance(&point, &features.row(j));
            }
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = distance_sums[cluster_label] / (sizes[cluster_label] - 1) as f64;

        // b(i): smallest mean distance to another cluster
        let b_i = (0..n_clusters)
            .filter(|&c| c != cluster_label && sizes[c] > 0)
            .map(|c| distance_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denominator = a_i.max(b_i);
        if denominator > 0.0 {
            silhouette_sum += (b_i - a_i) / denominator;
        }
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, cluster)| **cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(&features.row(i), &centroids.row(cluster)))
        .sum()
}

fn ensure_finite(features: &Array2<f64>) -> crate::Result<()> {
    if let Some(((row, col), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
        let feature = if features.ncols() == N_FEATURES {
            clustering_features()[col].clone()
        } else {
            format!("column {col}")
        };
        return Err(SegmentationError::NonFiniteFeature { feature, row });
    }
    Ok(())
}

fn squared_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    squared_distance(point1, point2).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [5.0, 5.0],
            [5.1, 4.9],
            [4.9, 5.2],
            [10.0, 0.0],
            [10.2, 0.1],
            [9.9, -0.1],
        ]
    }

    #[test]
    fn test_fit_kmeans() {
        let fitted = fit_kmeans(&blobs(), 3, &ClusteringParams::default()).unwrap();

        assert_eq!(fitted.model.n_clusters, 3);
        assert_eq!(fitted.labels.len(), 9);
        assert_eq!(fitted.model.centroids.shape(), &[3, 2]);
        assert!(fitted.model.inertia >= 0.0 && fitted.model.inertia.is_finite());

        // each blob shares one label, blobs differ
        assert!(fitted.labels[0..3].iter().all(|&l| l == fitted.labels[0]));
        assert!(fitted.labels[3..6].iter().all(|&l| l == fitted.labels[3]));
        assert!(fitted.labels[6..9].iter().all(|&l| l == fitted.labels[6]));
        assert_ne!(fitted.labels[0], fitted.labels[3]);
        assert_ne!(fitted.labels[3], fitted.labels[6]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let params = ClusteringParams::default();
        let first = fit_kmeans(&blobs(), 3, &params).unwrap();
        let second = fit_kmeans(&blobs(), 3, &params).unwrap();
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.model, second.model);
    }

    #[test]
    fn test_assign_matches_training_labels() {
        let data = blobs();
        let fitted = fit_kmeans(&data, 3, &ClusteringParams::default()).unwrap();
        for (row, &label) in data.outer_iter().zip(&fitted.labels) {
            assert_eq!(fitted.model.assign(row).unwrap(), label);
        }
    }

    #[test]
    fn test_assign_rejects_wrong_dimension() {
        let fitted = fit_kmeans(&blobs(), 3, &ClusteringParams::default()).unwrap();
        let err = fitted.model.assign(array![1.0, 2.0, 3.0].view()).unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");
    }

    #[test]
    fn test_cluster_sizes() {
        let fitted = fit_kmeans(&blobs(), 3, &ClusteringParams::default()).unwrap();
        let sizes = fitted.cluster_sizes();
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.iter().sum::<usize>(), 9);
    }

    #[test]
    fn test_insufficient_rows() {
        let data = array![[0.0, 1.0], [1.0, 0.0]];
        match fit_kmeans(&data, 3, &ClusteringParams::default()) {
            Err(SegmentationError::InsufficientData { rows, clusters }) => {
                assert_eq!((rows, clusters), (2, 3));
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut data = blobs();
        data[[4, 1]] = f64::NAN;
        let err = fit_kmeans(&data, 3, &ClusteringParams::default()).unwrap_err();
        match err {
            SegmentationError::NonFiniteFeature { feature, row } => {
                assert_eq!(feature, "column 1");
                assert_eq!(row, 4);
            }
            other => panic!("expected non-finite error, got {:?}", other),
        }
    }

    #[test]
    fn test_silhouette_well_separated() {
        let data = blobs();
        let labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let score = silhouette_score(&data, &labels, 3);
        assert!(score > 0.9, "score was {}", score);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_silhouette_bad_assignment_is_lower() {
        let data = blobs();
        let good = silhouette_score(&data, &[0, 0, 0, 1, 1, 1, 2, 2, 2], 3);
        let bad = silhouette_score(&data, &[0, 1, 2, 0, 1, 2, 0, 1, 2], 3);
        assert!(bad < good);
        assert!(bad < 0.0);
    }

    #[test]
    fn test_silhouette_singletons_and_single_cluster() {
        let data = array![[0.0], [1.0], [10.0]];
        // singleton cluster contributes zero
        let score = silhouette_score(&data, &[0, 0, 1], 2);
        let expected = (0.9 + 8.0 / 9.0) / 3.0;
        assert!((score - expected).abs() < 1e-12);
        assert_eq!(silhouette_score(&data, &[0, 0, 0], 1), 0.0);
    }
}
