//! Cluster-count selection by silhouette score

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SegmentationConfig;
use crate::error::SegmentationError;
use crate::model::{fit_kmeans, silhouette_score};

/// Score of one candidate cluster count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub n_clusters: usize,
    pub silhouette_score: f64,
}

/// Outcome of the cluster-count search
#[derive(Debug, Clone, PartialEq)]
pub struct KSelection {
    pub n_clusters: usize,
    /// Score of the winning candidate; the sentinel when the fallback was used
    pub silhouette_score: f64,
    pub candidates: Vec<CandidateScore>,
}

const SENTINEL_SCORE: f64 = -1.0;

/// Pick the cluster count with the highest silhouette score.
///
/// Candidates run from `min_clusters` to `max_clusters`, capped at one below
/// the row count. Only a strictly better score replaces the current best, so
/// the smallest k wins ties.
pub fn select_cluster_count(
    features: &Array2<f64>,
    config: &SegmentationConfig,
) -> crate::Result<KSelection> {
    let n_rows = features.nrows();
    let upper = config.max_clusters.min(n_rows.saturating_sub(1));
    if upper < config.min_clusters {
        return Err(SegmentationError::InsufficientData {
            rows: n_rows,
            clusters: config.min_clusters,
        });
    }

    let mut best_score = SENTINEL_SCORE;
    let mut best_n_clusters = config.default_clusters;
    let mut candidates = Vec::with_capacity(upper - config.min_clusters + 1);

    for n_clusters in config.min_clusters..=upper {
        let fitted = fit_kmeans(features, n_clusters, &config.clustering)?;
        let score = silhouette_score(features, &fitted.labels, n_clusters);
        debug!(n_clusters, score, "Scored candidate cluster count");

        candidates.push(CandidateScore {
            n_clusters,
            silhouette_score: score,
        });
        if score > best_score {
            best_score = score;
            best_n_clusters = n_clusters;
        }
    }

    info!(
        n_clusters = best_n_clusters,
        silhouette_score = best_score,
        "Selected cluster count"
    );

    Ok(KSelection {
        n_clusters: best_n_clusters,
        silhouette_score: best_score,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Four tight, well separated groups of five points each
    fn four_groups() -> Array2<f64> {
        let centers = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
        let offsets = [(0.0, 0.0), (0.3, 0.1), (-0.2, 0.3), (0.1, -0.3), (-0.3, -0.1)];
        let mut values = Vec::new();
        for (cx, cy) in centers {
            for (dx, dy) in offsets {
                values.push(cx + dx);
                values.push(cy + dy);
            }
        }
        Array2::from_shape_vec((20, 2), values).unwrap()
    }

    #[test]
    fn test_selects_true_group_count() {
        let selection = select_cluster_count(&four_groups(), &SegmentationConfig::default()).unwrap();
        assert_eq!(selection.n_clusters, 4);
        assert_eq!(selection.candidates.len(), 6);
        assert_eq!(selection.candidates[0].n_clusters, 3);
        assert_eq!(selection.candidates[5].n_clusters, 8);

        let best = selection
            .candidates
            .iter()
            .map(|c| c.silhouette_score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(selection.silhouette_score, best);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let config = SegmentationConfig::default();
        let first = select_cluster_count(&four_groups(), &config).unwrap();
        let second = select_cluster_count(&four_groups(), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_range_capped_by_rows() {
        let data = four_groups().slice(ndarray::s![0..5, ..]).to_owned();
        let selection = select_cluster_count(&data, &SegmentationConfig::default()).unwrap();
        let tried: Vec<usize> = selection.candidates.iter().map(|c| c.n_clusters).collect();
        assert_eq!(tried, vec![3, 4]);
    }

    #[test]
    fn test_too_few_rows() {
        let data = four_groups().slice(ndarray::s![0..3, ..]).to_owned();
        let err = select_cluster_count(&data, &SegmentationConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "InsufficientDataError");
    }
}
