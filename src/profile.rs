//! Segment profiling and natural-language label synthesis

use std::collections::{BTreeMap, HashMap};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::data::{CUSTOMER_LIFETIME_VALUE, NUMERIC_FEATURES, PURCHASE_FREQUENCY};
use crate::preprocessing::{clustering_features, EngineeredTable, ENGAGEMENT_SCORE, VALUE_SCORE};
use crate::selection::CandidateScore;

/// Ratio to the population mean above which a segment is "high"
pub const HIGH_RATIO: f64 = 1.2;
/// Ratio to the population mean below which a segment is "low"
pub const LOW_RATIO: f64 = 0.8;

pub const ALGORITHM: &str = "kmeans";

/// Position of a segment mean relative to the population mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Middle,
    Low,
}

impl Tier {
    pub fn classify(segment_mean: f64, population_mean: f64) -> Self {
        if segment_mean > population_mean * HIGH_RATIO {
            Tier::High
        } else if segment_mean < population_mean * LOW_RATIO {
            Tier::Low
        } else {
            Tier::Middle
        }
    }

    pub fn value_label(self) -> &'static str {
        match self {
            Tier::High => "high-value",
            Tier::Middle => "mid-tier",
            Tier::Low => "budget-conscious",
        }
    }

    pub fn frequency_label(self) -> &'static str {
        match self {
            Tier::High => "frequent",
            Tier::Middle => "regular",
            Tier::Low => "infrequent",
        }
    }

    pub fn engagement_label(self) -> &'static str {
        match self {
            Tier::High => "highly engaged",
            Tier::Middle => "moderately engaged",
            Tier::Low => "low engagement",
        }
    }
}

/// The three tiers a segment label is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTiers {
    pub value: Tier,
    pub frequency: Tier,
    pub engagement: Tier,
}

impl SegmentTiers {
    /// e.g. "High-Value, frequent purchasers with highly engaged"
    pub fn label(&self) -> String {
        format!(
            "{}, {} purchasers with {}",
            title_case(self.value.value_label()),
            self.frequency.frequency_label(),
            self.engagement.engagement_label()
        )
    }
}

/// Capitalize the first letter of every word, hyphenated parts included
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_word = true;
    for c in text.chars() {
        if start_of_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start_of_word = !c.is_alphabetic();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub avg_engagement_score: f64,
    pub avg_value_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Aggregate description of one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    pub segment_id: usize,
    pub label: String,
    pub tiers: SegmentTiers,
    pub size: usize,
    /// Share of all customers, in percent
    pub percentage: f64,
    /// Mean of each numeric attribute, keyed by attribute name
    pub avg_metrics: BTreeMap<String, f64>,
    pub engagement_metrics: EngagementMetrics,
    /// Up to three most common preferred categories, most common first
    pub top_categories: Vec<CategoryCount>,
    /// Relative frequency of each gender; sums to 1
    pub gender_distribution: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub algorithm: String,
    pub n_clusters: usize,
    pub silhouette_score: f64,
    pub features_used: Vec<String>,
    pub candidate_scores: Vec<CandidateScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQuality {
    pub silhouette_score: f64,
    pub features_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub total_customers: usize,
    pub segments_found: usize,
    pub model_quality: ModelQuality,
}

/// Snapshot of one segmentation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationInsights {
    /// Customers per populated segment
    pub segment_sizes: BTreeMap<usize, usize>,
    /// Profiles keyed `Segment_<id>`
    pub segment_profiles: BTreeMap<String, SegmentProfile>,
    pub model_info: ModelInfo,
    pub summary: InsightsSummary,
}

impl SegmentationInsights {
    pub fn profile(&self, segment_id: usize) -> Option<&SegmentProfile> {
        self.segment_profiles.get(&profile_key(segment_id))
    }

    pub fn label_for(&self, segment_id: usize) -> Option<&str> {
        self.profile(segment_id).map(|p| p.label.as_str())
    }
}

pub fn profile_key(segment_id: usize) -> String {
    format!("Segment_{segment_id}")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean_of(column: ArrayView1<f64>, rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| column[i]).sum::<f64>() / rows.len() as f64
}

fn top_categories(categories: &[String], rows: &[usize], limit: usize) -> Vec<CategoryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &i in rows {
        *counts.entry(categories[i].as_str()).or_default() += 1;
    }
    let mut ranked: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    ranked.truncate(limit);
    ranked
}

fn distribution(values: &[String], rows: &[usize]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for &i in rows {
        *counts.entry(values[i].clone()).or_default() += 1;
    }
    let total = rows.len() as f64;
    counts
        .into_iter()
        .map(|(value, count)| (value, count as f64 / total))
        .collect()
}

/// Build profiles and labels for every populated segment.
///
/// Tiers compare each segment mean against the mean over all rows of
/// `engineered`, which holds imputed, unscaled values.
pub fn describe(
    engineered: &EngineeredTable,
    labels: &[usize],
    n_clusters: usize,
    silhouette_score: f64,
    candidate_scores: &[CandidateScore],
) -> SegmentationInsights {
    let total = engineered.n_rows();
    let all_rows: Vec<usize> = (0..total).collect();

    let population_value = mean_of(engineered.column(CUSTOMER_LIFETIME_VALUE), &all_rows);
    let population_frequency = mean_of(engineered.column(PURCHASE_FREQUENCY), &all_rows);
    let population_engagement = mean_of(engineered.column(ENGAGEMENT_SCORE), &all_rows);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
    for (row, &segment) in labels.iter().enumerate() {
        if segment < n_clusters {
            members[segment].push(row);
        }
    }

    let mut segment_sizes = BTreeMap::new();
    let mut segment_profiles = BTreeMap::new();

    for (segment_id, rows) in members.iter().enumerate() {
        if rows.is_empty() {
            continue;
        }

        let avg_metrics: BTreeMap<String, f64> = NUMERIC_FEATURES
            .iter()
            .enumerate()
            .map(|(col, name)| {
                (
                    name.to_string(),
                    round2(mean_of(engineered.column(col), rows)),
                )
            })
            .collect();

        let avg_engagement = mean_of(engineered.column(ENGAGEMENT_SCORE), rows);
        let tiers = SegmentTiers {
            value: Tier::classify(
                mean_of(engineered.column(CUSTOMER_LIFETIME_VALUE), rows),
                population_value,
            ),
            frequency: Tier::classify(
                mean_of(engineered.column(PURCHASE_FREQUENCY), rows),
                population_frequency,
            ),
            engagement: Tier::classify(avg_engagement, population_engagement),
        };

        let profile = SegmentProfile {
            segment_id,
            label: tiers.label(),
            tiers,
            size: rows.len(),
            percentage: round2(rows.len() as f64 / total as f64 * 100.0),
            avg_metrics,
            engagement_metrics: EngagementMetrics {
                avg_engagement_score: round2(avg_engagement),
                avg_value_score: round2(mean_of(engineered.column(VALUE_SCORE), rows)),
            },
            top_categories: top_categories(&engineered.categories, rows, 3),
            gender_distribution: distribution(&engineered.genders, rows),
        };

        segment_sizes.insert(segment_id, rows.len());
        segment_profiles.insert(profile_key(segment_id), profile);
    }

    let features_used = clustering_features();
    SegmentationInsights {
        summary: InsightsSummary {
            total_customers: total,
            segments_found: segment_sizes.len(),
            model_quality: ModelQuality {
                silhouette_score,
                features_used: features_used.len(),
            },
        },
        segment_sizes,
        segment_profiles,
        model_info: ModelInfo {
            algorithm: ALGORITHM.to_string(),
            n_clusters,
            silhouette_score,
            features_used,
            candidate_scores: candidate_scores.to_vec(),
        },
    }
}
