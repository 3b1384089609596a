// ClusterEngine - partition the 2D projection and score the partition
//
// Clustering only ever sees the `x`/`y` columns of a reduced table. KMeans
// and the Gaussian mixture come from linfa-clustering (both seeded
// internally); HDBSCAN lives in `hdbscan`. Every partition is scored with
// the Euclidean silhouette coefficient.

pub mod hdbscan;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::{GaussianMixtureModel, KMeans};
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;

use crate::analysis::distance::pairwise_euclidean;
use crate::analysis::table::FeatureTable;
use crate::config::ClusteringConfig;
use crate::error::PipelineError;

pub use hdbscan::{Hdbscan, NOISE};

/// Convergence tolerance for KMeans and GMM
const TOLERANCE: f64 = 1e-4;

/// Supported clustering algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAlgorithm {
    KMeans,
    Gmm,
    Hdbscan,
}

impl ClusterAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterAlgorithm::KMeans => "KMeans",
            ClusterAlgorithm::Gmm => "GMM",
            ClusterAlgorithm::Hdbscan => "HDBSCAN",
        }
    }

    /// Whether the caller chooses the number of clusters
    pub fn takes_cluster_count(&self) -> bool {
        !matches!(self, ClusterAlgorithm::Hdbscan)
    }
}

impl fmt::Display for ClusterAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterAlgorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "kmeans" => Ok(ClusterAlgorithm::KMeans),
            "gmm" | "gaussianmixture" => Ok(ClusterAlgorithm::Gmm),
            "hdbscan" => Ok(ClusterAlgorithm::Hdbscan),
            _ => Err(PipelineError::UnsupportedOption {
                option: "clustering algorithm",
                value: s.to_string(),
                expected: "KMeans, GMM, HDBSCAN",
            }),
        }
    }
}

/// Labels for every row plus the partition's validity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    /// One label per input row; `-1` marks HDBSCAN noise
    pub labels: Vec<i64>,
    /// Silhouette coefficient, `0.0` when undefined
    pub validity_score: f64,
    /// Distinct labels in `labels`, noise included
    pub n_clusters_found: usize,
}

/// Mean Euclidean silhouette coefficient
///
/// Noise is treated as a label of its own. Returns `0.0` unless the number
/// of distinct labels is strictly between 1 and the number of points.
/// Points alone in their cluster contribute 0.
pub fn silhouette_score(points: ArrayView2<'_, f64>, labels: &[i64]) -> f64 {
    let n = points.nrows();
    let distinct: BTreeSet<i64> = labels.iter().copied().collect();
    if n == 0 || labels.len() != n || distinct.len() < 2 || distinct.len() >= n {
        return 0.0;
    }

    let distances = pairwise_euclidean(points);
    let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
    for &label in labels {
        *sizes.entry(label).or_default() += 1;
    }

    let total: f64 = (0..n)
        .map(|i| {
            let own = labels[i];
            if sizes[&own] < 2 {
                return 0.0;
            }
            let mut sums: BTreeMap<i64, f64> = BTreeMap::new();
            for j in 0..n {
                if i != j {
                    *sums.entry(labels[j]).or_default() += distances[[i, j]];
                }
            }
            let a = sums.get(&own).copied().unwrap_or(0.0) / (sizes[&own] - 1) as f64;
            let b = sums
                .iter()
                .filter(|(label, _)| **label != own)
                .map(|(label, sum)| sum / sizes[label] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();
    total / n as f64
}

/// ClusterEngine partitions reduced tables
pub struct ClusterEngine {
    config: ClusteringConfig,
}

impl ClusterEngine {
    pub fn new(config: &ClusteringConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Cluster the `(x, y)` projection of `table`
    ///
    /// # Arguments
    /// * `table` - Reduced table with `x` and `y` columns
    /// * `algorithm` - Clustering algorithm
    /// * `n_clusters` - Requested cluster count (ignored by HDBSCAN)
    ///
    /// # Returns
    /// Row-aligned labels, silhouette and distinct label count
    pub fn cluster(
        &self,
        table: &FeatureTable,
        algorithm: ClusterAlgorithm,
        n_clusters: usize,
    ) -> Result<ClusterResult, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::EmptyInput { operation: "cluster" });
        }
        let points = table.projection().ok_or(PipelineError::MissingProjection)?;
        if algorithm.takes_cluster_count() {
            if n_clusters == 0 {
                return Err(PipelineError::invalid("n_clusters", "must be at least 1"));
            }
            if points.nrows() < n_clusters {
                return Err(PipelineError::insufficient_samples(
                    format!("{algorithm} with {n_clusters} clusters"),
                    n_clusters,
                    points.nrows(),
                ));
            }
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::invalid(
                "projection",
                "contains NaN or infinite values",
            ));
        }

        let labels = match algorithm {
            ClusterAlgorithm::KMeans => self.kmeans(&points, n_clusters)?,
            ClusterAlgorithm::Gmm => self.gmm(&points, n_clusters)?,
            ClusterAlgorithm::Hdbscan => Hdbscan::new(
                self.config.hdbscan_min_cluster_size,
                self.config.hdbscan_min_samples,
            )
            .fit_predict(points.view()),
        };

        let validity_score = silhouette_score(points.view(), &labels);
        let n_clusters_found = labels.iter().collect::<BTreeSet<_>>().len();
        tracing::info!(
            algorithm = %algorithm,
            rows = labels.len(),
            n_clusters_found,
            validity_score,
            "[ClusterEngine] Clustered projection"
        );

        Ok(ClusterResult {
            labels,
            validity_score,
            n_clusters_found,
        })
    }

    fn kmeans(&self, points: &Array2<f64>, k: usize) -> Result<Vec<i64>, PipelineError> {
        let model = KMeans::params(k)
            .max_n_iterations(self.config.max_iterations)
            .tolerance(TOLERANCE)
            .fit(&DatasetBase::from(points.clone()))
            .map_err(|err| PipelineError::computation("KMeans", err))?;
        let assigned: Array1<usize> = model.predict(points);
        Ok(assigned.iter().map(|&c| c as i64).collect())
    }

    fn gmm(&self, points: &Array2<f64>, k: usize) -> Result<Vec<i64>, PipelineError> {
        let model = GaussianMixtureModel::params(k)
            .max_n_iterations(self.config.max_iterations)
            .tolerance(TOLERANCE)
            .fit(&DatasetBase::from(points.clone()))
            .map_err(|err| PipelineError::computation("GMM", err))?;
        let assigned: Array1<usize> = model.predict(points);
        Ok(assigned.iter().map(|&c| c as i64).collect())
    }
}
