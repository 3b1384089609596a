use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::ClassificationReport;
use crate::analysis::features::DEFAULT_SEGMENT_LENGTH;
use crate::analysis::FeatureTable;
use crate::error::ErrorKind;

fn default_mode() -> String {
    "MFCC".to_string()
}

fn default_segment_length() -> f64 {
    DEFAULT_SEGMENT_LENGTH
}

fn default_n_clusters() -> usize {
    2
}

fn default_fmax() -> f64 {
    20000.0
}

fn default_cmap() -> String {
    "inferno".to_string()
}

/// Feature extraction request
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesRequest {
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_segment_length")]
    pub segment_length: f64,
}

/// Dimensionality reduction request
#[derive(Debug, Clone, Deserialize)]
pub struct ReduceRequest {
    pub method: String,
}

/// Clustering request
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterRequest {
    pub algorithm: String,
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,
}

/// Spectrogram request; times in seconds, frequencies in Hz
#[derive(Debug, Clone, Deserialize)]
pub struct SpecRequest {
    pub file_path: String,
    pub start_s: f64,
    pub dur_s: f64,
    #[serde(default)]
    pub fmin: f64,
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    #[serde(default = "default_cmap")]
    pub cmap: String,
}

/// Classification request
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyRequest {
    pub model: String,
    pub split_pct: i64,
}

/// Manual labels, one per reduced row
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsRequest {
    pub labels: Vec<i64>,
}

/// Table rows (features, reduced or labeled)
#[derive(Debug, Clone, Serialize)]
pub struct RowsResponse {
    pub rows: Arc<FeatureTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterResponse {
    pub rows: Arc<FeatureTable>,
    pub silhouette: f64,
    pub n_labels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpectrogramResponse {
    pub png_base64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResponse {
    pub accuracy: f64,
    /// Rendered text table
    pub report: String,
    /// Rows are true labels, columns predicted, ascending label order
    pub cm: Vec<Vec<u64>>,
    pub labels: Vec<i64>,
    pub details: ClassificationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// Stage failure as reported to clients: `{error, kind}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

impl std::error::Error for ApiError {}
