//! Configuration management for the analysis server
//!
//! This module provides runtime configuration loading from JSON files so the
//! numeric defaults of every stage (sample rate, coefficient count, seeds,
//! model sizes, image size) can be tuned without recompilation. A missing or
//! malformed file falls back to the built-in defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the listening port
pub const PORT_ENV_VAR: &str = "SOUND_AI_PORT";

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/sound_ai.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub extraction: ExtractionConfig,
    pub reduction: ReductionConfig,
    pub clustering: ClusteringConfig,
    pub classification: ClassificationConfig,
    pub spectrogram: SpectrogramConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (loopback only by default)
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
    /// Directory receiving files posted to the upload endpoint
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 54388,
            allowed_origins: vec![
                "tauri://localhost".to_string(),
                "http://localhost".to_string(),
            ],
            upload_dir: std::env::temp_dir().join("sound_ai_uploads"),
        }
    }
}

/// Cepstral feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rate every file is resampled to before windowing
    pub sample_rate: u32,
    /// Number of cepstral coefficients per segment
    pub n_coeffs: usize,
    /// FFT size of the analysis frames inside a segment
    pub n_fft: usize,
    /// Hop between analysis frames inside a segment
    pub hop_length: usize,
    /// Number of mel bands feeding the DCT
    pub n_mels: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_coeffs: 13,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
        }
    }
}

/// Dimensionality reduction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Seed for the stochastic embeddings
    pub seed: u64,
    /// Gradient descent iterations for t-SNE
    pub tsne_iterations: usize,
    /// Upper bound on the UMAP neighbourhood size
    pub umap_neighbors: usize,
    /// Optimisation epochs for UMAP
    pub umap_epochs: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tsne_iterations: 1000,
            umap_neighbors: 15,
            umap_epochs: 500,
        }
    }
}

/// Clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Smallest group HDBSCAN reports as a cluster
    pub hdbscan_min_cluster_size: usize,
    /// Neighbourhood size for HDBSCAN core distances
    pub hdbscan_min_samples: usize,
    /// Iteration cap for KMeans and GMM
    pub max_iterations: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            hdbscan_min_cluster_size: 3,
            hdbscan_min_samples: 3,
            max_iterations: 300,
        }
    }
}

/// Supervised model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Seed for the split and every stochastic model
    pub seed: u64,
    /// Trees in the random forest
    pub forest_trees: usize,
    /// Boosting stages
    pub boosting_stages: usize,
    /// Shrinkage applied to each boosting stage
    pub boosting_learning_rate: f64,
    /// Depth of each boosting regression tree
    pub boosting_max_depth: usize,
    /// Soft-margin penalty of the linear SVM
    pub svm_c: f64,
    /// Coordinate descent passes for the linear SVM
    pub svm_max_iterations: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            forest_trees: 100,
            boosting_stages: 100,
            boosting_learning_rate: 0.1,
            boosting_max_depth: 3,
            svm_c: 1.0,
            svm_max_iterations: 1000,
        }
    }
}

/// Spectrogram raster size
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 360,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing or
    /// its JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    tracing::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load the default config file and apply environment overrides
    pub fn load() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_PATH).with_env_overrides()
    }

    /// Apply `SOUND_AI_PORT` when it holds a valid port number
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(PORT_ENV_VAR) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(err) => tracing::warn!(
                    "[Config] Ignoring {}={:?}: {}",
                    PORT_ENV_VAR,
                    raw,
                    err
                ),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 54388);
        assert_eq!(config.extraction.sample_rate, 22050);
        assert_eq!(config.extraction.n_coeffs, 13);
        assert_eq!(config.reduction.seed, 42);
        assert_eq!(config.clustering.hdbscan_min_cluster_size, 3);
        assert_eq!(config.classification.forest_trees, 100);
        assert_eq!(config.spectrogram.width, 600);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"extraction": {"n_coeffs": 20}}"#).unwrap();
        assert_eq!(parsed.extraction.n_coeffs, 20);
        assert_eq!(parsed.extraction.sample_rate, 22050);
        assert_eq!(parsed.server.port, 54388);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/sound_ai.json");
        assert_eq!(config.classification.seed, 42);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.server.host, config.server.host);
        assert_eq!(parsed.spectrogram.height, config.spectrogram.height);
    }
}
