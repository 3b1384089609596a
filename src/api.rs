// Stage API - the pipeline operations exposed to clients
//
// AnalysisService runs one stage per call against the shared PipelineState:
// it reads the slot the stage consumes, computes without holding any lock,
// and swaps in the slot the stage produces. A failed stage leaves the state
// untouched. Errors come back as `ApiError { error, kind }` with the
// stage-specific message prefixes clients match on.

pub mod types;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::analysis::classifier::REPORT_DIGITS;
use crate::analysis::reduction::DEFAULT_COMPONENTS;
use crate::analysis::{
    assemble, read_csv_table, ClusterAlgorithm, ClusterEngine, Classifier, Colormap,
    DimensionalityReducer, ExtractionMode, FeatureExtractor, FeatureTable, ModelKind,
    ReductionMethod, SpectrogramRenderer,
};
use crate::config::AppConfig;
use crate::context::PipelineState;
use crate::error::{log_pipeline_error, ErrorCode, ErrorKind, PipelineError};

pub use types::*;

pub const NO_VALID_FILES: &str = "No valid files";
pub const NO_FEATURES: &str = "no features";
pub const NO_REDUCED_DATA: &str = "no reduced data";
pub const LABEL_REQUIRED: &str = "reduced data must include label column";
pub const NO_FILES_PROVIDED: &str = "No files provided";

/// Wrap a stage failure with its client-facing prefix
fn stage_error(prefix: &'static str, err: PipelineError) -> ApiError {
    log_pipeline_error(&err, prefix);
    ApiError::new(err.kind(), format!("{prefix}: {}", err.message()))
}

fn precondition(message: &'static str) -> ApiError {
    tracing::warn!("[API] {}", message);
    ApiError::new(ErrorKind::InputValidation, message)
}

/// File name safe to create inside the upload directory
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// The analysis stages bound to one shared PipelineState
pub struct AnalysisService {
    config: AppConfig,
    state: Arc<PipelineState>,
    extractor: FeatureExtractor,
    reducer: DimensionalityReducer,
    clusters: ClusterEngine,
    classifier: Classifier,
    renderer: SpectrogramRenderer,
}

impl AnalysisService {
    /// Create a service with a fresh, empty PipelineState
    pub fn new(config: AppConfig) -> Self {
        Self::with_state(config, Arc::new(PipelineState::new()))
    }

    /// Create a service over an existing PipelineState
    pub fn with_state(config: AppConfig, state: Arc<PipelineState>) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config.extraction),
            reducer: DimensionalityReducer::new(&config.reduction),
            clusters: ClusterEngine::new(&config.clustering),
            classifier: Classifier::new(&config.classification),
            renderer: SpectrogramRenderer::new(&config.spectrogram),
            config,
            state,
        }
    }

    /// Replace the feature extractor (e.g. one with an embedding backend)
    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    // ========================================================================
    // STAGES
    // ========================================================================

    /// Extract and assemble features from audio or CSV files
    ///
    /// Blank entries are ignored; when nothing is left the call fails with
    /// "No valid files". A path that does not name a file fails the whole
    /// request. Each row's `file_name` is the path exactly as requested, so
    /// it can be passed back to `spectrogram`. State is unchanged on failure.
    pub fn features(&self, request: &FeaturesRequest) -> Result<RowsResponse, ApiError> {
        const PREFIX: &str = "Feature extraction failed";
        let paths: Vec<&str> = request
            .file_paths
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if paths.is_empty() {
            return Err(precondition(NO_VALID_FILES));
        }
        if let Some(missing) = paths.iter().find(|p| !Path::new(p).is_file()) {
            return Err(stage_error(
                PREFIX,
                PipelineError::invalid("file_paths", format!("file not found: {missing}")),
            ));
        }

        let table = self
            .extract_table(&paths, &request.mode, request.segment_length)
            .map_err(|err| stage_error(PREFIX, err))?;
        let rows = self
            .state
            .set_features(table)
            .map_err(|err| stage_error(PREFIX, err))?;
        Ok(RowsResponse { rows })
    }

    fn extract_table(
        &self,
        paths: &[&str],
        mode: &str,
        segment_length: f64,
    ) -> Result<FeatureTable, PipelineError> {
        let mode: ExtractionMode = mode.parse()?;
        let sources = paths
            .iter()
            .map(|&path| {
                let table = match mode {
                    ExtractionMode::Csv => read_csv_table(path)?,
                    audio => self.extractor.extract(path, audio, segment_length)?,
                };
                Ok((path.to_string(), table))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        assemble(sources)
    }

    /// Project the current features to 2D
    pub fn reduce(&self, request: &ReduceRequest) -> Result<RowsResponse, ApiError> {
        const PREFIX: &str = "Reduction failed";
        let features = self
            .state
            .features()
            .map_err(|err| stage_error(PREFIX, err))?
            .ok_or_else(|| precondition(NO_FEATURES))?;

        let method: ReductionMethod = request.method.parse().map_err(|err| stage_error(PREFIX, err))?;
        let reduced = self
            .reducer
            .reduce(&features, method, DEFAULT_COMPONENTS)
            .map_err(|err| stage_error(PREFIX, err))?;
        let rows = self.state.set_reduced(reduced).map_err(|err| stage_error(PREFIX, err))?;
        Ok(RowsResponse { rows })
    }

    /// Cluster the current projection and store the labels with it
    pub fn cluster(&self, request: &ClusterRequest) -> Result<ClusterResponse, ApiError> {
        const PREFIX: &str = "Clustering failed";
        let reduced = self
            .state
            .reduced()
            .map_err(|err| stage_error(PREFIX, err))?
            .ok_or_else(|| precondition(NO_REDUCED_DATA))?;

        let algorithm: ClusterAlgorithm = request
            .algorithm
            .parse()
            .map_err(|err| stage_error(PREFIX, err))?;
        let result = self
            .clusters
            .cluster(&reduced, algorithm, request.n_clusters)
            .map_err(|err| stage_error(PREFIX, err))?;

        let labeled = FeatureTable::clone(&reduced)
            .with_labels(result.labels)
            .map_err(|err| stage_error(PREFIX, err))?;
        let rows = self.state.set_reduced(labeled).map_err(|err| stage_error(PREFIX, err))?;
        Ok(ClusterResponse {
            rows,
            silhouette: result.validity_score,
            n_labels: result.n_clusters_found,
        })
    }

    /// Render a spectrogram PNG, base64-encoded
    pub fn spectrogram(&self, request: &SpecRequest) -> Result<SpectrogramResponse, ApiError> {
        const PREFIX: &str = "Spectrogram failed";
        let colormap: Colormap = request.cmap.parse().map_err(|err| stage_error(PREFIX, err))?;
        let png = self
            .renderer
            .render(
                &request.file_path,
                request.start_s,
                request.dur_s,
                request.fmin,
                request.fmax,
                colormap,
            )
            .map_err(|err| stage_error(PREFIX, err))?;
        Ok(SpectrogramResponse {
            png_base64: STANDARD.encode(png),
        })
    }

    /// Train and evaluate a model on the labeled projection
    pub fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ApiError> {
        const PREFIX: &str = "Classification failed";
        let reduced = self
            .state
            .reduced()
            .map_err(|err| stage_error(PREFIX, err))?
            .filter(|table| table.has_labels())
            .ok_or_else(|| precondition(LABEL_REQUIRED))?;

        let model: ModelKind = request.model.parse().map_err(|err| stage_error(PREFIX, err))?;
        let result = self
            .classifier
            .classify(&reduced, model, request.split_pct)
            .map_err(|err| stage_error(PREFIX, err))?;
        Ok(ClassifyResponse {
            accuracy: result.accuracy,
            report: result.report.render(REPORT_DIGITS),
            cm: result.confusion_matrix,
            labels: result.labels,
            details: result.report,
        })
    }

    /// Overwrite the label column of the projection with manual labels
    pub fn set_labels(&self, request: &LabelsRequest) -> Result<RowsResponse, ApiError> {
        const PREFIX: &str = "Labeling failed";
        let reduced = self
            .state
            .reduced()
            .map_err(|err| stage_error(PREFIX, err))?
            .ok_or_else(|| precondition(NO_REDUCED_DATA))?;

        let labeled = FeatureTable::clone(&reduced)
            .with_labels(request.labels.clone())
            .map_err(|err| stage_error(PREFIX, err))?;
        let rows = self.state.set_reduced(labeled).map_err(|err| stage_error(PREFIX, err))?;
        tracing::info!(rows = rows.n_rows(), "[API] Applied manual labels");
        Ok(RowsResponse { rows })
    }

    /// Save uploaded files into the upload directory
    ///
    /// # Arguments
    /// * `files` - `(client file name, contents)` pairs
    ///
    /// # Returns
    /// The stored paths, usable as `file_paths` in a features request
    pub fn store_uploads(&self, files: Vec<(String, Vec<u8>)>) -> Result<UploadResponse, ApiError> {
        if files.is_empty() {
            return Err(precondition(NO_FILES_PROVIDED));
        }
        let upload_failed = |err: std::io::Error| {
            tracing::error!("[API] Upload failed: {}", err);
            ApiError::new(ErrorKind::Internal, format!("Upload failed: {err}"))
        };

        let dir = &self.config.server.upload_dir;
        fs::create_dir_all(dir).map_err(upload_failed)?;
        let mut file_paths = Vec::with_capacity(files.len());
        for (name, contents) in files {
            let path = dir.join(sanitize_file_name(&name));
            fs::write(&path, contents).map_err(upload_failed)?;
            file_paths.push(path.display().to_string());
        }
        tracing::info!(files = file_paths.len(), "[API] Stored uploads");
        Ok(UploadResponse { file_paths })
    }
}
