// DimensionalityReducer - project feature columns onto a low-dimensional plane
//
// The reducer reads only the feature columns of a table, runs one of the
// embedding methods and returns a new table whose feature columns are the
// components (`x`, `y`, ...) with every metadata column carried over.
//
// Module organization:
// - pca: exact principal components (also seeds the other two methods)
// - tsne: exact t-SNE
// - umap: UMAP with negative sampling
// - mod.rs: Coordinator (DimensionalityReducer), method selection, validation

pub mod pca;
pub mod tsne;
pub mod umap;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};

use crate::analysis::table::FeatureTable;
use crate::config::ReductionConfig;
use crate::error::PipelineError;

pub use pca::Pca;
pub use tsne::Tsne;
pub use umap::Umap;

/// Number of output components used by the pipeline
pub const DEFAULT_COMPONENTS: usize = 2;

/// Embedding algorithm seam
pub trait Reducer {
    /// Project every row of `data` onto `n_components` dimensions
    fn fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
        n_components: usize,
    ) -> Result<Array2<f64>, PipelineError>;
}

/// Supported reduction methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMethod {
    Pca,
    Tsne,
    Umap,
}

impl ReductionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionMethod::Pca => "PCA",
            ReductionMethod::Tsne => "t-SNE",
            ReductionMethod::Umap => "UMAP",
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReductionMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "pca" => Ok(ReductionMethod::Pca),
            "tsne" => Ok(ReductionMethod::Tsne),
            "umap" => Ok(ReductionMethod::Umap),
            _ => Err(PipelineError::UnsupportedOption {
                option: "reduction method",
                value: s.to_string(),
                expected: "PCA, t-SNE, UMAP",
            }),
        }
    }
}

/// Output column names: `x`, `y`, `z`, then `component_4`, ...
pub fn component_names(n_components: usize) -> Vec<String> {
    (0..n_components)
        .map(|i| match i {
            0 => "x".to_string(),
            1 => "y".to_string(),
            2 => "z".to_string(),
            _ => format!("component_{}", i + 1),
        })
        .collect()
}

/// DimensionalityReducer runs the configured embedding methods
pub struct DimensionalityReducer {
    config: ReductionConfig,
}

impl DimensionalityReducer {
    pub fn new(config: &ReductionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn reducer(&self, method: ReductionMethod) -> Box<dyn Reducer> {
        match method {
            ReductionMethod::Pca => Box::new(Pca),
            ReductionMethod::Tsne => Box::new(Tsne::new(self.config.seed, self.config.tsne_iterations)),
            ReductionMethod::Umap => Box::new(Umap::new(
                self.config.seed,
                self.config.umap_neighbors,
                self.config.umap_epochs,
            )),
        }
    }

    /// Project the feature columns of `table`
    ///
    /// # Arguments
    /// * `table` - Any table with at least one feature column
    /// * `method` - Embedding method
    /// * `n_components` - Output dimensionality (the pipeline uses 2)
    ///
    /// # Returns
    /// A table with columns `x`, `y`, ... plus the input's metadata
    pub fn reduce(
        &self,
        table: &FeatureTable,
        method: ReductionMethod,
        n_components: usize,
    ) -> Result<FeatureTable, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::EmptyInput { operation: "reduce" });
        }
        if table.feature_names().is_empty() {
            return Err(PipelineError::NoFeatureColumns { operation: "reduction" });
        }
        if n_components == 0 {
            return Err(PipelineError::invalid("n_components", "must be at least 1"));
        }
        if table.n_rows() < n_components {
            return Err(PipelineError::insufficient_samples(
                "dimensionality reduction",
                n_components,
                table.n_rows(),
            ));
        }
        let data = table.features();
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::invalid(
                "features",
                "input contains NaN or infinite values",
            ));
        }

        tracing::info!(
            method = %method,
            rows = table.n_rows(),
            features = table.feature_names().len(),
            "[Reducer] Reducing feature table"
        );
        let projected = self.reducer(method).fit_transform(data, n_components)?;
        table.with_replaced_features(component_names(n_components), projected)
    }
}
