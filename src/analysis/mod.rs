// Analysis module - the stages of the sound analysis pipeline
//
// Pipeline: FeatureExtractor / read_csv_table → assemble → DimensionalityReducer
//           → ClusterEngine → Classifier
//
// SpectrogramRenderer is independent of the table flow and works directly on
// audio files. Every stage is a pure function of its inputs plus its config
// section; holding results between requests is the job of `PipelineState`.

pub mod assembler;
pub mod classifier;
pub mod clustering;
pub mod distance;
pub mod features;
pub mod reduction;
pub mod spectrogram;
pub mod table;

pub use assembler::{assemble, read_csv_table};
pub use classifier::{ClassificationResult, Classifier, ModelKind};
pub use clustering::{ClusterAlgorithm, ClusterEngine, ClusterResult};
pub use features::{ExtractionMode, FeatureExtractor};
pub use reduction::{DimensionalityReducer, ReductionMethod};
pub use spectrogram::{Colormap, SpectrogramRenderer};
pub use table::FeatureTable;
