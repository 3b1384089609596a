// Sound AI - audio analysis pipeline
// Feature extraction, 2D projection, clustering, classification and
// spectrograms over a shared, stage-by-stage pipeline state

// Module declarations
pub mod analysis;
pub mod api;
pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod http;

// Re-exports for convenience
pub use api::AnalysisService;
pub use context::PipelineState;
pub use error::{ErrorCode, ErrorKind, PipelineError};
