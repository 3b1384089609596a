// Pipeline error types and constants

use crate::error::{ErrorCode, ErrorKind};
use thiserror::Error;
use tracing::error;

/// Pipeline error code constants
///
/// Error code range: 3001-3014
pub struct PipelineErrorCodes;

impl PipelineErrorCodes {
    /// No full-length segment could be extracted from the audio
    pub const INSUFFICIENT_AUDIO: i32 = 3001;

    /// The input table has no rows
    pub const EMPTY_INPUT: i32 = 3002;

    /// The input table has no feature columns left after excluding metadata
    pub const NO_FEATURE_COLUMNS: i32 = 3003;

    /// Fewer rows than the operation needs
    pub const INSUFFICIENT_SAMPLES: i32 = 3004;

    /// The table lacks the `x`/`y` projection columns
    pub const MISSING_PROJECTION: i32 = 3005;

    /// The table lacks a `label` column
    pub const MISSING_LABEL: i32 = 3006;

    /// Fewer than two distinct labels
    pub const INSUFFICIENT_CLASSES: i32 = 3007;

    /// Spectrogram segment shorter than one analysis window
    pub const SEGMENT_TOO_SHORT: i32 = 3008;

    /// Unknown method/algorithm/model/colormap name
    pub const UNSUPPORTED_OPTION: i32 = 3009;

    /// A request parameter is out of range or inconsistent
    pub const INVALID_PARAMETER: i32 = 3010;

    /// Audio file could not be opened or decoded
    pub const AUDIO_LOAD: i32 = 3011;

    /// CSV file could not be read or has an unusable shape
    pub const CSV_INGEST: i32 = 3012;

    /// An underlying numeric routine failed
    pub const COMPUTATION: i32 = 3013;

    /// A pipeline slot lock was poisoned
    pub const STATE_POISONED: i32 = 3014;
}

/// Log a pipeline error with structured context
///
/// Emits the code, kind and message as tracing fields so failures can be
/// filtered by stage without parsing the text.
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        stage = context,
        error_code = err.code(),
        kind = err.kind().as_str(),
        "Pipeline error: {}",
        err.message()
    );
}

/// Errors raised by the analysis stages
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Audio shorter than one segment, or malformed signal
    #[error("Audio file too short or invalid. No segments extracted with segment_length={segment_length}s")]
    InsufficientAudio { segment_length: f64 },

    /// Operation received a table without rows
    #[error("Cannot {operation}: feature table is empty")]
    EmptyInput { operation: &'static str },

    /// Every column is metadata
    #[error("No feature columns found for {operation}")]
    NoFeatureColumns { operation: &'static str },

    /// Row count below the operation's floor
    #[error("Insufficient data: need at least {required} samples for {operation}, got {actual}")]
    InsufficientSamples {
        operation: String,
        required: usize,
        actual: usize,
    },

    /// Clustering before reduction
    #[error("Cannot cluster: 'x' and 'y' columns not found. Run dimensionality reduction first.")]
    MissingProjection,

    /// Classification before labeling
    #[error("features are not labeled")]
    MissingLabel,

    /// Fewer than two classes to discriminate
    #[error("less than 2 unique labels (found {found})")]
    InsufficientClasses { found: usize },

    /// Spectrogram segment below the minimum window
    #[error("Segment too short ({samples} samples). Need at least {minimum} samples for spectrogram.")]
    SegmentTooShort { samples: usize, minimum: usize },

    /// Unknown option name for a closed set of choices
    #[error("Unsupported {option} '{value}' (expected one of: {expected})")]
    UnsupportedOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Out-of-range or inconsistent parameter
    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Decoder or filesystem failure
    #[error("Failed to load audio '{path}': {reason}")]
    AudioLoad { path: String, reason: String },

    /// CSV reader failure or unusable layout
    #[error("Failed to ingest CSV '{path}': {reason}")]
    CsvIngest { path: String, reason: String },

    /// Numeric backend failure
    #[error("{stage} computation failed: {reason}")]
    Computation { stage: &'static str, reason: String },

    /// Slot lock poisoned by a panicking writer
    #[error("Pipeline state lock poisoned for slot: {slot}")]
    StatePoisoned { slot: &'static str },
}

impl PipelineError {
    pub fn insufficient_samples(operation: impl Into<String>, required: usize, actual: usize) -> Self {
        PipelineError::InsufficientSamples {
            operation: operation.into(),
            required,
            actual,
        }
    }

    pub fn computation(stage: &'static str, reason: impl ToString) -> Self {
        PipelineError::Computation {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::InsufficientAudio { .. } => PipelineErrorCodes::INSUFFICIENT_AUDIO,
            PipelineError::EmptyInput { .. } => PipelineErrorCodes::EMPTY_INPUT,
            PipelineError::NoFeatureColumns { .. } => PipelineErrorCodes::NO_FEATURE_COLUMNS,
            PipelineError::InsufficientSamples { .. } => PipelineErrorCodes::INSUFFICIENT_SAMPLES,
            PipelineError::MissingProjection => PipelineErrorCodes::MISSING_PROJECTION,
            PipelineError::MissingLabel => PipelineErrorCodes::MISSING_LABEL,
            PipelineError::InsufficientClasses { .. } => PipelineErrorCodes::INSUFFICIENT_CLASSES,
            PipelineError::SegmentTooShort { .. } => PipelineErrorCodes::SEGMENT_TOO_SHORT,
            PipelineError::UnsupportedOption { .. } => PipelineErrorCodes::UNSUPPORTED_OPTION,
            PipelineError::InvalidParameter { .. } => PipelineErrorCodes::INVALID_PARAMETER,
            PipelineError::AudioLoad { .. } => PipelineErrorCodes::AUDIO_LOAD,
            PipelineError::CsvIngest { .. } => PipelineErrorCodes::CSV_INGEST,
            PipelineError::Computation { .. } => PipelineErrorCodes::COMPUTATION,
            PipelineError::StatePoisoned { .. } => PipelineErrorCodes::STATE_POISONED,
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyInput { .. }
            | PipelineError::NoFeatureColumns { .. }
            | PipelineError::MissingProjection
            | PipelineError::MissingLabel
            | PipelineError::InvalidParameter { .. }
            | PipelineError::AudioLoad { .. }
            | PipelineError::CsvIngest { .. } => ErrorKind::InputValidation,
            PipelineError::InsufficientAudio { .. }
            | PipelineError::InsufficientSamples { .. }
            | PipelineError::InsufficientClasses { .. }
            | PipelineError::SegmentTooShort { .. } => ErrorKind::InsufficientData,
            PipelineError::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            PipelineError::Computation { .. } => ErrorKind::Computation,
            PipelineError::StatePoisoned { .. } => ErrorKind::Internal,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_codes() {
        assert_eq!(
            PipelineError::InsufficientAudio { segment_length: 1.0 }.code(),
            3001
        );
        assert_eq!(PipelineError::MissingProjection.code(), 3005);
        assert_eq!(PipelineError::MissingLabel.code(), 3006);
        assert_eq!(
            PipelineError::StatePoisoned { slot: "features" }.code(),
            3014
        );
    }

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(
            PipelineError::EmptyInput { operation: "reduce" }.kind(),
            ErrorKind::InputValidation
        );
        assert_eq!(
            PipelineError::insufficient_samples("KMeans", 3, 2).kind(),
            ErrorKind::InsufficientData
        );
        assert_eq!(
            PipelineError::UnsupportedOption {
                option: "method",
                value: "LDA".to_string(),
                expected: "PCA, t-SNE, UMAP",
            }
            .kind(),
            ErrorKind::UnsupportedOption
        );
        assert_eq!(
            PipelineError::computation("GMM", "singular covariance").kind(),
            ErrorKind::Computation
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PipelineError::insufficient_samples("2D reduction", 2, 1);
        assert!(err.message().contains("need at least 2"));
        assert!(err.message().contains("got 1"));

        let err = PipelineError::SegmentTooShort {
            samples: 100,
            minimum: 256,
        };
        assert!(err.message().contains("100 samples"));
    }

    #[test]
    fn test_error_code_trait_object() {
        let err: &dyn ErrorCode = &PipelineError::InsufficientClasses { found: 1 };
        assert_eq!(err.code(), 3007);
        assert_eq!(err.kind().as_str(), "insufficient_data");
    }
}
