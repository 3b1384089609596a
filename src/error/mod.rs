// Error types for the sound analysis pipeline
//
// This module defines the typed pipeline error and the error-code contract
// shared by every stage, so the request boundary can branch on a kind tag
// instead of parsing messages.

mod pipeline;

pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

use serde::{Deserialize, Serialize};

/// Coarse error taxonomy reported to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing file, empty table, wrong column shape
    InputValidation,
    /// Too few samples, classes or segments for the requested operation
    InsufficientData,
    /// Unknown method, algorithm, model or colormap name
    UnsupportedOption,
    /// An underlying numeric routine failed
    Computation,
    /// Server-side failure unrelated to the request (poisoned lock, worker panic)
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::UnsupportedOption => "unsupported_option",
            ErrorKind::Computation => "computation",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes, kinds and
/// messages from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the taxonomy bucket for this error
    fn kind(&self) -> ErrorKind;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
