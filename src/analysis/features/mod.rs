// FeatureExtractor - windowed cepstral features for audio files
//
// A file is decoded, mixed down to mono, resampled to the extraction rate and
// cut into back-to-back windows of a fixed duration. Every full window is
// reduced to one feature vector (the mean MFCC over its analysis frames, or
// an embedding when a backend is plugged in) tagged with its start time.
//
// Module organization:
// - fft: FFT computation with windowing
// - mel: Mel filterbank, log compression and DCT
// - mod.rs: Coordinator (FeatureExtractor), mode and segment-length handling
//
// References:
// - McFee, B. et al. (2015). librosa: Audio and music signal analysis in Python

pub mod fft;
pub mod mel;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::analysis::table::{FeatureTable, Segment};
use crate::audio::{load_audio, resample};
use crate::config::ExtractionConfig;
use crate::error::PipelineError;

use mel::MfccProcessor;

/// Shortest accepted segment length in seconds
pub const MIN_SEGMENT_LENGTH: f64 = 0.1;
/// Longest accepted segment length in seconds
pub const MAX_SEGMENT_LENGTH: f64 = 60.0;
/// Segment length used when the requested one is out of range
pub const DEFAULT_SEGMENT_LENGTH: f64 = 1.0;

/// Prefix of the extracted feature column names
pub const FEATURE_PREFIX: &str = "feature";

/// How feature tables are produced from the request's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Mean MFCC per window
    Mfcc,
    /// Learned audio embedding per window (needs an `EmbeddingBackend`)
    OpenL3,
    /// Pre-computed feature tables read from CSV files
    Csv,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Mfcc => "MFCC",
            ExtractionMode::OpenL3 => "OpenL3",
            ExtractionMode::Csv => "CSV",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            m if m.eq_ignore_ascii_case("mfcc") => Ok(ExtractionMode::Mfcc),
            m if m.eq_ignore_ascii_case("openl3") => Ok(ExtractionMode::OpenL3),
            m if m.eq_ignore_ascii_case("csv") => Ok(ExtractionMode::Csv),
            other => Err(PipelineError::UnsupportedOption {
                option: "mode",
                value: other.to_string(),
                expected: "MFCC, OpenL3, CSV",
            }),
        }
    }
}

/// Pluggable per-window embedding model
pub trait EmbeddingBackend: Send + Sync {
    /// Short model name for logs
    fn name(&self) -> &str;

    /// Embed one window of mono samples at `sample_rate`
    fn embed(&self, window: &[f32], sample_rate: u32) -> Result<Vec<f64>, PipelineError>;
}

/// Slack absorbing float rounding when seconds are mapped to sample indices
const SAMPLE_EPSILON: f64 = 1e-6;

/// Sample index of `seconds` at `sr`; `0.7 * 22050` maps to 15435, not 15434
fn to_samples(seconds: f64, sr: f64) -> usize {
    (seconds * sr + SAMPLE_EPSILON).floor() as usize
}

/// Clamp a requested segment length into the accepted range
///
/// Values outside `[0.1, 60.0]` (or non-finite) are replaced by `1.0`.
pub fn normalize_segment_length(requested: f64) -> f64 {
    if requested.is_finite() && (MIN_SEGMENT_LENGTH..=MAX_SEGMENT_LENGTH).contains(&requested) {
        requested
    } else {
        tracing::warn!(
            "[FeatureExtractor] Segment length {}s outside [{}, {}]; using {}s",
            requested,
            MIN_SEGMENT_LENGTH,
            MAX_SEGMENT_LENGTH,
            DEFAULT_SEGMENT_LENGTH
        );
        DEFAULT_SEGMENT_LENGTH
    }
}

/// Pick the mode that will actually run
///
/// An embedding request without a backend degrades to MFCC.
pub fn resolve_mode(requested: ExtractionMode, backend_available: bool) -> ExtractionMode {
    if requested == ExtractionMode::OpenL3 && !backend_available {
        tracing::warn!("[FeatureExtractor] No embedding backend available; falling back to MFCC");
        return ExtractionMode::Mfcc;
    }
    requested
}

/// FeatureExtractor turns audio into a table of per-window feature vectors
pub struct FeatureExtractor {
    sample_rate: u32,
    mfcc: MfccProcessor,
    backend: Option<Arc<dyn EmbeddingBackend>>,
}

impl FeatureExtractor {
    /// Create an extractor from the extraction settings
    ///
    /// # Arguments
    /// * `config` - Sample rate, coefficient count and frame geometry
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            mfcc: MfccProcessor::new(
                config.sample_rate,
                config.n_fft,
                config.hop_length,
                config.n_mels,
                config.n_coeffs,
            ),
            backend: None,
        }
    }

    /// Attach an embedding backend
    pub fn with_backend(mut self, backend: Option<Arc<dyn EmbeddingBackend>>) -> Self {
        self.backend = backend;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Extract a feature table from an audio file
    ///
    /// # Arguments
    /// * `path` - Any format the audio loader decodes
    /// * `mode` - `Mfcc` or `OpenL3` (degrades to MFCC without a backend)
    /// * `segment_length` - Window duration in seconds (normalized first)
    ///
    /// # Returns
    /// One row per full window with `feature_1..n` and `second`
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: P,
        mode: ExtractionMode,
        segment_length: f64,
    ) -> Result<FeatureTable, PipelineError> {
        let path = path.as_ref();
        let signal = load_audio(path)?;
        let mono = signal.to_mono();
        let samples = resample(&mono, signal.sample_rate, self.sample_rate)?;
        tracing::debug!(
            path = %path.display(),
            native_rate = signal.sample_rate,
            samples = samples.len(),
            "[FeatureExtractor] Decoded and resampled"
        );
        self.extract_samples(&samples, mode, segment_length)
    }

    /// Extract a feature table from mono samples already at the extraction rate
    pub fn extract_samples(
        &self,
        samples: &[f32],
        mode: ExtractionMode,
        segment_length: f64,
    ) -> Result<FeatureTable, PipelineError> {
        let segment_length = normalize_segment_length(segment_length);
        let mode = match resolve_mode(mode, self.has_backend()) {
            ExtractionMode::Csv => {
                return Err(PipelineError::invalid(
                    "mode",
                    "CSV inputs are tables, not audio",
                ))
            }
            resolved => resolved,
        };

        let sr = self.sample_rate as f64;
        let window_len = to_samples(segment_length, sr);

        let mut segments = Vec::new();
        let mut index = 0usize;
        loop {
            let start_time = index as f64 * segment_length;
            let start = to_samples(start_time, sr);
            let end = start + window_len;
            if window_len == 0 || end > samples.len() {
                break;
            }
            let features = self.window_features(&samples[start..end], mode)?;
            segments.push(Segment {
                start_time,
                features,
            });
            index += 1;
        }

        if segments.is_empty() {
            return Err(PipelineError::InsufficientAudio { segment_length });
        }

        tracing::info!(
            mode = %mode,
            segments = segments.len(),
            segment_length,
            "[FeatureExtractor] Extracted segments"
        );
        FeatureTable::from_segments(&segments, FEATURE_PREFIX)
    }

    fn window_features(
        &self,
        window: &[f32],
        mode: ExtractionMode,
    ) -> Result<Vec<f64>, PipelineError> {
        match (&self.backend, mode) {
            (Some(backend), ExtractionMode::OpenL3) => backend.embed(window, self.sample_rate),
            _ => {
                let samples: Vec<f64> = window.iter().map(|&s| s as f64).collect();
                Ok(self.mfcc.mean_coefficients(&samples))
            }
        }
    }
}
