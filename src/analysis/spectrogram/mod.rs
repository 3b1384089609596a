// SpectrogramRenderer - time/frequency image of one audio segment
//
// The segment is cut from the first channel at the file's native rate,
// split into 50%-overlapping periodic-Hann windows (mean removed) and turned
// into a one-sided power spectral density. The band [fmin, fmax] is mapped
// to decibels, normalized, coloured and encoded as PNG.

pub mod colormap;

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::analysis::features::fft::FftProcessor;
use crate::audio::load_audio;
use crate::config::SpectrogramConfig;
use crate::error::PipelineError;

pub use colormap::Colormap;

/// Shortest segment that can be rendered
pub const MIN_SEGMENT_SAMPLES: usize = 256;
/// Longest analysis window
pub const MAX_WINDOW: usize = 2048;
/// Floor added to the power before taking decibels
const POWER_FLOOR: f64 = 1e-10;

/// Power spectral density over time
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// Bin centre frequencies in Hz, ascending
    pub frequencies: Vec<f64>,
    /// Window centre times in seconds, relative to the segment start
    pub times: Vec<f64>,
    /// `power[t][f]`
    pub power: Vec<Vec<f64>>,
}

/// Window length for a segment of `len` samples lasting `duration` seconds
pub fn window_length(len: usize, sample_rate: u32, duration: f64) -> usize {
    let quarter = (sample_rate as f64 * duration / 4.0).floor().max(0.0) as usize;
    len.min(MAX_WINDOW).min(quarter.max(MIN_SEGMENT_SAMPLES))
}

/// One-sided PSD with density scaling, like `scipy.signal.spectrogram`
pub fn compute(samples: &[f64], sample_rate: u32, window: usize) -> Spectrogram {
    let processor = FftProcessor::new(window);
    let overlap = window / 2;
    let step = window - overlap;
    let n_windows = if samples.len() < window {
        0
    } else {
        (samples.len() - overlap) / step
    };
    let fs = sample_rate as f64;
    let window_power: f64 = processor.window().iter().map(|w| w * w).sum();
    let scale = 1.0 / (fs * window_power);
    let n_bins = processor.n_bins();
    let has_nyquist = window % 2 == 0;

    let power = (0..n_windows)
        .map(|t| {
            let frame = &samples[t * step..t * step + window];
            let mean = frame.iter().sum::<f64>() / window as f64;
            let detrended: Vec<f64> = frame.iter().map(|v| v - mean).collect();
            let mut spectrum = processor.power_spectrum(&detrended);
            for (k, p) in spectrum.iter_mut().enumerate() {
                *p *= scale;
                let edge = k == 0 || (has_nyquist && k == n_bins - 1);
                if !edge {
                    *p *= 2.0;
                }
            }
            spectrum
        })
        .collect();

    Spectrogram {
        frequencies: (0..n_bins).map(|k| k as f64 * fs / window as f64).collect(),
        times: (0..n_windows)
            .map(|t| (t * step + window / 2) as f64 / fs)
            .collect(),
        power,
    }
}

/// Renders spectrogram PNGs
pub struct SpectrogramRenderer {
    config: SpectrogramConfig,
}

impl SpectrogramRenderer {
    pub fn new(config: &SpectrogramConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Render `[start_s, start_s + dur_s)` of an audio file
    ///
    /// # Arguments
    /// * `path` - Audio file, decoded at its native rate
    /// * `start_s`, `dur_s` - Segment position in seconds
    /// * `fmin`, `fmax` - Displayed frequency band in Hz
    /// * `colormap` - Colour scheme
    ///
    /// # Returns
    /// PNG bytes
    pub fn render<P: AsRef<Path>>(
        &self,
        path: P,
        start_s: f64,
        dur_s: f64,
        fmin: f64,
        fmax: f64,
        colormap: Colormap,
    ) -> Result<Vec<u8>, PipelineError> {
        let signal = load_audio(&path)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            sample_rate = signal.sample_rate,
            "[Spectrogram] Decoded audio"
        );
        self.render_samples(
            signal.first_channel(),
            signal.sample_rate,
            start_s,
            dur_s,
            fmin,
            fmax,
            colormap,
        )
    }

    /// Render a segment of already decoded samples
    #[allow(clippy::too_many_arguments)]
    pub fn render_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
        start_s: f64,
        dur_s: f64,
        fmin: f64,
        fmax: f64,
        colormap: Colormap,
    ) -> Result<Vec<u8>, PipelineError> {
        if !start_s.is_finite() || start_s < 0.0 {
            return Err(PipelineError::invalid("start_s", "must be a non-negative number"));
        }
        if !dur_s.is_finite() || dur_s <= 0.0 {
            return Err(PipelineError::invalid("dur_s", "must be a positive number"));
        }
        if !fmin.is_finite() || !fmax.is_finite() {
            return Err(PipelineError::invalid("frequency range", "fmin and fmax must be finite"));
        }

        let sr = sample_rate as f64;
        let start = ((start_s * sr).floor() as usize).min(samples.len());
        let end = start
            .saturating_add((dur_s * sr).floor() as usize)
            .min(samples.len());
        let segment: Vec<f64> = samples[start..end].iter().map(|&s| s as f64).collect();
        if segment.len() < MIN_SEGMENT_SAMPLES {
            return Err(PipelineError::SegmentTooShort {
                samples: segment.len(),
                minimum: MIN_SEGMENT_SAMPLES,
            });
        }

        let window = window_length(segment.len(), sample_rate, dur_s);
        let spectrogram = compute(&segment, sample_rate, window);
        let band: Vec<usize> = spectrogram
            .frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= fmin && f <= fmax)
            .map(|(k, _)| k)
            .collect();
        if band.is_empty() {
            return Err(PipelineError::invalid(
                "frequency range",
                format!("no frequency bins between {fmin} and {fmax} Hz"),
            ));
        }

        let decibels: Vec<Vec<f64>> = spectrogram
            .power
            .iter()
            .map(|column| band.iter().map(|&k| 10.0 * (column[k] + POWER_FLOOR).log10()).collect())
            .collect();
        let (low, high) = decibels
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = high - low;

        let band_freqs: Vec<f64> = band.iter().map(|&k| spectrogram.frequencies[k]).collect();
        let (width, height) = (self.config.width.max(1), self.config.height.max(1));
        let n_windows = decibels.len();
        let mut raster = RgbImage::new(width, height);
        for y in 0..height {
            // Row 0 is the top of the image, i.e. fmax
            let frequency = fmax - (y as f64 + 0.5) / height as f64 * (fmax - fmin);
            let bin = nearest(&band_freqs, frequency);
            for x in 0..width {
                let t = (x as usize * n_windows / width as usize).min(n_windows - 1);
                let value = if range > 0.0 {
                    (decibels[t][bin] - low) / range
                } else {
                    0.0
                };
                raster.put_pixel(x, y, Rgb(colormap.color(value)));
            }
        }

        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(raster)
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| PipelineError::computation("Spectrogram", err))?;
        tracing::info!(
            samples = segment.len(),
            window,
            windows = n_windows,
            bins = band.len(),
            colormap = %colormap,
            "[Spectrogram] Rendered segment"
        );
        Ok(bytes.into_inner())
    }
}

/// Index of the value in ascending `values` closest to `target`
fn nearest(values: &[f64], target: f64) -> usize {
    let upper = values.partition_point(|&v| v < target);
    if upper == 0 {
        return 0;
    }
    if upper >= values.len() {
        return values.len() - 1;
    }
    if target - values[upper - 1] <= values[upper] - target {
        upper - 1
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn tone(freq: f64, sr: u32, seconds: f64) -> Vec<f32> {
        (0..(sr as f64 * seconds) as usize)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn test_window_length_rules() {
        assert_eq!(window_length(22050, 22050, 1.0), 2048);
        assert_eq!(window_length(4000, 4000, 1.0), 1000);
        assert_eq!(window_length(300, 22050, 0.01), 256);
        assert_eq!(window_length(200, 22050, 1.0), 200);
    }

    #[test]
    fn test_psd_peak_at_tone_frequency() {
        let samples: Vec<f64> = tone(1000.0, 8000, 1.0).iter().map(|&s| s as f64).collect();
        let spec = compute(&samples, 8000, 1024);
        assert_eq!(spec.frequencies.len(), 513);
        assert_eq!(spec.times.len(), (8000 - 512) / 512);
        let column = &spec.power[0];
        let peak = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(spec.frequencies[peak], 1000.0);
    }

    #[test]
    fn test_render_produces_png_of_configured_size() {
        let renderer = SpectrogramRenderer::new(&SpectrogramConfig::default());
        let samples = tone(440.0, 22050, 2.0);
        let png = renderer
            .render_samples(&samples, 22050, 0.5, 1.0, 0.0, 20000.0, Colormap::Inferno)
            .unwrap();
        assert_eq!(&png[..8], &PNG_MAGIC);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 600);
        assert_eq!(decoded.height(), 360);
    }

    #[test]
    fn test_short_segment_is_rejected() {
        let renderer = SpectrogramRenderer::new(&SpectrogramConfig::default());
        let samples = tone(440.0, 22050, 1.0);
        let err = renderer
            .render_samples(&samples, 22050, 0.99, 0.5, 0.0, 20000.0, Colormap::Gray)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SegmentTooShort { minimum: 256, .. }));
    }

    #[test]
    fn test_empty_band_is_rejected() {
        let renderer = SpectrogramRenderer::new(&SpectrogramConfig::default());
        let samples = tone(440.0, 8000, 1.0);
        let err = renderer
            .render_samples(&samples, 8000, 0.0, 1.0, 5000.0, 6000.0, Colormap::Magma)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_nearest() {
        let values = [0.0, 10.0, 20.0];
        assert_eq!(nearest(&values, -5.0), 0);
        assert_eq!(nearest(&values, 4.0), 0);
        assert_eq!(nearest(&values, 6.0), 1);
        assert_eq!(nearest(&values, 99.0), 2);
    }
}
