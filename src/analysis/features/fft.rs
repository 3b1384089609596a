// FFT module - windowed power spectra
//
// This module handles FFT computation with Hann windowing to reduce
// spectral leakage. The power spectrum feeds both the mel filterbank and
// the spectrogram renderer.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Periodic Hann window (the DFT-even variant used for spectral analysis)
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - ((2.0 * std::f64::consts::PI * i as f64) / size as f64).cos()))
        .collect()
}

/// FFT processor that computes one-sided power spectra from audio frames
pub struct FftProcessor {
    fft: Arc<dyn Fft<f64>>,
    fft_size: usize,
    /// Hann window for FFT (pre-computed)
    window: Vec<f64>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - FFT frame size in samples
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            fft_size,
            window: hann_window(fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Number of one-sided bins (`fft_size / 2 + 1`)
    pub fn n_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the one-sided power spectrum `|X[k]|²`
    ///
    /// Applies Hann windowing and zero-pads frames shorter than `fft_size`.
    ///
    /// # Arguments
    /// * `frame` - Audio frame (length <= fft_size)
    ///
    /// # Returns
    /// Power spectrum (size = fft_size / 2 + 1)
    pub fn power_spectrum(&self, frame: &[f64]) -> Vec<f64> {
        let mut buffer: Vec<Complex<f64>> = frame
            .iter()
            .take(self.fft_size)
            .zip(&self.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..self.n_bins()].iter().map(|c| c.norm_sqr()).collect()
    }
}
