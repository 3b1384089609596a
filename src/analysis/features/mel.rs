// Mel module - mel filterbank and cepstral coefficients
//
// Frames are centred with zero padding, windowed, and turned into power
// spectra; a Slaney-normalised mel filterbank folds each spectrum into mel
// bands, which are log-compressed (dB, 80 dB dynamic range) and decorrelated
// with an orthonormal DCT-II.
//
// References:
// - Slaney, M. (1998). Auditory Toolbox, Technical Report #1998-010
// - Davis, S. & Mermelstein, P. (1980). Comparison of parametric
//   representations for monosyllabic word recognition

use super::fft::FftProcessor;

/// Floor applied before taking the log of mel power
const AMIN: f64 = 1e-10;
/// Dynamic range kept below the loudest mel bin
const TOP_DB: f64 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

/// Convert Hz to mel (Slaney scale: linear below 1 kHz, logarithmic above)
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert mel back to Hz (Slaney scale)
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Triangular mel filterbank, `n_mels` rows × `n_fft / 2 + 1` columns
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(fmax);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, centre, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let norm = 2.0 / (upper - lower);
            fft_freqs
                .iter()
                .map(|&f| {
                    let rising = (f - lower) / (centre - lower);
                    let falling = (upper - f) / (upper - centre);
                    rising.min(falling).max(0.0) * norm
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II of `input`, truncated to `n_out` coefficients
pub fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64).cos()
                })
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Computes per-frame cepstral coefficients and their mean over a window
pub struct MfccProcessor {
    fft: FftProcessor,
    filterbank: Vec<Vec<f64>>,
    hop_length: usize,
    n_coeffs: usize,
}

impl MfccProcessor {
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        hop_length: usize,
        n_mels: usize,
        n_coeffs: usize,
    ) -> Self {
        Self {
            fft: FftProcessor::new(n_fft),
            filterbank: mel_filterbank(sample_rate, n_fft, n_mels),
            hop_length: hop_length.max(1),
            n_coeffs,
        }
    }

    pub fn n_coeffs(&self) -> usize {
        self.n_coeffs
    }

    /// Mel power spectrogram, one row per centred frame
    fn mel_power_frames(&self, signal: &[f64]) -> Vec<Vec<f64>> {
        let n_fft = self.fft.fft_size();
        let pad = n_fft / 2;
        let mut padded = vec![0.0; pad];
        padded.extend_from_slice(signal);
        padded.resize(padded.len() + pad, 0.0);

        let n_frames = 1 + signal.len() / self.hop_length;
        (0..n_frames)
            .map(|frame| {
                let start = frame * self.hop_length;
                let end = (start + n_fft).min(padded.len());
                let power = self.fft.power_spectrum(&padded[start..end]);
                self.filterbank
                    .iter()
                    .map(|filter| filter.iter().zip(&power).map(|(w, p)| w * p).sum())
                    .collect()
            })
            .collect()
    }

    /// Cepstral coefficients for every frame of `signal`
    pub fn frames(&self, signal: &[f64]) -> Vec<Vec<f64>> {
        let mel_frames = self.mel_power_frames(signal);

        let mut db_frames: Vec<Vec<f64>> = mel_frames
            .iter()
            .map(|frame| frame.iter().map(|&p| 10.0 * p.max(AMIN).log10()).collect())
            .collect();
        let peak = db_frames
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let floor = peak - TOP_DB;
        for value in db_frames.iter_mut().flatten() {
            *value = value.max(floor);
        }

        db_frames
            .iter()
            .map(|frame| dct_ortho(frame, self.n_coeffs))
            .collect()
    }

    /// Mean cepstral vector over all frames of `signal`
    pub fn mean_coefficients(&self, signal: &[f64]) -> Vec<f64> {
        let frames = self.frames(signal);
        let mut mean = vec![0.0; self.n_coeffs];
        if frames.is_empty() {
            return mean;
        }
        for frame in &frames {
            for (acc, value) in mean.iter_mut().zip(frame) {
                *acc += value;
            }
        }
        let count = frames.len() as f64;
        mean.iter_mut().for_each(|v| *v /= count);
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0, 440.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_filterbank_shape_and_coverage() {
        let bank = mel_filterbank(22050, 2048, 128);
        assert_eq!(bank.len(), 128);
        assert!(bank.iter().all(|row| row.len() == 1025));
        assert!(bank.iter().all(|row| row.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn test_dct_of_constant_is_dc_only() {
        let coeffs = dct_ortho(&[1.0; 16], 4);
        assert!((coeffs[0] - 4.0).abs() < 1e-9);
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn test_frame_count_matches_centered_framing() {
        let processor = MfccProcessor::new(22050, 2048, 512, 128, 13);
        let frames = processor.frames(&vec![0.0; 22050]);
        assert_eq!(frames.len(), 1 + 22050 / 512);
        assert!(frames.iter().all(|f| f.len() == 13));
    }

    #[test]
    fn test_tones_produce_distinct_coefficients() {
        let processor = MfccProcessor::new(22050, 2048, 512, 128, 13);
        let tone = |freq: f64| -> Vec<f64> {
            (0..22050)
                .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / 22050.0).sin())
                .collect()
        };
        let low = processor.mean_coefficients(&tone(200.0));
        let high = processor.mean_coefficients(&tone(5000.0));
        let distance: f64 = low
            .iter()
            .zip(&high)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(distance > 1.0, "expected separable tones, got {distance}");
    }
}
