// Resample module - band-limited sample-rate conversion
//
// A windowed-sinc resampler converts a whole mono signal in one chunk, then
// flushes the filter tail. The filter delay is trimmed so output sample 0
// lines up with input sample 0.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::PipelineError;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resample `samples` from `source_rate` to `target_rate`
///
/// Content above the target Nyquist frequency is filtered out rather than
/// folded back into the band.
///
/// # Returns
/// `ceil(len * target_rate / source_rate)` samples
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, PipelineError> {
    if source_rate == 0 {
        return Err(PipelineError::invalid(
            "source sample rate",
            "must be positive",
        ));
    }
    if target_rate == 0 {
        return Err(PipelineError::invalid(
            "target sample rate",
            "must be positive",
        ));
    }
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(), samples.len(), 1)
            .map_err(|err| PipelineError::computation("resample", err))?;
    let delay = resampler.output_delay();

    let waves_in = vec![samples.to_vec()];
    let mut output = resampler
        .process(&waves_in, None)
        .map_err(|err| PipelineError::computation("resample", err))?
        .swap_remove(0);
    // Flush until the delayed tail has been emitted
    while output.len() < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|err| PipelineError::computation("resample", err))?
            .swap_remove(0);
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    let mut aligned: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    tracing::debug!(
        source_rate,
        target_rate,
        input = samples.len(),
        output = aligned.len(),
        "[Resample] Converted sample rate"
    );
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::resample;
    use std::f32::consts::PI;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn preserves_constant_signal_after_resample() {
        let input = vec![0.5; 44_100];
        let resampled = resample(&input, 44_100, 22_050).unwrap();
        assert_eq!(resampled.len(), 22_050);
        // edges ramp against the zero history of the filter
        let middle = &resampled[1_000..21_000];
        assert!(middle.iter().all(|&sample| (sample - 0.5).abs() < 5e-3));
    }

    #[test]
    fn removes_tone_above_target_nyquist() {
        let input = sine(15_000.0, 44_100, 44_100);
        let resampled = resample(&input, 44_100, 22_050).unwrap();
        assert!(rms(&resampled[1_000..21_000]) < 0.01);
    }

    #[test]
    fn keeps_in_band_tone_level() {
        let input = sine(1_000.0, 44_100, 44_100);
        let resampled = resample(&input, 44_100, 22_050).unwrap();
        let level = rms(&resampled[1_000..21_000]);
        assert!((level - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn upsampling_length() {
        let input = sine(440.0, 16_000, 16_000);
        let resampled = resample(&input, 16_000, 22_050).unwrap();
        assert_eq!(resampled.len(), 22_050);
    }

    #[test]
    fn identity_when_rates_match() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 22_050, 22_050).unwrap(), input);
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(resample(&[0.0], 0, 22_050).is_err());
    }
}
