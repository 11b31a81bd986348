use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{SpectralResult, StageError, StageResult};
use crate::telemetry::log::LogManager;
use ndarray::Array1;
use num_complex::Complex64;
use rustfft::num_traits::Zero;
use std::f64::consts::PI;

pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.5;
/// Shortest Welch segment, in samples.
pub const MIN_SEGMENT_LEN: usize = 16;

/// Cross-spectral estimation service consumed by the calibration pipeline.
///
/// Implementations return aligned arrays with non-negative, non-decreasing
/// frequencies; gain and phase describe `device / reference`.
pub trait SpectralEstimator {
    fn estimate(
        &self,
        device: &[f64],
        reference: &[f64],
        sample_rate: f64,
        smoothing_factor: f64,
    ) -> StageResult<SpectralResult>;
}

/// Welch averaging with fractional-octave smoothing.
///
/// Hann-windowed segments (largest power of two not above a quarter of the
/// record) overlap by half. The averaged spectra are then smoothed over
/// `smoothing_factor` octaves centred on each bin before gain, phase and
/// coherence are formed.
pub struct WelchEstimator {
    logger: LogManager,
}

impl WelchEstimator {
    pub fn new(logger: LogManager) -> Self {
        Self { logger }
    }

    pub fn segment_len(samples: usize) -> usize {
        let target = (samples / 4).max(MIN_SEGMENT_LEN.min(samples));
        let mut len = 1;
        while len * 2 <= target {
            len *= 2;
        }
        len
    }
}

impl Default for WelchEstimator {
    fn default() -> Self {
        Self::new(LogManager::new("welch"))
    }
}

fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

/// Averages each bin `k >= 1` over `[k·2^(-w/2), k·2^(w/2)]`; DC is left alone.
fn smooth_octaves(values: &[f64], width: f64) -> Vec<f64> {
    let len = values.len();
    if width <= 0.0 || len < 3 {
        return values.to_vec();
    }
    let mut prefix = vec![0.0; len + 1];
    for (i, value) in values.iter().enumerate() {
        prefix[i + 1] = prefix[i] + value;
    }
    let spread = 2f64.powf(width / 2.0);
    let mut smoothed = values.to_vec();
    for (k, slot) in smoothed.iter_mut().enumerate().skip(1) {
        let lo = ((k as f64 / spread).ceil() as usize).clamp(1, k);
        let hi = ((k as f64 * spread).floor() as usize).clamp(k, len - 1);
        *slot = (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64;
    }
    smoothed
}

impl SpectralEstimator for WelchEstimator {
    fn estimate(
        &self,
        device: &[f64],
        reference: &[f64],
        sample_rate: f64,
        smoothing_factor: f64,
    ) -> StageResult<SpectralResult> {
        if !(sample_rate > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if device.len() != reference.len() {
            self.logger.warn(&format!(
                "device has {} samples, reference {}; using the common length",
                device.len(),
                reference.len()
            ));
        }
        let samples = device.len().min(reference.len());
        if samples < MIN_SEGMENT_LEN {
            return Err(StageError::InvalidInput(format!(
                "{} samples is too short for spectral estimation",
                samples
            )));
        }

        let seg_len = Self::segment_len(samples);
        let step = (seg_len / 2).max(1);
        let window = hann(seg_len);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let bins = seg_len / 2 + 1;
        let mut fft = FftHelper::new(seg_len);

        let mut sxx = vec![0.0; bins];
        let mut syy = vec![0.0; bins];
        let mut sxy = vec![Complex64::zero(); bins];
        let mut segments = 0usize;
        let mut start = 0;
        while start + seg_len <= samples {
            let x = &reference[start..start + seg_len];
            let y = &device[start..start + seg_len];
            let (x_mean, y_mean) = (StatsHelper::mean(x), StatsHelper::mean(y));
            let xw: Vec<f64> = x.iter().zip(&window).map(|(v, w)| (v - x_mean) * w).collect();
            let yw: Vec<f64> = y.iter().zip(&window).map(|(v, w)| (v - y_mean) * w).collect();
            let xf = fft.forward(&xw);
            let yf = fft.forward(&yw);
            for k in 0..bins {
                sxx[k] += xf[k].norm_sqr();
                syy[k] += yf[k].norm_sqr();
                sxy[k] += xf[k].conj() * yf[k];
            }
            segments += 1;
            start += step;
        }

        // One-sided density scaling; DC and an even-length Nyquist bin are not doubled.
        let base = 1.0 / (sample_rate * window_power * segments as f64);
        let scale = |k: usize| {
            if k == 0 || (seg_len % 2 == 0 && k == bins - 1) {
                base
            } else {
                2.0 * base
            }
        };
        for k in 0..bins {
            let s = scale(k);
            sxx[k] *= s;
            syy[k] *= s;
            sxy[k] *= s;
        }

        let sxx = smooth_octaves(&sxx, smoothing_factor);
        let syy = smooth_octaves(&syy, smoothing_factor);
        let re = smooth_octaves(&sxy.iter().map(|c| c.re).collect::<Vec<_>>(), smoothing_factor);
        let im = smooth_octaves(&sxy.iter().map(|c| c.im).collect::<Vec<_>>(), smoothing_factor);

        let mut amplitude = Array1::<f64>::zeros(bins);
        let mut phase = Array1::<f64>::zeros(bins);
        let mut coherence = Array1::<f64>::zeros(bins);
        for k in 0..bins {
            let cross = Complex64::new(re[k], im[k]);
            if sxx[k] > 0.0 {
                amplitude[k] = cross.norm() / sxx[k];
            }
            phase[k] = cross.arg().to_degrees();
            let denominator = sxx[k] * syy[k];
            if denominator > 0.0 {
                coherence[k] = (cross.norm_sqr() / denominator).clamp(0.0, 1.0);
            }
        }
        let frequency = Array1::from_iter((0..bins).map(|k| k as f64 * sample_rate / seg_len as f64));

        self.logger.detail(&format!(
            "welch: {} segment(s) of {} samples, df {:.5} Hz",
            segments,
            seg_len,
            sample_rate / seg_len as f64
        ));

        SpectralResult::new(
            frequency,
            amplitude,
            phase,
            coherence,
            Array1::from(syy),
            Array1::from(sxx),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn segment_len_is_power_of_two_quarter_record() {
        assert_eq!(WelchEstimator::segment_len(4096), 1024);
        assert_eq!(WelchEstimator::segment_len(5000), 1024);
        assert_eq!(WelchEstimator::segment_len(40), 16);
        assert_eq!(WelchEstimator::segment_len(16), 16);
    }

    #[test]
    fn scaled_copy_has_unit_coherence_and_constant_gain() {
        let reference = noise(8192, 7);
        let device: Vec<f64> = reference.iter().map(|v| 2.5 * v).collect();
        let result = WelchEstimator::default()
            .estimate(&device, &reference, 40.0, DEFAULT_SMOOTHING_FACTOR)
            .unwrap();

        assert_eq!(result.len(), 1025);
        for k in 1..result.len() {
            assert!((result.amplitude()[k] - 2.5).abs() < 1e-9);
            assert!(result.phase()[k].abs() < 1e-6);
            assert!(result.coherence()[k] > 0.999_999);
        }
        let last = result.frequency()[result.len() - 1];
        assert!((last - 20.0).abs() < 1e-12);
    }

    #[test]
    fn independent_noise_has_low_coherence() {
        let result = WelchEstimator::default()
            .estimate(&noise(8192, 1), &noise(8192, 2), 40.0, DEFAULT_SMOOTHING_FACTOR)
            .unwrap();
        let mean_coherence = result.coherence().mean().unwrap();
        assert!(mean_coherence < 0.5, "mean coherence {}", mean_coherence);
    }

    #[test]
    fn rejects_short_records_and_bad_rates() {
        let estimator = WelchEstimator::default();
        assert!(estimator.estimate(&[0.0; 8], &[0.0; 8], 40.0, 0.5).is_err());
        assert!(estimator.estimate(&[0.0; 64], &[0.0; 64], 0.0, 0.5).is_err());
    }

    #[test]
    fn octave_smoothing_preserves_constants() {
        let flat = vec![3.0; 64];
        assert_eq!(smooth_octaves(&flat, 0.5), flat);
        let ramp: Vec<f64> = (0..64).map(|k| k as f64).collect();
        assert_eq!(smooth_octaves(&ramp, 0.0), ramp);
    }
}
