use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Forward/inverse FFT pair for real sequences of one fixed length.
///
/// Spectra use the one-sided layout (`n / 2 + 1` bins, DC first).
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch = vec![Complex64::zero(); size];
        Self {
            forward,
            inverse,
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.scratch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scratch.is_empty()
    }

    pub fn spectrum_len(&self) -> usize {
        self.len() / 2 + 1
    }

    /// One-sided spectrum of `input`; shorter input is zero padded, longer input truncated.
    pub fn forward(&mut self, input: &[f64]) -> Vec<Complex64> {
        self.scratch.fill(Complex64::zero());
        for (slot, &value) in self.scratch.iter_mut().zip(input) {
            *slot = Complex64::new(value, 0.0);
        }
        self.forward.process(&mut self.scratch);
        self.scratch[..self.spectrum_len()].to_vec()
    }

    /// Real sequence whose one-sided spectrum is `spectrum`, normalized by the length.
    pub fn inverse(&mut self, spectrum: &[Complex64]) -> Vec<f64> {
        let size = self.len();
        let half = self.spectrum_len();
        self.scratch.fill(Complex64::zero());
        for (k, value) in spectrum.iter().take(half).enumerate() {
            self.scratch[k] = *value;
            let mirror = size - k;
            if k > 0 && mirror >= half {
                self.scratch[mirror] = value.conj();
            }
        }
        self.inverse.process(&mut self.scratch);
        let scale = 1.0 / size as f64;
        self.scratch.iter().map(|c| c.re * scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_helper_returns_one_sided_length() {
        let mut helper = FftHelper::new(8);
        let output = helper.forward(&[1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0]);
        assert_eq!(output.len(), 5);
        assert!((output[2].re - 4.0).abs() < 1e-12);
    }

    #[test]
    fn inverse_recovers_odd_and_even_lengths() {
        for size in [7usize, 8] {
            let signal: Vec<f64> = (0..size).map(|i| (i as f64 * 0.7).sin() + 0.25).collect();
            let mut helper = FftHelper::new(size);
            let spectrum = helper.forward(&signal);
            let restored = helper.inverse(&spectrum);
            assert_eq!(restored.len(), size);
            for (a, b) in signal.iter().zip(&restored) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
