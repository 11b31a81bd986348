use crate::config::FrequencyBand;
use crate::math::stats::{LinearFit, StatsHelper};
use crate::prelude::{ProcessingStage, SpectralResult, StageError, StageResult};
use crate::telemetry::log::LogManager;

pub struct GateInput {
    pub spectrum: SpectralResult,
    pub band: FrequencyBand,
    pub coherence_cutoff: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatedResult {
    /// Every bin inside the analysis band, phase untouched.
    pub band_limited: SpectralResult,
    /// Bins above the coherence cutoff with the linear phase trend removed.
    pub gated: SpectralResult,
    /// Fitted phase trend in degrees per Hz.
    pub phase_slope: f64,
    /// Intercept of the fit; discarded from the correction.
    pub discarded_intercept: f64,
}

/// Removes `slope * f` from the phase, keeping any constant offset.
pub fn detrend_phase(spectrum: SpectralResult) -> StageResult<(SpectralResult, LinearFit)> {
    let fit = StatsHelper::linear_fit(spectrum.frequency().view(), spectrum.phase().view())
        .ok_or(StageError::UnderdeterminedFit {
            surviving: spectrum.len(),
        })?;
    let detrended = spectrum.phase() - &(spectrum.frequency() * fit.slope);
    Ok((spectrum.with_phase(detrended)?, fit))
}

/// Band restriction, coherence gating and phase detrending.
pub struct QualityGateStage {
    logger: LogManager,
}

impl QualityGateStage {
    pub fn new(logger: LogManager) -> Self {
        Self { logger }
    }
}

impl ProcessingStage for QualityGateStage {
    type Input = GateInput;
    type Output = GatedResult;

    fn name(&self) -> &'static str {
        "quality-gate"
    }

    fn execute(&mut self, input: GateInput) -> StageResult<GatedResult> {
        let GateInput {
            spectrum,
            band,
            coherence_cutoff,
        } = input;

        let in_band = spectrum.indices_where(|i| band.contains(spectrum.frequency()[i]));
        let band_limited = spectrum.select(&in_band);

        let coherent = band_limited.indices_where(|i| band_limited.coherence()[i] > coherence_cutoff);
        let surviving = coherent.len();
        self.logger.detail(&format!(
            "{} of {} in-band bins exceed coherence {}",
            surviving,
            band_limited.len(),
            coherence_cutoff
        ));
        if surviving < 2 {
            self.logger.warn(&format!(
                "only {} bin(s) above coherence {} in {:.3}-{:.3} Hz",
                surviving, coherence_cutoff, band.min, band.max
            ));
            return Err(StageError::UnderdeterminedFit { surviving });
        }

        let (gated, fit) = detrend_phase(band_limited.select(&coherent))?;
        Ok(GatedResult {
            band_limited,
            gated,
            phase_slope: fit.slope,
            discarded_intercept: fit.intercept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn spectrum(coherence: Array1<f64>, phase: Array1<f64>) -> SpectralResult {
        let len = coherence.len();
        let frequency = Array1::from_iter((0..len).map(|k| k as f64 * 0.5));
        SpectralResult::new(
            frequency.clone(),
            Array1::from_iter((0..len).map(|k| 1.0 + k as f64)),
            phase,
            coherence,
            frequency.clone(),
            frequency,
        )
        .unwrap()
    }

    fn gate(spectrum: SpectralResult, min: f64, max: f64, cutoff: f64) -> StageResult<GatedResult> {
        QualityGateStage::new(LogManager::new("test")).execute(GateInput {
            spectrum,
            band: FrequencyBand { min, max },
            coherence_cutoff: cutoff,
        })
    }

    #[test]
    fn band_is_inclusive_and_arrays_stay_aligned() {
        let input = spectrum(Array1::from_elem(8, 0.99), Array1::zeros(8));
        let result = gate(input, 0.5, 2.5, 0.9).unwrap();
        assert_eq!(result.band_limited.frequency(), &array![0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(result.band_limited.amplitude(), &array![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(result.gated.psd_device(), result.gated.frequency());
    }

    #[test]
    fn coherence_equal_to_cutoff_is_excluded() {
        let coherence = array![0.98, 0.99, 0.98, 0.995, 0.97, 0.999];
        let result = gate(spectrum(coherence, Array1::zeros(6)), 0.0, 10.0, 0.98).unwrap();
        assert_eq!(result.gated.frequency(), &array![0.5, 1.5, 2.5]);
        assert_eq!(result.gated.amplitude(), &array![2.0, 4.0, 6.0]);
        assert_eq!(result.gated.coherence(), &array![0.99, 0.995, 0.999]);
    }

    #[test]
    fn detrending_zeroes_the_slope_and_keeps_offset() {
        let phase = Array1::from_iter((0..10).map(|k| 3.0 - 4.0 * (k as f64 * 0.5) + (k % 2) as f64 * 0.1));
        let result = gate(spectrum(Array1::from_elem(10, 1.0), phase), 0.0, 10.0, 0.5).unwrap();
        assert!((result.phase_slope + 4.0).abs() < 0.05);
        let refit = StatsHelper::linear_fit(result.gated.frequency().view(), result.gated.phase().view())
            .unwrap();
        assert!(refit.slope.abs() < 1e-9);
        assert!((refit.intercept - result.discarded_intercept).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_surviving_bins_is_a_failure() {
        let coherence = array![0.5, 0.99, 0.5, 0.5];
        let err = gate(spectrum(coherence, Array1::zeros(4)), 0.0, 10.0, 0.98).unwrap_err();
        assert!(matches!(err, StageError::UnderdeterminedFit { surviving: 1 }));

        let empty_band = spectrum(Array1::from_elem(4, 1.0), Array1::zeros(4));
        assert!(matches!(
            gate(empty_band, 50.0, 60.0, 0.5),
            Err(StageError::UnderdeterminedFit { surviving: 0 })
        ));
    }
}
