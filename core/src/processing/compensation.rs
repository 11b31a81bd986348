use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::response::{resp_file_name, ResponseEvaluator, ResponseRequest, ResponseUnits};
use crate::telemetry::log::LogManager;
use crate::waveform::WaveformTrace;
use std::path::PathBuf;

/// Samples dropped from each end after the frequency-domain round trip.
pub const EDGE_TRIM: usize = 20;

pub struct CompensationInput<'a> {
    pub device: &'a WaveformTrace,
    pub reference: &'a WaveformTrace,
    pub sample_rate: f64,
    /// Table sensitivity in meters per volt.
    pub sensitivity: f64,
    pub digitizer_counts_per_volt: f64,
}

/// Device and reference samples ready for spectral estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensatedPair {
    pub device: Vec<f64>,
    pub reference: Vec<f64>,
}

/// Puts the reference sensor's nominal response onto the table drive signal
/// and converts it to digitizer units.
pub struct CompensationStage<'a> {
    response_root: Option<PathBuf>,
    evaluator: &'a dyn ResponseEvaluator,
    logger: LogManager,
}

impl<'a> CompensationStage<'a> {
    pub fn new(
        response_root: Option<PathBuf>,
        evaluator: &'a dyn ResponseEvaluator,
        logger: LogManager,
    ) -> Self {
        Self {
            response_root,
            evaluator,
            logger,
        }
    }
}

fn trim_edges(samples: &[f64]) -> StageResult<Vec<f64>> {
    if samples.len() <= 2 * EDGE_TRIM {
        return Err(StageError::InvalidInput(format!(
            "{} samples leave nothing after trimming {} from each end",
            samples.len(),
            EDGE_TRIM
        )));
    }
    Ok(samples[EDGE_TRIM..samples.len() - EDGE_TRIM].to_vec())
}

impl<'a> ProcessingStage for CompensationStage<'a> {
    type Input = CompensationInput<'a>;
    type Output = CompensatedPair;

    fn name(&self) -> &'static str {
        "compensation"
    }

    fn execute(&mut self, input: CompensationInput<'a>) -> StageResult<CompensatedPair> {
        let response_root = self
            .response_root
            .as_ref()
            .ok_or(StageError::MissingResponseDirectory)?;
        if !(input.digitizer_counts_per_volt > 0.0) || !(input.sample_rate > 0.0) {
            return Err(StageError::InvalidInput(format!(
                "sample rate {} and digitizer sensitivity {} must be positive",
                input.sample_rate, input.digitizer_counts_per_volt
            )));
        }

        let reference = input.reference;
        let samples = reference.len();
        if samples == 0 {
            return Err(StageError::InvalidInput("reference trace is empty".into()));
        }

        let resp_path = response_root.join(resp_file_name(
            reference.network(),
            reference.station(),
            reference.location(),
            reference.channel(),
        ));
        let request = ResponseRequest {
            delta_t: 1.0 / input.sample_rate,
            num_samples: samples,
            path: &resp_path,
            start_time: reference.start_time(),
            network: reference.network(),
            station: reference.station(),
            location: reference.location(),
            channel: reference.channel(),
            units: ResponseUnits::Displacement,
        };
        let response = self.evaluator.evaluate(&request).map_err(|err| {
            self.logger.error(&format!(
                "response evaluation failed for {}: {}",
                reference.id(),
                err
            ));
            StageError::from(err)
        })?;

        let mut fft = FftHelper::new(samples);
        if response.values.len() != fft.spectrum_len() {
            return Err(StageError::Internal(format!(
                "response has {} bins, spectrum has {}",
                response.values.len(),
                fft.spectrum_len()
            )));
        }

        let mean = StatsHelper::mean(reference.samples());
        let centered: Vec<f64> = reference.samples().iter().map(|v| v - mean).collect();
        let spectrum: Vec<_> = fft
            .forward(&centered)
            .into_iter()
            .zip(&response.values)
            .map(|(bin, resp)| bin * resp)
            .collect();
        let scale = input.sensitivity / input.digitizer_counts_per_volt;
        let with_response: Vec<f64> = fft.inverse(&spectrum).into_iter().map(|v| v * scale).collect();

        if input.sensitivity == 0.0 {
            self.logger.warn(&format!(
                "no table sensitivity covers {}; reference is scaled to zero",
                reference.start_time()
            ));
        }
        self.logger.detail(&format!(
            "{}: removed mean {:.6}, scaled by {:.6e}",
            reference.id(),
            mean,
            scale
        ));

        Ok(CompensatedPair {
            device: trim_edges(input.device.samples())?,
            reference: trim_edges(&with_response)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{FrequencyResponse, ResponseError};
    use chrono::{TimeZone, Utc};
    use num_complex::Complex64;
    use std::cell::RefCell;

    struct FlatResponse {
        gain: f64,
        seen: RefCell<Vec<PathBuf>>,
    }

    impl ResponseEvaluator for FlatResponse {
        fn evaluate(
            &self,
            request: &ResponseRequest<'_>,
        ) -> Result<FrequencyResponse, ResponseError> {
            self.seen.borrow_mut().push(request.path.to_path_buf());
            let frequencies = request.frequencies();
            Ok(FrequencyResponse {
                values: vec![Complex64::new(self.gain, 0.0); frequencies.len()],
                frequencies,
            })
        }
    }

    struct BrokenResponse;

    impl ResponseEvaluator for BrokenResponse {
        fn evaluate(
            &self,
            request: &ResponseRequest<'_>,
        ) -> Result<FrequencyResponse, ResponseError> {
            Err(ResponseError::Io {
                path: request.path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            })
        }
    }

    fn trace(channel: &str, samples: Vec<f64>) -> WaveformTrace {
        WaveformTrace::new(
            "UNK",
            "NA",
            "10",
            channel,
            Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap(),
            40.0,
            samples,
        )
    }

    fn input<'a>(device: &'a WaveformTrace, reference: &'a WaveformTrace) -> CompensationInput<'a> {
        CompensationInput {
            device,
            reference,
            sample_rate: 40.0,
            sensitivity: 0.5,
            digitizer_counts_per_volt: 2.0,
        }
    }

    #[test]
    fn flat_response_demeans_scales_and_trims() {
        let raw: Vec<f64> = (0..101).map(|i| (i as f64 * 0.3).sin() + 4.0).collect();
        let mean = StatsHelper::mean(&raw);
        let device = trace("BHZ", (0..101).map(|i| i as f64).collect());
        let reference = trace("BHZ", raw.clone());
        let evaluator = FlatResponse {
            gain: 2.0,
            seen: RefCell::new(Vec::new()),
        };
        let mut stage = CompensationStage::new(
            Some(PathBuf::from("/resp")),
            &evaluator,
            LogManager::new("test"),
        );

        let output = stage.execute(input(&device, &reference)).unwrap();
        assert_eq!(output.device.len(), 61);
        assert_eq!(output.reference.len(), 61);
        assert_eq!(output.device[0], 20.0);
        for (i, value) in output.reference.iter().enumerate() {
            let expected = (raw[i + EDGE_TRIM] - mean) * 2.0 * 0.25;
            assert!((value - expected).abs() < 1e-9);
        }
        assert_eq!(
            evaluator.seen.borrow()[0],
            PathBuf::from("/resp/RESP.UNK.NA.10.BHZ")
        );
    }

    #[test]
    fn missing_response_directory_fails_before_evaluation() {
        let device = trace("BHZ", vec![0.0; 100]);
        let reference = trace("BHZ", vec![0.0; 100]);
        let evaluator = FlatResponse {
            gain: 1.0,
            seen: RefCell::new(Vec::new()),
        };
        let mut stage = CompensationStage::new(None, &evaluator, LogManager::new("test"));
        assert!(matches!(
            stage.execute(input(&device, &reference)),
            Err(StageError::MissingResponseDirectory)
        ));
        assert!(evaluator.seen.borrow().is_empty());
    }

    #[test]
    fn evaluator_failure_is_surfaced() {
        let device = trace("BHZ", vec![0.0; 100]);
        let reference = trace("BHZ", vec![1.0; 100]);
        let mut stage = CompensationStage::new(
            Some(PathBuf::from("/resp")),
            &BrokenResponse,
            LogManager::new("test"),
        );
        assert!(matches!(
            stage.execute(input(&device, &reference)),
            Err(StageError::ResponseEvaluation(_))
        ));
    }

    #[test]
    fn too_short_for_edge_trim() {
        let device = trace("BHZ", vec![0.0; 40]);
        let reference = trace("BHZ", vec![1.0; 40]);
        let evaluator = FlatResponse {
            gain: 1.0,
            seen: RefCell::new(Vec::new()),
        };
        let mut stage =
            CompensationStage::new(Some(PathBuf::from("/resp")), &evaluator, LogManager::new("test"));
        assert!(matches!(
            stage.execute(input(&device, &reference)),
            Err(StageError::InvalidInput(_))
        ));
    }
}
