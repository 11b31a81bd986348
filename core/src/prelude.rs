use crate::response::ResponseError;
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("response file directory is not configured")]
    MissingResponseDirectory,
    #[error("response evaluation failed: {0}")]
    ResponseEvaluation(#[from] ResponseError),
    #[error("phase fit underdetermined: {surviving} bin(s) survived the coherence gate")]
    UnderdeterminedFit { surviving: usize },
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// A single step of the per-channel calibration chain.
pub trait ProcessingStage {
    type Input;
    type Output;

    fn name(&self) -> &'static str;
    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output>;
}

/// Cross-spectral estimate of device output against the reference drive.
///
/// All arrays share one length and one bin ordering; every selection goes
/// through [`SpectralResult::select`] so they stay aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralResult {
    frequency: Array1<f64>,
    amplitude: Array1<f64>,
    phase: Array1<f64>,
    coherence: Array1<f64>,
    psd_device: Array1<f64>,
    psd_reference: Array1<f64>,
}

impl SpectralResult {
    pub fn new(
        frequency: Array1<f64>,
        amplitude: Array1<f64>,
        phase: Array1<f64>,
        coherence: Array1<f64>,
        psd_device: Array1<f64>,
        psd_reference: Array1<f64>,
    ) -> StageResult<Self> {
        let len = frequency.len();
        let lengths = [
            amplitude.len(),
            phase.len(),
            coherence.len(),
            psd_device.len(),
            psd_reference.len(),
        ];
        if lengths.iter().any(|&other| other != len) {
            return Err(StageError::InvalidInput(format!(
                "spectral arrays are misaligned: frequency {} vs {:?}",
                len, lengths
            )));
        }
        if frequency.iter().any(|f| !(*f >= 0.0)) {
            return Err(StageError::InvalidInput(
                "frequencies must be non-negative".into(),
            ));
        }
        if frequency
            .iter()
            .zip(frequency.iter().skip(1))
            .any(|(a, b)| b < a)
        {
            return Err(StageError::InvalidInput(
                "frequencies must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            frequency,
            amplitude,
            phase,
            coherence,
            psd_device,
            psd_reference,
        })
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    pub fn frequency(&self) -> &Array1<f64> {
        &self.frequency
    }

    pub fn amplitude(&self) -> &Array1<f64> {
        &self.amplitude
    }

    /// Phase in degrees.
    pub fn phase(&self) -> &Array1<f64> {
        &self.phase
    }

    pub fn coherence(&self) -> &Array1<f64> {
        &self.coherence
    }

    pub fn psd_device(&self) -> &Array1<f64> {
        &self.psd_device
    }

    pub fn psd_reference(&self) -> &Array1<f64> {
        &self.psd_reference
    }

    /// Indices of bins satisfying `keep`, in ascending order.
    pub fn indices_where<F>(&self, mut keep: F) -> Vec<usize>
    where
        F: FnMut(usize) -> bool,
    {
        (0..self.len()).filter(|&i| keep(i)).collect()
    }

    /// Sub-result at `indices`, applied identically to every array.
    ///
    /// Panics if an index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            frequency: self.frequency.select(Axis(0), indices),
            amplitude: self.amplitude.select(Axis(0), indices),
            phase: self.phase.select(Axis(0), indices),
            coherence: self.coherence.select(Axis(0), indices),
            psd_device: self.psd_device.select(Axis(0), indices),
            psd_reference: self.psd_reference.select(Axis(0), indices),
        }
    }

    /// Same bins with the phase replaced.
    pub fn with_phase(mut self, phase: Array1<f64>) -> StageResult<Self> {
        if phase.len() != self.len() {
            return Err(StageError::InvalidInput(format!(
                "replacement phase has {} bins, expected {}",
                phase.len(),
                self.len()
            )));
        }
        self.phase = phase;
        Ok(self)
    }
}
