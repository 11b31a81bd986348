pub mod compensation;
pub mod gate;
pub mod spectral;

pub use compensation::{CompensatedPair, CompensationInput, CompensationStage, EDGE_TRIM};
pub use gate::{detrend_phase, GateInput, GatedResult, QualityGateStage};
pub use spectral::{SpectralEstimator, WelchEstimator, DEFAULT_SMOOTHING_FACTOR};
