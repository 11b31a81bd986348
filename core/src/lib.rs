//! Shake-table cross-spectral calibration core.
//!
//! A run validates its configuration, pairs each device channel with the
//! table reference trace, puts the reference sensor's nominal response onto
//! the drive signal, estimates the cross spectrum, gates it by band and
//! coherence, and appends per-channel gain and phase statistics to a
//! fixed-format report.

pub mod channel;
pub mod config;
pub mod math;
pub mod matching;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod report;
pub mod response;
pub mod telemetry;
pub mod waveform;

pub use channel::{CanonicalChannel, SensorAxis, UnknownChannel};
pub use config::{CalibrationConfig, ConfigError, ConfigErrors, EnvironmentRefs, FrequencyBand};
pub use matching::{ChannelMatcher, FailureMode, MatchError};
pub use pipeline::{CalibrationPipeline, CalibrationRun, ChannelOutcome, PipelineError};
pub use prelude::{ProcessingStage, SpectralResult, StageError, StageResult};
pub use response::{ResponseEvaluator, RespFileEvaluator};
pub use waveform::{JsonArchive, TraceCollection, WaveformStore, WaveformTrace};
