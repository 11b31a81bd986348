//! End-to-end calibration run: archive read, channel matching, per-channel
//! analysis and report writing, strictly in configuration order.

use crate::channel::{CanonicalChannel, SensorAxis};
use crate::config::environment::ANALYSIS_DIR_VAR;
use crate::config::CalibrationConfig;
use crate::matching::{ChannelMatcher, ChannelPairRecord, FailureMode, MatchError};
use crate::prelude::{ProcessingStage, StageError, StageResult};
use crate::processing::{
    CompensationInput, CompensationStage, GateInput, GatedResult, QualityGateStage,
    SpectralEstimator,
};
use crate::report::{
    aggregate, ChannelStatistics, ChannelWindow, ReportHeader, ReportRow, ReportWriter,
};
use crate::response::ResponseEvaluator;
use crate::telemetry::{LogManager, RunMetrics};
use crate::waveform::{ArchiveError, WaveformStore};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("the environment variable {0} must be set")]
    MissingEnvironment(&'static str),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Matching(#[from] MatchError),
    #[error("analysis of channel {channel} failed: {source}")]
    Channel {
        channel: String,
        #[source]
        source: StageError,
    },
    #[error("cannot write report {path}: {source}")]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything produced for one successfully analyzed channel.
#[derive(Debug, Clone)]
pub struct ChannelAnalysis {
    pub window: ChannelWindow,
    pub statistics: ChannelStatistics,
    pub spectra: GatedResult,
}

#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: String,
    pub reference_channel: String,
    pub result: Result<ChannelAnalysis, String>,
}

impl ChannelOutcome {
    pub fn analysis(&self) -> Option<&ChannelAnalysis> {
        self.result.as_ref().ok()
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationRun {
    pub dataset: String,
    pub report_path: PathBuf,
    pub outcomes: Vec<ChannelOutcome>,
    pub metrics: RunMetrics,
}

impl CalibrationRun {
    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|outcome| outcome.channel == channel)
    }
}

pub fn report_path(analysis_root: &Path, dataset: &str) -> PathBuf {
    analysis_root.join(format!("{}_results.txt", dataset))
}

pub struct CalibrationPipeline<'a> {
    config: &'a CalibrationConfig,
    store: &'a dyn WaveformStore,
    evaluator: &'a dyn ResponseEvaluator,
    estimator: &'a dyn SpectralEstimator,
    mode: FailureMode,
    logger: LogManager,
}

impl<'a> CalibrationPipeline<'a> {
    pub fn new(
        config: &'a CalibrationConfig,
        store: &'a dyn WaveformStore,
        evaluator: &'a dyn ResponseEvaluator,
        estimator: &'a dyn SpectralEstimator,
        mode: FailureMode,
        logger: LogManager,
    ) -> Self {
        Self {
            config,
            store,
            evaluator,
            estimator,
            mode,
            logger,
        }
    }

    pub fn run(&self) -> Result<CalibrationRun, PipelineError> {
        let config = self.config;
        let analysis_root = config
            .environment()
            .analysis_root()
            .ok_or(PipelineError::MissingEnvironment(ANALYSIS_DIR_VAR))?;
        fs::create_dir_all(analysis_root).map_err(|source| PipelineError::Report {
            path: analysis_root.to_path_buf(),
            source,
        })?;

        let waveforms = self.store.read(config.waveform_path())?;
        let source_name = config
            .waveform_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.logger.record(&format!(
            "read {} trace(s) from {}",
            waveforms.len(),
            config.waveform_path().display()
        ));

        let matched = ChannelMatcher::new(
            config.reference_network(),
            config.reference_station(),
            self.mode,
            self.logger.scoped("matcher"),
        )
        .with_archive(self.store, analysis_root.to_path_buf())
        .match_channels(&waveforms, config.channels(), &source_name)?;

        let windows: Vec<ChannelWindow> = matched.pairs().map(window_of).collect();
        let analyzed_on = Utc::now();
        let writer = ReportWriter::new(
            report_path(analysis_root, config.dataset()),
            self.logger.scoped("report"),
        );
        self.write(&writer, |w| w.write_header(&self.header(&windows, analyzed_on)))?;

        let mut metrics = RunMetrics::new();
        let mut outcomes = Vec::with_capacity(matched.channels.len());
        for entry in &matched.channels {
            let pair = match entry {
                Ok(pair) => pair,
                Err(failure) => {
                    let reason = failure.error.to_string();
                    self.write(&writer, |w| {
                        w.append_failure(&failure.channel, &failure.reference_channel, &reason)
                    })?;
                    metrics.record_unmatched();
                    outcomes.push(ChannelOutcome {
                        channel: failure.channel.clone(),
                        reference_channel: failure.reference_channel.clone(),
                        result: Err(reason),
                    });
                    continue;
                }
            };

            let window = window_of(pair);
            match self.analyze(pair) {
                Ok((statistics, spectra)) => {
                    let row = ReportRow::from_statistics(
                        config.dataset(),
                        &window,
                        &statistics,
                        config.coherence_cutoff(),
                        analyzed_on,
                        &source_name,
                    );
                    self.write(&writer, |w| w.append_row(&row))?;
                    metrics.record_analyzed(statistics.bins);
                    outcomes.push(ChannelOutcome {
                        channel: pair.device_channel.clone(),
                        reference_channel: pair.reference_channel.clone(),
                        result: Ok(ChannelAnalysis {
                            window,
                            statistics,
                            spectra,
                        }),
                    });
                }
                Err(err) => {
                    self.logger.error(&format!(
                        "channel {} against {}: {}",
                        pair.device_channel, pair.reference_channel, err
                    ));
                    metrics.record_rejected();
                    if self.mode == FailureMode::Strict {
                        if let Err(footer) = writer.write_footer() {
                            self.logger.warn(&format!("report footer not written: {}", footer));
                        }
                        return Err(PipelineError::Channel {
                            channel: pair.device_channel.clone(),
                            source: err,
                        });
                    }
                    let reason = err.to_string();
                    self.write(&writer, |w| {
                        w.append_failure(&pair.device_channel, &pair.reference_channel, &reason)
                    })?;
                    outcomes.push(ChannelOutcome {
                        channel: pair.device_channel.clone(),
                        reference_channel: pair.reference_channel.clone(),
                        result: Err(reason),
                    });
                }
            }
        }

        self.write(&writer, ReportWriter::write_footer)?;
        self.logger.record(&format!(
            "dataset {}: {} channel(s) analyzed over {} bin(s), {} unmatched, {} rejected; report {}",
            config.dataset(),
            metrics.analyzed,
            metrics.bins,
            metrics.unmatched,
            metrics.rejected,
            writer.path().display()
        ));

        Ok(CalibrationRun {
            dataset: config.dataset().to_string(),
            report_path: writer.path().to_path_buf(),
            outcomes,
            metrics,
        })
    }

    fn analyze(&self, pair: &ChannelPairRecord) -> StageResult<(ChannelStatistics, GatedResult)> {
        let config = self.config;
        let scope = self.logger.scoped(&pair.device_channel);
        let sensitivity = config.sensitivity_meters_per_volt(
            pair.canonical.axis(),
            &pair.device_trace.start_time(),
        );

        let mut compensation = CompensationStage::new(
            config.environment().response_root().map(Path::to_path_buf),
            self.evaluator,
            scope.scoped("compensation"),
        );
        let compensated = compensation.execute(CompensationInput {
            device: &pair.device_trace,
            reference: &pair.reference_trace,
            sample_rate: config.sample_rate(),
            sensitivity,
            digitizer_counts_per_volt: config.digitizer_counts_per_volt(),
        })?;
        scope.detail(&format!(
            "{}: {} sample(s) per side at {} m/V",
            compensation.name(),
            compensated.device.len(),
            sensitivity
        ));

        let spectrum = self.estimator.estimate(
            &compensated.device,
            &compensated.reference,
            config.sample_rate(),
            config.smoothing_factor(),
        )?;

        let mut gate = QualityGateStage::new(scope.scoped("gate"));
        let gated = gate.execute(GateInput {
            spectrum,
            band: config.frequency_band(),
            coherence_cutoff: config.coherence_cutoff(),
        })?;

        let statistics = aggregate(&gated);
        scope.record(&format!(
            "gain {:.6} +/- {:.6}, phase {:.4} +/- {:.4} deg over {} bin(s)",
            statistics.gain_mean,
            statistics.gain_std,
            statistics.phase_mean,
            statistics.phase_std,
            statistics.bins
        ));
        Ok((statistics, gated))
    }

    fn header(&self, windows: &[ChannelWindow], analyzed_on: DateTime<Utc>) -> ReportHeader {
        let config = self.config;
        let start_of = |channels: &[CanonicalChannel]| {
            channels
                .iter()
                .find_map(|c| windows.iter().find(|w| w.channel == *c))
                .map(|w| w.start)
        };
        let horizontal = start_of(&[CanonicalChannel::Horizontal1, CanonicalChannel::Horizontal2])
            .map(|start| config.sensitivity_meters_per_volt(SensorAxis::Horizontal, &start));
        let vertical = start_of(&[CanonicalChannel::Vertical])
            .map(|start| config.sensitivity_meters_per_volt(SensorAxis::Vertical, &start));

        ReportHeader {
            analyzed_on,
            dataset: config.dataset().to_string(),
            digitizer_counts_per_volt: config.digitizer_counts_per_volt(),
            sample_rate: config.sample_rate(),
            smoothing_factor: config.smoothing_factor(),
            coherence_cutoff: config.coherence_cutoff(),
            windows: windows.to_vec(),
            horizontal_sensitivity: horizontal,
            vertical_sensitivity: vertical,
            band: config.frequency_band(),
        }
    }

    fn write<F>(&self, writer: &ReportWriter, action: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&ReportWriter) -> std::io::Result<()>,
    {
        action(writer).map_err(|source| {
            self.logger.error(&format!(
                "cannot write report {}: {}",
                writer.path().display(),
                source
            ));
            PipelineError::Report {
                path: writer.path().to_path_buf(),
                source,
            }
        })
    }
}

fn window_of(pair: &ChannelPairRecord) -> ChannelWindow {
    ChannelWindow {
        channel: pair.canonical,
        reference_channel: pair.reference_channel.clone(),
        start: pair.device_trace.start_time(),
        end: pair.device_trace.end_time(),
    }
}
