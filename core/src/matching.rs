//! Channel trace matcher.
//!
//! Pairs each declared device channel with its reference trace, trimmed to the
//! declared window and relabeled to the configured reference-sensor identity.

use crate::channel::{CanonicalChannel, UnknownChannel};
use crate::config::ChannelSpec;
use crate::telemetry::LogManager;
use crate::waveform::{TraceCollection, WaveformStore, WaveformTrace};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// How a failure on one channel affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// The first failing channel aborts the whole run.
    #[default]
    Strict,
    /// Failing channels are recorded and the remaining channels proceed.
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSide {
    Device,
    Reference,
}

impl fmt::Display for TraceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceSide::Device => f.write_str("channel"),
            TraceSide::Reference => f.write_str("reference channel"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    UnknownChannel(#[from] UnknownChannel),
    #[error("no trace in {source_name} for {side}: {channel} during {start} - {end}")]
    DataUnavailable {
        side: TraceSide,
        channel: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source_name: String,
    },
}

/// A matched device/reference pair ready for analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPairRecord {
    pub canonical: CanonicalChannel,
    /// Canonical device channel code.
    pub device_channel: String,
    /// Reference channel code as configured.
    pub reference_channel: String,
    pub device_trace: WaveformTrace,
    pub reference_trace: WaveformTrace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFailure {
    /// Canonical device channel code.
    pub channel: String,
    /// Reference channel code as configured.
    pub reference_channel: String,
    pub error: MatchError,
}

/// Per-channel match results, one entry per configured channel in
/// configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub channels: Vec<Result<ChannelPairRecord, ChannelFailure>>,
}

impl MatchOutcome {
    /// True when every declared channel produced a pair.
    pub fn is_complete(&self) -> bool {
        self.channels.iter().all(Result::is_ok)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &ChannelPairRecord> {
        self.channels.iter().filter_map(|entry| entry.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChannelFailure> {
        self.channels.iter().filter_map(|entry| entry.as_ref().err())
    }
}

struct CanonicalTrace {
    raw_channel: String,
    canonical: CanonicalChannel,
    trace: WaveformTrace,
}

pub struct ChannelMatcher<'a> {
    reference_network: String,
    reference_station: String,
    mode: FailureMode,
    archive: Option<(&'a dyn WaveformStore, PathBuf)>,
    logger: LogManager,
}

impl<'a> ChannelMatcher<'a> {
    pub fn new(
        reference_network: &str,
        reference_station: &str,
        mode: FailureMode,
        logger: LogManager,
    ) -> Self {
        Self {
            reference_network: reference_network.to_string(),
            reference_station: reference_station.to_string(),
            mode,
            archive: None,
            logger,
        }
    }

    /// Persist every matched pair through `store` into `directory`.
    pub fn with_archive(mut self, store: &'a dyn WaveformStore, directory: PathBuf) -> Self {
        self.archive = Some((store, directory));
        self
    }

    /// Matches every configured channel in order.
    ///
    /// Unknown channel codes always abort. Missing data aborts in
    /// [`FailureMode::Strict`] and is recorded per channel otherwise.
    pub fn match_channels(
        &self,
        waveforms: &TraceCollection,
        specs: &[ChannelSpec],
        source_name: &str,
    ) -> Result<MatchOutcome, MatchError> {
        let canonical = self.canonicalize(waveforms)?;
        let mut outcome = MatchOutcome::default();

        for spec in specs {
            let device_canonical = CanonicalChannel::normalize(&spec.device_channel)?;
            CanonicalChannel::normalize(&spec.reference_channel)?;

            let device = self.pick(
                &canonical,
                &spec.device_channel,
                spec.device_location.as_deref(),
                spec,
            )?;
            let reference = self.pick(
                &canonical,
                &spec.reference_channel,
                spec.reference_location.as_deref(),
                spec,
            )?;

            let missing = match (&device, &reference) {
                (None, _) => Some(TraceSide::Device),
                (_, None) => Some(TraceSide::Reference),
                _ => None,
            };
            if let (Some(device), Some(reference)) = (device, reference) {
                let pair = ChannelPairRecord {
                    canonical: device_canonical,
                    device_channel: device_canonical.code().to_string(),
                    reference_channel: spec.reference_channel.to_ascii_uppercase(),
                    device_trace: device
                        .with_identity(&self.reference_network, &self.reference_station),
                    reference_trace: reference
                        .with_identity(&self.reference_network, &self.reference_station),
                };
                self.logger.detail(&format!(
                    "matched {} ({} samples) with {} ({} samples)",
                    pair.device_trace.id(),
                    pair.device_trace.len(),
                    pair.reference_trace.id(),
                    pair.reference_trace.len()
                ));
                self.archive_pair(&pair);
                outcome.channels.push(Ok(pair));
                continue;
            }

            let side = missing.unwrap_or(TraceSide::Device);
            let channel = match side {
                TraceSide::Device => spec.device_channel.clone(),
                TraceSide::Reference => spec.reference_channel.clone(),
            };
            let error = MatchError::DataUnavailable {
                side,
                channel,
                start: spec.start_time,
                end: spec.end_time,
                source_name: source_name.to_string(),
            };
            self.logger.error(&error.to_string());
            if self.mode == FailureMode::Strict {
                return Err(error);
            }
            outcome.channels.push(Err(ChannelFailure {
                channel: device_canonical.code().to_string(),
                reference_channel: spec.reference_channel.to_ascii_uppercase(),
                error,
            }));
        }

        Ok(outcome)
    }

    fn canonicalize(&self, waveforms: &TraceCollection) -> Result<Vec<CanonicalTrace>, MatchError> {
        waveforms
            .iter()
            .map(|trace| {
                let canonical = CanonicalChannel::normalize(trace.channel()).map_err(|err| {
                    self.logger.error(&format!(
                        "unknown channel code encountered in {}: {}",
                        trace.id(),
                        err
                    ));
                    err
                })?;
                Ok(CanonicalTrace {
                    raw_channel: trace.channel().to_ascii_uppercase(),
                    canonical,
                    trace: trace.with_channel(canonical.code()),
                })
            })
            .collect()
    }

    /// First trimmed candidate for `code`, preferring traces recorded under exactly that code.
    fn pick(
        &self,
        traces: &[CanonicalTrace],
        code: &str,
        location: Option<&str>,
        spec: &ChannelSpec,
    ) -> Result<Option<WaveformTrace>, MatchError> {
        let canonical = CanonicalChannel::normalize(code)?;
        let code = code.to_ascii_uppercase();
        let candidates: Vec<&CanonicalTrace> = traces
            .iter()
            .filter(|entry| entry.canonical == canonical)
            .filter(|entry| location.map_or(true, |loc| entry.trace.location() == loc))
            .collect();
        let exact = candidates.iter().any(|entry| entry.raw_channel == code);

        Ok(candidates
            .into_iter()
            .filter(|entry| !exact || entry.raw_channel == code)
            .find_map(|entry| entry.trace.trimmed(&spec.start_time, &spec.end_time)))
    }

    fn archive_pair(&self, pair: &ChannelPairRecord) -> bool {
        let Some((store, directory)) = &self.archive else {
            return true;
        };
        let file_name = format!(
            "{}_{}_{}_{}_shaketable.json",
            self.reference_network,
            self.reference_station,
            pair.device_channel,
            pair.device_trace.location()
        );
        let path = directory.join(file_name);
        let traces = TraceCollection::new(vec![
            pair.device_trace.clone(),
            pair.reference_trace.clone(),
        ]);
        match store.write(&path, &traces) {
            Ok(()) => true,
            Err(err) => {
                self.logger.error(&format!(
                    "error writing shaketable traces for channel {}: {}",
                    pair.device_channel, err
                ));
                false
            }
        }
    }
}
