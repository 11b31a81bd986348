//! Calibration configuration manager.
//!
//! The YAML document is checked key by key and every problem is collected
//! before anything is reported, so one run surfaces the full list of fixes a
//! config needs. A validated [`CalibrationConfig`] is immutable.

pub mod environment;
pub mod schedule;
pub mod time;

use crate::channel::{CanonicalChannel, SensorAxis};
use crate::telemetry::LogManager;
use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub use environment::EnvironmentRefs;
pub use schedule::{year_day, SensitivityEntry, SensitivitySchedule};
pub use time::{epoch_seconds, parse_timestamp};

/// Subdirectory of the raw root holding shake-table waveform files.
pub const SHAKETABLE_SUBDIR: &str = "shaketable";
pub const DEFAULT_REFERENCE_NETWORK: &str = "UNK";
pub const DEFAULT_REFERENCE_STATION: &str = "NA";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing YAML configuration: {0}")]
    Parse(String),
    #[error("missing entry in configuration file: {0}")]
    MissingKey(String),
    #[error("malformed entry `{key}`: {reason}")]
    Malformed { key: String, reason: String },
    #[error("the environment variable {0} must be set")]
    MissingEnvironment(&'static str),
    #[error("waveform file {0} not found")]
    WaveformNotFound(PathBuf),
}

/// Every validation failure found in one configuration document.
#[derive(Debug)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn errors(&self) -> &[ConfigError] {
        &self.0
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

/// Inclusive analysis band in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub min: f64,
    pub max: f64,
}

impl FrequencyBand {
    pub fn contains(&self, frequency: f64) -> bool {
        self.min <= frequency && frequency <= self.max
    }
}

/// One declared device/reference channel pairing and its analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub device_channel: String,
    pub reference_channel: String,
    pub device_location: Option<String>,
    pub reference_location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    sample_rate: f64,
    digitizer_counts_per_volt: f64,
    horizontal: SensitivitySchedule,
    vertical: SensitivitySchedule,
    channels: Vec<ChannelSpec>,
    band: FrequencyBand,
    coherence_cutoff: f64,
    smoothing_factor: f64,
    reference_network: String,
    reference_station: String,
    waveform_path: PathBuf,
    dataset: String,
    environment: EnvironmentRefs,
}

impl CalibrationConfig {
    pub fn load<P: AsRef<Path>>(
        path: P,
        environment: &EnvironmentRefs,
        logger: &LogManager,
    ) -> Result<Self, ConfigErrors> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| {
            let error = ConfigError::Io {
                path: path_ref.to_path_buf(),
                source,
            };
            logger.error(&error.to_string());
            ConfigErrors(vec![error])
        })?;
        Self::from_yaml_str(&contents, environment, logger)
    }

    pub fn from_yaml_str(
        contents: &str,
        environment: &EnvironmentRefs,
        logger: &LogManager,
    ) -> Result<Self, ConfigErrors> {
        let document = match serde_yaml::from_str::<Value>(contents) {
            Ok(Value::Mapping(map)) => map,
            Ok(_) => {
                return Err(report(
                    logger,
                    vec![ConfigError::Parse("top level must be a mapping".into())],
                ))
            }
            Err(err) => return Err(report(logger, vec![ConfigError::Parse(err.to_string())])),
        };

        let mut validator = Validator::default();
        for name in environment.missing() {
            validator.errors.push(ConfigError::MissingEnvironment(name));
        }

        let waveform_path = validator.waveform_path(&document, environment);
        let sample_rate = validator.positive(&document, "analysis_sample_rate");
        let digitizer = validator.positive(&document, "digi_cnts_per_volt");
        let horizontal = validator.schedule(&document, "shaketable_hori_resp");
        let vertical = validator.schedule(&document, "shaketable_vert_resp");
        let band = validator.band(&document);
        let smoothing = validator.positive(&document, "smoothing_factor");
        let cutoff = validator.cutoff(&document);
        let channels = validator.components(&document);
        let reference_network =
            validator.optional_string(&document, "ref_sensor_network", DEFAULT_REFERENCE_NETWORK);
        let reference_station =
            validator.optional_string(&document, "ref_sensor_station", DEFAULT_REFERENCE_STATION);

        if !validator.errors.is_empty() {
            return Err(report(logger, validator.errors));
        }

        let (
            Some(waveform_path),
            Some(sample_rate),
            Some(digitizer_counts_per_volt),
            Some(horizontal),
            Some(vertical),
            Some(band),
            Some(smoothing_factor),
            Some(coherence_cutoff),
            Some(channels),
        ) = (
            waveform_path,
            sample_rate,
            digitizer,
            horizontal,
            vertical,
            band,
            smoothing,
            cutoff,
            channels,
        )
        else {
            return Err(report(
                logger,
                vec![ConfigError::Parse("incomplete configuration".into())],
            ));
        };

        let dataset = waveform_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        logger.detail(&format!(
            "loaded {} channel(s) from dataset {} ({})",
            channels.len(),
            dataset,
            waveform_path.display()
        ));

        Ok(Self {
            sample_rate,
            digitizer_counts_per_volt,
            horizontal,
            vertical,
            channels,
            band,
            coherence_cutoff,
            smoothing_factor,
            reference_network,
            reference_station,
            waveform_path,
            dataset,
            environment: environment.clone(),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn digitizer_counts_per_volt(&self) -> f64 {
        self.digitizer_counts_per_volt
    }

    /// Table sensitivity in effect on `date`, or `0.0` when no period covers it.
    pub fn sensitivity_meters_per_volt(&self, axis: SensorAxis, date: &DateTime<Utc>) -> f64 {
        match axis {
            SensorAxis::Vertical => self.vertical.lookup(date),
            SensorAxis::Horizontal => self.horizontal.lookup(date),
        }
    }

    pub fn schedule(&self, axis: SensorAxis) -> &SensitivitySchedule {
        match axis {
            SensorAxis::Vertical => &self.vertical,
            SensorAxis::Horizontal => &self.horizontal,
        }
    }

    pub fn coherence_cutoff(&self) -> f64 {
        self.coherence_cutoff
    }

    pub fn smoothing_factor(&self) -> f64 {
        self.smoothing_factor
    }

    pub fn frequency_band(&self) -> FrequencyBand {
        self.band
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn reference_network(&self) -> &str {
        &self.reference_network
    }

    pub fn reference_station(&self) -> &str {
        &self.reference_station
    }

    pub fn waveform_path(&self) -> &Path {
        &self.waveform_path
    }

    /// Name of the directory holding the waveform file.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn environment(&self) -> &EnvironmentRefs {
        &self.environment
    }
}

fn report(logger: &LogManager, errors: Vec<ConfigError>) -> ConfigErrors {
    for error in &errors {
        logger.error(&error.to_string());
    }
    ConfigErrors(errors)
}

fn lookup<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn value_to_code(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Default)]
struct Validator {
    errors: Vec<ConfigError>,
}

impl Validator {
    fn missing(&mut self, key: &str) {
        self.errors.push(ConfigError::MissingKey(key.to_string()));
    }

    fn malformed(&mut self, key: &str, reason: impl Into<String>) {
        self.errors.push(ConfigError::Malformed {
            key: key.to_string(),
            reason: reason.into(),
        });
    }

    fn number_at(&mut self, map: &Mapping, key: &str, label: &str) -> Option<f64> {
        match lookup(map, key) {
            None => {
                self.missing(label);
                None
            }
            Some(value) => match value.as_f64() {
                Some(number) if number.is_finite() => Some(number),
                _ => {
                    self.malformed(label, "expected a number");
                    None
                }
            },
        }
    }

    fn integer_at(&mut self, map: &Mapping, key: &str, label: &str) -> Option<i64> {
        match lookup(map, key) {
            None => {
                self.missing(label);
                None
            }
            Some(value) => match value.as_i64() {
                Some(number) => Some(number),
                None => {
                    self.malformed(label, "expected an integer YYYYDDD date");
                    None
                }
            },
        }
    }

    fn positive(&mut self, map: &Mapping, key: &str) -> Option<f64> {
        let value = self.number_at(map, key, key)?;
        if value <= 0.0 {
            self.malformed(key, format!("must be positive, got {}", value));
            return None;
        }
        Some(value)
    }

    fn cutoff(&mut self, map: &Mapping) -> Option<f64> {
        let key = "coherence_cutoff";
        let value = self.number_at(map, key, key)?;
        if !(0.0..=1.0).contains(&value) {
            self.malformed(key, format!("must lie in [0, 1], got {}", value));
            return None;
        }
        Some(value)
    }

    fn optional_string(&mut self, map: &Mapping, key: &str, default: &str) -> String {
        match lookup(map, key) {
            None => default.to_string(),
            Some(value) => match value_to_code(value) {
                Some(text) if !text.is_empty() => text,
                _ => {
                    self.malformed(key, "expected a string");
                    default.to_string()
                }
            },
        }
    }

    fn waveform_path(&mut self, map: &Mapping, environment: &EnvironmentRefs) -> Option<PathBuf> {
        let key = "shaketable_ms_filename";
        let relative = match lookup(map, key) {
            None => {
                self.missing(key);
                return None;
            }
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => {
                self.malformed(key, "expected a path relative to the raw data root");
                return None;
            }
        };
        let raw_root = environment.raw_root()?;
        let path = raw_root.join(SHAKETABLE_SUBDIR).join(relative);
        if !path.is_file() {
            self.errors.push(ConfigError::WaveformNotFound(path));
            return None;
        }
        Some(path)
    }

    fn schedule(&mut self, map: &Mapping, key: &str) -> Option<SensitivitySchedule> {
        let entries = match lookup(map, key) {
            None => {
                self.missing(key);
                return None;
            }
            Some(Value::Sequence(entries)) if !entries.is_empty() => entries,
            Some(_) => {
                self.malformed(key, "must contain a non-empty list");
                return None;
            }
        };

        let mut parsed = Vec::with_capacity(entries.len());
        let mut complete = true;
        for (index, entry) in entries.iter().enumerate() {
            let prefix = format!("{}[{}]", key, index);
            let Value::Mapping(fields) = entry else {
                self.malformed(&prefix, "expected startdate/enddate/meters_per_volt");
                complete = false;
                continue;
            };
            let start = self.integer_at(fields, "startdate", &format!("{}/startdate", prefix));
            let end = self.integer_at(fields, "enddate", &format!("{}/enddate", prefix));
            let meters =
                self.number_at(fields, "meters_per_volt", &format!("{}/meters_per_volt", prefix));
            match (start, end, meters) {
                (Some(start_day), Some(end_day), Some(meters_per_volt)) => {
                    parsed.push(SensitivityEntry {
                        start_day,
                        end_day,
                        meters_per_volt,
                    })
                }
                _ => complete = false,
            }
        }
        complete.then(|| SensitivitySchedule::new(parsed))
    }

    fn band(&mut self, map: &Mapping) -> Option<FrequencyBand> {
        let key = "plot_settings";
        let settings = match lookup(map, key) {
            None => {
                self.missing(key);
                return None;
            }
            Some(Value::Mapping(settings)) => settings,
            Some(_) => {
                self.malformed(key, "expected start_freq and end_freq");
                return None;
            }
        };
        let min = self.number_at(settings, "start_freq", "plot_settings/start_freq");
        let max = self.number_at(settings, "end_freq", "plot_settings/end_freq");
        let (min, max) = (min?, max?);
        if min < 0.0 || min > max {
            self.malformed(
                key,
                format!("start_freq {} must be non-negative and not above end_freq {}", min, max),
            );
            return None;
        }
        Some(FrequencyBand { min, max })
    }

    fn components(&mut self, map: &Mapping) -> Option<Vec<ChannelSpec>> {
        let key = "components";
        let entries = match lookup(map, key) {
            None => {
                self.missing(key);
                return None;
            }
            Some(Value::Sequence(entries)) if !entries.is_empty() => entries,
            Some(_) => {
                self.malformed(key, "must contain a non-empty list");
                return None;
            }
        };

        let mut specs = Vec::with_capacity(entries.len());
        let mut complete = true;
        for (index, entry) in entries.iter().enumerate() {
            let prefix = format!("{}[{}]", key, index);
            let Value::Mapping(fields) = entry else {
                self.malformed(&prefix, "expected chan/ref_chan/starttime/endtime");
                complete = false;
                continue;
            };
            match self.component(fields, &prefix) {
                Some(spec) => specs.push(spec),
                None => complete = false,
            }
        }
        complete.then_some(specs)
    }

    fn component(&mut self, fields: &Mapping, prefix: &str) -> Option<ChannelSpec> {
        let device = self.channel_code(fields, "chan", prefix);
        let reference = self.channel_code(fields, "ref_chan", prefix);
        let start = self.timestamp(fields, "starttime", prefix);
        let end = self.timestamp(fields, "endtime", prefix);
        let device_location = self.location(fields, "loc", prefix);
        let reference_location = self.location(fields, "ref_loc", prefix);

        let (device_channel, reference_channel, start_time, end_time) =
            (device?, reference?, start?, end?);
        if start_time >= end_time {
            self.malformed(prefix, "starttime must precede endtime");
            return None;
        }
        Some(ChannelSpec {
            device_channel,
            reference_channel,
            device_location,
            reference_location,
            start_time,
            end_time,
        })
    }

    fn channel_code(&mut self, fields: &Mapping, key: &str, prefix: &str) -> Option<String> {
        let label = format!("{}/{}", prefix, key);
        let Some(value) = lookup(fields, key) else {
            self.missing(&label);
            return None;
        };
        let Some(code) = value_to_code(value).map(|code| code.to_ascii_uppercase()) else {
            self.malformed(&label, "expected a channel code");
            return None;
        };
        if let Err(err) = CanonicalChannel::normalize(&code) {
            self.malformed(&label, err.to_string());
            return None;
        }
        Some(code)
    }

    fn timestamp(&mut self, fields: &Mapping, key: &str, prefix: &str) -> Option<DateTime<Utc>> {
        let label = format!("{}/{}", prefix, key);
        let Some(value) = lookup(fields, key) else {
            self.missing(&label);
            return None;
        };
        match value.as_str().and_then(parse_timestamp) {
            Some(time) => Some(time),
            None => {
                self.malformed(&label, format!("unparseable timestamp {:?}", value));
                None
            }
        }
    }

    fn location(&mut self, fields: &Mapping, key: &str, prefix: &str) -> Option<String> {
        let value = lookup(fields, key)?;
        match value_to_code(value) {
            Some(code) => Some(format!("{:0>2}", code)),
            None => {
                self.malformed(&format!("{}/{}", prefix, key), "expected a location code");
                None
            }
        }
    }
}
