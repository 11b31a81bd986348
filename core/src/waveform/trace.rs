use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Slack when mapping window bounds onto sample instants, in samples.
const SAMPLE_TOLERANCE: f64 = 1e-6;

/// Evenly sampled time series identified by its SEED codes.
///
/// Traces are values: relabeling or trimming produces a new trace and never
/// touches the one it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformTrace {
    network: String,
    station: String,
    location: String,
    channel: String,
    start_time: DateTime<Utc>,
    sample_rate: f64,
    samples: Vec<f64>,
}

fn seconds_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    (to.timestamp_micros() - from.timestamp_micros()) as f64 / 1e6
}

impl WaveformTrace {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
        start_time: DateTime<Utc>,
        sample_rate: f64,
        samples: Vec<f64>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
            start_time,
            sample_rate,
            samples,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `NET.STA.LOC.CHAN`
    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Instant of sample `index`.
    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        if self.sample_rate <= 0.0 {
            return self.start_time;
        }
        let micros = (index as f64 / self.sample_rate * 1e6).round() as i64;
        self.start_time + Duration::microseconds(micros)
    }

    /// Instant of the last sample.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.time_at(self.len().saturating_sub(1))
    }

    pub fn with_identity(&self, network: &str, station: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            ..self.clone()
        }
    }

    pub fn with_channel(&self, channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            ..self.clone()
        }
    }

    pub fn with_location(&self, location: &str) -> Self {
        Self {
            location: location.to_string(),
            ..self.clone()
        }
    }

    /// Samples whose instants fall inside `[start, end]`, or `None` when no sample does.
    pub fn trimmed(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Option<Self> {
        if self.is_empty() || self.sample_rate <= 0.0 || end < start {
            return None;
        }
        let first = (seconds_between(&self.start_time, start) * self.sample_rate
            - SAMPLE_TOLERANCE)
            .ceil()
            .max(0.0);
        let last = (seconds_between(&self.start_time, end) * self.sample_rate + SAMPLE_TOLERANCE)
            .floor()
            .min((self.len() - 1) as f64);
        if last < 0.0 || first > last {
            return None;
        }
        let (first, last) = (first as usize, last as usize);
        Some(Self {
            start_time: self.time_at(first),
            samples: self.samples[first..=last].to_vec(),
            ..self.clone()
        })
    }
}
