//! Instrument response evaluation.

pub mod resp_file;

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use std::path::{Path, PathBuf};

pub use resp_file::{ChannelResponse, PoleZeroStage, RespDocument, RespFileEvaluator, TransferKind};

#[derive(thiserror::Error, Debug)]
pub enum ResponseError {
    #[error("cannot read response file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed response file {path} (line {line}): {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("no response epoch in {path} covers {channel} at {time}")]
    NoEpoch {
        path: PathBuf,
        channel: String,
        time: DateTime<Utc>,
    },
    #[error("unsupported response units `{0}`")]
    UnsupportedUnits(String),
    #[error("invalid response request: {0}")]
    InvalidRequest(String),
}

/// Ground-motion quantity a response is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseUnits {
    Displacement,
    Velocity,
    Acceleration,
}

impl ResponseUnits {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Displacement => "DIS",
            Self::Velocity => "VEL",
            Self::Acceleration => "ACC",
        }
    }

    /// Number of time derivatives of displacement.
    pub fn derivative_order(&self) -> i32 {
        match self {
            Self::Displacement => 0,
            Self::Velocity => 1,
            Self::Acceleration => 2,
        }
    }

    /// Parses the SEED unit names `M`, `M/S` and `M/S**2`.
    pub fn from_seed_units(units: &str) -> Result<Self, ResponseError> {
        match units.trim().to_ascii_uppercase().as_str() {
            "M" | "NM" => Ok(Self::Displacement),
            "M/S" | "NM/S" => Ok(Self::Velocity),
            "M/S**2" | "M/S/S" | "M/S2" | "NM/S**2" => Ok(Self::Acceleration),
            other => Err(ResponseError::UnsupportedUnits(other.to_string())),
        }
    }
}

/// Parameters of one response evaluation, mirroring what a RESP evaluator needs.
#[derive(Debug, Clone)]
pub struct ResponseRequest<'a> {
    pub delta_t: f64,
    pub num_samples: usize,
    pub path: &'a Path,
    pub start_time: DateTime<Utc>,
    pub network: &'a str,
    pub station: &'a str,
    pub location: &'a str,
    pub channel: &'a str,
    pub units: ResponseUnits,
}

impl<'a> ResponseRequest<'a> {
    /// One-sided FFT frequencies `k / (n * dt)` for `k = 0..=n/2`.
    pub fn frequencies(&self) -> Vec<f64> {
        let span = self.num_samples as f64 * self.delta_t;
        (0..=self.num_samples / 2)
            .map(|k| k as f64 / span)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ResponseError> {
        if self.num_samples == 0 {
            return Err(ResponseError::InvalidRequest("no samples".into()));
        }
        if !(self.delta_t > 0.0) {
            return Err(ResponseError::InvalidRequest(format!(
                "sample spacing must be positive, got {}",
                self.delta_t
            )));
        }
        Ok(())
    }
}

/// Complex response sampled on the one-sided FFT grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyResponse {
    pub values: Vec<Complex64>,
    pub frequencies: Vec<f64>,
}

pub trait ResponseEvaluator {
    fn evaluate(&self, request: &ResponseRequest<'_>) -> Result<FrequencyResponse, ResponseError>;
}

/// `RESP.<NET>.<STA>.<LOC>.<CHAN>`
pub fn resp_file_name(network: &str, station: &str, location: &str, channel: &str) -> String {
    format!("RESP.{}.{}.{}.{}", network, station, location, channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn request_frequencies_follow_fft_grid() {
        let request = ResponseRequest {
            delta_t: 0.25,
            num_samples: 8,
            path: Path::new("RESP.II.PFO.00.BHZ"),
            start_time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            network: "II",
            station: "PFO",
            location: "00",
            channel: "BHZ",
            units: ResponseUnits::Displacement,
        };
        assert_eq!(request.frequencies(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn seed_units_map_to_derivative_order() {
        assert_eq!(
            ResponseUnits::from_seed_units("m/s").unwrap().derivative_order(),
            1
        );
        assert_eq!(
            ResponseUnits::from_seed_units("M/S**2").unwrap(),
            ResponseUnits::Acceleration
        );
        assert!(ResponseUnits::from_seed_units("COUNTS").is_err());
        assert_eq!(resp_file_name("UNK", "NA", "10", "BHZ"), "RESP.UNK.NA.10.BHZ");
    }
}
