//! Channel alias table.
//!
//! Archives from mixed acquisition systems label the same physical component
//! with different SEED codes; every code in the table collapses to one of the
//! three canonical designators used for matching and reporting.

use serde::{Deserialize, Serialize};

const VERTICAL_ALIASES: [&str; 4] = ["UN1", "BHZ", "HHZ", "HNZ"];
const HORIZONTAL_1_ALIASES: [&str; 6] = ["UN2", "BHN", "HHN", "HHY", "HNY", "BH1"];
const HORIZONTAL_2_ALIASES: [&str; 6] = ["UN3", "BHE", "HHE", "HHX", "HNX", "BH2"];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown channel code `{0}`")]
pub struct UnknownChannel(pub String);

/// Shake-table axis whose sensitivity schedule applies to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorAxis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalChannel {
    Vertical,
    Horizontal1,
    Horizontal2,
}

impl CanonicalChannel {
    pub const ALL: [CanonicalChannel; 3] = [
        CanonicalChannel::Vertical,
        CanonicalChannel::Horizontal1,
        CanonicalChannel::Horizontal2,
    ];

    /// Collapses `code` (case-insensitive) through the alias table.
    pub fn normalize(code: &str) -> Result<Self, UnknownChannel> {
        let upper = code.trim().to_ascii_uppercase();
        if VERTICAL_ALIASES.contains(&upper.as_str()) {
            Ok(Self::Vertical)
        } else if HORIZONTAL_1_ALIASES.contains(&upper.as_str()) {
            Ok(Self::Horizontal1)
        } else if HORIZONTAL_2_ALIASES.contains(&upper.as_str()) {
            Ok(Self::Horizontal2)
        } else {
            Err(UnknownChannel(code.to_string()))
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Vertical => "BHZ",
            Self::Horizontal1 => "BH1",
            Self::Horizontal2 => "BH2",
        }
    }

    pub fn axis(&self) -> SensorAxis {
        match self {
            Self::Vertical => SensorAxis::Vertical,
            Self::Horizontal1 | Self::Horizontal2 => SensorAxis::Horizontal,
        }
    }
}

impl std::fmt::Display for CanonicalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
