//! Per-channel statistics and the fixed-format results report.

pub mod writer;

use crate::math::stats::StatsHelper;
use crate::processing::GatedResult;
use serde::{Deserialize, Serialize};

pub use writer::{
    format_time, ChannelWindow, ReportHeader, ReportRow, ReportWriter, RowParseError, RULE_WIDTH,
};

/// Population statistics of the gated transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub gain_mean: f64,
    pub gain_std: f64,
    /// Degrees, after detrending.
    pub phase_mean: f64,
    pub phase_std: f64,
    pub bins: usize,
}

pub fn aggregate(result: &GatedResult) -> ChannelStatistics {
    let gated = &result.gated;
    let (gain_mean, gain_std) =
        StatsHelper::mean_std(gated.amplitude().view()).unwrap_or((f64::NAN, f64::NAN));
    let (phase_mean, phase_std) =
        StatsHelper::mean_std(gated.phase().view()).unwrap_or((f64::NAN, f64::NAN));
    ChannelStatistics {
        gain_mean,
        gain_std,
        phase_mean,
        phase_std,
        bins: gated.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::SpectralResult;
    use ndarray::array;

    #[test]
    fn aggregate_uses_population_statistics() {
        let gated = SpectralResult::new(
            array![1.0, 2.0],
            array![0.9, 1.1],
            array![-1.0, 1.0],
            array![0.99, 0.99],
            array![1.0, 1.0],
            array![1.0, 1.0],
        )
        .unwrap();
        let result = GatedResult {
            band_limited: gated.clone(),
            gated,
            phase_slope: 0.0,
            discarded_intercept: 0.0,
        };
        let stats = aggregate(&result);
        assert!((stats.gain_mean - 1.0).abs() < 1e-12);
        assert!((stats.gain_std - 0.1).abs() < 1e-12);
        assert_eq!(stats.phase_mean, 0.0);
        assert_eq!(stats.phase_std, 1.0);
        assert_eq!(stats.bins, 2);
    }
}
