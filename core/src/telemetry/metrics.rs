/// Channel tallies for a single calibration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub analyzed: usize,
    /// Channels with no trace in the archive for their window.
    pub unmatched: usize,
    /// Matched channels whose analysis failed.
    pub rejected: usize,
    /// Gated bins summed over every analyzed channel.
    pub bins: usize,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_analyzed(&mut self, bins: usize) {
        self.analyzed += 1;
        self.bins += bins;
    }

    pub fn record_unmatched(&mut self) {
        self.unmatched += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn failed(&self) -> usize {
        self.unmatched + self.rejected
    }

    pub fn channels(&self) -> usize {
        self.analyzed + self.failed()
    }
}
