use super::trace::WaveformTrace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceCollection {
    traces: Vec<WaveformTrace>,
}

impl TraceCollection {
    pub fn new(traces: Vec<WaveformTrace>) -> Self {
        Self { traces }
    }

    pub fn traces(&self) -> &[WaveformTrace] {
        &self.traces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WaveformTrace> {
        self.traces.iter()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn first(&self) -> Option<&WaveformTrace> {
        self.traces.first()
    }

    pub fn push(&mut self, trace: WaveformTrace) {
        self.traces.push(trace);
    }

    /// Traces whose channel code equals `channel`, case-insensitively.
    pub fn select(&self, channel: &str) -> Self {
        self.select_where(|trace| trace.channel().eq_ignore_ascii_case(channel))
    }

    pub fn select_where<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&WaveformTrace) -> bool,
    {
        Self::new(
            self.traces
                .iter()
                .filter(|trace| keep(trace))
                .cloned()
                .collect(),
        )
    }

    /// Every trace trimmed to `[start, end]`; traces left without samples are dropped.
    pub fn trim(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Self::new(
            self.traces
                .iter()
                .filter_map(|trace| trace.trimmed(start, end))
                .collect(),
        )
    }
}

impl From<Vec<WaveformTrace>> for TraceCollection {
    fn from(traces: Vec<WaveformTrace>) -> Self {
        Self::new(traces)
    }
}

impl<'a> IntoIterator for &'a TraceCollection {
    type Item = &'a WaveformTrace;
    type IntoIter = std::slice::Iter<'a, WaveformTrace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn collection() -> TraceCollection {
        let start = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2020, 5, 1, 1, 0, 0).unwrap();
        TraceCollection::new(vec![
            WaveformTrace::new("II", "PFO", "00", "BHZ", start, 1.0, vec![0.0; 60]),
            WaveformTrace::new("II", "PFO", "10", "BHZ", later, 1.0, vec![0.0; 60]),
            WaveformTrace::new("II", "PFO", "00", "BH1", start, 1.0, vec![0.0; 60]),
        ])
    }

    #[test]
    fn select_matches_channel_code() {
        let picked = collection().select("bhz");
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|trace| trace.channel() == "BHZ"));
    }

    #[test]
    fn trim_drops_traces_without_coverage() {
        let start = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 10).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 20).unwrap();
        let trimmed = collection().select("BHZ").trim(&start, &end);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed.first().map(WaveformTrace::len), Some(11));
    }
}
