use crate::channel::CanonicalChannel;
use crate::config::{epoch_seconds, FrequencyBand};
use crate::report::ChannelStatistics;
use crate::telemetry::log::LogManager;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Width of the `#` delimiter lines around a report section.
pub const RULE_WIDTH: usize = 144;

const FIELD_COUNT: usize = 14;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowParseError {
    #[error("comment line is not a data row")]
    Comment,
    #[error("expected 14 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field}: `{value}`")]
    InvalidField { field: &'static str, value: String },
}

/// Analysis window actually covered by one channel's device trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelWindow {
    pub channel: CanonicalChannel,
    pub reference_channel: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Run parameters written once at the top of a report section.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportHeader {
    pub analyzed_on: DateTime<Utc>,
    pub dataset: String,
    pub digitizer_counts_per_volt: f64,
    pub sample_rate: f64,
    pub smoothing_factor: f64,
    pub coherence_cutoff: f64,
    pub windows: Vec<ChannelWindow>,
    pub horizontal_sensitivity: Option<f64>,
    pub vertical_sensitivity: Option<f64>,
    pub band: FrequencyBand,
}

impl ReportHeader {
    pub fn render(&self) -> String {
        let rule = "#".repeat(RULE_WIDTH);
        let mut lines = vec![
            rule,
            "# SHAKETABLE ANALYSIS PARAMETERS".to_string(),
            "# ==============================".to_string(),
            format!("#               analysis at: {}", self.analyzed_on.format("%Y-%m-%d %H:%M:%S")),
            format!("#                   dataset: {}", self.dataset),
            format!("#        digi cnts per volt: {}", self.digitizer_counts_per_volt),
            format!("#          sample rate (hz): {}", self.sample_rate),
            format!("#      coh smoothing factor: {}", self.smoothing_factor),
            format!("#                coh cutoff: {}", self.coherence_cutoff),
        ];
        for channel in CanonicalChannel::ALL {
            let window = self.windows.iter().find(|w| w.channel == channel);
            let code = channel.code();
            lines.push(format!(
                "#       chan {}   ref chan: {}",
                code,
                window.map_or("n/a", |w| w.reference_channel.as_str())
            ));
            lines.push(format!(
                "#       chan {} start time: {}",
                code,
                window.map_or_else(|| "n/a".to_string(), |w| format_time(&w.start))
            ));
            lines.push(format!(
                "#       chan {}   end time: {}",
                code,
                window.map_or_else(|| "n/a".to_string(), |w| format_time(&w.end))
            ));
        }
        lines.push(format!(
            "# shake tbl hori sens (m/V): {}",
            optional(self.horizontal_sensitivity)
        ));
        lines.push(format!(
            "# shake tbl vert sens (m/V): {}",
            optional(self.vertical_sensitivity)
        ));
        lines.push(format!("#  plot start freq (hz): {}", self.band.min));
        lines.push(format!("#  plot   end freq (hz): {}", self.band.max));
        lines.push("#".to_string());
        lines.push(format!(
            "#H {:<24} {:4} {:8} {:27} {:17} {:27} {:17} {:>10} {:>10} {:>9} {:>9} {:>7} {:>20} {}",
            "data_dir",
            "chan",
            "ref_chan",
            "start_time",
            "start_epoch",
            "end_time",
            "end_epoch",
            "ampmn",
            "ampstd",
            "phamn",
            "phastd",
            "coh_cut",
            "analyzedon",
            "ms_file"
        ));
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// `2020-05-01T00:00:00.000000Z`, always 27 characters.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// One fixed-width data row of the results report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub dataset: String,
    pub channel: String,
    pub reference_channel: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub gain_mean: f64,
    pub gain_std: f64,
    pub phase_mean: f64,
    pub phase_std: f64,
    pub coherence_cutoff: f64,
    pub analyzed_on: DateTime<Utc>,
    pub source_file: String,
}

impl ReportRow {
    pub fn from_statistics(
        dataset: &str,
        window: &ChannelWindow,
        statistics: &ChannelStatistics,
        coherence_cutoff: f64,
        analyzed_on: DateTime<Utc>,
        source_file: &str,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            channel: window.channel.code().to_string(),
            reference_channel: window.reference_channel.clone(),
            start_time: window.start,
            end_time: window.end,
            gain_mean: statistics.gain_mean,
            gain_std: statistics.gain_std,
            phase_mean: statistics.phase_mean,
            phase_std: statistics.phase_std,
            coherence_cutoff,
            analyzed_on,
            source_file: source_file.to_string(),
        }
    }

    /// Gain to six decimals, phase to four, epochs to the microsecond.
    pub fn render(&self) -> String {
        format!(
            "   {:<24} {:4} {:8} {:27} {:17.6} {:27} {:17.6} {:>10.6} {:>10.6} {:>9.4} {:>9.4} {:>7} {:>20} {}",
            self.dataset,
            self.channel,
            self.reference_channel,
            format_time(&self.start_time),
            epoch_seconds(&self.start_time),
            format_time(&self.end_time),
            epoch_seconds(&self.end_time),
            self.gain_mean,
            self.gain_std,
            self.phase_mean,
            self.phase_std,
            self.coherence_cutoff,
            self.analyzed_on.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.source_file
        )
    }

    /// Reads back a line produced by [`ReportRow::render`].
    ///
    /// Epoch columns are redundant with the timestamps and are only checked
    /// for being numeric.
    pub fn parse(line: &str) -> Result<Self, RowParseError> {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return Err(RowParseError::Comment);
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < FIELD_COUNT {
            return Err(RowParseError::FieldCount(fields.len()));
        }
        number("start_epoch", fields[4])?;
        number("end_epoch", fields[6])?;
        Ok(Self {
            dataset: fields[0].to_string(),
            channel: fields[1].to_string(),
            reference_channel: fields[2].to_string(),
            start_time: timestamp("start_time", fields[3])?,
            end_time: timestamp("end_time", fields[5])?,
            gain_mean: number("ampmn", fields[7])?,
            gain_std: number("ampstd", fields[8])?,
            phase_mean: number("phamn", fields[9])?,
            phase_std: number("phastd", fields[10])?,
            coherence_cutoff: number("coh_cut", fields[11])?,
            analyzed_on: timestamp("analyzedon", fields[12])?,
            source_file: fields[FIELD_COUNT - 1..].join(" "),
        })
    }
}

fn number(field: &'static str, value: &str) -> Result<f64, RowParseError> {
    value.parse().map_err(|_| RowParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, RowParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| RowParseError::InvalidField {
            field,
            value: value.to_string(),
        })
}

/// Appends report sections, reopening the file for every write so a run
/// interrupted midway leaves a complete prefix on disk.
pub struct ReportWriter {
    path: PathBuf,
    logger: LogManager,
}

impl ReportWriter {
    pub fn new(path: PathBuf, logger: LogManager) -> Self {
        Self { path, logger }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&self, header: &ReportHeader) -> io::Result<()> {
        self.append(&header.render())
    }

    pub fn append_row(&self, row: &ReportRow) -> io::Result<()> {
        self.logger.detail(&format!("row for {} -> {}", row.channel, self.path.display()));
        self.append(&format!("{}\n", row.render()))
    }

    pub fn append_failure(&self, channel: &str, reference_channel: &str, reason: &str) -> io::Result<()> {
        let reason = reason.replace('\n', " ");
        self.append(&format!("# FAILED {} {} {}\n", channel, reference_channel, reason))
    }

    pub fn write_footer(&self) -> io::Result<()> {
        self.append(&format!("{}\n", "#".repeat(RULE_WIDTH)))
    }

    fn append(&self, text: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(channel: CanonicalChannel) -> ChannelWindow {
        ChannelWindow {
            channel,
            reference_channel: "UN1".into(),
            start: Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 5, 1, 0, 10, 0).unwrap(),
        }
    }

    fn header() -> ReportHeader {
        ReportHeader {
            analyzed_on: Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap(),
            dataset: "run01".into(),
            digitizer_counts_per_volt: 419430.0,
            sample_rate: 40.0,
            smoothing_factor: 0.5,
            coherence_cutoff: 0.98,
            windows: vec![window(CanonicalChannel::Vertical)],
            horizontal_sensitivity: None,
            vertical_sensitivity: Some(0.02),
            band: FrequencyBand { min: 0.1, max: 10.0 },
        }
    }

    fn row() -> ReportRow {
        let stats = ChannelStatistics {
            gain_mean: 1.234_567_89,
            gain_std: 0.001_234_4,
            phase_mean: -0.123_456,
            phase_std: 0.543_21,
            bins: 42,
        };
        ReportRow::from_statistics(
            "run01",
            &window(CanonicalChannel::Vertical),
            &stats,
            0.98,
            Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap(),
            "table.json",
        )
    }

    #[test]
    fn timestamps_render_at_fixed_width() {
        let time = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(format_time(&time), "2020-05-01T00:00:00.000000Z");
        assert_eq!(format_time(&time).len(), 27);
    }

    #[test]
    fn header_lists_every_canonical_channel() {
        let text = header().render();
        assert!(text.starts_with(&"#".repeat(RULE_WIDTH)));
        assert!(text.contains("#                   dataset: run01"));
        assert!(text.contains("#       chan BHZ   ref chan: UN1"));
        assert!(text.contains("#       chan BHZ start time: 2020-05-01T00:00:00.000000Z"));
        assert!(text.contains("#       chan BH1   ref chan: n/a"));
        assert!(text.contains("# shake tbl hori sens (m/V): n/a"));
        assert!(text.contains("# shake tbl vert sens (m/V): 0.02"));
        assert!(text.lines().last().unwrap().starts_with("#H data_dir"));
    }

    #[test]
    fn row_round_trips_to_column_precision() {
        let original = row();
        let parsed = ReportRow::parse(&original.render()).unwrap();
        assert_eq!(parsed.dataset, "run01");
        assert_eq!(parsed.channel, "BHZ");
        assert_eq!(parsed.reference_channel, "UN1");
        assert_eq!(parsed.start_time, original.start_time);
        assert_eq!(parsed.end_time, original.end_time);
        assert!((parsed.gain_mean - original.gain_mean).abs() <= 5e-7);
        assert!((parsed.gain_std - original.gain_std).abs() <= 5e-7);
        assert!((parsed.phase_mean - original.phase_mean).abs() <= 5e-5);
        assert!((parsed.phase_std - original.phase_std).abs() <= 5e-5);
        assert_eq!(parsed.coherence_cutoff, 0.98);
        assert_eq!(parsed.analyzed_on, original.analyzed_on);
        assert_eq!(parsed.source_file, "table.json");
    }

    #[test]
    fn large_values_keep_columns_separated() {
        let mut wide = row();
        wide.gain_mean = 12345.678;
        wide.phase_mean = -179.9999;
        let parsed = ReportRow::parse(&wide.render()).unwrap();
        assert!((parsed.gain_mean - 12345.678).abs() < 1e-6);
        assert!((parsed.phase_mean + 179.9999).abs() < 1e-6);
    }

    #[test]
    fn parse_rejects_comments_and_short_lines() {
        assert_eq!(ReportRow::parse("# FAILED BH1 UN2 x"), Err(RowParseError::Comment));
        assert_eq!(ReportRow::parse("run01 BHZ"), Err(RowParseError::FieldCount(2)));
    }

    #[test]
    fn writer_appends_sections_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("run01_results.txt");
        let writer = ReportWriter::new(path.clone(), LogManager::new("test"));
        writer.write_header(&header()).unwrap();
        writer.append_row(&row()).unwrap();
        writer.append_failure("BH1", "UN2", "phase fit\nunderdetermined").unwrap();
        writer.write_footer().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.last().copied(), Some("#".repeat(RULE_WIDTH).as_str()));
        assert!(lines.contains(&"# FAILED BH1 UN2 phase fit underdetermined"));
        let rows: Vec<ReportRow> = lines
            .iter()
            .filter_map(|line| ReportRow::parse(line).ok())
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "BHZ");
    }
}
