use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Encodes a date as the integer `YYYYDDD` used by sensitivity schedules.
pub fn year_day(date: &DateTime<Utc>) -> i64 {
    i64::from(date.year()) * 1000 + i64::from(date.ordinal())
}

/// One calibrated period of the shake table, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub start_day: i64,
    pub end_day: i64,
    pub meters_per_volt: f64,
}

impl SensitivityEntry {
    pub fn covers(&self, day: i64) -> bool {
        self.start_day <= day && day <= self.end_day
    }
}

/// Ordered sensitivity periods for one table axis.
///
/// Entries may overlap or leave gaps; lookups take the first covering entry
/// and fall back to `0.0` when none covers the date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySchedule {
    entries: Vec<SensitivityEntry>,
}

impl SensitivitySchedule {
    pub fn new(entries: Vec<SensitivityEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SensitivityEntry] {
        &self.entries
    }

    pub fn lookup_day(&self, day: i64) -> f64 {
        self.entries
            .iter()
            .find(|entry| entry.covers(day))
            .map(|entry| entry.meters_per_volt)
            .unwrap_or(0.0)
    }

    pub fn lookup(&self, date: &DateTime<Utc>) -> f64 {
        self.lookup_day(year_day(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> SensitivitySchedule {
        SensitivitySchedule::new(vec![
            SensitivityEntry {
                start_day: 2020001,
                end_day: 2020180,
                meters_per_volt: 0.01,
            },
            SensitivityEntry {
                start_day: 2020150,
                end_day: 2020366,
                meters_per_volt: 0.02,
            },
        ])
    }

    #[test]
    fn year_day_encodes_ordinal() {
        let date = Utc.with_ymd_and_hms(2020, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(year_day(&date), 2020366);
    }

    #[test]
    fn lookup_is_piecewise_constant_with_inclusive_bounds() {
        let schedule = schedule();
        assert_eq!(schedule.lookup_day(2020001), 0.01);
        assert_eq!(schedule.lookup_day(2020100), 0.01);
        assert_eq!(schedule.lookup_day(2020366), 0.02);
    }

    #[test]
    fn overlapping_entries_resolve_to_first_match() {
        assert_eq!(schedule().lookup_day(2020160), 0.01);
    }

    #[test]
    fn unmatched_date_yields_zero() {
        assert_eq!(schedule().lookup_day(2019365), 0.0);
        assert_eq!(SensitivitySchedule::default().lookup_day(2020001), 0.0);
    }
}
