use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d:%H:%M:%S%.f",
    "%Y-%m-%d-%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%jT%H:%M:%S%.f",
    "%Y-%j:%H:%M:%S%.f",
    "%Y-%j-%H:%M:%S%.f",
    "%Y-%j %H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y-%j"];

/// Parses the timestamp forms accepted in calibration configs, as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Epoch seconds with microsecond resolution.
pub fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_calendar_and_ordinal_forms() {
        let expected = Utc.with_ymd_and_hms(2021, 2, 3, 4, 5, 6).unwrap();
        for text in [
            "2021-02-03T04:05:06",
            "2021-02-03 04:05:06",
            "2021-02-03:04:05:06",
            "2021-034T04:05:06",
            "2021-034 04:05:06",
            "2021-02-03T04:05:06Z",
        ] {
            assert_eq!(parse_timestamp(text), Some(expected), "{}", text);
        }
    }

    #[test]
    fn parses_fractional_seconds_and_bare_dates() {
        let parsed = parse_timestamp("2021-02-03T04:05:06.250").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
        assert_eq!(
            parse_timestamp("2021-034"),
            Some(Utc.with_ymd_and_hms(2021, 2, 3, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn epoch_seconds_keeps_microseconds() {
        let time = parse_timestamp("1970-01-01T00:00:01.5").unwrap();
        assert_eq!(epoch_seconds(&time), 1.5);
    }
}
