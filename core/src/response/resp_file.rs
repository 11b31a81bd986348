//! SEED RESP text files.
//!
//! Only the analog part of a channel response is read: every blockette 053
//! poles-and-zeros stage plus the overall sensitivity from blockette 058.
//! Digital FIR stages are ignored, which is adequate inside the passband
//! used for shake-table work.

use super::{FrequencyResponse, ResponseError, ResponseEvaluator, ResponseRequest, ResponseUnits};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// Laplace variable convention of a blockette 053 stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// `s = i·2πf`
    RadiansPerSecond,
    /// `s = i·f`
    Hertz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoleZeroStage {
    pub kind: TransferKind,
    pub input_units: Option<ResponseUnits>,
    pub a0: f64,
    pub zeros: Vec<Complex64>,
    pub poles: Vec<Complex64>,
}

impl PoleZeroStage {
    pub fn evaluate(&self, frequency: f64) -> Complex64 {
        let s = match self.kind {
            TransferKind::RadiansPerSecond => Complex64::new(0.0, 2.0 * PI * frequency),
            TransferKind::Hertz => Complex64::new(0.0, frequency),
        };
        let numerator: Complex64 = self.zeros.iter().map(|z| s - z).product();
        let denominator: Complex64 = self.poles.iter().map(|p| s - p).product();
        if denominator.norm() == 0.0 {
            return Complex64::new(0.0, 0.0);
        }
        numerator / denominator * self.a0
    }
}

/// Analog response of one channel epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResponse {
    pub stages: Vec<PoleZeroStage>,
    pub sensitivity: f64,
    pub input_units: ResponseUnits,
}

impl ChannelResponse {
    /// Response at `frequencies`, re-expressed against `units`.
    pub fn evaluate(&self, frequencies: &[f64], units: ResponseUnits) -> Vec<Complex64> {
        let order = self.input_units.derivative_order() - units.derivative_order();
        frequencies
            .iter()
            .map(|&f| {
                let analog: Complex64 = self
                    .stages
                    .iter()
                    .map(|stage| stage.evaluate(f))
                    .product::<Complex64>()
                    * self.sensitivity;
                let iw = Complex64::new(0.0, 2.0 * PI * f);
                if order < 0 && f == 0.0 {
                    Complex64::new(0.0, 0.0)
                } else {
                    analog * iw.powi(order)
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Epoch {
    network: Option<String>,
    station: Option<String>,
    location: Option<String>,
    channel: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    stages: Vec<PoleZeroStage>,
    gains: Vec<(u32, f64)>,
    current_gain_stage: u32,
}

impl Epoch {
    fn covers(&self, time: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| start <= *time) && self.end.map_or(true, |end| *time < end)
    }

    fn matches(&self, field: &Option<String>, wanted: &str) -> bool {
        field
            .as_deref()
            .map_or(true, |value| value == wanted || value.chars().all(|c| c == '?'))
    }
}

/// Parsed RESP document, possibly holding several channel epochs.
#[derive(Debug, Clone, Default)]
pub struct RespDocument {
    epochs: Vec<Epoch>,
}

fn field_value(rest: &str) -> &str {
    rest.split_once(':').map_or(rest, |(_, value)| value).trim()
}

fn parse_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// `YYYY,DDD[,HH:MM:SS[.ffff]]`, or `None` for open-ended epochs.
fn parse_resp_time(text: &str) -> Result<Option<DateTime<Utc>>, String> {
    let text = text.trim();
    if text.is_empty() || text.to_ascii_lowercase().starts_with("no ending") {
        return Ok(None);
    }
    let mut parts = text.split(',');
    let year: i32 = parts
        .next()
        .and_then(|y| y.trim().parse().ok())
        .ok_or_else(|| format!("bad year in {:?}", text))?;
    let day: u32 = parts
        .next()
        .and_then(|d| d.trim().parse().ok())
        .ok_or_else(|| format!("bad day of year in {:?}", text))?;
    let date = NaiveDate::from_yo_opt(year, day).ok_or_else(|| format!("bad date {:?}", text))?;
    let time = match parts.next() {
        Some(clock) => NaiveTime::parse_from_str(clock.trim(), "%H:%M:%S%.f")
            .map_err(|err| format!("bad time in {:?}: {}", text, err))?,
        None => NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(|| "bad midnight".to_string())?,
    };
    Ok(Some(date.and_time(time).and_utc()))
}

fn parse_complex_row(rest: &str) -> Result<Complex64, String> {
    let fields: Vec<f64> = rest
        .split_whitespace()
        .skip(1)
        .take(2)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|err| format!("bad pole/zero value: {}", err))?;
    match fields.as_slice() {
        [re, im] => Ok(Complex64::new(*re, *im)),
        _ => Err("pole/zero row needs index, real and imaginary parts".into()),
    }
}

impl RespDocument {
    pub fn parse(text: &str) -> Result<Self, (usize, String)> {
        let mut document = RespDocument::default();
        let mut current = Epoch::default();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, rest)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let fail = |reason: String| (line_no, reason);

            match key {
                "B050F03" => {
                    if current.channel.is_some() {
                        document.epochs.push(std::mem::take(&mut current));
                    }
                    current.station = Some(field_value(rest).to_string());
                }
                "B050F16" => current.network = Some(field_value(rest).to_string()),
                "B052F03" => current.location = Some(field_value(rest).to_string()),
                "B052F04" => {
                    if current.channel.is_some() {
                        let next = Epoch {
                            network: current.network.clone(),
                            station: current.station.clone(),
                            ..Default::default()
                        };
                        document.epochs.push(std::mem::replace(&mut current, next));
                    }
                    current.channel = Some(field_value(rest).to_string());
                }
                "B052F22" => current.start = parse_resp_time(field_value(rest)).map_err(fail)?,
                "B052F23" => current.end = parse_resp_time(field_value(rest)).map_err(fail)?,
                "B053F03" => {
                    let kind = match field_value(rest).chars().next() {
                        Some('A') => TransferKind::RadiansPerSecond,
                        Some('B') => TransferKind::Hertz,
                        other => {
                            return Err(fail(format!("unsupported transfer function type {:?}", other)))
                        }
                    };
                    current.stages.push(PoleZeroStage {
                        kind,
                        input_units: None,
                        a0: 1.0,
                        zeros: Vec::new(),
                        poles: Vec::new(),
                    });
                }
                "B053F05" | "B053F07" | "B053F10-13" | "B053F15-18" => {
                    let Some(stage) = current.stages.last_mut() else {
                        return Err(fail(format!("{} outside a blockette 053 stage", key)));
                    };
                    match key {
                        "B053F05" => {
                            let units = field_value(rest)
                                .split_whitespace()
                                .next()
                                .unwrap_or_default();
                            stage.input_units = ResponseUnits::from_seed_units(units).ok();
                        }
                        "B053F07" => {
                            stage.a0 = parse_number(field_value(rest))
                                .ok_or_else(|| fail("bad A0 normalization factor".into()))?;
                        }
                        "B053F10-13" => stage.zeros.push(parse_complex_row(rest).map_err(fail)?),
                        _ => stage.poles.push(parse_complex_row(rest).map_err(fail)?),
                    }
                }
                "B058F03" => {
                    current.current_gain_stage = parse_number(field_value(rest))
                        .map(|n| n as u32)
                        .ok_or_else(|| fail("bad stage sequence number".into()))?;
                }
                "B058F04" => {
                    let gain = parse_number(field_value(rest))
                        .ok_or_else(|| fail("bad sensitivity".into()))?;
                    current.gains.push((current.current_gain_stage, gain));
                }
                _ => {}
            }
        }

        if current.channel.is_some() || !current.stages.is_empty() {
            document.epochs.push(current);
        }
        Ok(document)
    }

    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    /// Analog response of the epoch covering `time` for the requested channel identity.
    pub fn channel_response(
        &self,
        request: &ResponseRequest<'_>,
    ) -> Result<ChannelResponse, ResponseError> {
        let epoch = self
            .epochs
            .iter()
            .find(|epoch| {
                epoch.covers(&request.start_time)
                    && epoch.matches(&epoch.network, request.network)
                    && epoch.matches(&epoch.station, request.station)
                    && epoch.matches(&epoch.location, request.location)
                    && epoch.matches(&epoch.channel, request.channel)
            })
            .ok_or_else(|| ResponseError::NoEpoch {
                path: request.path.to_path_buf(),
                channel: format!(
                    "{}.{}.{}.{}",
                    request.network, request.station, request.location, request.channel
                ),
                time: request.start_time,
            })?;

        let input_units = epoch
            .stages
            .first()
            .and_then(|stage| stage.input_units)
            .ok_or_else(|| ResponseError::Parse {
                path: request.path.to_path_buf(),
                line: 0,
                reason: "no blockette 053 stage with recognized input units".into(),
            })?;

        let overall = epoch.gains.iter().find(|(stage, _)| *stage == 0).map(|(_, g)| *g);
        let sensitivity = overall.unwrap_or_else(|| {
            epoch
                .gains
                .iter()
                .filter(|(stage, _)| *stage > 0)
                .map(|(_, gain)| *gain)
                .product()
        });

        Ok(ChannelResponse {
            stages: epoch.stages.clone(),
            sensitivity,
            input_units,
        })
    }
}

/// Evaluates responses from RESP files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespFileEvaluator;

impl RespFileEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn load(path: &Path) -> Result<RespDocument, ResponseError> {
        let text = fs::read_to_string(path).map_err(|source| ResponseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        RespDocument::parse(&text).map_err(|(line, reason)| ResponseError::Parse {
            path: path.to_path_buf(),
            line,
            reason,
        })
    }
}

impl ResponseEvaluator for RespFileEvaluator {
    fn evaluate(&self, request: &ResponseRequest<'_>) -> Result<FrequencyResponse, ResponseError> {
        request.validate()?;
        let document = Self::load(request.path)?;
        let response = document.channel_response(request)?;
        let frequencies = request.frequencies();
        let values = response.evaluate(&frequencies, request.units);
        Ok(FrequencyResponse {
            values,
            frequencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RESP: &str = "\
#
B050F03     Station:     NA
B050F16     Network:     UNK
B052F03     Location:    10
B052F04     Channel:     BHZ
B052F22     Start date:  2019,001,00:00:00.0000
B052F23     End date:    2021,001,00:00:00.0000
B053F03     Transfer function type:                A [Laplace Transform (Rad/sec)]
B053F04     Stage sequence number:                 1
B053F05     Response in units lookup:              M/S - Velocity in Meters Per Second
B053F06     Response out units lookup:             V - Volts
B053F07     A0 normalization factor:               +1.00000E+00
B053F08     Normalization frequency:               +1.00000E+00
B053F09     Number of zeroes:                      0
B053F14     Number of poles:                       1
#              Complex poles:
#              i  real          imag          real_error    imag_error
B053F15-18     0  -1.00000E+00  +0.00000E+00  +0.00000E+00  +0.00000E+00
B058F03     Stage sequence number:                 0
B058F04     Sensitivity:                           +2.00000E+00
B058F05     Frequency of sensitivity:              +1.00000E+00 HZ
#
B050F03     Station:     NA
B050F16     Network:     UNK
B052F03     Location:    10
B052F04     Channel:     BHZ
B052F22     Start date:  2021,001,00:00:00.0000
B052F23     End date:    No Ending Time
B053F03     Transfer function type:                A [Laplace Transform (Rad/sec)]
B053F05     Response in units lookup:              M - Displacement in Meters
B053F07     A0 normalization factor:               +1.00000E+00
B058F03     Stage sequence number:                 0
B058F04     Sensitivity:                           +5.00000E+00
";

    fn request(path: &Path, year: i32, samples: usize) -> ResponseRequest<'_> {
        ResponseRequest {
            delta_t: 1.0 / (2.0 * PI),
            num_samples: samples,
            path,
            start_time: Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
            network: "UNK",
            station: "NA",
            location: "10",
            channel: "BHZ",
            units: ResponseUnits::Displacement,
        }
    }

    #[test]
    fn parses_epochs_and_stages() {
        let document = RespDocument::parse(RESP).unwrap();
        assert_eq!(document.epoch_count(), 2);
        let path = Path::new("RESP.UNK.NA.10.BHZ");
        let response = document.channel_response(&request(path, 2020, 4)).unwrap();
        assert_eq!(response.sensitivity, 2.0);
        assert_eq!(response.input_units, ResponseUnits::Velocity);
        assert_eq!(response.stages[0].poles, vec![Complex64::new(-1.0, 0.0)]);
    }

    #[test]
    fn velocity_response_gains_a_derivative_for_displacement() {
        let document = RespDocument::parse(RESP).unwrap();
        let path = Path::new("RESP.UNK.NA.10.BHZ");
        let req = request(path, 2020, 4);
        let response = document.channel_response(&req).unwrap();
        // f = 1/(2π) Hz gives s = i, so H = 2 / (i + 1) and the derivative adds a factor i.
        let values = response.evaluate(&[1.0 / (2.0 * PI)], ResponseUnits::Displacement);
        let expected = Complex64::new(0.0, 1.0) * 2.0 / Complex64::new(1.0, 1.0);
        assert!((values[0] - expected).norm() < 1e-12);
        let at_dc = response.evaluate(&[0.0], ResponseUnits::Displacement);
        assert_eq!(at_dc[0], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn later_epoch_is_selected_by_time() {
        let document = RespDocument::parse(RESP).unwrap();
        let path = Path::new("RESP.UNK.NA.10.BHZ");
        let response = document.channel_response(&request(path, 2022, 4)).unwrap();
        assert_eq!(response.sensitivity, 5.0);
        let values = response.evaluate(&[0.0, 3.0], ResponseUnits::Displacement);
        assert_eq!(values, vec![Complex64::new(5.0, 0.0); 2]);
    }

    #[test]
    fn uncovered_time_is_an_error() {
        let document = RespDocument::parse(RESP).unwrap();
        let path = Path::new("RESP.UNK.NA.10.BHZ");
        assert!(matches!(
            document.channel_response(&request(path, 2010, 4)),
            Err(ResponseError::NoEpoch { .. })
        ));
    }

    #[test]
    fn evaluator_reads_file_on_fft_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RESP.UNK.NA.10.BHZ");
        fs::write(&path, RESP).unwrap();
        let response = RespFileEvaluator.evaluate(&request(&path, 2022, 8)).unwrap();
        assert_eq!(response.values.len(), 5);
        assert_eq!(response.frequencies.len(), 5);

        let missing = dir.path().join("RESP.UNK.NA.00.BHZ");
        assert!(matches!(
            RespFileEvaluator.evaluate(&request(&missing, 2022, 8)),
            Err(ResponseError::Io { .. })
        ));
    }

    #[test]
    fn malformed_pole_row_reports_line() {
        let text = "B053F03     Transfer function type:  A\nB053F15-18  0  abc  0.0  0 0\n";
        let err = RespDocument::parse(text).unwrap_err();
        assert_eq!(err.0, 2);
    }
}
