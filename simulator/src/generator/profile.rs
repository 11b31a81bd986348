use crate::generator::template::{delayed, flat_resp, white_noise};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use shakecore::config::environment::{ANALYSIS_DIR_VAR, RAW_DIR_VAR, RESPONSE_DIR_VAR};
use shakecore::config::{EnvironmentRefs, SHAKETABLE_SUBDIR};
use shakecore::response::resp_file_name;
use shakecore::waveform::{JsonArchive, TraceCollection, WaveformStore, WaveformTrace};
use std::fs;
use std::path::{Path, PathBuf};

const WAVEFORM_FILE: &str = "table.json";
const DEVICE_LOCATION: &str = "00";
const REFERENCE_LOCATION: &str = "10";
const PAIRS: [(&str, &str); 3] = [("BHZ", "UN1"), ("BH1", "UN2"), ("BH2", "UN3")];

/// Parameters of a synthetic shake-table session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    pub dataset: String,
    pub network: String,
    pub station: String,
    pub start: DateTime<Utc>,
    pub sample_rate: f64,
    pub duration_secs: f64,
    /// Device gain relative to the compensated drive.
    pub gain: f64,
    pub delay_samples: usize,
    /// Additive device noise, relative to the drive amplitude.
    pub noise: f64,
    pub digitizer_counts_per_volt: f64,
    pub meters_per_volt: f64,
    pub coherence_cutoff: f64,
    pub smoothing_factor: f64,
    pub start_freq: f64,
    pub end_freq: f64,
    pub seed: u64,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            dataset: "synthetic01".into(),
            network: "XX".into(),
            station: "TBL".into(),
            start: Utc
                .with_ymd_and_hms(2020, 5, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            sample_rate: 100.0,
            duration_secs: 300.0,
            gain: 1.0,
            delay_samples: 1,
            noise: 0.0,
            digitizer_counts_per_volt: 419_430.0,
            meters_per_volt: 0.0125,
            coherence_cutoff: 0.98,
            smoothing_factor: 0.5,
            start_freq: 0.1,
            end_freq: 10.0,
            seed: 0,
        }
    }
}

impl SessionProfile {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading session profile {}", path_ref.display()))?;
        let profile: SessionProfile = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing session profile {}", path_ref.display()))?;
        Ok(profile)
    }

    fn sample_count(&self) -> usize {
        (self.duration_secs * self.sample_rate).round().max(0.0) as usize
    }
}

/// Directory layout of a synthesized session.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    pub raw_root: PathBuf,
    pub analysis_root: PathBuf,
    pub response_root: PathBuf,
    pub config_path: PathBuf,
}

impl SessionLayout {
    pub fn environment(&self) -> EnvironmentRefs {
        EnvironmentRefs::new(&self.raw_root, &self.analysis_root, &self.response_root)
    }

    /// Shell lines exporting the environment a run over this session needs.
    pub fn exports(&self) -> Vec<String> {
        [
            (RAW_DIR_VAR, &self.raw_root),
            (ANALYSIS_DIR_VAR, &self.analysis_root),
            (RESPONSE_DIR_VAR, &self.response_root),
        ]
        .iter()
        .map(|(name, path)| format!("export {}={}", name, path.display()))
        .collect()
    }
}

#[derive(Serialize)]
struct ScheduleDocument {
    startdate: i64,
    enddate: i64,
    meters_per_volt: f64,
}

#[derive(Serialize)]
struct PlotSettings {
    start_freq: f64,
    end_freq: f64,
}

#[derive(Serialize)]
struct ComponentDocument {
    chan: String,
    ref_chan: String,
    loc: String,
    ref_loc: String,
    starttime: String,
    endtime: String,
}

#[derive(Serialize)]
struct ConfigDocument {
    shaketable_ms_filename: String,
    analysis_sample_rate: f64,
    digi_cnts_per_volt: f64,
    shaketable_hori_resp: Vec<ScheduleDocument>,
    shaketable_vert_resp: Vec<ScheduleDocument>,
    plot_settings: PlotSettings,
    smoothing_factor: f64,
    coherence_cutoff: f64,
    components: Vec<ComponentDocument>,
    ref_sensor_network: String,
    ref_sensor_station: String,
}

fn build_traces(profile: &SessionProfile) -> Vec<WaveformTrace> {
    let samples = profile.sample_count();
    let scale = profile.meters_per_volt / profile.digitizer_counts_per_volt;
    let mut rng = StdRng::seed_from_u64(profile.seed);
    let mut traces = Vec::with_capacity(PAIRS.len() * 2);

    for (device, reference) in PAIRS {
        let drive = white_noise(&mut rng, samples, 1.0);
        let noise = white_noise(&mut rng, samples, profile.noise);
        let output: Vec<f64> = delayed(&drive, profile.delay_samples, profile.gain * scale)
            .into_iter()
            .zip(noise)
            .map(|(signal, n)| signal + n * scale)
            .collect();
        traces.push(WaveformTrace::new(
            &profile.network,
            &profile.station,
            DEVICE_LOCATION,
            device,
            profile.start,
            profile.sample_rate,
            output,
        ));
        traces.push(WaveformTrace::new(
            &profile.network,
            &profile.station,
            REFERENCE_LOCATION,
            reference,
            profile.start,
            profile.sample_rate,
            drive,
        ));
    }
    traces
}

fn build_config(profile: &SessionProfile) -> ConfigDocument {
    let start = profile.start + Duration::seconds(1);
    let end = profile.start + Duration::milliseconds((profile.duration_secs * 1000.0) as i64)
        - Duration::seconds(1);
    let year = profile.start.year() as i64;
    let schedule = || {
        vec![ScheduleDocument {
            startdate: year * 1000 + 1,
            enddate: year * 1000 + 366,
            meters_per_volt: profile.meters_per_volt,
        }]
    };

    ConfigDocument {
        shaketable_ms_filename: format!("{}/{}", profile.dataset, WAVEFORM_FILE),
        analysis_sample_rate: profile.sample_rate,
        digi_cnts_per_volt: profile.digitizer_counts_per_volt,
        shaketable_hori_resp: schedule(),
        shaketable_vert_resp: schedule(),
        plot_settings: PlotSettings {
            start_freq: profile.start_freq,
            end_freq: profile.end_freq,
        },
        smoothing_factor: profile.smoothing_factor,
        coherence_cutoff: profile.coherence_cutoff,
        components: PAIRS
            .iter()
            .map(|(device, reference)| ComponentDocument {
                chan: device.to_string(),
                ref_chan: reference.to_string(),
                loc: DEVICE_LOCATION.into(),
                ref_loc: REFERENCE_LOCATION.into(),
                starttime: start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                endtime: end.format("%Y-%m-%dT%H:%M:%S").to_string(),
            })
            .collect(),
        ref_sensor_network: "UNK".into(),
        ref_sensor_station: "NA".into(),
    }
}

/// Writes the waveform archive, flat RESP files and configuration for a
/// session under `root`.
pub fn build_session(root: &Path, profile: &SessionProfile) -> anyhow::Result<SessionLayout> {
    let layout = SessionLayout {
        raw_root: root.join("raw"),
        analysis_root: root.join("analysis"),
        response_root: root.join("resp"),
        config_path: root.join(format!("{}.yaml", profile.dataset)),
    };
    let data_dir = layout.raw_root.join(SHAKETABLE_SUBDIR).join(&profile.dataset);
    for dir in [&data_dir, &layout.analysis_root, &layout.response_root] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let traces = TraceCollection::new(build_traces(profile));
    JsonArchive::new()
        .write(&data_dir.join(WAVEFORM_FILE), &traces)
        .context("writing synthetic waveform archive")?;

    let config = build_config(profile);
    for (device, _) in PAIRS {
        let path = layout.response_root.join(resp_file_name(
            &config.ref_sensor_network,
            &config.ref_sensor_station,
            REFERENCE_LOCATION,
            device,
        ));
        let text = flat_resp(
            &config.ref_sensor_network,
            &config.ref_sensor_station,
            REFERENCE_LOCATION,
            device,
            profile.start.year() - 1,
        );
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    }

    let yaml = serde_yaml::to_string(&config).context("serializing session configuration")?;
    fs::write(&layout.config_path, yaml)
        .with_context(|| format!("writing {}", layout.config_path.display()))?;

    log::info!(
        "synthesized {} traces for dataset {} under {}",
        traces.len(),
        profile.dataset,
        root.display()
    );
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakecore::telemetry::LogManager;
    use shakecore::CalibrationConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn profile_load_fills_defaults() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"dataset: bench07\ngain: 0.5\nseed: 9\n").unwrap();
        let path = temp.into_temp_path();
        let profile = SessionProfile::load(&path).unwrap();
        assert_eq!(profile.dataset, "bench07");
        assert_eq!(profile.gain, 0.5);
        assert_eq!(profile.sample_rate, 100.0);
    }

    #[test]
    fn session_produces_loadable_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let profile = SessionProfile {
            duration_secs: 20.0,
            ..Default::default()
        };
        let layout = build_session(dir.path(), &profile).unwrap();

        let config = CalibrationConfig::load(
            &layout.config_path,
            &layout.environment(),
            &LogManager::new("test"),
        )
        .unwrap();
        assert_eq!(config.dataset(), "synthetic01");
        assert_eq!(config.channels().len(), 3);
        assert_eq!(config.channels()[0].device_location.as_deref(), Some("00"));

        let archive = JsonArchive::new().read(config.waveform_path()).unwrap();
        assert_eq!(archive.len(), 6);
        assert_eq!(archive.first().unwrap().len(), 2000);
        assert!(layout.response_root.join("RESP.UNK.NA.10.BH2").exists());
        assert!(layout.exports()[0].starts_with("export IDA_CAL_RAW_DIR="));
    }
}
