use crate::workflow::config::WorkflowConfig;
use crate::workflow::spectra::dump_spectra;
use anyhow::Context;
use shakecore::pipeline::{CalibrationPipeline, CalibrationRun};
use shakecore::processing::WelchEstimator;
use shakecore::telemetry::LogManager;
use shakecore::{CalibrationConfig, JsonArchive, RespFileEvaluator};

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> anyhow::Result<CalibrationRun> {
        let logger = LogManager::new("shakecal");
        let path = &self.config.config_path;
        let calibration = CalibrationConfig::load(path, &self.config.environment, &logger)
            .with_context(|| format!("loading calibration config {}", path.display()))?;

        let store = JsonArchive::new();
        let evaluator = RespFileEvaluator::new();
        let estimator = WelchEstimator::new(logger.scoped("welch"));
        let run = CalibrationPipeline::new(
            &calibration,
            &store,
            &evaluator,
            &estimator,
            self.config.mode,
            logger,
        )
        .run()
        .with_context(|| format!("running calibration for dataset {}", calibration.dataset()))?;

        if let Some(directory) = &self.config.dump_spectra {
            let written = dump_spectra(directory, &run)?;
            log::info!("wrote {} spectra file(s) to {}", written.len(), directory.display());
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_session, SessionProfile};
    use shakecore::report::ReportRow;
    use std::fs;

    fn session(profile: &SessionProfile) -> (tempfile::TempDir, WorkflowConfig) {
        let dir = tempfile::tempdir().unwrap();
        let layout = build_session(dir.path(), profile).unwrap();
        let cfg = WorkflowConfig::from_args(
            layout.config_path.clone(),
            true,
            Some(dir.path().join("spectra")),
        )
        .with_environment(layout.environment());
        (dir, cfg)
    }

    #[test]
    fn runner_recovers_synthetic_gain() {
        let profile = SessionProfile {
            duration_secs: 200.0,
            gain: 0.8,
            noise: 0.01,
            seed: 11,
            ..Default::default()
        };
        let (dir, cfg) = session(&profile);
        let run = Runner::new(cfg).execute().unwrap();

        assert_eq!((run.metrics.analyzed, run.metrics.failed()), (3, 0));
        let text = fs::read_to_string(&run.report_path).unwrap();
        let rows: Vec<ReportRow> = text
            .lines()
            .filter_map(|line| ReportRow::parse(line).ok())
            .collect();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert!((row.gain_mean - 0.8).abs() < 0.02, "{:?}", row);
            assert!(row.phase_mean.abs() < 1.0, "{:?}", row);
        }

        let spectra = dir.path().join("spectra");
        for kind in ["psd", "tf", "tf_gated"] {
            assert!(spectra.join(format!("BH1_synthetic01_{}.json", kind)).exists());
        }
        let gated: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(spectra.join("BHZ_synthetic01_tf_gated.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(gated["kind"], "tf_gated");
        assert!(gated.get("psd_device").is_none());
    }

    #[test]
    fn runner_reports_missing_response_files() {
        let profile = SessionProfile {
            duration_secs: 20.0,
            ..Default::default()
        };
        let (dir, cfg) = session(&profile);
        fs::remove_file(dir.path().join("resp").join("RESP.UNK.NA.10.BHZ")).unwrap();
        let err = Runner::new(cfg).execute().unwrap_err();
        assert!(format!("{:#}", err).contains("RESP.UNK.NA.10.BHZ"));
    }
}
