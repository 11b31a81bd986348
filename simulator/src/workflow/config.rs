use shakecore::config::EnvironmentRefs;
use shakecore::matching::FailureMode;
use std::path::PathBuf;

/// Everything one driver invocation needs besides the calibration document itself.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub config_path: PathBuf,
    pub mode: FailureMode,
    pub dump_spectra: Option<PathBuf>,
    pub environment: EnvironmentRefs,
}

impl WorkflowConfig {
    pub fn from_args(config_path: PathBuf, strict: bool, dump_spectra: Option<PathBuf>) -> Self {
        Self {
            config_path,
            mode: if strict {
                FailureMode::Strict
            } else {
                FailureMode::Isolated
            },
            dump_spectra,
            environment: EnvironmentRefs::from_env(),
        }
    }

    #[cfg(test)]
    pub fn with_environment(mut self, environment: EnvironmentRefs) -> Self {
        self.environment = environment;
        self
    }
}
