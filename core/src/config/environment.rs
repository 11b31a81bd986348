use std::path::{Path, PathBuf};

pub const RAW_DIR_VAR: &str = "IDA_CAL_RAW_DIR";
pub const ANALYSIS_DIR_VAR: &str = "IDA_CAL_ANALYSIS_DIR";
pub const RESPONSE_DIR_VAR: &str = "SEEDRESP";

/// External directory references required by a calibration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentRefs {
    pub raw_root: Option<PathBuf>,
    pub analysis_root: Option<PathBuf>,
    pub response_root: Option<PathBuf>,
}

impl EnvironmentRefs {
    pub fn new(
        raw_root: impl Into<PathBuf>,
        analysis_root: impl Into<PathBuf>,
        response_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            raw_root: Some(raw_root.into()),
            analysis_root: Some(analysis_root.into()),
            response_root: Some(response_root.into()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the references from an arbitrary variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };
        Self {
            raw_root: resolve(RAW_DIR_VAR),
            analysis_root: resolve(ANALYSIS_DIR_VAR),
            response_root: resolve(RESPONSE_DIR_VAR),
        }
    }

    /// Names of the variables that are not set.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.raw_root.is_none() {
            missing.push(RAW_DIR_VAR);
        }
        if self.analysis_root.is_none() {
            missing.push(ANALYSIS_DIR_VAR);
        }
        if self.response_root.is_none() {
            missing.push(RESPONSE_DIR_VAR);
        }
        missing
    }

    pub fn raw_root(&self) -> Option<&Path> {
        self.raw_root.as_deref()
    }

    pub fn analysis_root(&self) -> Option<&Path> {
        self.analysis_root.as_deref()
    }

    pub fn response_root(&self) -> Option<&Path> {
        self.response_root.as_deref()
    }
}
