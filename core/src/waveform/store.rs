use super::collection::TraceCollection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("waveform archive {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed waveform archive {path}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Container-format boundary for reading and writing trace collections.
pub trait WaveformStore {
    fn read(&self, path: &Path) -> Result<TraceCollection, ArchiveError>;
    fn write(&self, path: &Path, traces: &TraceCollection) -> Result<(), ArchiveError>;
}

#[derive(Serialize, Deserialize)]
struct ArchiveDocument {
    format: String,
    #[serde(flatten)]
    collection: TraceCollection,
}

const ARCHIVE_FORMAT: &str = "shakecore-traces/1";

/// Waveform archive stored as a JSON document.
///
/// Location codes are left-padded with `0` to two characters on read so
/// archives written by different acquisition tools compare equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArchive;

impl JsonArchive {
    pub fn new() -> Self {
        Self
    }
}

impl WaveformStore for JsonArchive {
    fn read(&self, path: &Path) -> Result<TraceCollection, ArchiveError> {
        let contents = fs::read_to_string(path).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: ArchiveDocument =
            serde_json::from_str(&contents).map_err(|source| ArchiveError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(document
            .collection
            .iter()
            .map(|trace| trace.with_location(&format!("{:0>2}", trace.location())))
            .collect::<Vec<_>>()
            .into())
    }

    fn write(&self, path: &Path, traces: &TraceCollection) -> Result<(), ArchiveError> {
        let document = ArchiveDocument {
            format: ARCHIVE_FORMAT.to_string(),
            collection: traces.clone(),
        };
        let json = serde_json::to_string(&document).map_err(|source| ArchiveError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
