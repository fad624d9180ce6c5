use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use converge_api::{DesiredConfig, ObservedState};

/// What the engine remembers about one resource between reconciliations:
/// the configuration it last applied (the diff baseline) and the remote
/// state it last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_applied: DesiredConfig,
    pub observed: Option<ObservedState>,
}

impl Snapshot {
    pub fn new(last_applied: DesiredConfig, observed: Option<ObservedState>) -> Self {
        Self {
            last_applied,
            observed,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access snapshot {name:?}")]
    Io {
        name: String,
        #[source]
        error: io::Error,
    },

    #[error("snapshot {name:?} is not valid JSON")]
    Corrupt {
        name: String,
        #[source]
        error: serde_json::Error,
    },
}

/// File-backed snapshot store, one JSON document per resource name.
///
/// A missing file reads as `None`; a file that fails to parse is surfaced as
/// [`StoreError::Corrupt`] rather than silently dropped.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub async fn read_snapshot(&self, name: &str) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match fs::read(self.path(name)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(StoreError::Io {
                    name: name.to_owned(),
                    error,
                });
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| StoreError::Corrupt {
                name: name.to_owned(),
                error,
            })
    }

    pub async fn write_snapshot(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let io_error = |error| StoreError::Io {
            name: name.to_owned(),
            error,
        };

        fs::create_dir_all(&self.dir).await.map_err(io_error)?;

        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|error| StoreError::Corrupt {
            name: name.to_owned(),
            error,
        })?;

        debug!(name, "persisting snapshot");
        fs::write(self.path(name), bytes).await.map_err(io_error)
    }

    /// Forget a resource, e.g. after a successful delete. Removing a
    /// snapshot that does not exist is not an error.
    pub async fn remove_snapshot(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::Io {
                name: name.to_owned(),
                error,
            }),
        }
    }
}
