//! Health status file.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::HealthStatus;

use super::JsonFile;

/// Writes the health snapshot for external inspection.
#[derive(Debug, Clone)]
pub struct HealthStore {
    file: JsonFile,
}

impl HealthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn write(&self, status: &HealthStatus) -> Result<()> {
        self.file.write_json(status).await
    }

    /// Best-effort write; failures are logged and swallowed.
    pub async fn publish(&self, status: &HealthStatus) {
        if let Err(e) = self.write(status).await {
            log::warn!(
                "Could not save health status to {}: {}",
                self.file.path().display(),
                e
            );
        }
    }

    /// Read the last published snapshot. Used by the inspection commands only.
    pub async fn read(&self) -> Result<Option<HealthStatus>> {
        self.file.read_json().await
    }
}
