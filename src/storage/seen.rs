//! Durable seen-set store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{SeenSet, Timestamp};

use super::JsonFile;

/// On-disk layout of the seen-set file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenSetFile {
    pub seen_courses: SeenSet,
    #[serde(default)]
    pub last_updated: Option<Timestamp>,
    #[serde(default)]
    pub total_courses: usize,
}

/// Loads and saves the seen-set file.
#[derive(Debug, Clone)]
pub struct SeenStore {
    file: JsonFile,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Load the seen-set.
    ///
    /// A missing file yields an empty set. A file that does not match the
    /// schema is copied to `<file>.backup` and an empty set is returned;
    /// only I/O failures (including a failed backup) are errors.
    pub async fn load(&self) -> Result<SeenSet> {
        let Some(bytes) = self.file.read_bytes().await? else {
            log::info!(
                "No seen-set at {}, starting empty",
                self.file.path().display()
            );
            return Ok(SeenSet::new());
        };

        match serde_json::from_slice::<SeenSetFile>(&bytes) {
            Ok(data) => {
                log::info!(
                    "Loaded {} seen courses from {}",
                    data.seen_courses.len(),
                    self.file.path().display()
                );
                Ok(data.seen_courses)
            }
            Err(e) => {
                log::error!(
                    "Seen-set at {} is corrupt: {}",
                    self.file.path().display(),
                    e
                );
                let backup = self.file.backup().await.map_err(|err| {
                    AppError::config(format!(
                        "corrupt seen-set {} could not be backed up: {err}",
                        self.file.path().display()
                    ))
                })?;
                log::warn!(
                    "Backed up corrupted seen-set to {}, starting empty",
                    backup.display()
                );
                Ok(SeenSet::new())
            }
        }
    }

    /// Persist the seen-set.
    pub async fn save(&self, seen: &SeenSet, now: DateTime<Utc>) -> Result<()> {
        let data = SeenSetFile {
            seen_courses: seen.clone(),
            last_updated: Some(now.into()),
            total_courses: seen.len(),
        };
        self.file.write_json(&data).await?;
        log::debug!("Saved {} seen courses", seen.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, SeenEntry};
    use tempfile::TempDir;

    fn sample_set(now: DateTime<Utc>) -> SeenSet {
        let item = Item::new("py-101", "Python 101", "https://example.com/course/py-101/", now);
        let mut seen = SeenSet::new();
        seen.commit("py-101", SeenEntry::first_sighting(&item, now));
        seen
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = SeenStore::new(tmp.path().join("seen_courses.json"));

        let seen = store.load().await.unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let store = SeenStore::new(tmp.path().join("seen_courses.json"));
        let now = Utc::now();

        store.save(&sample_set(now), now).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, sample_set(now));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["total_courses"], 1);
        assert!(raw["seen_courses"]["py-101"].is_object());
        assert!(raw["last_updated"].is_string());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_backed_up_and_reset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seen_courses.json");
        std::fs::write(&path, b"{\"seen_courses\": [1, 2, 3").unwrap();
        let store = SeenStore::new(&path);

        let seen = store.load().await.unwrap();

        assert!(seen.is_empty());
        let backup = tmp.path().join("seen_courses.json.backup");
        assert_eq!(
            std::fs::read(backup).unwrap(),
            b"{\"seen_courses\": [1, 2, 3"
        );
    }

    #[tokio::test]
    async fn test_wrong_shape_counts_as_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seen_courses.json");
        std::fs::write(&path, br#"{"seen_courses": ["a", "b"]}"#).unwrap();
        let store = SeenStore::new(&path);

        assert!(store.load().await.unwrap().is_empty());
        assert!(tmp.path().join("seen_courses.json.backup").exists());
    }

    #[tokio::test]
    async fn test_legacy_naive_timestamps_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("seen_courses.json");
        std::fs::write(
            &path,
            br#"{
                "seen_courses": {
                    "legacy": {
                        "title": "Old Course",
                        "url": "https://example.com/course/legacy/",
                        "first_seen": "2025-01-02T03:04:05.678901",
                        "last_seen": "2025-01-09T03:04:05.678901",
                        "seen_count": 4
                    }
                },
                "last_updated": "2025-01-09T03:04:06.000001",
                "total_courses": 1
            }"#,
        )
        .unwrap();
        let store = SeenStore::new(&path);

        let seen = store.load().await.unwrap();
        let entry = seen.get("legacy").unwrap();
        assert_eq!(entry.seen_count, 4);
        assert!(entry.last_seen.instant().is_some());
        assert!(!tmp.path().join("seen_courses.json.backup").exists());
    }
}
