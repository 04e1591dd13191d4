//! The persisted run marker.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date of the last completed backup pass.
///
/// This is the only mutable state the rotator persists. It is read once at
/// the start of a run and written once after a pass completes, and it
/// guards at calendar-day granularity only: two invocations racing the
/// check on the same day can both pass it, so schedule one invocation per
/// day rather than relying on the marker for mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    /// Day the last pass completed, in the local calendar.
    pub last_run_date: NaiveDate,
}

impl RunMarker {
    /// Read the marker, if one exists.
    ///
    /// A missing file means no pass has completed yet. An unreadable or
    /// unparsable marker is an error; callers decide whether to treat it
    /// as absent.
    pub async fn load(path: &Path) -> Result<Option<RunMarker>, MarkerError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MarkerError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let marker = serde_json::from_str(&contents).map_err(|e| MarkerError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Some(marker))
    }

    /// Persist the marker, replacing any previous one.
    pub async fn save(&self, path: &Path) -> Result<(), MarkerError> {
        let json = serde_json::to_string_pretty(self).map_err(MarkerError::Serialize)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| MarkerError::Write {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

/// Run marker persistence errors.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Failed to read run marker {path}: {source}")]
    Read {
        /// Marker file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    #[error("Run marker {path} is not valid JSON: {source}")]
    Parse {
        /// Marker file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    #[error("Failed to write run marker {path}: {source}")]
    Write {
        /// Marker file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    #[error("Failed to serialize run marker: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn load_on_a_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        assert!(RunMarker::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let marker = RunMarker {
            last_run_date: date(2024, 6, 5),
        };

        marker.save(&path).await.unwrap();
        let loaded = RunMarker::load(&path).await.unwrap().unwrap();

        assert_eq!(loaded, marker);
    }

    #[tokio::test]
    async fn save_overwrites_the_previous_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        RunMarker {
            last_run_date: date(2024, 6, 4),
        }
        .save(&path)
        .await
        .unwrap();
        RunMarker {
            last_run_date: date(2024, 6, 5),
        }
        .save(&path)
        .await
        .unwrap();

        let loaded = RunMarker::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.last_run_date, date(2024, 6, 5));
    }

    #[tokio::test]
    async fn corrupt_marker_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = RunMarker::load(&path).await.unwrap_err();
        assert!(matches!(err, MarkerError::Parse { .. }));
    }
}
