//! Bucket directory layout and file-level maintenance operations.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::{ArchiveError, ArchiveResult};
use crate::rotation::Bucket;

/// Highest `_N` suffix tried when moving a file into a directory where the
/// name is already taken.
pub const MAX_MOVE_SUFFIX: u32 = 100;

/// One failed deletion in a best-effort batch.
#[derive(Debug)]
pub struct DeleteFailure {
    /// File name that could not be removed.
    pub name: String,
    /// Underlying I/O error.
    pub cause: std::io::Error,
}

impl std::fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.cause)
    }
}

/// The on-disk archive tree: one subdirectory per bucket under a root.
///
/// Paths follow `<root>/<bucket>/<source>-<YYYY-MM-DD>.<extension>`.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one bucket's archives.
    pub fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(bucket.as_str())
    }

    /// Archive file name for one source on one date.
    pub fn archive_name(source: &str, date: NaiveDate, extension: &str) -> String {
        format!("{source}-{}.{extension}", date.format("%Y-%m-%d"))
    }

    /// Regex matching the archives `archive_name` produces for one source,
    /// including `_N` collision suffixes.
    ///
    /// Anchored to the `<source>-<date>` prefix so one source never matches
    /// another source's files, even when their names nest (`db`, `db2`,
    /// `db-main`).
    pub fn source_pattern(source: &str) -> String {
        format!(r"^{}-\d{{4}}-\d{{2}}-\d{{2}}", regex::escape(source))
    }

    /// Full path of one source's archive inside a bucket.
    pub fn archive_path(
        &self,
        bucket: Bucket,
        source: &str,
        date: NaiveDate,
        extension: &str,
    ) -> PathBuf {
        self.bucket_dir(bucket)
            .join(Self::archive_name(source, date, extension))
    }

    /// Create any bucket directories that are missing.
    ///
    /// Creating an already-present directory is not an error; the layout is
    /// re-ensured at the start of every run.
    pub async fn ensure_bucket_dirs(&self) -> ArchiveResult<()> {
        for bucket in Bucket::ALL {
            let dir = self.bucket_dir(bucket);
            if tokio::fs::metadata(&dir).await.is_err() {
                tracing::info!(dir = %dir.display(), "Creating bucket directory");
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ArchiveError::CreateDir {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Delete the named files from a bucket, best effort.
    ///
    /// Every file is attempted independently. Failures, including a file
    /// that disappeared after it was scanned, are collected per name and
    /// never abort the rest of the batch.
    pub async fn delete_files(&self, bucket: Bucket, names: &[String]) -> Vec<DeleteFailure> {
        let dir = self.bucket_dir(bucket);
        let mut failures = Vec::new();

        for name in names {
            let path = dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Deleted archive");
                }
                Err(e) => {
                    tracing::error!(file = %name, error = %e, "Couldn't remove archive file");
                    failures.push(DeleteFailure {
                        name: name.clone(),
                        cause: e,
                    });
                }
            }
        }

        failures
    }

    /// Move `file_name` from `src_dir` into a bucket, appending `_1`, `_2`
    /// and so on before the extension while the target name is taken.
    ///
    /// Returns the name the file ended up with. Gives up after
    /// [`MAX_MOVE_SUFFIX`] suffixed candidates.
    pub async fn move_into(
        &self,
        bucket: Bucket,
        src_dir: &Path,
        file_name: &str,
    ) -> ArchiveResult<String> {
        self.move_into_bounded(bucket, src_dir, file_name, MAX_MOVE_SUFFIX)
            .await
    }

    async fn move_into_bounded(
        &self,
        bucket: Bucket,
        src_dir: &Path,
        file_name: &str,
        max_suffix: u32,
    ) -> ArchiveResult<String> {
        let src = src_dir.join(file_name);
        let dst_dir = self.bucket_dir(bucket);

        for attempt in 0..=max_suffix {
            let candidate = suffixed_name(file_name, attempt);
            let dst = dst_dir.join(&candidate);
            if tokio::fs::try_exists(&dst).await? {
                continue;
            }

            tokio::fs::rename(&src, &dst).await?;
            tracing::debug!(
                from = %src.display(),
                to = %dst.display(),
                "Moved file into bucket"
            );
            return Ok(candidate);
        }

        Err(ArchiveError::CollisionExhausted {
            name: file_name.to_string(),
            attempts: max_suffix,
        })
    }
}

/// `report.txt` becomes `report_2.txt`; names without an extension get the
/// suffix appended whole. A zero suffix returns the name unchanged.
fn suffixed_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }

    let path = Path::new(name);
    match (
        path.file_stem().and_then(|stem| stem.to_str()),
        path.extension().and_then(|ext| ext.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}
