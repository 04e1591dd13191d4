//! The run controller: one backup-and-rotate pass end to end.
//!
//! A pass ensures the bucket layout exists, consults the run marker,
//! selects the rotation bucket for the day, dumps every configured source
//! into it, enforces per-source retention and finally persists the marker.
//! Dumps fail fast and leave the marker untouched, so a rerun after a
//! failure repeats the whole pass under the same day's label. Retention
//! failures are collected and reported but never fail the pass.

mod marker;

pub use marker::{MarkerError, RunMarker};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveStore};
use crate::config::RotatorConfig;
use crate::dump::{DumpError, DumpTool};
use crate::retention::{self, RetentionOutcome};
use crate::rotation::{select_bucket, Bucket, RetentionPolicy, RotationSchedule};

/// Fatal errors that abort a pass.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Archive layout error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Dump(#[from] DumpError),

    #[error("Run marker error: {0}")]
    Marker(#[from] MarkerError),
}

/// What one invocation did.
#[derive(Debug)]
pub enum RunOutcome {
    /// A pass ran to completion (or was fully evaluated, for a dry run).
    Completed(RunReport),

    /// The marker said a pass already completed today.
    SkippedAlreadyRan {
        /// Date recorded in the marker.
        last_run_date: NaiveDate,
    },
}

/// Results from a completed pass.
#[derive(Debug)]
pub struct RunReport {
    /// Bucket the pass ran against.
    pub bucket: Bucket,
    /// Day the pass was labelled with.
    pub date: NaiveDate,
    /// Sources successfully dumped.
    pub sources_dumped: usize,
    /// Archives removed by retention across all sources.
    pub archives_deleted: usize,
    /// Archives that could not be removed.
    pub delete_failures: usize,
    /// True when nothing was actually dumped, deleted or recorded.
    pub dry_run: bool,
}

impl RunReport {
    pub fn has_delete_failures(&self) -> bool {
        self.delete_failures > 0
    }
}

/// Drives one invocation end to end.
pub struct BackupRunner {
    store: ArchiveStore,
    dump_tool: Arc<dyn DumpTool>,
    sources: Vec<String>,
    extension: String,
    schedule: RotationSchedule,
    policy: RetentionPolicy,
    marker_path: PathBuf,
}

impl BackupRunner {
    pub fn new(config: &RotatorConfig, dump_tool: Arc<dyn DumpTool>) -> Self {
        Self {
            store: ArchiveStore::new(&config.backup.path),
            dump_tool,
            sources: config.backup.sources.clone(),
            extension: config.backup.extension.clone(),
            schedule: config.backup.schedule(),
            policy: config.backup.retention_policy(),
            marker_path: config.state_path(),
        }
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Run one pass labelled with `today`.
    ///
    /// `force` bypasses the same-day marker check for operator reruns.
    /// A dry run evaluates the whole pass, logging what it would do, but
    /// dumps nothing, deletes nothing and leaves the marker untouched.
    pub async fn run(
        &self,
        today: NaiveDate,
        force: bool,
        dry_run: bool,
    ) -> Result<RunOutcome, RunError> {
        // Layout first: without the bucket directories there is nowhere
        // for the dump tool to write.
        self.store.ensure_bucket_dirs().await?;

        if let Some(marker) = self.load_marker().await
            && marker.last_run_date == today
        {
            if force {
                tracing::info!(
                    last_run = %marker.last_run_date,
                    "Already ran today, continuing because of --force"
                );
            } else {
                tracing::info!(
                    last_run = %marker.last_run_date,
                    "Already ran today, nothing to do"
                );
                return Ok(RunOutcome::SkippedAlreadyRan {
                    last_run_date: marker.last_run_date,
                });
            }
        }

        let bucket = select_bucket(today, &self.schedule, &self.policy);
        tracing::info!(
            bucket = %bucket,
            date = %today,
            retention = self.policy.retention(bucket),
            sources = self.sources.len(),
            dry_run,
            "Starting backup pass"
        );

        let mut report = RunReport {
            bucket,
            date: today,
            sources_dumped: 0,
            archives_deleted: 0,
            delete_failures: 0,
            dry_run,
        };

        // Dumps are sequential and fail fast: a failed source aborts the
        // pass with the marker untouched, so the next invocation redoes
        // every source under the same day's label.
        for source in &self.sources {
            let dest = self.store.archive_path(bucket, source, today, &self.extension);
            if dry_run {
                tracing::info!(source, dest = %dest.display(), "DRY RUN: would dump");
                continue;
            }

            tracing::info!(source, dest = %dest.display(), "Dumping source");
            self.dump_tool.dump(source, &dest).await?;
            report.sources_dumped += 1;
        }

        for source in &self.sources {
            let outcome = retention::enforce(
                &self.store,
                bucket,
                source,
                self.policy.retention(bucket),
                dry_run,
            )
            .await?;
            report.archives_deleted += outcome.deleted_count();
            report.delete_failures += outcome.failures.len();
        }

        if dry_run {
            tracing::info!(bucket = %bucket, "DRY RUN: marker left untouched");
            return Ok(RunOutcome::Completed(report));
        }

        RunMarker {
            last_run_date: today,
        }
        .save(&self.marker_path)
        .await?;

        tracing::info!(
            bucket = %bucket,
            sources = report.sources_dumped,
            deleted = report.archives_deleted,
            delete_failures = report.delete_failures,
            "Backup pass complete"
        );

        Ok(RunOutcome::Completed(report))
    }

    /// Apply retention only, without dumping or touching the marker.
    pub async fn prune(
        &self,
        buckets: &[Bucket],
        dry_run: bool,
    ) -> Result<Vec<RetentionOutcome>, RunError> {
        self.store.ensure_bucket_dirs().await?;

        let mut outcomes = Vec::new();
        for &bucket in buckets {
            for source in &self.sources {
                let outcome = retention::enforce(
                    &self.store,
                    bucket,
                    source,
                    self.policy.retention(bucket),
                    dry_run,
                )
                .await?;
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    /// Marker contents, with an unreadable marker degraded to absent so a
    /// corrupt state file never wedges the schedule.
    async fn load_marker(&self) -> Option<RunMarker> {
        match RunMarker::load(&self.marker_path).await {
            Ok(marker) => marker,
            Err(e) => {
                tracing::warn!(
                    path = %self.marker_path.display(),
                    error = %e,
                    "Ignoring unreadable run marker"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::dump::{DumpError, DumpOutput, DumpTool};

    /// Test double that writes the destination file and records each call.
    struct RecordingDump {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingDump {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(source: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(source.to_string()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DumpTool for RecordingDump {
        async fn dump(&self, source: &str, dest: &Path) -> Result<DumpOutput, DumpError> {
            self.calls.lock().unwrap().push(source.to_string());
            if self.fail_on.as_deref() == Some(source) {
                return Err(DumpError::Spawn {
                    tool: "fake".into(),
                    source: std::io::Error::other("simulated dump failure"),
                });
            }
            tokio::fs::write(dest, b"fake archive").await.unwrap();
            Ok(DumpOutput {
                stdout: String::new(),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn config_for(root: &Path) -> RotatorConfig {
        RotatorConfig::from_str(&format!(
            r#"
            [backup]
            path = "{}"
            sources = ["alpha", "beta"]

            [backup.daily]
            retention = 2
        "#,
            root.display()
        ))
        .unwrap()
    }

    fn runner_with(
        config: &RotatorConfig,
        dump: RecordingDump,
    ) -> (BackupRunner, Arc<RecordingDump>) {
        let dump = Arc::new(dump);
        let runner = BackupRunner::new(config, dump.clone());
        (runner, dump)
    }

    // 2024-06-05 is a Wednesday, so a plain daily run.
    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()
    }

    #[tokio::test]
    async fn full_pass_dumps_every_source_and_records_the_marker() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.bucket, Bucket::Daily);
        assert_eq!(report.sources_dumped, 2);
        assert_eq!(dump.calls(), vec!["alpha", "beta"]);

        let daily = runner.store().bucket_dir(Bucket::Daily);
        assert!(daily.join("alpha-2024-06-05.gz").exists());
        assert!(daily.join("beta-2024-06-05.gz").exists());

        let marker = RunMarker::load(&config.state_path()).await.unwrap().unwrap();
        assert_eq!(marker.last_run_date, wednesday());
    }

    #[tokio::test]
    async fn second_run_on_the_same_day_skips() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        runner.run(wednesday(), false, false).await.unwrap();
        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::SkippedAlreadyRan { last_run_date } if last_run_date == wednesday()
        ));
        // Only the first pass reached the dump tool.
        assert_eq!(dump.calls(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn force_reruns_on_the_same_day() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        runner.run(wednesday(), false, false).await.unwrap();
        let outcome = runner.run(wednesday(), true, false).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(dump.calls(), vec!["alpha", "beta", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn failed_dump_aborts_without_marker_or_later_sources() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::failing_on("beta"));

        let err = runner.run(wednesday(), false, false).await.unwrap_err();

        assert!(matches!(err, RunError::Dump(_)));
        // alpha was dumped before the failure, beta attempted, nothing after.
        assert_eq!(dump.calls(), vec!["alpha", "beta"]);
        assert!(runner
            .store()
            .bucket_dir(Bucket::Daily)
            .join("alpha-2024-06-05.gz")
            .exists());
        assert!(RunMarker::load(&config.state_path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rerun_after_failure_repeats_the_whole_pass() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());

        let (runner, _) = runner_with(&config, RecordingDump::failing_on("beta"));
        runner.run(wednesday(), false, false).await.unwrap_err();

        let (runner, dump) = runner_with(&config, RecordingDump::new());
        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(dump.calls(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn retention_trims_old_archives_during_the_pass() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, _) = runner_with(&config, RecordingDump::new());

        // Pre-seed older dailies so today's archive pushes alpha over the
        // retention cap of 2.
        runner.store().ensure_bucket_dirs().await.unwrap();
        let daily = runner.store().bucket_dir(Bucket::Daily);
        for name in ["alpha-2024-06-03.gz", "alpha-2024-06-04.gz"] {
            tokio::fs::write(daily.join(name), b"old").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass");
        };
        assert_eq!(report.archives_deleted, 1);
        assert!(!daily.join("alpha-2024-06-03.gz").exists());
        assert!(daily.join("alpha-2024-06-04.gz").exists());
        assert!(daily.join("alpha-2024-06-05.gz").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_failures_are_counted_without_failing_the_pass() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, _) = runner_with(&config, RecordingDump::new());

        runner.store().ensure_bucket_dirs().await.unwrap();
        let daily = runner.store().bucket_dir(Bucket::Daily);

        // A non-UTF-8 byte in the oldest archive's name survives on disk
        // but cannot round-trip through the listing, so its deletion fails.
        let stuck = OsString::from_vec(b"alpha-2024-06-01\xff.gz".to_vec());
        let stuck_path = daily.join(&stuck);
        tokio::fs::write(&stuck_path, b"old").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        for name in ["alpha-2024-06-03.gz", "alpha-2024-06-04.gz"] {
            tokio::fs::write(daily.join(name), b"old").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass");
        };
        // Four alpha archives against a cap of 2: the stuck file fails to
        // delete, the other surplus file is removed.
        assert!(report.has_delete_failures());
        assert_eq!(report.delete_failures, 1);
        assert_eq!(report.archives_deleted, 1);
        assert!(stuck_path.exists());
        assert!(!daily.join("alpha-2024-06-03.gz").exists());

        // The failed deletion still counted as a completed pass.
        let marker = RunMarker::load(&config.state_path()).await.unwrap().unwrap();
        assert_eq!(marker.last_run_date, wednesday());
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        let outcome = runner.run(wednesday(), false, true).await.unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed dry run");
        };
        assert!(report.dry_run);
        assert_eq!(report.sources_dumped, 0);
        assert!(dump.calls().is_empty());
        assert!(RunMarker::load(&config.state_path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_marker_degrades_to_a_fresh_run() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        tokio::fs::write(config.state_path(), "{ not json").await.unwrap();
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        let outcome = runner.run(wednesday(), false, false).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(dump.calls(), vec!["alpha", "beta"]);
        // The pass rewrote the marker with valid contents.
        let marker = RunMarker::load(&config.state_path()).await.unwrap().unwrap();
        assert_eq!(marker.last_run_date, wednesday());
    }

    #[tokio::test]
    async fn prune_trims_without_dumping() {
        let root = TempDir::new().unwrap();
        let config = config_for(root.path());
        let (runner, dump) = runner_with(&config, RecordingDump::new());

        runner.store().ensure_bucket_dirs().await.unwrap();
        let daily = runner.store().bucket_dir(Bucket::Daily);
        for name in [
            "alpha-2024-06-02.gz",
            "alpha-2024-06-03.gz",
            "alpha-2024-06-04.gz",
        ] {
            tokio::fs::write(daily.join(name), b"old").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        let outcomes = runner.prune(&[Bucket::Daily], false).await.unwrap();

        let deleted: usize = outcomes.iter().map(|o| o.deleted_count()).sum();
        assert_eq!(deleted, 1);
        assert!(dump.calls().is_empty());
        assert!(!daily.join("alpha-2024-06-02.gz").exists());
    }
}
