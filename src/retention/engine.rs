//! Surplus computation and best-effort deletion.

use crate::archive::{self, ArchiveResult, ArchiveStore, DeleteFailure, FileEntry};
use crate::rotation::Bucket;

/// Results from enforcing retention for one source in one bucket.
#[derive(Debug)]
pub struct RetentionOutcome {
    /// Bucket the policy ran against.
    pub bucket: Bucket,
    /// Source whose archives were examined.
    pub source: String,
    /// Number of matching archives found in the bucket.
    pub examined: usize,
    /// Names selected for deletion, oldest first.
    pub selected: Vec<String>,
    /// Per-file failures; empty when every deletion succeeded.
    pub failures: Vec<DeleteFailure>,
    /// True when the selection was reported without deleting.
    pub dry_run: bool,
}

impl RetentionOutcome {
    /// Number of archives actually removed.
    pub fn deleted_count(&self) -> usize {
        if self.dry_run {
            0
        } else {
            self.selected.len() - self.failures.len()
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Names that must go for an oldest-first listing to fit its retention cap.
///
/// A `retention` of zero disables the policy and selects nothing, as does a
/// listing at or under the cap. The result is always the leading prefix of
/// the input, so repeating the call over an unchanged listing selects the
/// same files.
pub fn files_to_delete(entries: &[FileEntry], retention: u32) -> Vec<String> {
    if retention == 0 || entries.len() <= retention as usize {
        return Vec::new();
    }

    let surplus = entries.len() - retention as usize;
    entries[..surplus]
        .iter()
        .map(|entry| entry.name.clone())
        .collect()
}

/// Enforce one source's retention cap inside one bucket.
///
/// Scans the bucket directory for the source's own archives, computes the
/// surplus against `retention` and deletes it. Individual delete failures
/// land in the outcome and never abort the batch. A dry run reports the
/// selection without touching anything.
pub async fn enforce(
    store: &ArchiveStore,
    bucket: Bucket,
    source: &str,
    retention: u32,
    dry_run: bool,
) -> ArchiveResult<RetentionOutcome> {
    let dir = store.bucket_dir(bucket);
    // Scoped to the source's own archive names so nested source names
    // never delete each other's files.
    let pattern = ArchiveStore::source_pattern(source);
    let entries = archive::scan(&dir, Some(&pattern)).await?;
    let selected = files_to_delete(&entries, retention);

    tracing::debug!(
        bucket = %bucket,
        source,
        retention,
        examined = entries.len(),
        surplus = selected.len(),
        "Computed retention surplus"
    );

    if selected.is_empty() {
        return Ok(RetentionOutcome {
            bucket,
            source: source.to_string(),
            examined: entries.len(),
            selected,
            failures: Vec::new(),
            dry_run,
        });
    }

    if dry_run {
        tracing::info!(
            bucket = %bucket,
            source,
            files = ?selected,
            "DRY RUN: would delete archives over retention"
        );
        return Ok(RetentionOutcome {
            bucket,
            source: source.to_string(),
            examined: entries.len(),
            selected,
            failures: Vec::new(),
            dry_run,
        });
    }

    tracing::info!(
        bucket = %bucket,
        source,
        files = ?selected,
        "Deleting archives over retention"
    );
    let failures = store.delete_files(bucket, &selected).await;

    Ok(RetentionOutcome {
        bucket,
        source: source.to_string(),
        examined: entries.len(),
        selected,
        failures,
        dry_run,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn entries(names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| FileEntry {
                name: name.to_string(),
                created_at: i as i64,
            })
            .collect()
    }

    #[test]
    fn selects_the_oldest_surplus() {
        let listing = entries(&["a.gz", "b.gz", "c.gz", "d.gz"]);
        assert_eq!(files_to_delete(&listing, 2), vec!["a.gz", "b.gz"]);
    }

    #[test]
    fn zero_retention_disables_the_policy() {
        let listing = entries(&["a.gz", "b.gz", "c.gz"]);
        assert!(files_to_delete(&listing, 0).is_empty());
    }

    #[test]
    fn under_cap_selects_nothing() {
        let listing = entries(&["a.gz", "b.gz"]);
        assert!(files_to_delete(&listing, 5).is_empty());
    }

    #[rstest]
    #[case(0, 3, 0)]
    #[case(3, 3, 0)]
    #[case(4, 3, 1)]
    #[case(10, 3, 7)]
    #[case(10, 1, 9)]
    fn surplus_is_count_minus_cap(
        #[case] count: usize,
        #[case] retention: u32,
        #[case] expected: usize,
    ) {
        let names: Vec<String> = (0..count).map(|i| format!("f{i}.gz")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let listing = entries(&refs);

        assert_eq!(files_to_delete(&listing, retention).len(), expected);
    }

    #[test]
    fn selection_is_idempotent_over_an_unchanged_listing() {
        let listing = entries(&["a.gz", "b.gz", "c.gz", "d.gz", "e.gz"]);
        let first = files_to_delete(&listing, 2);
        let second = files_to_delete(&listing, 2);
        assert_eq!(first, second);
    }

    async fn seed(dir: &Path, names: &[&str]) {
        for name in names {
            tokio::fs::write(dir.join(name), b"archive").await.unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
    }

    #[tokio::test]
    async fn enforce_deletes_only_the_surplus() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();
        let dir = store.bucket_dir(Bucket::Daily);
        seed(
            &dir,
            &[
                "orders-2024-06-01.gz",
                "orders-2024-06-02.gz",
                "orders-2024-06-03.gz",
            ],
        )
        .await;

        let outcome = enforce(&store, Bucket::Daily, "orders", 2, false)
            .await
            .unwrap();

        assert_eq!(outcome.examined, 3);
        assert_eq!(outcome.selected, vec!["orders-2024-06-01.gz"]);
        assert_eq!(outcome.deleted_count(), 1);
        assert!(!outcome.has_failures());
        assert!(!dir.join("orders-2024-06-01.gz").exists());
        assert!(dir.join("orders-2024-06-02.gz").exists());
        assert!(dir.join("orders-2024-06-03.gz").exists());
    }

    #[tokio::test]
    async fn enforce_leaves_other_sources_alone() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();
        let dir = store.bucket_dir(Bucket::Daily);
        seed(
            &dir,
            &[
                "users-2024-06-01.gz",
                "orders-2024-06-01.gz",
                "orders-2024-06-02.gz",
                "users-2024-06-02.gz",
            ],
        )
        .await;

        let outcome = enforce(&store, Bucket::Daily, "orders", 1, false)
            .await
            .unwrap();

        assert_eq!(outcome.selected, vec!["orders-2024-06-01.gz"]);
        assert!(dir.join("users-2024-06-01.gz").exists());
        assert!(dir.join("users-2024-06-02.gz").exists());
    }

    #[tokio::test]
    async fn enforce_ignores_nested_source_names() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();
        let dir = store.bucket_dir(Bucket::Daily);
        // "db" is a name prefix of "db2"; db's cap must not count or
        // delete db2's archives.
        seed(
            &dir,
            &[
                "db2-2024-06-01.gz",
                "db2-2024-06-02.gz",
                "db-2024-06-01.gz",
                "db-2024-06-02.gz",
                "db-2024-06-03.gz",
            ],
        )
        .await;

        let outcome = enforce(&store, Bucket::Daily, "db", 2, false).await.unwrap();

        assert_eq!(outcome.examined, 3);
        assert_eq!(outcome.selected, vec!["db-2024-06-01.gz"]);
        assert!(dir.join("db2-2024-06-01.gz").exists());
        assert!(dir.join("db2-2024-06-02.gz").exists());
    }

    #[tokio::test]
    async fn enforce_dry_run_deletes_nothing() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();
        let dir = store.bucket_dir(Bucket::Weekly);
        seed(
            &dir,
            &["db-2024-06-01.gz", "db-2024-06-02.gz", "db-2024-06-03.gz"],
        )
        .await;

        let outcome = enforce(&store, Bucket::Weekly, "db", 1, true).await.unwrap();

        assert_eq!(
            outcome.selected,
            vec!["db-2024-06-01.gz", "db-2024-06-02.gz"]
        );
        assert_eq!(outcome.deleted_count(), 0);
        assert!(dir.join("db-2024-06-01.gz").exists());
        assert!(dir.join("db-2024-06-02.gz").exists());
    }

    #[tokio::test]
    async fn enforce_on_an_empty_bucket_is_a_no_op() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();

        let outcome = enforce(&store, Bucket::Monthly, "db", 3, false).await.unwrap();

        assert_eq!(outcome.examined, 0);
        assert!(outcome.selected.is_empty());
        assert_eq!(outcome.deleted_count(), 0);
    }

    #[tokio::test]
    async fn enforce_twice_is_idempotent() {
        let root = TempDir::new().unwrap();
        let store = ArchiveStore::new(root.path());
        store.ensure_bucket_dirs().await.unwrap();
        let dir = store.bucket_dir(Bucket::Daily);
        seed(
            &dir,
            &[
                "db-2024-06-01.gz",
                "db-2024-06-02.gz",
                "db-2024-06-03.gz",
                "db-2024-06-04.gz",
            ],
        )
        .await;

        let first = enforce(&store, Bucket::Daily, "db", 2, false).await.unwrap();
        let second = enforce(&store, Bucket::Daily, "db", 2, false).await.unwrap();

        assert_eq!(first.deleted_count(), 2);
        assert_eq!(second.deleted_count(), 0);
        assert!(second.selected.is_empty());
        assert!(dir.join("db-2024-06-03.gz").exists());
        assert!(dir.join("db-2024-06-04.gz").exists());
    }
}
