//! Directory scanning ordered by file creation time.

use std::{
    path::Path,
    time::UNIX_EPOCH,
};

use regex::Regex;

use super::{ArchiveError, ArchiveResult};

/// One regular file captured at scan time.
///
/// Entries are snapshots of a single directory listing. They are recomputed
/// on every scan and never cached across runs, so a file that appears or
/// disappears between runs is simply reflected in the next listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name without any directory component.
    pub name: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// List the regular files in `dir`, oldest first.
///
/// A directory that does not exist yields an empty listing; callers that
/// need to distinguish "no archives yet" from a bad path should check for
/// the directory separately. A directory that exists but cannot be read is
/// an error.
///
/// `name_pattern` is a regular expression matched anywhere in the file name,
/// so an escaped literal behaves as a substring filter. Subdirectories and
/// other non-regular entries are skipped. Names are listed lossily: a name
/// that is not valid UTF-8 appears with replacement characters and will not
/// resolve back to the file on disk.
///
/// The sort is ascending by creation time and stable, so entries with equal
/// timestamps keep the order the operating system listed them in.
pub async fn scan(dir: &Path, name_pattern: Option<&str>) -> ArchiveResult<Vec<FileEntry>> {
    let filter = match name_pattern {
        Some(pattern) => Some(Regex::new(pattern)?),
        None => None,
    };

    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ArchiveError::DirUnreadable {
                path: dir.to_path_buf(),
                source: e,
            });
        }
    };

    let mut entries = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                return Err(ArchiveError::DirUnreadable {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(re) = &filter
            && !re.is_match(&name)
        {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping entry with unreadable metadata"
                );
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        entries.push(FileEntry {
            name,
            created_at: created_at_millis(&metadata),
        });
    }

    // Stable sort: equal timestamps keep their listing order.
    entries.sort_by_key(|entry| entry.created_at);

    tracing::debug!(
        dir = %dir.display(),
        filter = name_pattern.unwrap_or("<none>"),
        files = entries.len(),
        "Scanned archive directory"
    );

    Ok(entries)
}

/// Most recently created matching file, if any.
pub async fn latest(dir: &Path, name_pattern: Option<&str>) -> ArchiveResult<Option<FileEntry>> {
    Ok(scan(dir, name_pattern).await?.pop())
}

/// Oldest matching file, if any.
pub async fn oldest(dir: &Path, name_pattern: Option<&str>) -> ArchiveResult<Option<FileEntry>> {
    Ok(scan(dir, name_pattern).await?.into_iter().next())
}

/// Creation time in milliseconds since the Unix epoch.
///
/// Filesystems without a birth time fall back to the modification time.
/// Pre-epoch timestamps clamp to zero.
fn created_at_millis(metadata: &std::fs::Metadata) -> i64 {
    let stamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(UNIX_EPOCH);

    stamp
        .duration_since(UNIX_EPOCH)
        .map(|since_epoch| since_epoch.as_millis() as i64)
        .unwrap_or(0)
}
