//! Archive directory layout and file operations.
//!
//! An archive tree is a root directory with one subdirectory per rotation
//! bucket (`daily/`, `weekly/`, `monthly/`). Each archive file inside a
//! bucket is named `<source>-<YYYY-MM-DD>.<extension>`. This module owns
//! everything that touches that tree: scanning, deleting, moving and
//! (re)creating the layout.

mod scanner;
mod store;

pub use scanner::{latest, oldest, scan, FileEntry};
pub use store::{ArchiveStore, DeleteFailure, MAX_MOVE_SUFFIX};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from archive tree operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The directory exists but its entries could not be listed.
    #[error("Cannot read directory {path}: {source}")]
    DirUnreadable {
        /// Directory that failed to list.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A bucket directory could not be created.
    #[error("Cannot create bucket directory {path}: {source}")]
    CreateDir {
        /// Directory that failed to create.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file name filter is not a valid regular expression.
    #[error("Invalid name filter: {0}")]
    Pattern(#[from] regex::Error),

    /// No free name was found when moving a file into a bucket.
    #[error("No collision-free name for '{name}' after {attempts} attempts")]
    CollisionExhausted {
        /// File name that kept colliding.
        name: String,
        /// Number of suffixed candidates tried.
        attempts: u32,
    },

    /// Any other I/O failure.
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
