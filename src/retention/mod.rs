//! Retention enforcement: keep the newest N archives per source.
//!
//! Retention runs against one bucket directory at a time. Archives are
//! matched to their source by file name, ordered oldest first, and the
//! surplus beyond the configured cap is deleted. Deletion is best effort:
//! a file that cannot be removed is reported and retried naturally on the
//! next run, and a cap of zero disables the policy entirely.

mod engine;

pub use engine::{enforce, files_to_delete, RetentionOutcome};
