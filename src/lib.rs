//! Scheduled backup rotation for database dumps.
//!
//! `dumprotate` is meant to run once a day from cron or a systemd timer.
//! Each run picks a rotation bucket (daily, weekly or monthly) for the
//! current date, invokes an external dump tool once per configured data
//! source, then deletes the oldest archives beyond each bucket's retention
//! cap. A small JSON marker file keeps a rerun on the same day from doing
//! the work twice.

pub mod archive;
pub mod config;
pub mod dump;
pub mod notify;
pub mod observability;
pub mod retention;
pub mod rotation;
pub mod runner;
