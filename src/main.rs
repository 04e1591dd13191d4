//! Command-line entry point for the backup rotator.

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use clap::Parser;

use dumprotate::archive::{self, ArchiveResult, ArchiveStore, FileEntry};
use dumprotate::config::RotatorConfig;
use dumprotate::dump::create_dump_tool;
use dumprotate::notify::Mailer;
use dumprotate::observability::init_tracing;
use dumprotate::rotation::{select_bucket, Bucket};
use dumprotate::runner::{BackupRunner, RunOutcome, RunReport};

const DEFAULT_CONFIG_PATH: &str = "dumprotate.toml";

/// CLI arguments for dumprotate
#[derive(Parser, Debug)]
#[command(version, about = "Rotating daily/weekly/monthly database backups", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./dumprotate.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run one backup-and-rotate pass (default)
    Run {
        /// Run even if a pass already completed today
        #[arg(long)]
        force: bool,
        /// Log what would happen without dumping, deleting or updating state
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a commented default configuration file
    Init {
        /// Path to create the config file (defaults to ./dumprotate.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and show today's rotation decision
    Check,
    /// List a bucket's archives, oldest first
    Ls {
        /// Bucket to list (daily, weekly or monthly)
        bucket: String,
        /// Only archives for this data source
        #[arg(long)]
        source: Option<String>,
        /// Only print the oldest archive
        #[arg(long, conflicts_with = "latest")]
        oldest: bool,
        /// Only print the newest archive
        #[arg(long)]
        latest: bool,
    },
    /// Move an externally produced archive file into a bucket
    Ingest {
        /// Bucket to place the file in (daily, weekly or monthly)
        bucket: String,
        /// Archive file to move
        file: String,
    },
    /// Apply retention without running a backup
    Prune {
        /// Restrict to one bucket (defaults to all three)
        #[arg(long)]
        bucket: Option<String>,
        /// Log what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

/// Default configuration for `init`. Commented-out `${VAR}` references stay
/// unexpanded, so the template loads as-is.
fn default_config_toml() -> &'static str {
    r#"# dumprotate configuration
# Generated by `dumprotate init`

[backup]
# Root directory holding the daily/, weekly/ and monthly/ subdirectories.
path = "/var/backups/mongo"
# One archive per source per run. For mongodump these are database names.
sources = ["appdb"]
# Archive file extension, without a leading dot.
extension = "gz"

[backup.daily]
# Archives to keep per source. 0 disables retention for the bucket.
retention = 7

[backup.weekly]
retention = 4
# Weekday the weekly rotation runs on.
on = "sunday"

[backup.monthly]
retention = 12
# Day of the month the monthly rotation runs on. Monthly wins over weekly
# when both land on the same date.
on = 1

[dump]
type = "mongodump"
# binary = "mongodump"
# username = "backup"
# password = "${MONGO_BACKUP_PASSWORD}"
# auth_database = "admin"

# Any other dump program works too:
# [dump]
# type = "command"
# program = "pg_dump"
# args = ["--dbname={source}", "--format=custom", "--file={dest}"]

# By default the run marker lives under the backup root.
# [state]
# path = "/var/lib/dumprotate/state.json"

[notify]
enabled = false
# sendmail_path = "/usr/sbin/sendmail"
# from = "dumprotate@backup-host"
# to = ["ops@example.com"]
# on_success = false

[observability.logging]
level = "info"
# pretty, compact or json
format = "compact"
# file = "/var/log/dumprotate.log"
"#
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Check) => {
            run_check(args.config.as_deref());
        }
        Some(Command::Ls {
            bucket,
            source,
            oldest,
            latest,
        }) => {
            run_ls(args.config.as_deref(), &bucket, source.as_deref(), oldest, latest).await;
        }
        Some(Command::Ingest { bucket, file }) => {
            run_ingest(args.config.as_deref(), &bucket, &file).await;
        }
        Some(Command::Prune { bucket, dry_run }) => {
            run_prune(args.config.as_deref(), bucket.as_deref(), dry_run).await;
        }
        Some(Command::Run { force, dry_run }) => {
            run_backup(args.config.as_deref(), force, dry_run).await;
        }
        None => {
            run_backup(args.config.as_deref(), false, false).await;
        }
    }
}

/// Load the config or exit; runs before tracing is up, so errors go to
/// stderr directly.
fn load_config(explicit_path: Option<&str>) -> RotatorConfig {
    let path = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);
    match RotatorConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path, e);
            eprintln!("Run 'dumprotate init' to create a starter config.");
            std::process::exit(1);
        }
    }
}

fn init_tracing_or_exit(config: &RotatorConfig) {
    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }
}

fn parse_bucket_or_exit(name: &str) -> Bucket {
    match name.parse() {
        Ok(bucket) => bucket,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Run one backup-and-rotate pass.
async fn run_backup(config_path: Option<&str>, force: bool, dry_run: bool) {
    let config = load_config(config_path);
    init_tracing_or_exit(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backup_root = %config.backup.path,
        "Starting dumprotate"
    );

    let mailer = Mailer::new(config.notify.clone());
    let dump_tool = create_dump_tool(&config.dump);
    let runner = BackupRunner::new(&config, dump_tool);
    let today = Local::now().date_naive();

    match runner.run(today, force, dry_run).await {
        Ok(RunOutcome::SkippedAlreadyRan { .. }) => {}
        Ok(RunOutcome::Completed(report)) => {
            if report.has_delete_failures() {
                tracing::warn!(
                    failures = report.delete_failures,
                    "Some archives over retention could not be deleted"
                );
            }
            if mailer.is_enabled() && mailer.notify_on_success() && !report.dry_run {
                let subject = format!("dumprotate: backup pass complete ({})", report.date);
                if let Err(e) = mailer.send(&subject, &success_body(&report)).await {
                    tracing::warn!(error = %e, "Failed to send success report");
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Backup pass failed");
            if mailer.is_enabled() {
                let subject = format!("dumprotate: backup pass FAILED ({})", today);
                let body = format!("The backup pass on {} failed:\n\n{}", today, e);
                if let Err(mail_err) = mailer.send(&subject, &body).await {
                    tracing::warn!(error = %mail_err, "Failed to send failure report");
                }
            }
            std::process::exit(1);
        }
    }
}

fn success_body(report: &RunReport) -> String {
    format!(
        "Backup pass for {} completed.\n\n\
         Bucket:           {}\n\
         Sources dumped:   {}\n\
         Archives deleted: {}\n\
         Delete failures:  {}",
        report.date,
        report.bucket,
        report.sources_dumped,
        report.archives_deleted,
        report.delete_failures
    )
}

/// Validate the config and print today's rotation decision.
fn run_check(config_path: Option<&str>) {
    let config = load_config(config_path);

    let policy = config.backup.retention_policy();
    let schedule = config.backup.schedule();
    let today = Local::now().date_naive();
    let bucket = select_bucket(today, &schedule, &policy);
    let tool = create_dump_tool(&config.dump);

    println!("Configuration OK");
    println!("  backup root:  {}", config.backup.path);
    println!("  sources:      {}", config.backup.sources.join(", "));
    println!("  dump tool:    {}", tool.name());
    println!("  state file:   {}", config.state_path().display());
    for b in Bucket::ALL {
        let retention = policy.retention(b);
        let setting = if retention == 0 {
            "retention disabled".to_string()
        } else {
            format!("keep {}", retention)
        };
        println!("  {:8}      {}", format!("{}:", b), setting);
    }
    println!("  bucket today: {} ({})", bucket, today);
}

/// List archives in one bucket, oldest first.
async fn run_ls(
    config_path: Option<&str>,
    bucket: &str,
    source: Option<&str>,
    oldest: bool,
    latest: bool,
) {
    let config = load_config(config_path);
    let bucket = parse_bucket_or_exit(bucket);

    let store = ArchiveStore::new(&config.backup.path);
    let dir = store.bucket_dir(bucket);
    let pattern = source.map(ArchiveStore::source_pattern);

    let entries = match bucket_listing(&dir, pattern.as_deref(), oldest, latest).await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Failed to list {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };

    for entry in &entries {
        println!("{}  {}", format_created_at(entry.created_at), entry.name);
    }
}

/// Whole listing, or just one end of it for `--oldest`/`--latest`.
async fn bucket_listing(
    dir: &Path,
    pattern: Option<&str>,
    oldest: bool,
    latest: bool,
) -> ArchiveResult<Vec<FileEntry>> {
    if oldest {
        Ok(archive::oldest(dir, pattern).await?.into_iter().collect())
    } else if latest {
        Ok(archive::latest(dir, pattern).await?.into_iter().collect())
    } else {
        archive::scan(dir, pattern).await
    }
}

fn format_created_at(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|stamp| stamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Move an externally produced archive into a bucket, suffixing the name
/// if it is already taken. Prints the path the file ended up at.
async fn run_ingest(config_path: Option<&str>, bucket: &str, file: &str) {
    let config = load_config(config_path);
    init_tracing_or_exit(&config);
    let bucket = parse_bucket_or_exit(bucket);

    let path = PathBuf::from(file);
    let Some((src_dir, name)) = split_ingest_path(&path) else {
        eprintln!("Not a movable file path: {}", path.display());
        std::process::exit(1);
    };

    let store = ArchiveStore::new(&config.backup.path);
    if let Err(e) = store.ensure_bucket_dirs().await {
        tracing::error!(error = %e, "Ingest failed");
        std::process::exit(1);
    }

    match store.move_into(bucket, src_dir, name).await {
        Ok(landed) => {
            tracing::info!(
                file = %path.display(),
                bucket = %bucket,
                landed = %landed,
                "Ingested archive"
            );
            println!("{}", store.bucket_dir(bucket).join(&landed).display());
        }
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "Ingest failed");
            std::process::exit(1);
        }
    }
}

/// Directory and file name parts of an ingest argument. A bare file name
/// resolves against the current directory.
fn split_ingest_path(path: &Path) -> Option<(&Path, &str)> {
    let name = path.file_name()?.to_str()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some((dir, name))
}

/// Apply retention without dumping.
async fn run_prune(config_path: Option<&str>, bucket: Option<&str>, dry_run: bool) {
    let config = load_config(config_path);
    init_tracing_or_exit(&config);

    let buckets: Vec<Bucket> = match bucket {
        Some(name) => vec![parse_bucket_or_exit(name)],
        None => Bucket::ALL.to_vec(),
    };

    let dump_tool = create_dump_tool(&config.dump);
    let runner = BackupRunner::new(&config, dump_tool);

    match runner.prune(&buckets, dry_run).await {
        Ok(outcomes) => {
            let deleted: usize = outcomes.iter().map(|o| o.deleted_count()).sum();
            let failures: usize = outcomes.iter().map(|o| o.failures.len()).sum();
            tracing::info!(deleted, failures, dry_run, "Prune complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "Prune failed");
            std::process::exit(1);
        }
    }
}

/// Write the default configuration file.
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Edit backup.path and backup.sources, then check the result with:");
    println!("  dumprotate check");
    println!();
    println!("Schedule one run per day, e.g. in crontab:");
    println!("  30 2 * * *  dumprotate --config {}", output_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_template_loads() {
        let config = RotatorConfig::from_str(default_config_toml()).unwrap();

        assert_eq!(config.backup.path, "/var/backups/mongo");
        assert_eq!(config.backup.daily.retention, 7);
        assert_eq!(config.backup.weekly.retention, 4);
        assert_eq!(config.backup.monthly.retention, 12);
        assert!(!config.notify.enabled);
    }

    #[test]
    fn created_at_formatting_survives_out_of_range_stamps() {
        // i64::MAX millis is out of chrono's range and must not panic.
        let shown = format_created_at(i64::MAX);
        assert_eq!(shown, i64::MAX.to_string());
    }

    #[test]
    fn ingest_args_parse_bucket_and_file() {
        let args =
            Args::try_parse_from(["dumprotate", "ingest", "weekly", "/tmp/nightly.gz"]).unwrap();

        match args.command {
            Some(Command::Ingest { bucket, file }) => {
                assert_eq!(bucket, "weekly");
                assert_eq!(file, "/tmp/nightly.gz");
            }
            other => panic!("expected ingest, got: {other:?}"),
        }
    }

    #[test]
    fn ingest_path_splits_into_directory_and_name() {
        assert_eq!(
            split_ingest_path(Path::new("/backups/tmp/nightly.gz")),
            Some((Path::new("/backups/tmp"), "nightly.gz"))
        );
        assert_eq!(
            split_ingest_path(Path::new("nightly.gz")),
            Some((Path::new("."), "nightly.gz"))
        );
        assert_eq!(split_ingest_path(Path::new("/")), None);
    }

    #[tokio::test]
    async fn ls_end_flags_pick_a_single_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["db-2024-06-01.gz", "db-2024-06-02.gz", "db-2024-06-03.gz"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        let all = bucket_listing(dir.path(), None, false, false).await.unwrap();
        let oldest = bucket_listing(dir.path(), None, true, false).await.unwrap();
        let newest = bucket_listing(dir.path(), None, false, true).await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(oldest.len(), 1);
        assert_eq!(oldest[0].name, "db-2024-06-01.gz");
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].name, "db-2024-06-03.gz");
    }
}
