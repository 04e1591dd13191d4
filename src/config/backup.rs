//! Backup layout, schedule and retention configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::rotation::{DayOfWeek, RetentionPolicy, RotationSchedule};

/// Backup root, data sources and per-bucket rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Root directory holding the `daily/`, `weekly/` and `monthly/`
    /// bucket directories.
    pub path: String,

    /// Data sources to dump, one archive per source per run.
    pub sources: Vec<String>,

    /// Archive file extension, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Daily bucket settings.
    #[serde(default)]
    pub daily: DailyBucketConfig,

    /// Weekly bucket settings.
    #[serde(default)]
    pub weekly: WeeklyBucketConfig,

    /// Monthly bucket settings.
    #[serde(default)]
    pub monthly: MonthlyBucketConfig,
}

impl BackupConfig {
    /// Per-bucket retention caps as a single policy value.
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            daily: self.daily.retention,
            weekly: self.weekly.retention,
            monthly: self.monthly.retention,
        }
    }

    /// Weekly and monthly trigger days as a single schedule value.
    pub fn schedule(&self) -> RotationSchedule {
        RotationSchedule {
            weekly_on: self.weekly.on,
            monthly_on: self.monthly.on,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("backup.path must not be empty".into());
        }
        if self.sources.is_empty() {
            return Err("backup.sources must list at least one data source".into());
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.trim().is_empty() {
                return Err("backup.sources entries must not be empty".into());
            }
            if !seen.insert(source.as_str()) {
                return Err(format!("backup.sources lists '{source}' more than once"));
            }
        }

        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err("backup.extension must be a bare extension like \"gz\"".into());
        }
        if !(1..=31).contains(&self.monthly.on) {
            return Err(format!(
                "backup.monthly.on must be between 1 and 31, got {}",
                self.monthly.on
            ));
        }

        Ok(())
    }
}

/// Daily bucket: eligible on every run, no trigger rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DailyBucketConfig {
    /// Archives to keep per source. Zero disables retention.
    #[serde(default = "default_daily_retention")]
    pub retention: u32,
}

impl Default for DailyBucketConfig {
    fn default() -> Self {
        Self {
            retention: default_daily_retention(),
        }
    }
}

/// Weekly bucket: takes over the run on one weekday.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeeklyBucketConfig {
    /// Archives to keep per source. Zero disables both the retention and
    /// the weekly trigger.
    #[serde(default = "default_weekly_retention")]
    pub retention: u32,

    /// Weekday the weekly rotation runs on.
    #[serde(default = "default_weekly_on")]
    pub on: DayOfWeek,
}

impl Default for WeeklyBucketConfig {
    fn default() -> Self {
        Self {
            retention: default_weekly_retention(),
            on: default_weekly_on(),
        }
    }
}

/// Monthly bucket: takes over the run on one day of the month.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonthlyBucketConfig {
    /// Archives to keep per source. Zero disables both the retention and
    /// the monthly trigger.
    #[serde(default = "default_monthly_retention")]
    pub retention: u32,

    /// Day of the month (1 to 31) the monthly rotation runs on. Months
    /// without that day simply never trigger it.
    #[serde(default = "default_monthly_on")]
    pub on: u8,
}

impl Default for MonthlyBucketConfig {
    fn default() -> Self {
        Self {
            retention: default_monthly_retention(),
            on: default_monthly_on(),
        }
    }
}

fn default_extension() -> String {
    "gz".to_string()
}

fn default_daily_retention() -> u32 {
    7
}

fn default_weekly_retention() -> u32 {
    4
}

fn default_monthly_retention() -> u32 {
    12
}

fn default_weekly_on() -> DayOfWeek {
    DayOfWeek::Sunday
}

fn default_monthly_on() -> u8 {
    1
}
